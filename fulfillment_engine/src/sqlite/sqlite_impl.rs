//! `SqliteDatabase` is the reference backend for the fulfillment engine.
//!
//! It implements every trait in the [`crate::traits`] module on top of SQLite. Operations that
//! span order state, stock, counters and history run inside a single transaction, and every
//! state-changing statement re-checks its precondition in the `WHERE` clause, so concurrent
//! writers can race safely: one wins, the rest match zero rows and are told so.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use mfb_common::{Cents, Coordinates};
use sqlx::SqlitePool;

use super::db::{actors, commissions, db_url, dispatch, new_pool, orders, payments, stock};
use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{
        ActorId,
        ActorProfile,
        CandidateActor,
        CommissionRecord,
        DispatchResponse,
        NewActor,
        NewOrder,
        NewPayment,
        NotifiedActor,
        Order,
        OrderId,
        OrderStatusType,
        Payment,
        PaymentStatus,
        StatusEntry,
    },
    traits::{
        ActorApiError,
        ActorManagement,
        CancellationOutcome,
        CandidateFilter,
        ClaimOutcome,
        CommissionApiError,
        CommissionManagement,
        FulfillmentDatabase,
        FulfillmentError,
        MarkPaidOutcome,
        NewCommissionRecord,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using `MFB_DATABASE_URL` (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl FulfillmentDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = orders::fetch_order_by_order_id(&order.order_id, &mut tx).await? {
            tx.commit().await?;
            return Ok((existing, false));
        }
        let inserted = orders::insert_order(&order, &mut tx).await?;
        orders::append_history(&inserted.order_id, OrderStatusType::Placed, &order.customer_id, None, &mut tx).await?;
        stock::insert_order_items(&inserted.order_id, &order.items, &mut tx).await?;
        for item in &order.items {
            stock::reserve(item, &mut tx).await?;
        }
        tx.commit().await?;
        debug!("🗃️ Order {} saved with id {} ({} item(s) reserved)", inserted.order_id, inserted.id, order.items.len());
        Ok((inserted, true))
    }

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_id(order_id, &mut conn).await?)
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::search_orders(query, &mut conn).await?)
    }

    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<StatusEntry>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_history(order_id, &mut conn).await
    }

    async fn claim_order(&self, order_id: &OrderId, actor_id: &ActorId) -> Result<ClaimOutcome, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        match orders::claim(order_id, actor_id, &mut tx).await? {
            Some(order) => {
                orders::append_history(order_id, OrderStatusType::Assigned, actor_id.as_str(), None, &mut tx).await?;
                dispatch::mark_accepted(order_id, actor_id, &mut tx).await?;
                actors::adjust_assignments(actor_id, 1, &mut tx).await?;
                tx.commit().await?;
                debug!("🗃️ Order {order_id} claimed by {actor_id}");
                Ok(ClaimOutcome::Claimed(order))
            },
            None => {
                // Matched zero rows: somebody else got here first, or the order left the
                // claimable states. Re-read to say which; never retry the claim.
                let order = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
                tx.commit().await?;
                match order {
                    None => Err(FulfillmentError::OrderNotFound(order_id.clone())),
                    Some(o) if o.fulfiller_id.is_some() => Ok(ClaimOutcome::AlreadyClaimed),
                    Some(o) => Ok(ClaimOutcome::StaleState(o.status)),
                }
            },
        }
    }

    async fn update_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
        by: &str,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        match orders::update_order_status(order_id, expected, new_status, &mut tx).await? {
            Some(order) => {
                orders::append_history(order_id, new_status, by, note, &mut tx).await?;
                tx.commit().await?;
                Ok(order)
            },
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
                tx.commit().await?;
                match order {
                    None => Err(FulfillmentError::OrderNotFound(order_id.clone())),
                    Some(o) => Err(FulfillmentError::StaleState(order_id.clone(), o.status)),
                }
            },
        }
    }

    async fn cancel_order(
        &self,
        order_id: &OrderId,
        by: &str,
        note: Option<&str>,
    ) -> Result<CancellationOutcome, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let before = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))?;
        if before.status == OrderStatusType::Cancelled {
            tx.commit().await?;
            return Ok(CancellationOutcome {
                order: before,
                restored_items: 0,
                released_assignment: false,
                refund_marked: false,
            });
        }
        if !before.status.may_transition_to(OrderStatusType::Cancelled) {
            tx.commit().await?;
            return Err(FulfillmentError::InvalidTransition {
                order_id: order_id.clone(),
                from: before.status,
                to: OrderStatusType::Cancelled,
            });
        }
        let order = orders::update_order_status(order_id, before.status, OrderStatusType::Cancelled, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::StaleState(order_id.clone(), before.status))?;
        orders::append_history(order_id, OrderStatusType::Cancelled, by, note, &mut tx).await?;
        let restored_items = stock::restore_for_order(order_id, &mut tx).await?;
        let released_assignment = match (&order.fulfiller_id, before.status.holds_assignment()) {
            (Some(fulfiller), true) => actors::adjust_assignments(fulfiller, -1, &mut tx).await?,
            _ => false,
        };
        let refund_marked = payments::mark_refund_due_if_captured(order_id, &mut tx).await?;
        dispatch::expire_pending(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!(
            "🗃️ Order {order_id} cancelled (was {}). Stock restored: {restored_items}, assignment released: \
             {released_assignment}, refund marked: {refund_marked}",
            before.status
        );
        Ok(CancellationOutcome { order, restored_items, released_assignment, refund_marked })
    }

    async fn complete_order(&self, order_id: &OrderId, by: &str, earning: Cents) -> Result<Order, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::update_order_status(order_id, OrderStatusType::InProgress, OrderStatusType::Completed, &mut tx)
            .await?
        {
            Some(order) => order,
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
                tx.commit().await?;
                return match order {
                    None => Err(FulfillmentError::OrderNotFound(order_id.clone())),
                    Some(o) if o.status == OrderStatusType::Completed => Ok(o),
                    Some(o) => Err(FulfillmentError::StaleState(order_id.clone(), o.status)),
                };
            },
        };
        orders::append_history(order_id, OrderStatusType::Completed, by, None, &mut tx).await?;
        let fulfiller = order
            .fulfiller_id
            .clone()
            .ok_or_else(|| FulfillmentError::DatabaseError(format!("Completed order {order_id} has no fulfiller")))?;
        actors::record_completion(&fulfiller, earning, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} completed by {fulfiller}; {earning} credited");
        Ok(order)
    }

    async fn release_assignment(
        &self,
        order_id: &OrderId,
        by: &str,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let before = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))?;
        let Some(fulfiller) = before.fulfiller_id.clone() else {
            tx.commit().await?;
            return Err(FulfillmentError::StaleState(order_id.clone(), before.status));
        };
        let order = match orders::clear_assignment(order_id, &mut tx).await? {
            Some(order) => order,
            None => {
                tx.commit().await?;
                return Err(FulfillmentError::StaleState(order_id.clone(), before.status));
            },
        };
        orders::append_history(order_id, OrderStatusType::Rejected, by, note, &mut tx).await?;
        actors::adjust_assignments(&fulfiller, -1, &mut tx).await?;
        dispatch::expire_pending(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {order_id} released by {fulfiller}");
        Ok(order)
    }

    async fn record_no_actor_found(&self, order_id: &OrderId) -> Result<Order, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::update_order_status(
            order_id,
            OrderStatusType::Searching,
            OrderStatusType::NoActorFound,
            &mut tx,
        )
        .await?
        {
            Some(order) => order,
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx).await?;
                tx.commit().await?;
                return match order {
                    None => Err(FulfillmentError::OrderNotFound(order_id.clone())),
                    Some(o) if o.status == OrderStatusType::NoActorFound => Ok(o),
                    Some(o) => Err(FulfillmentError::StaleState(order_id.clone(), o.status)),
                };
            },
        };
        orders::append_history(order_id, OrderStatusType::NoActorFound, "system", Some("dispatch exhausted"), &mut tx)
            .await?;
        payments::mark_refund_due_if_captured(order_id, &mut tx).await?;
        dispatch::expire_pending(order_id, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn begin_search(&self, order_id: &OrderId, initial_radius_km: f64) -> Result<Order, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let before = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))?;
        let order = match orders::begin_search(order_id, initial_radius_km, &mut tx).await? {
            Some(order) => order,
            None => {
                tx.commit().await?;
                return Err(FulfillmentError::StaleState(order_id.clone(), before.status));
            },
        };
        if before.status != OrderStatusType::Searching {
            orders::append_history(order_id, OrderStatusType::Searching, "system", None, &mut tx).await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    async fn escalate_search(&self, order_id: &OrderId, new_radius_km: f64) -> Result<Order, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        match orders::escalate(order_id, new_radius_km, &mut conn).await? {
            Some(order) => Ok(order),
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
                match order {
                    None => Err(FulfillmentError::OrderNotFound(order_id.clone())),
                    Some(o) => Err(FulfillmentError::StaleState(order_id.clone(), o.status)),
                }
            },
        }
    }

    async fn record_notifications(
        &self,
        order_id: &OrderId,
        round: i64,
        actor_ids: &[ActorId],
    ) -> Result<Vec<NotifiedActor>, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let tickets = dispatch::record_notifications(order_id, round, actor_ids, &mut tx).await?;
        tx.commit().await?;
        Ok(tickets)
    }

    async fn record_response(
        &self,
        order_id: &OrderId,
        actor_id: &ActorId,
        response: DispatchResponse,
    ) -> Result<Option<NotifiedActor>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        dispatch::record_response(order_id, actor_id, response, &mut conn).await
    }

    async fn expire_pending_notifications(&self, order_id: &OrderId) -> Result<u64, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        dispatch::expire_pending(order_id, &mut conn).await
    }

    async fn fetch_notified_actors(&self, order_id: &OrderId) -> Result<Vec<NotifiedActor>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        dispatch::fetch_for_order(order_id, &mut conn).await
    }

    async fn record_payment(&self, payment: NewPayment) -> Result<Payment, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        orders::fetch_order_by_order_id(&payment.order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(payment.order_id.clone()))?;
        let payment = payments::insert_payment(&payment, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, FulfillmentError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(order_id, &mut conn).await
    }

    async fn update_payment_status(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
    ) -> Result<Payment, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let payment = payments::update_status(order_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn modify_line_total(
        &self,
        order_id: &OrderId,
        new_total: Cents,
        by: &str,
        admin_override: bool,
    ) -> Result<Order, FulfillmentError> {
        let mut tx = self.pool.begin().await?;
        let before = orders::fetch_order_by_order_id(order_id, &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))?;
        // Money is frozen once an actor accepted the order, unless an admin overrides.
        if before.status.holds_assignment() && !admin_override {
            tx.commit().await?;
            return Err(FulfillmentError::OrderModificationForbidden);
        }
        if before.status.is_terminal() {
            tx.commit().await?;
            return Err(FulfillmentError::OrderModificationForbidden);
        }
        let order = orders::modify_line_total(order_id, new_total.value(), &mut tx)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))?;
        let note = format!("line total changed from {} to {}", before.line_total, new_total);
        orders::append_history(order_id, order.status, by, Some(&note), &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn expire_stale_orders(&self, stale_limit: Duration) -> Result<Vec<Order>, FulfillmentError> {
        let stale = {
            let mut conn = self.pool.acquire().await?;
            orders::fetch_stale(stale_limit, &mut conn).await?
        };
        let mut cancelled = Vec::with_capacity(stale.len());
        for order in stale {
            match self.cancel_order(&order.order_id, "system", Some("stale dispatch expiry")).await {
                Ok(outcome) => cancelled.push(outcome.order),
                // A racing transition (claim, cancel) is fine; the order is no longer stale.
                Err(FulfillmentError::StaleState(..)) | Err(FulfillmentError::InvalidTransition { .. }) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(cancelled)
    }

    async fn close(&mut self) -> Result<(), FulfillmentError> {
        self.pool.close().await;
        Ok(())
    }
}

impl ActorManagement for SqliteDatabase {
    async fn upsert_actor(&self, actor: NewActor) -> Result<ActorProfile, ActorApiError> {
        let mut conn = self.pool.acquire().await?;
        actors::upsert_actor(&actor, &mut conn).await
    }

    async fn fetch_actor(&self, actor_id: &ActorId) -> Result<Option<ActorProfile>, ActorApiError> {
        let mut conn = self.pool.acquire().await?;
        actors::fetch_actor(actor_id, &mut conn).await
    }

    async fn find_candidates(
        &self,
        origin: Coordinates,
        radius_km: f64,
        filter: &CandidateFilter,
    ) -> Result<Vec<CandidateActor>, ActorApiError> {
        let mut conn = self.pool.acquire().await?;
        actors::find_candidates(origin, radius_km, filter, &mut conn).await
    }

    async fn set_availability(&self, actor_id: &ActorId, available: bool) -> Result<(), ActorApiError> {
        let mut conn = self.pool.acquire().await?;
        actors::set_availability(actor_id, available, &mut conn).await
    }

    async fn set_stock(&self, shop_id: &ActorId, product_id: &str, quantity: i64) -> Result<(), ActorApiError> {
        let mut conn = self.pool.acquire().await?;
        stock::set_stock(shop_id, product_id, quantity, &mut conn).await
    }

    async fn fetch_stock(&self, product_id: &str) -> Result<Option<i64>, ActorApiError> {
        let mut conn = self.pool.acquire().await?;
        stock::fetch_stock(product_id, &mut conn).await
    }
}

impl CommissionManagement for SqliteDatabase {
    async fn insert_commission_record(
        &self,
        record: NewCommissionRecord,
    ) -> Result<CommissionRecord, CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::insert_record(&record, &mut conn).await
    }

    async fn fetch_commission_record(&self, record_id: i64) -> Result<Option<CommissionRecord>, CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::fetch_record(record_id, &mut conn).await
    }

    async fn commission_records_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Vec<CommissionRecord>, CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::records_for_order(order_id, &mut conn).await
    }

    async fn mark_obligation_paid(
        &self,
        record_id: i64,
        proof: &str,
        now: DateTime<Utc>,
    ) -> Result<MarkPaidOutcome, CommissionApiError> {
        let mut tx = self.pool.begin().await.map_err(|e| CommissionApiError::DatabaseError(e.to_string()))?;
        let outcome = commissions::mark_paid(record_id, proof, now, &mut tx).await?;
        tx.commit().await.map_err(|e| CommissionApiError::DatabaseError(e.to_string()))?;
        Ok(outcome)
    }

    async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<Vec<CommissionRecord>, CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::sweep_overdue(now, &mut conn).await
    }

    async fn overdue_needing_reminder(
        &self,
        now: DateTime<Utc>,
        cadence: Duration,
    ) -> Result<Vec<CommissionRecord>, CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::overdue_needing_reminder(now, cadence, &mut conn).await
    }

    async fn record_reminder_sent(&self, record_id: i64, now: DateTime<Utc>) -> Result<(), CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::record_reminder_sent(record_id, now, &mut conn).await
    }

    async fn record_payout_result(
        &self,
        record_id: i64,
        payout_id: Option<String>,
        failed: bool,
    ) -> Result<(), CommissionApiError> {
        let mut conn = self.pool.acquire().await?;
        commissions::record_payout_result(record_id, payout_id, failed, &mut conn).await
    }
}
