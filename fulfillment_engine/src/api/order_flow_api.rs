use std::fmt::Debug;

use chrono::Duration;
use log::*;
use mfb_common::Cents;

use crate::{
    api::{commission_api::CommissionApi, order_objects::OrderQueryFilter},
    db_types::{NewOrder, NewPayment, Order, OrderId, OrderStatusType, Payment, PaymentStatus, StatusEntry},
    events::{EventProducers, OrderAnnulledEvent, OrderCompletedEvent},
    traits::{CancellationOutcome, FulfillmentDatabase, FulfillmentError, Notifier, PayoutProvider},
};

/// `OrderFlowApi` is the order state machine's public surface: intake, whitelisted status
/// transitions, and the compensating side effects that certain transitions trigger.
///
/// The transition whitelist lives on [`OrderStatusType::may_transition_to`]; this API enforces it,
/// appends the audit history, and routes the transitions with side effects to the dedicated
/// compensating operations:
///
/// | Transition              | Side effects |
/// |-------------------------|--------------|
/// | → `Cancelled` (post-assignment) | restore stock, release assignment counter, mark payment refund-due, notify both parties |
/// | → `Cancelled` (pre-assignment)  | restore stock, mark payment refund-due, notify customer |
/// | → `Completed`           | stamp, bump actor counters, settle the captured payment |
/// | → `Rejected`            | release fulfiller and counters; order becomes re-dispatchable |
///
/// Re-applying the current status is a no-op, not an error. Every other off-whitelist request is
/// rejected with [`FulfillmentError::InvalidTransition`] and leaves the history untouched.
pub struct OrderFlowApi<B, N, P> {
    db: B,
    notifier: N,
    commissions: CommissionApi<B, N, P>,
    producers: EventProducers,
}

impl<B, N, P> Debug for OrderFlowApi<B, N, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B, N, P> OrderFlowApi<B, N, P>
where
    B: FulfillmentDatabase,
    N: Notifier,
    P: PayoutProvider,
{
    pub fn new(db: B, notifier: N, commissions: CommissionApi<B, N, P>, producers: EventProducers) -> Self {
        Self { db, notifier, commissions, producers }
    }

    /// Creates the order and reserves stock for its line items. Idempotent on `order_id`: the
    /// second parameter is `false` when the order already existed.
    pub async fn create_order(&self, order: NewOrder) -> Result<(Order, bool), FulfillmentError> {
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            debug!("🛒️ Order {} created for customer {}", order.order_id, order.customer_id);
        } else {
            debug!("🛒️ Order {} already exists; returning the stored order", order.order_id);
        }
        Ok((order, inserted))
    }

    /// Applies a requested status change, enforcing the whitelist.
    ///
    /// `Cancelled`, `Completed` and `Rejected` are routed through their compensating flows.
    /// `Searching` and `Assigned` are refused here: the dispatch coordinator and the assignment
    /// ledger are the only legal writers of those states.
    pub async fn update_status(
        &self,
        order_id: &OrderId,
        new_status: OrderStatusType,
        by: &str,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentError> {
        let order = self.fetch_order_required(order_id).await?;
        if order.status == new_status {
            debug!("🛒️ Order {order_id} is already {new_status}. No action to take.");
            return Ok(order);
        }
        if !order.status.may_transition_to(new_status) {
            return Err(FulfillmentError::InvalidTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: new_status,
            });
        }
        match new_status {
            OrderStatusType::Cancelled => {
                let outcome = self.cancel_order(order_id, by, note).await?;
                Ok(outcome.order)
            },
            OrderStatusType::Completed => self.complete_order(order_id, by).await,
            OrderStatusType::Rejected => self.release_assignment(order_id, by, note).await,
            OrderStatusType::Searching | OrderStatusType::Assigned | OrderStatusType::NoActorFound => {
                Err(FulfillmentError::OrderModificationForbidden)
            },
            _ => {
                let updated = self.db.update_order_status(order_id, order.status, new_status, by, note).await?;
                debug!("🛒️ Order {order_id} moved {} -> {}", order.status, updated.status);
                Ok(updated)
            },
        }
    }

    /// Cancels the order and runs every compensation in one transaction. Idempotent: cancelling a
    /// cancelled order reports an empty outcome. A cancellation racing an in-flight claim is safe
    /// either way: whichever write lands first wins and the other is refused by its precondition.
    pub async fn cancel_order(
        &self,
        order_id: &OrderId,
        by: &str,
        note: Option<&str>,
    ) -> Result<CancellationOutcome, FulfillmentError> {
        let order = self.fetch_order_required(order_id).await?;
        if order.status == OrderStatusType::Cancelled {
            debug!("🛒️ Order {order_id} is already cancelled. No action to take.");
            return Ok(CancellationOutcome {
                order,
                restored_items: 0,
                released_assignment: false,
                refund_marked: false,
            });
        }
        if !order.status.may_transition_to(OrderStatusType::Cancelled) {
            return Err(FulfillmentError::InvalidTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: OrderStatusType::Cancelled,
            });
        }
        let outcome = self.db.cancel_order(order_id, by, note).await?;
        info!(
            "🛒️ Order {order_id} cancelled by {by}. {} item(s) restored, assignment released: {}, refund marked: {}",
            outcome.restored_items, outcome.released_assignment, outcome.refund_marked
        );
        let order = &outcome.order;
        self.notify_quietly(
            &order.customer_id,
            "Order cancelled",
            &format!("Your order {} has been cancelled.", order.order_id),
        )
        .await;
        if let Some(fulfiller) = &order.fulfiller_id {
            self.notify_quietly(
                fulfiller.as_str(),
                "Order cancelled",
                &format!("Order {} was cancelled and removed from your queue.", order.order_id),
            )
            .await;
        }
        for producer in &self.producers.order_annulled {
            producer.publish_event(OrderAnnulledEvent::new(outcome.order.clone())).await;
        }
        Ok(outcome)
    }

    /// Completes an `InProgress` order: stamps the transition, settles the captured payment (if
    /// any) through the commission engine, and bumps the actor's completion and earnings
    /// counters with the settled owner earning.
    pub async fn complete_order(&self, order_id: &OrderId, by: &str) -> Result<Order, FulfillmentError> {
        let order = self.fetch_order_required(order_id).await?;
        if order.status == OrderStatusType::Completed {
            debug!("🛒️ Order {order_id} is already completed. No action to take.");
            return Ok(order);
        }
        if !order.status.may_transition_to(OrderStatusType::Completed) {
            return Err(FulfillmentError::InvalidTransition {
                order_id: order_id.clone(),
                from: order.status,
                to: OrderStatusType::Completed,
            });
        }
        let earning = match self.db.fetch_payment(order_id).await? {
            Some(payment) if matches!(payment.status, PaymentStatus::Pending | PaymentStatus::Paid) => {
                match self.commissions.settle_payment(order_id).await {
                    Ok(record) => record.owner_earning,
                    Err(e) => {
                        // Settlement problems must not hold the completion hostage; they are
                        // visible in the ledger and retryable.
                        warn!("🛒️ Could not settle payment for order {order_id} at completion: {e}");
                        Cents::from(0)
                    },
                }
            },
            _ => Cents::from(0),
        };
        let order = self.db.complete_order(order_id, by, earning).await?;
        info!("🛒️ Order {order_id} completed. Earning credited: {earning}");
        self.notify_quietly(
            &order.customer_id,
            "Order completed",
            &format!("Your order {} has been completed.", order.order_id),
        )
        .await;
        for producer in &self.producers.order_completed {
            producer.publish_event(OrderCompletedEvent::new(order.clone())).await;
        }
        Ok(order)
    }

    /// The assigned fulfiller backs out. Clears the assignment (counter released, fulfiller
    /// unset) and leaves the order `Rejected`, from where it may be re-dispatched or cancelled.
    pub async fn release_assignment(
        &self,
        order_id: &OrderId,
        by: &str,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentError> {
        let order = self.db.release_assignment(order_id, by, note).await?;
        info!("🛒️ Order {order_id} released by its fulfiller ({by}); it may be re-dispatched");
        self.notify_quietly(
            &order.customer_id,
            "Order needs a new assignee",
            &format!("The assignee for order {} backed out. We are finding a replacement.", order.order_id),
        )
        .await;
        Ok(order)
    }

    /// Records the customer's payment for the order. One payment per order.
    pub async fn record_payment(&self, payment: NewPayment) -> Result<Payment, FulfillmentError> {
        let payment = self.db.record_payment(payment).await?;
        debug!(
            "🛒️ Payment of {} ({}) recorded for order {} into {}",
            payment.amount, payment.method, payment.order_id, payment.destination
        );
        Ok(payment)
    }

    /// Admin override for the order total. Regular callers may only change pre-assignment orders.
    pub async fn modify_line_total(
        &self,
        order_id: &OrderId,
        new_total: Cents,
        by: &str,
        admin_override: bool,
    ) -> Result<Order, FulfillmentError> {
        let order = self.db.modify_line_total(order_id, new_total, by, admin_override).await?;
        info!("🛒️ Order {order_id} total changed to {new_total} by {by} (admin override: {admin_override})");
        Ok(order)
    }

    /// Cancels orders that sat in `Placed`/`Searching` longer than `stale_limit`, with full
    /// compensations. Used by the stale-dispatch worker to recover orders whose coordinator died
    /// mid-wait (process restart).
    pub async fn expire_stale_orders(&self, stale_limit: Duration) -> Result<Vec<Order>, FulfillmentError> {
        let expired = self.db.expire_stale_orders(stale_limit).await?;
        for order in &expired {
            info!("🕰️ Order {} expired after sitting unassigned too long", order.order_id);
            self.notify_quietly(
                &order.customer_id,
                "Order expired",
                &format!("We could not get order {} moving in time. Any payment will be refunded.", order.order_id),
            )
            .await;
            for producer in &self.producers.order_annulled {
                producer.publish_event(OrderAnnulledEvent::new(order.clone())).await;
            }
        }
        Ok(expired)
    }

    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, FulfillmentError> {
        self.db.fetch_order_by_order_id(order_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, FulfillmentError> {
        self.db.search_orders(query).await
    }

    pub async fn status_history(&self, order_id: &OrderId) -> Result<Vec<StatusEntry>, FulfillmentError> {
        self.db.fetch_status_history(order_id).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    async fn fetch_order_required(&self, order_id: &OrderId) -> Result<Order, FulfillmentError> {
        self.db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))
    }

    async fn notify_quietly(&self, recipient: &str, title: &str, body: &str) {
        let delivered = self.notifier.notify(recipient, title, body, serde_json::Value::Null).await;
        if !delivered {
            // Notification delivery is best effort and never blocks order progress.
            warn!("🛒️ Notification to {recipient} ({title}) was not delivered");
        }
    }
}
