use std::{collections::HashMap, fmt::Debug, sync::Arc, time::Duration as StdDuration};

use log::*;
use rand::Rng;
use tokio::sync::{mpsc, Mutex};

use crate::{
    api::errors::DispatchError,
    config::DispatchConfig,
    db_types::{ActorId, CandidateActor, DispatchResponse, FulfillmentKind, Order, OrderId},
    events::{DispatchExhaustedEvent, EventProducers, OrderAssignedEvent},
    resilience::AdmissionQueue,
    traits::{CandidateFilter, ClaimOutcome, FulfillmentDatabase, FulfillmentError, Notifier},
};

use crate::db_types::ActorKind;

/// Wake-up signals posted to a running dispatch coordinator. Correctness never depends on these:
/// every wake-up (and every round timeout) re-reads the order, and the assignment ledger is the
/// only arbiter. A lost signal merely costs latency until the round timer fires.
#[derive(Debug, Clone, Copy)]
enum DispatchSignal {
    /// An actor's claim succeeded at the ledger.
    Claimed,
    /// Every ticket in the current round has been rejected; no point waiting out the timer.
    RoundDrained,
    /// The order was cancelled or otherwise pulled from dispatch.
    Halted,
}

type SignalRegistry = Arc<Mutex<HashMap<OrderId, mpsc::Sender<DispatchSignal>>>>;

/// `DispatchApi` owns the search → fan-out → bounded-wait → escalate loop and the actor-facing
/// accept/reject entry points that feed it.
///
/// One [`run_dispatch`](Self::run_dispatch) call drives one order to either `Assigned` or
/// `NoActorFound`. The embedding service spawns it as a task (see [`crate::workers`]); admission
/// is bounded, so a flood of dispatch requests fails fast with [`DispatchError::Overloaded`]
/// instead of queuing without limit.
pub struct DispatchApi<B, N> {
    db: B,
    notifier: N,
    config: DispatchConfig,
    producers: EventProducers,
    admission: AdmissionQueue,
    runs: SignalRegistry,
}

impl<B, N> Debug for DispatchApi<B, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchApi")
    }
}

impl<B: Clone, N: Clone> Clone for DispatchApi<B, N> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            notifier: self.notifier.clone(),
            config: self.config.clone(),
            producers: self.producers.clone(),
            admission: self.admission.clone(),
            runs: Arc::clone(&self.runs),
        }
    }
}

impl<B, N> DispatchApi<B, N>
where
    B: FulfillmentDatabase,
    N: Notifier,
{
    pub fn new(db: B, notifier: N, config: DispatchConfig, admission: AdmissionQueue, producers: EventProducers) -> Self {
        Self { db, notifier, config, producers, admission, runs: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Runs the full escalation state machine for one order until it is assigned, exhausted, or
    /// halted. The order must be `Placed` (or `Rejected`, for a re-dispatch).
    ///
    /// The per-round wait is a timer-bounded channel receive, so the task suspends instead of
    /// holding a worker hostage, and a process restart can simply re-run dispatch for any order
    /// still `Searching` (see the stale-dispatch worker).
    pub async fn run_dispatch(&self, order_id: &OrderId) -> Result<Order, DispatchError> {
        let _permit = self.admission.admit().await?;
        let order = self.fetch_order_required(order_id).await?;
        let initial_radius = self.config.initial_radius_km(order.kind);
        let order = self.db.begin_search(order_id, initial_radius).await?;
        info!(
            "📡️ Dispatch started for order {} ({}), radius {:.1} km",
            order.order_id, order.kind, order.search_radius_km
        );

        let mut signals = self.register(order_id).await;
        let result = self.run_rounds(order_id, &mut signals).await;
        self.unregister(order_id).await;
        match &result {
            Ok(order) => info!("📡️ Dispatch for {} finished: assigned to {:?}", order_id, order.fulfiller_id),
            Err(e) => info!("📡️ Dispatch for {order_id} finished without assignment: {e}"),
        }
        result
    }

    /// An actor accepts an offered order. The ledger's atomic claim decides the winner: first
    /// accept wins by arrival order at the store, never by notification order. Losers get a typed
    /// error and must release the actor without side effects.
    pub async fn accept_assignment(&self, order_id: &OrderId, actor_id: &ActorId) -> Result<Order, FulfillmentError> {
        match self.db.claim_order(order_id, actor_id).await? {
            ClaimOutcome::Claimed(order) => {
                info!("📡️ Order {order_id} claimed by actor {actor_id}");
                self.signal(order_id, DispatchSignal::Claimed).await;
                let delivered = self
                    .notifier
                    .notify(
                        &order.customer_id,
                        "Order assigned",
                        &format!("Order {} is now being handled.", order.order_id),
                        serde_json::json!({ "order_id": order.order_id, "actor_id": actor_id }),
                    )
                    .await;
                if !delivered {
                    warn!("📡️ Assignment notification for order {order_id} was not delivered");
                }
                for producer in &self.producers.order_assigned {
                    producer.publish_event(OrderAssignedEvent::new(order.clone(), actor_id.clone())).await;
                }
                Ok(order)
            },
            ClaimOutcome::AlreadyClaimed => {
                debug!("📡️ Actor {actor_id} lost the claim race for order {order_id}");
                Err(FulfillmentError::AlreadyClaimed(order_id.clone()))
            },
            ClaimOutcome::StaleState(status) => {
                debug!("📡️ Actor {actor_id} tried to claim order {order_id}, but it is {status}");
                Err(FulfillmentError::StaleState(order_id.clone(), status))
            },
        }
    }

    /// An actor declines an offered order. Only their `Pending` ticket is touched; a late
    /// rejection after the round timed out is ignored.
    pub async fn reject_assignment(&self, order_id: &OrderId, actor_id: &ActorId) -> Result<(), FulfillmentError> {
        let updated = self.db.record_response(order_id, actor_id, DispatchResponse::Rejected).await?;
        match updated {
            Some(_) => debug!("📡️ Actor {actor_id} rejected order {order_id}"),
            None => {
                debug!("📡️ Late rejection by {actor_id} for order {order_id} ignored");
                return Ok(());
            },
        }
        let tickets = self.db.fetch_notified_actors(order_id).await?;
        if !tickets.iter().any(|t| t.response == DispatchResponse::Pending) {
            // The whole round declined; let the coordinator escalate without waiting out the timer.
            self.signal(order_id, DispatchSignal::RoundDrained).await;
        }
        Ok(())
    }

    /// Nudges a running coordinator to notice an external halt (typically a cancellation) before
    /// its round timer fires. Dispatch also notices on its own at the next wake-up; this only
    /// trims latency.
    pub async fn halt(&self, order_id: &OrderId) {
        self.signal(order_id, DispatchSignal::Halted).await;
    }

    /// Straight-line ETA estimate in minutes for an actor heading to the order, using the
    /// haversine distance and an average speed.
    pub fn eta_minutes(candidate: &CandidateActor, speed_kmh: f64) -> f64 {
        candidate.distance_km / speed_kmh * 60.0
    }

    async fn run_rounds(
        &self,
        order_id: &OrderId,
        signals: &mut mpsc::Receiver<DispatchSignal>,
    ) -> Result<Order, DispatchError> {
        loop {
            let order = self.checked_order(order_id).await?;
            let Some(order) = order else {
                // Assigned — the ledger already did the bookkeeping.
                let order = self.fetch_order_required(order_id).await?;
                self.db.expire_pending_notifications(order_id).await?;
                return Ok(order);
            };

            let candidates = self.query_candidates(&order).await?;
            if candidates.is_empty() {
                debug!(
                    "📡️ Round {} for order {}: no candidates within {:.1} km",
                    order.search_attempts, order_id, order.search_radius_km
                );
                self.escalate_or_exhaust(&order).await?;
                continue;
            }

            let round = order.search_attempts;
            let actor_ids: Vec<ActorId> = candidates.iter().map(|c| c.actor_id.clone()).collect();
            self.db.record_notifications(order_id, round, &actor_ids).await?;
            debug!("📡️ Round {round} for order {order_id}: notifying {} candidate(s)", candidates.len());
            for candidate in &candidates {
                let delivered = self
                    .notifier
                    .notify(
                        candidate.actor_id.as_str(),
                        "New order available",
                        &format!("Order {} is {:.1} km away.", order.order_id, candidate.distance_km),
                        serde_json::json!({
                            "order_id": order.order_id,
                            "distance_km": candidate.distance_km,
                        }),
                    )
                    .await;
                if !delivered {
                    warn!("📡️ Offer notification to {} was not delivered", candidate.actor_id);
                }
            }

            self.await_round(order_id, signals).await;

            // The store is the source of truth for what the round produced.
            let order = self.fetch_order_required(order_id).await?;
            self.db.expire_pending_notifications(order_id).await?;
            if order.fulfiller_id.is_some() {
                return Ok(order);
            }
            if order.status != crate::db_types::OrderStatusType::Searching {
                debug!("📡️ Dispatch for {order_id} halted; order is {}", order.status);
                return Err(DispatchError::Halted(order_id.clone(), order.status));
            }
            debug!("📡️ Round {round} for order {order_id} expired with no acceptance");
            self.escalate_or_exhaust(&order).await?;
        }
    }

    /// Waits out one notification round: until the timer elapses, or a signal makes further
    /// waiting pointless. Whatever ends the wait, the caller re-reads the order before acting.
    async fn await_round(&self, order_id: &OrderId, signals: &mut mpsc::Receiver<DispatchSignal>) {
        let deadline = tokio::time::Instant::now() + self.config.round_timeout;
        match tokio::time::timeout_at(deadline, signals.recv()).await {
            Ok(Some(DispatchSignal::Claimed)) | Ok(Some(DispatchSignal::Halted)) => {},
            Ok(Some(DispatchSignal::RoundDrained)) => {
                debug!("📡️ Round for order {order_id} drained early");
            },
            // All senders gone; fall back to the timer.
            Ok(None) => tokio::time::sleep_until(deadline).await,
            Err(_) => {},
        }
    }

    /// Escalates one step, or transitions the order to its terminal dispatch failure when
    /// attempts or radius are exhausted. The radius never decreases; attempts only grow.
    async fn escalate_or_exhaust(&self, order: &Order) -> Result<(), DispatchError> {
        let order_id = &order.order_id;
        if order.search_attempts + 1 < self.config.max_attempts &&
            order.search_radius_km < self.config.max_radius_km
        {
            let new_radius = (order.search_radius_km + self.config.radius_step_km).min(self.config.max_radius_km);
            let updated = self.db.escalate_search(order_id, new_radius).await?;
            debug!(
                "📡️ Order {order_id} escalated to round {} at {:.1} km",
                updated.search_attempts, updated.search_radius_km
            );
            self.backoff().await;
            Ok(())
        } else {
            let order = self.db.record_no_actor_found(order_id).await?;
            warn!(
                "📡️ Dispatch exhausted for order {order_id} after {} attempt(s), radius {:.1} km",
                order.search_attempts, order.search_radius_km
            );
            let delivered = self
                .notifier
                .notify(
                    &order.customer_id,
                    "No one available",
                    &format!(
                        "We could not find anyone to take order {}. Any payment will be refunded.",
                        order.order_id
                    ),
                    serde_json::Value::Null,
                )
                .await;
            if !delivered {
                warn!("📡️ Exhaustion notification for order {order_id} was not delivered");
            }
            for producer in &self.producers.dispatch_exhausted {
                producer.publish_event(DispatchExhaustedEvent::new(order.clone())).await;
            }
            Err(DispatchError::NoActorFound(order_id.clone()))
        }
    }

    /// Geo query for one round. Previously notified actors are excluded, so escalation always
    /// reaches new ground; the radius growth is what widens the pool.
    async fn query_candidates(&self, order: &Order) -> Result<Vec<CandidateActor>, DispatchError> {
        let centre = match order.kind {
            FulfillmentKind::Delivery => order.origin(),
            FulfillmentKind::Service => order.destination(),
        };
        let kind = match order.kind {
            FulfillmentKind::Delivery => ActorKind::Courier,
            FulfillmentKind::Service => ActorKind::Provider,
        };
        let notified: Vec<ActorId> =
            self.db.fetch_notified_actors(&order.order_id).await?.into_iter().map(|t| t.actor_id).collect();
        let mut filter = CandidateFilter::for_kind(kind).excluding(notified);
        if let Some(category) = &order.category {
            filter = filter.with_category(category.clone());
        }
        Ok(self.db.find_candidates(centre, order.search_radius_km, &filter).await?)
    }

    /// Returns `Ok(None)` when the order already holds an assignment, `Ok(Some)` while it is
    /// still `Searching`, and a `Halted` error for anything else (cancellations included — this
    /// is where an external cancellation is observed, at the latest one round after it landed).
    async fn checked_order(&self, order_id: &OrderId) -> Result<Option<Order>, DispatchError> {
        let order = self.fetch_order_required(order_id).await?;
        if order.fulfiller_id.is_some() {
            return Ok(None);
        }
        if order.status != crate::db_types::OrderStatusType::Searching {
            self.db.expire_pending_notifications(order_id).await?;
            return Err(DispatchError::Halted(order_id.clone(), order.status));
        }
        Ok(Some(order))
    }

    async fn backoff(&self) {
        let base = self.config.escalation_backoff;
        let jitter_ms = {
            let half = (base.as_millis() / 2).max(1) as u64;
            rand::thread_rng().gen_range(0..half)
        };
        tokio::time::sleep(base + StdDuration::from_millis(jitter_ms)).await;
    }

    async fn register(&self, order_id: &OrderId) -> mpsc::Receiver<DispatchSignal> {
        let (tx, rx) = mpsc::channel(8);
        self.runs.lock().await.insert(order_id.clone(), tx);
        rx
    }

    async fn unregister(&self, order_id: &OrderId) {
        self.runs.lock().await.remove(order_id);
    }

    async fn signal(&self, order_id: &OrderId, signal: DispatchSignal) {
        let guard = self.runs.lock().await;
        if let Some(tx) = guard.get(order_id) {
            // try_send: a full buffer means the coordinator has wake-ups queued already.
            let _ = tx.try_send(signal);
        }
    }

    async fn fetch_order_required(&self, order_id: &OrderId) -> Result<Order, FulfillmentError> {
        self.db
            .fetch_order_by_order_id(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
