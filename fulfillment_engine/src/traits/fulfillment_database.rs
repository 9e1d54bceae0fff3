use chrono::Duration;
use mfb_common::Cents;
use thiserror::Error;

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{
        ActorId,
        DispatchResponse,
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
    traits::{ActorApiError, ActorManagement, CancellationOutcome, ClaimOutcome, CommissionApiError, CommissionManagement},
};

/// The highest-level behaviour contract for fulfillment backends.
///
/// Every operation that spans order state, stock, counters or history runs inside a single
/// transaction on the backend side, so a failure can never leave an order half-transitioned.
/// Status-changing operations are conditional writes: they re-check the current state in the
/// update itself rather than trusting what the caller read earlier.
#[allow(async_fn_in_trait)]
pub trait FulfillmentDatabase: Clone + ActorManagement + CommissionManagement {
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Stores the order and reserves stock for its line items in one transaction. Idempotent on
    /// `order_id`: returns the existing order and `false` instead of erroring.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), FulfillmentError>;

    async fn fetch_order_by_order_id(&self, order_id: &OrderId) -> Result<Option<Order>, FulfillmentError>;

    /// Fetches orders matching the filter, ordered by `created_at` ascending.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, FulfillmentError>;

    /// The order's append-only status history, oldest first.
    async fn fetch_status_history(&self, order_id: &OrderId) -> Result<Vec<StatusEntry>, FulfillmentError>;

    /// The assignment ledger's claim primitive. A single atomic conditional write that succeeds
    /// only while the order is still claimable (`fulfiller_id IS NULL` and status in the
    /// claimable set) at the moment of the write. On success, in the same transaction: sets the
    /// fulfiller, transitions to `Assigned`, appends history, flips this actor's notification
    /// ticket to `Accepted` and increments the actor's `current_assignments`.
    ///
    /// Two concurrent claims for one order can never both succeed. Matched-zero-rows is
    /// disambiguated into `AlreadyClaimed` or `StaleState` and never retried blindly.
    async fn claim_order(&self, order_id: &OrderId, actor_id: &ActorId) -> Result<ClaimOutcome, FulfillmentError>;

    /// Plain whitelisted transition with history append. Conditional on the current status still
    /// being `expected`; a concurrent change surfaces as [`FulfillmentError::StaleState`]. Does
    /// not run compensations — callers use the dedicated operations below for those transitions.
    async fn update_order_status(
        &self,
        order_id: &OrderId,
        expected: OrderStatusType,
        new_status: OrderStatusType,
        by: &str,
        note: Option<&str>,
    ) -> Result<Order, FulfillmentError>;

    /// Cancels the order and runs every compensation in one transaction: restore reserved stock,
    /// release the fulfiller's assignment counter (post-assignment only), mark a captured payment
    /// `RefundDue`, mark leftover pending notification tickets `TimedOut`, append history.
    async fn cancel_order(
        &self,
        order_id: &OrderId,
        by: &str,
        note: Option<&str>,
    ) -> Result<CancellationOutcome, FulfillmentError>;

    /// Completes an `InProgress` order: stamps the transition, releases the assignment counter,
    /// bumps the actor's completion and earnings counters.
    async fn complete_order(&self, order_id: &OrderId, by: &str, earning: Cents) -> Result<Order, FulfillmentError>;

    /// The assigned fulfiller backs out: clears `fulfiller_id`, restores the assignment counter
    /// and transitions to `Rejected` so the order can be re-dispatched.
    async fn release_assignment(&self, order_id: &OrderId, by: &str, note: Option<&str>)
        -> Result<Order, FulfillmentError>;

    /// Terminal dispatch failure: transitions to `NoActorFound`, marks a captured payment
    /// `RefundDue` and expires pending tickets, all in one transaction.
    async fn record_no_actor_found(&self, order_id: &OrderId) -> Result<Order, FulfillmentError>;

    /// Moves the order into `Searching` (from `Placed` or `Rejected`), resetting the dispatch
    /// window for a fresh coordinator run.
    async fn begin_search(&self, order_id: &OrderId, initial_radius_km: f64) -> Result<Order, FulfillmentError>;

    /// One escalation step: bumps `search_attempts` and widens `search_radius_km`. The radius is
    /// written as `MAX(current, new)` so it can never shrink.
    async fn escalate_search(&self, order_id: &OrderId, new_radius_km: f64) -> Result<Order, FulfillmentError>;

    /// Records one `Pending` notification ticket per actor for the given round.
    async fn record_notifications(
        &self,
        order_id: &OrderId,
        round: i64,
        actors: &[ActorId],
    ) -> Result<Vec<NotifiedActor>, FulfillmentError>;

    /// Actor response bookkeeping for `Rejected` tickets (acceptance goes through
    /// [`claim_order`](Self::claim_order)). Only `Pending` tickets are updated; a late response
    /// to an already timed-out ticket returns `None`.
    async fn record_response(
        &self,
        order_id: &OrderId,
        actor_id: &ActorId,
        response: DispatchResponse,
    ) -> Result<Option<NotifiedActor>, FulfillmentError>;

    /// Marks every still-`Pending` ticket for the order `TimedOut`, returning how many changed.
    async fn expire_pending_notifications(&self, order_id: &OrderId) -> Result<u64, FulfillmentError>;

    async fn fetch_notified_actors(&self, order_id: &OrderId) -> Result<Vec<NotifiedActor>, FulfillmentError>;

    /// Records a payment for the order. One payment per order; re-recording is rejected.
    async fn record_payment(&self, payment: NewPayment) -> Result<Payment, FulfillmentError>;

    async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, FulfillmentError>;

    /// Payment status transitions (`Pending → Paid`, `Paid → RefundDue`, `RefundDue → Refunded`).
    /// Anything else is rejected; setting the current status again is a no-op.
    async fn update_payment_status(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
    ) -> Result<Payment, FulfillmentError>;

    /// Admin override for the order total. Allowed while the order is pre-assignment, or at any
    /// point when `admin_override` is set; always leaves an audit entry in the status history.
    async fn modify_line_total(
        &self,
        order_id: &OrderId,
        new_total: Cents,
        by: &str,
        admin_override: bool,
    ) -> Result<Order, FulfillmentError>;

    /// Cancels orders stuck in `Placed`/`Searching` longer than `stale_limit` (coordinator died
    /// mid-flight, process restart, …), running the full cancellation compensations for each.
    /// Returns the orders that were cancelled.
    async fn expire_stale_orders(&self, stale_limit: Duration) -> Result<Vec<Order>, FulfillmentError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), FulfillmentError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum FulfillmentError {
    #[error("Internal database engine error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested order (internal id {0}) does not exist")]
    OrderIdNotFound(i64),
    #[error("Order {order_id} may not move from {from} to {to}")]
    InvalidTransition { order_id: OrderId, from: OrderStatusType, to: OrderStatusType },
    #[error("Order {0} was already claimed by another actor")]
    AlreadyClaimed(OrderId),
    #[error("Order {0} is {1}; it no longer accepts this operation")]
    StaleState(OrderId, OrderStatusType),
    #[error("Not enough stock of {product_id}: wanted {wanted}, available {available}")]
    InsufficientStock { product_id: String, wanted: i64, available: i64 },
    #[error("No payment is recorded for order {0}")]
    PaymentNotFound(OrderId),
    #[error("Illegal payment status change: {0}")]
    PaymentStatusUpdateError(String),
    #[error("A payment already exists for order {0}")]
    PaymentAlreadyExists(OrderId),
    #[error("The requested order change is forbidden")]
    OrderModificationForbidden,
    #[error("{0}")]
    ActorError(#[from] ActorApiError),
    #[error("{0}")]
    CommissionError(#[from] CommissionApiError),
}

impl From<sqlx::Error> for FulfillmentError {
    fn from(e: sqlx::Error) -> Self {
        FulfillmentError::DatabaseError(e.to_string())
    }
}
