use chrono::{DateTime, Utc};
use mfb_common::Cents;
use serde::{Deserialize, Serialize};

use crate::db_types::{ActorKind, CommissionRecord, Order, OrderStatusType, PaymentDestination};

//--------------------------------------      ClaimOutcome     -------------------------------------------------------
/// Result of the assignment ledger's claim primitive. Losing a race is a normal outcome, not an
/// error: the caller releases the requesting actor and moves on without side effects.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// This actor won. The returned order is already `Assigned` with `fulfiller_id` set.
    Claimed(Order),
    /// Another actor claimed the order first.
    AlreadyClaimed,
    /// The order left the claimable states altogether (cancelled, expired, …) before the claim
    /// arrived.
    StaleState(OrderStatusType),
}

impl ClaimOutcome {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimOutcome::Claimed(_))
    }
}

//--------------------------------------  CancellationOutcome  -------------------------------------------------------
/// What a cancellation actually compensated, so callers can report and tests can assert.
#[derive(Debug, Clone)]
pub struct CancellationOutcome {
    pub order: Order,
    /// Number of line items whose reserved stock was restored.
    pub restored_items: u64,
    /// Whether the fulfiller's `current_assignments` counter was released.
    pub released_assignment: bool,
    /// Whether a captured payment was flipped to `RefundDue`.
    pub refund_marked: bool,
}

//--------------------------------------    CandidateFilter    -------------------------------------------------------
/// Narrows a geo-radius candidate query. An empty filter matches every available actor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub kind: Option<ActorKind>,
    pub category: Option<String>,
    /// Exclude actors already notified for this order in earlier rounds.
    pub exclude: Vec<crate::db_types::ActorId>,
}

impl CandidateFilter {
    pub fn for_kind(kind: ActorKind) -> Self {
        Self { kind: Some(kind), ..Default::default() }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn excluding(mut self, exclude: Vec<crate::db_types::ActorId>) -> Self {
        self.exclude = exclude;
        self
    }
}

//--------------------------------------  NewCommissionRecord  -------------------------------------------------------
/// Insert payload for one settlement. Produced by the commission engine, not by callers.
#[derive(Debug, Clone)]
pub struct NewCommissionRecord {
    pub order_id: crate::db_types::OrderId,
    pub actor_id: crate::db_types::ActorId,
    pub amount: Cents,
    pub destination: PaymentDestination,
    pub rate_permille: i64,
    pub commission: Cents,
    pub owner_earning: Cents,
    pub obligation_status: crate::db_types::ObligationStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub reversal_of: Option<i64>,
    pub settled_at: DateTime<Utc>,
}

//--------------------------------------    MarkPaidOutcome    -------------------------------------------------------
/// Result of a manual settlement. Re-marking an already paid record is a no-op, not an error.
#[derive(Debug, Clone)]
pub enum MarkPaidOutcome {
    Marked(CommissionRecord),
    AlreadyPaid(CommissionRecord),
}

impl MarkPaidOutcome {
    pub fn record(&self) -> &CommissionRecord {
        match self {
            MarkPaidOutcome::Marked(r) | MarkPaidOutcome::AlreadyPaid(r) => r,
        }
    }
}
