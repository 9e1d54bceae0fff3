use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::{
    db_types::{CommissionRecord, ObligationStatus, OrderId},
    traits::{MarkPaidOutcome, NewCommissionRecord},
};

/// Persistence contract for the commission ledger.
///
/// Records are append-only: settlement inserts, refunds insert reversing records, and the only
/// legal mutations are the obligation transitions (`mark_obligation_paid`, the overdue sweep) and
/// payout bookkeeping.
#[allow(async_fn_in_trait)]
pub trait CommissionManagement: Clone {
    async fn insert_commission_record(
        &self,
        record: NewCommissionRecord,
    ) -> Result<CommissionRecord, CommissionApiError>;

    async fn fetch_commission_record(&self, record_id: i64) -> Result<Option<CommissionRecord>, CommissionApiError>;

    async fn commission_records_for_order(&self, order_id: &OrderId) -> Result<Vec<CommissionRecord>, CommissionApiError>;

    /// Manual settlement of a pending or overdue obligation. The update is conditional on the
    /// current status, so concurrent calls cannot double-settle: the first wins, later calls see
    /// `AlreadyPaid`. `NotApplicable` records are rejected with a precondition failure.
    async fn mark_obligation_paid(
        &self,
        record_id: i64,
        proof: &str,
        now: DateTime<Utc>,
    ) -> Result<MarkPaidOutcome, CommissionApiError>;

    /// Flips every `Pending` obligation whose due date has passed to `Overdue` and returns the
    /// records that changed in this call. Safe to run repeatedly: already-overdue records do not
    /// match the update's filter a second time.
    async fn sweep_overdue(&self, now: DateTime<Utc>) -> Result<Vec<CommissionRecord>, CommissionApiError>;

    /// Overdue records whose last reminder is older than `cadence` (or that have never been
    /// reminded). The caller sends the reminders and stamps them with
    /// [`record_reminder_sent`](Self::record_reminder_sent).
    async fn overdue_needing_reminder(
        &self,
        now: DateTime<Utc>,
        cadence: Duration,
    ) -> Result<Vec<CommissionRecord>, CommissionApiError>;

    async fn record_reminder_sent(&self, record_id: i64, now: DateTime<Utc>) -> Result<(), CommissionApiError>;

    /// Stores the payout outcome for a platform-account settlement. `Err` from the payout
    /// provider lands here as `PayoutStatus::Failed` — retryable, never fatal.
    async fn record_payout_result(
        &self,
        record_id: i64,
        payout_id: Option<String>,
        failed: bool,
    ) -> Result<(), CommissionApiError>;
}

#[derive(Debug, Clone, Error)]
pub enum CommissionApiError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("The requested commission record {0} does not exist")]
    RecordNotFound(i64),
    #[error("Commission record {record_id} is {status}; the requested change is not allowed")]
    PreconditionFailed { record_id: i64, status: ObligationStatus },
}

impl From<sqlx::Error> for CommissionApiError {
    fn from(e: sqlx::Error) -> Self {
        CommissionApiError::DatabaseError(e.to_string())
    }
}
