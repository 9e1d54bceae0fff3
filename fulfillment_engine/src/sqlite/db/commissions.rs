use chrono::{DateTime, Duration, Utc};
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{CommissionRecord, ObligationStatus, OrderId, PayoutStatus},
    traits::{CommissionApiError, MarkPaidOutcome, NewCommissionRecord},
};

pub async fn insert_record(
    record: &NewCommissionRecord,
    conn: &mut SqliteConnection,
) -> Result<CommissionRecord, CommissionApiError> {
    let row = sqlx::query_as(
        r#"
            INSERT INTO commission_records (
                order_id,
                actor_id,
                amount,
                destination,
                rate_permille,
                commission,
                owner_earning,
                obligation_status,
                due_date,
                reversal_of,
                settled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(record.order_id.as_str())
    .bind(record.actor_id.as_str())
    .bind(record.amount)
    .bind(record.destination)
    .bind(record.rate_permille)
    .bind(record.commission)
    .bind(record.owner_earning)
    .bind(record.obligation_status)
    .bind(record.due_date)
    .bind(record.reversal_of)
    .bind(record.settled_at)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_record(
    record_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<CommissionRecord>, CommissionApiError> {
    let row = sqlx::query_as("SELECT * FROM commission_records WHERE id = $1")
        .bind(record_id)
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

pub async fn records_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionRecord>, CommissionApiError> {
    let rows = sqlx::query_as("SELECT * FROM commission_records WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(rows)
}

/// Manual settlement. The update itself is conditional on `Pending`/`Overdue`, so a concurrent
/// duplicate lands on the no-op branch instead of double-settling. Once paid, `due_date` and
/// `paid_date` are frozen — nothing in this module touches them again.
pub async fn mark_paid(
    record_id: i64,
    proof: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<MarkPaidOutcome, CommissionApiError> {
    let record =
        fetch_record(record_id, &mut *conn).await?.ok_or(CommissionApiError::RecordNotFound(record_id))?;
    match record.obligation_status {
        ObligationStatus::Paid => return Ok(MarkPaidOutcome::AlreadyPaid(record)),
        ObligationStatus::NotApplicable => {
            return Err(CommissionApiError::PreconditionFailed {
                record_id,
                status: ObligationStatus::NotApplicable,
            })
        },
        ObligationStatus::Pending | ObligationStatus::Overdue => {},
    }
    let updated: Option<CommissionRecord> = sqlx::query_as(
        "UPDATE commission_records SET obligation_status = 'Paid', paid_date = $1, paid_proof = $2 \
         WHERE id = $3 AND obligation_status IN ('Pending', 'Overdue') RETURNING *",
    )
    .bind(now)
    .bind(proof)
    .bind(record_id)
    .fetch_optional(&mut *conn)
    .await?;
    match updated {
        Some(record) => Ok(MarkPaidOutcome::Marked(record)),
        None => {
            // Lost a race with another settlement of the same record.
            let record =
                fetch_record(record_id, conn).await?.ok_or(CommissionApiError::RecordNotFound(record_id))?;
            debug!("🧾️ Record #{record_id} was settled concurrently");
            Ok(MarkPaidOutcome::AlreadyPaid(record))
        },
    }
}

/// The overdue flip. Only `Pending` rows past their due date match, so running the sweep twice in
/// a row returns the moved rows once and then nothing.
pub async fn sweep_overdue(
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionRecord>, CommissionApiError> {
    let rows = sqlx::query_as(
        "UPDATE commission_records SET obligation_status = 'Overdue' \
         WHERE obligation_status = 'Pending' AND due_date IS NOT NULL AND due_date <= $1 RETURNING *",
    )
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn overdue_needing_reminder(
    now: DateTime<Utc>,
    cadence: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<CommissionRecord>, CommissionApiError> {
    let threshold = now - cadence;
    let rows = sqlx::query_as(
        "SELECT * FROM commission_records WHERE obligation_status = 'Overdue' \
         AND (last_reminder_at IS NULL OR last_reminder_at <= $1) ORDER BY id ASC",
    )
    .bind(threshold)
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

pub async fn record_reminder_sent(
    record_id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), CommissionApiError> {
    sqlx::query("UPDATE commission_records SET last_reminder_at = $1 WHERE id = $2")
        .bind(now)
        .bind(record_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn record_payout_result(
    record_id: i64,
    payout_id: Option<String>,
    failed: bool,
    conn: &mut SqliteConnection,
) -> Result<(), CommissionApiError> {
    let status = if failed { PayoutStatus::Failed } else { PayoutStatus::Initiated };
    let result = sqlx::query("UPDATE commission_records SET payout_id = $1, payout_status = $2 WHERE id = $3")
        .bind(payout_id)
        .bind(status)
        .bind(record_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(CommissionApiError::RecordNotFound(record_id));
    }
    Ok(())
}
