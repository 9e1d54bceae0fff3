use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPayment, OrderId, Payment, PaymentStatus},
    traits::FulfillmentError,
};

pub async fn insert_payment(payment: &NewPayment, conn: &mut SqliteConnection) -> Result<Payment, FulfillmentError> {
    if fetch_payment(&payment.order_id, &mut *conn).await?.is_some() {
        return Err(FulfillmentError::PaymentAlreadyExists(payment.order_id.clone()));
    }
    let row = sqlx::query_as(
        "INSERT INTO payments (order_id, method, destination, amount) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(payment.order_id.as_str())
    .bind(&payment.method)
    .bind(payment.destination)
    .bind(payment.amount)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

pub async fn fetch_payment(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Payment>, FulfillmentError> {
    let row = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    Ok(row)
}

/// The legal payment transitions: `Pending → Paid`, `Paid → RefundDue`, `RefundDue → Refunded`,
/// and `Pending → RefundDue` for a capture that races a cancellation. Re-setting the current
/// status is a no-op; anything else is an error.
pub async fn update_status(
    order_id: &OrderId,
    new_status: PaymentStatus,
    conn: &mut SqliteConnection,
) -> Result<Payment, FulfillmentError> {
    let current =
        fetch_payment(order_id, &mut *conn).await?.ok_or_else(|| FulfillmentError::PaymentNotFound(order_id.clone()))?;
    if current.status == new_status {
        return Ok(current);
    }
    use PaymentStatus::*;
    let legal = matches!(
        (current.status, new_status),
        (Pending, Paid) | (Paid, RefundDue) | (RefundDue, Refunded) | (Pending, RefundDue)
    );
    if !legal {
        return Err(FulfillmentError::PaymentStatusUpdateError(format!(
            "Payment for order {order_id} is {}; cannot become {new_status}",
            current.status
        )));
    }
    let row = sqlx::query_as(
        "UPDATE payments SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *",
    )
    .bind(new_status.to_string())
    .bind(order_id.as_str())
    .fetch_one(conn)
    .await?;
    Ok(row)
}

/// Cancellation helper: marks a captured (or still pending) payment refund-due. Returns whether a
/// refund was actually marked.
pub async fn mark_refund_due_if_captured(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<bool, FulfillmentError> {
    let result = sqlx::query(
        "UPDATE payments SET status = 'RefundDue', updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND status IN ('Pending', 'Paid')",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
