use sqlx::SqliteConnection;

use crate::{
    db_types::{ActorId, DispatchResponse, NotifiedActor, OrderId},
    traits::FulfillmentError,
};

pub async fn record_notifications(
    order_id: &OrderId,
    round: i64,
    actors: &[ActorId],
    conn: &mut SqliteConnection,
) -> Result<Vec<NotifiedActor>, FulfillmentError> {
    for actor in actors {
        sqlx::query("INSERT INTO dispatch_notifications (order_id, actor_id, round) VALUES ($1, $2, $3)")
            .bind(order_id.as_str())
            .bind(actor.as_str())
            .bind(round)
            .execute(&mut *conn)
            .await?;
    }
    let tickets = sqlx::query_as(
        "SELECT * FROM dispatch_notifications WHERE order_id = $1 AND round = $2 ORDER BY id ASC",
    )
    .bind(order_id.as_str())
    .bind(round)
    .fetch_all(conn)
    .await?;
    Ok(tickets)
}

/// Records a response on the actor's still-`Pending` ticket. Late responses (after the round timed
/// the ticket out) match nothing and return `None`.
pub async fn record_response(
    order_id: &OrderId,
    actor_id: &ActorId,
    response: DispatchResponse,
    conn: &mut SqliteConnection,
) -> Result<Option<NotifiedActor>, FulfillmentError> {
    let updated: Option<NotifiedActor> = sqlx::query_as(
        "UPDATE dispatch_notifications SET response = $1, responded_at = CURRENT_TIMESTAMP \
         WHERE order_id = $2 AND actor_id = $3 AND response = 'Pending' RETURNING *",
    )
    .bind(response.to_string())
    .bind(order_id.as_str())
    .bind(actor_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(updated)
}

/// Stamps the winning actor's latest ticket `Accepted`. Unconditional on the ticket's prior
/// response: the claim that got us here is the uniqueness guarantee, and a winner whose ticket
/// already timed out still accepted.
pub async fn mark_accepted(
    order_id: &OrderId,
    actor_id: &ActorId,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    sqlx::query(
        "UPDATE dispatch_notifications SET response = 'Accepted', responded_at = CURRENT_TIMESTAMP \
         WHERE id = (SELECT MAX(id) FROM dispatch_notifications WHERE order_id = $1 AND actor_id = $2)",
    )
    .bind(order_id.as_str())
    .bind(actor_id.as_str())
    .execute(conn)
    .await?;
    Ok(())
}

/// Times out every still-`Pending` ticket for the order. Returns how many changed, so repeated
/// calls are visibly no-ops.
pub async fn expire_pending(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<u64, FulfillmentError> {
    let result = sqlx::query(
        "UPDATE dispatch_notifications SET response = 'TimedOut', responded_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND response = 'Pending'",
    )
    .bind(order_id.as_str())
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<NotifiedActor>, FulfillmentError> {
    let tickets = sqlx::query_as("SELECT * FROM dispatch_notifications WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(tickets)
}
