use chrono::Duration;
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    api::order_objects::OrderQueryFilter,
    db_types::{ActorId, NewOrder, Order, OrderId, OrderStatusType},
    traits::FulfillmentError,
};

pub async fn insert_order(order: &NewOrder, conn: &mut SqliteConnection) -> Result<Order, FulfillmentError> {
    let inserted = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                customer_id,
                shop_id,
                kind,
                category,
                line_total,
                currency,
                origin_lat,
                origin_lon,
                destination_lat,
                destination_lon
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *;
        "#,
    )
    .bind(&order.order_id)
    .bind(&order.customer_id)
    .bind(&order.shop_id)
    .bind(order.kind)
    .bind(&order.category)
    .bind(order.line_total)
    .bind(&order.currency)
    .bind(order.origin.latitude)
    .bind(order.origin.longitude)
    .bind(order.destination.latitude)
    .bind(order.destination.longitude)
    .fetch_one(conn)
    .await?;
    Ok(inserted)
}

/// Returns the orders row for the given external `order_id`.
pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to the criteria in the `OrderQueryFilter`.
///
/// Resulting orders are ordered by `created_at` in ascending order.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_id) = query.order_id {
        where_clause.push("order_id = ");
        where_clause.push_bind_unseparated(order_id.0);
    }
    if let Some(cid) = query.customer_id {
        where_clause.push("customer_id = ");
        where_clause.push_bind_unseparated(cid);
    }
    if let Some(fulfiller) = query.fulfiller_id {
        where_clause.push("fulfiller_id = ");
        where_clause.push_bind_unseparated(fulfiller.0);
    }
    if let Some(kind) = query.kind {
        where_clause.push("kind = ");
        where_clause.push_bind_unseparated(kind.to_string());
    }
    if query.status.as_ref().map(|s| !s.is_empty()).unwrap_or(false) {
        let statuses =
            query.status.as_ref().unwrap().iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(since) = query.since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = query.until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at ASC");
    trace!("📝️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    Ok(orders)
}

/// Conditional status transition: only lands if the row still holds `expected`. Zero matched rows
/// means the caller lost a race and must re-read.
pub async fn update_order_status(
    order_id: &OrderId,
    expected: OrderStatusType,
    new_status: OrderStatusType,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, FulfillmentError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = $3 \
         RETURNING *",
    )
    .bind(new_status.to_string())
    .bind(order_id.as_str())
    .bind(expected.to_string())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// The assignment ledger's conditional write. Succeeds only while the order is unassigned and
/// still in a claimable state; everything else matches zero rows, which the caller disambiguates
/// by re-reading the order. Never retried blindly.
pub async fn claim(
    order_id: &OrderId,
    actor_id: &ActorId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, FulfillmentError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET fulfiller_id = $1, status = 'Assigned', updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $2 AND fulfiller_id IS NULL AND status IN ('Placed', 'Searching') \
         RETURNING *",
    )
    .bind(actor_id.as_str())
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Clears the assignment on a fulfiller back-out: the only path that nulls `fulfiller_id`.
pub async fn clear_assignment(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, FulfillmentError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET fulfiller_id = NULL, status = 'Rejected', updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $1 AND status = 'Assigned' RETURNING *",
    )
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Opens (or re-opens) the dispatch window. The radius is written as `MAX(current, initial)` so a
/// re-dispatch never narrows an already widened search; attempts restart for the new run.
pub async fn begin_search(
    order_id: &OrderId,
    initial_radius_km: f64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, FulfillmentError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET status = 'Searching', search_radius_km = MAX(search_radius_km, $1), \
         search_attempts = 0, updated_at = CURRENT_TIMESTAMP \
         WHERE order_id = $2 AND status IN ('Placed', 'Rejected', 'Searching') RETURNING *",
    )
    .bind(initial_radius_km)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// One escalation step. `MAX` keeps the radius monotone even if two steps race.
pub async fn escalate(
    order_id: &OrderId,
    new_radius_km: f64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, FulfillmentError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET search_attempts = search_attempts + 1, search_radius_km = MAX(search_radius_km, $1), \
         updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 AND status = 'Searching' RETURNING *",
    )
    .bind(new_radius_km)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

pub async fn modify_line_total(
    order_id: &OrderId,
    new_total: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, FulfillmentError> {
    let result: Option<Order> = sqlx::query_as(
        "UPDATE orders SET line_total = $1, updated_at = CURRENT_TIMESTAMP WHERE order_id = $2 RETURNING *",
    )
    .bind(new_total)
    .bind(order_id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(result)
}

/// Orders that sat unassigned past the limit, ready for the stale-dispatch worker to cancel.
pub async fn fetch_stale(limit: Duration, conn: &mut SqliteConnection) -> Result<Vec<Order>, FulfillmentError> {
    let rows = sqlx::query_as(
        format!(
            "SELECT * FROM orders WHERE status IN ('Placed', 'Searching') AND \
             (unixepoch(CURRENT_TIMESTAMP) - unixepoch(updated_at)) > {}",
            limit.num_seconds()
        )
        .as_str(),
    )
    .fetch_all(conn)
    .await?;
    Ok(rows)
}

//--------------------------------------    Status history     -------------------------------------------------------

/// Appends one history entry. Entries are insert-only; nothing in this module updates or deletes
/// them.
pub async fn append_history(
    order_id: &OrderId,
    status: OrderStatusType,
    by: &str,
    note: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    sqlx::query("INSERT INTO order_status_history (order_id, status, actor, note) VALUES ($1, $2, $3, $4)")
        .bind(order_id.as_str())
        .bind(status.to_string())
        .bind(by)
        .bind(note)
        .execute(conn)
        .await?;
    debug!("📝️ Order {order_id} history: {status} by {by}");
    Ok(())
}

pub async fn fetch_history(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<crate::db_types::StatusEntry>, FulfillmentError> {
    let rows = sqlx::query_as("SELECT * FROM order_status_history WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(rows)
}
