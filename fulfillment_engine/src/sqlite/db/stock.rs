use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{ActorId, LineItem, OrderId},
    traits::{ActorApiError, FulfillmentError},
};

pub async fn set_stock(
    shop_id: &ActorId,
    product_id: &str,
    quantity: i64,
    conn: &mut SqliteConnection,
) -> Result<(), ActorApiError> {
    sqlx::query(
        "INSERT INTO product_stock (shop_id, product_id, quantity) VALUES ($1, $2, $3) \
         ON CONFLICT (product_id) DO UPDATE SET shop_id = excluded.shop_id, quantity = excluded.quantity",
    )
    .bind(shop_id.as_str())
    .bind(product_id)
    .bind(quantity)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_stock(product_id: &str, conn: &mut SqliteConnection) -> Result<Option<i64>, ActorApiError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT quantity FROM product_stock WHERE product_id = $1")
        .bind(product_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(|(q,)| q))
}

/// Conditional decrement: only succeeds while enough stock remains. Zero matched rows means the
/// reservation fails and the enclosing transaction rolls back.
pub async fn reserve(item: &LineItem, conn: &mut SqliteConnection) -> Result<(), FulfillmentError> {
    let result = sqlx::query(
        "UPDATE product_stock SET quantity = quantity - $1 WHERE product_id = $2 AND quantity >= $1",
    )
    .bind(item.quantity)
    .bind(&item.product_id)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        let available = fetch_stock(&item.product_id, conn).await.ok().flatten().unwrap_or(0);
        return Err(FulfillmentError::InsufficientStock {
            product_id: item.product_id.clone(),
            wanted: item.quantity,
            available,
        });
    }
    Ok(())
}

pub async fn insert_order_items(
    order_id: &OrderId,
    items: &[LineItem],
    conn: &mut SqliteConnection,
) -> Result<(), FulfillmentError> {
    for item in items {
        sqlx::query("INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3)")
            .bind(order_id.as_str())
            .bind(&item.product_id)
            .bind(item.quantity)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn items_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Vec<LineItem>, FulfillmentError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = $1")
            .bind(order_id.as_str())
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(|(product_id, quantity)| LineItem { product_id, quantity }).collect())
}

/// Returns each reserved quantity to stock. Runs inside the cancellation transaction, so a partial
/// failure rolls the whole compensation back.
pub async fn restore_for_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<u64, FulfillmentError> {
    let items = items_for_order(order_id, &mut *conn).await?;
    let mut restored = 0u64;
    for item in &items {
        sqlx::query("UPDATE product_stock SET quantity = quantity + $1 WHERE product_id = $2")
            .bind(item.quantity)
            .bind(&item.product_id)
            .execute(&mut *conn)
            .await?;
        restored += 1;
    }
    if restored > 0 {
        debug!("📦️ Restored stock for {restored} item(s) of order {order_id}");
    }
    Ok(restored)
}
