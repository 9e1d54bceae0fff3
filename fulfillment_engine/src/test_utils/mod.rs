//! Helpers for tests and local experiments. Gated behind the `test_utils` feature.

pub mod prepare_env;

use mfb_common::{Cents, Coordinates};

use crate::{
    db_types::{ActorId, ActorKind, FulfillmentKind, NewActor, NewOrder, OrderId},
    SqliteDatabase,
};

/// A fresh in-memory database. A single pooled connection, so every query sees the same data.
pub async fn memory_db() -> SqliteDatabase {
    SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("in-memory database should always open")
}

/// An available actor `offset_km` kilometres east of `centre`.
pub fn actor_near(id: &str, kind: ActorKind, centre: Coordinates, offset_km: f64) -> NewActor {
    let location = Coordinates::new(centre.latitude, centre.longitude + offset_km / 111.0);
    NewActor::new(ActorId::from(id), kind, id.to_string(), location)
}

/// A service order for `customer` at `destination`, with a generated order id.
pub fn service_order(order_id: &str, customer: &str, destination: Coordinates, total: i64) -> NewOrder {
    NewOrder::new(
        OrderId(order_id.to_string()),
        customer.to_string(),
        FulfillmentKind::Service,
        Cents::from(total),
        destination,
        destination,
    )
}

/// A delivery order from `shop` at `origin` to `destination`.
pub fn delivery_order(
    order_id: &str,
    customer: &str,
    shop: &str,
    origin: Coordinates,
    destination: Coordinates,
    total: i64,
) -> NewOrder {
    NewOrder::new(
        OrderId(order_id.to_string()),
        customer.to_string(),
        FulfillmentKind::Delivery,
        Cents::from(total),
        origin,
        destination,
    )
    .with_shop(ActorId::from(shop))
}
