//! Order state machine: whitelist enforcement, the happy path with counters, and the
//! compensating side effects of cancellation and release.

mod support;

use fulfillment_engine::{
    db_types::{
        ActorId,
        ActorKind,
        FulfillmentKind,
        LineItem,
        NewActor,
        NewOrder,
        NewPayment,
        OrderId,
        OrderStatusType,
        PaymentDestination,
        PaymentStatus,
    },
    traits::{ActorManagement, FulfillmentDatabase, FulfillmentError},
};
use mfb_common::{Cents, Coordinates};
use support::{engine, test_centre};

fn delivery_order(id: &str, shop: &str, centre: Coordinates) -> NewOrder {
    NewOrder::new(
        OrderId(id.to_string()),
        format!("cust-{id}"),
        FulfillmentKind::Delivery,
        Cents::from(10_000),
        centre,
        Coordinates::new(centre.latitude + 0.01, centre.longitude),
    )
    .with_shop(ActorId::from(shop))
    .with_items(vec![LineItem { product_id: "prod-1".to_string(), quantity: 3 }])
}

async fn seed_shop_and_courier(engine: &support::TestEngine, centre: Coordinates) -> (ActorId, ActorId) {
    let shop = ActorId::from("shop-1");
    let courier = ActorId::from("courier-1");
    engine.db.upsert_actor(NewActor::new(shop.clone(), ActorKind::Shop, "shop-1", centre)).await.unwrap();
    engine.db.upsert_actor(NewActor::new(courier.clone(), ActorKind::Courier, "courier-1", centre)).await.unwrap();
    engine.db.set_stock(&shop, "prod-1", 10).await.unwrap();
    (shop, courier)
}

#[tokio::test]
async fn off_whitelist_transitions_are_rejected_and_leave_history_alone() {
    let engine = engine().await;
    let centre = test_centre();
    seed_shop_and_courier(&engine, centre).await;
    let order_id = OrderId("life-1".to_string());
    engine.orders.create_order(delivery_order("life-1", "shop-1", centre)).await.unwrap();

    for illegal in [OrderStatusType::Completed, OrderStatusType::InProgress, OrderStatusType::Preparing] {
        let result = engine.orders.update_status(&order_id, illegal, "admin", None).await;
        match result {
            Err(FulfillmentError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, OrderStatusType::Placed);
                assert_eq!(to, illegal);
            },
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
    }

    // Nothing was appended beyond the placement entry.
    let history = engine.orders.status_history(&order_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, OrderStatusType::Placed);
}

#[tokio::test]
async fn placement_reserves_stock_and_full_path_updates_counters() {
    let engine = engine().await;
    let centre = test_centre();
    let (_, courier) = seed_shop_and_courier(&engine, centre).await;
    let order_id = OrderId("life-2".to_string());
    engine.orders.create_order(delivery_order("life-2", "shop-1", centre)).await.unwrap();
    assert_eq!(engine.db.fetch_stock("prod-1").await.unwrap(), Some(7));

    // Idempotent intake: same order id comes back unchanged, stock untouched.
    let (_, inserted) = engine.orders.create_order(delivery_order("life-2", "shop-1", centre)).await.unwrap();
    assert!(!inserted);
    assert_eq!(engine.db.fetch_stock("prod-1").await.unwrap(), Some(7));

    engine
        .orders
        .record_payment(NewPayment::new(order_id.clone(), "card", PaymentDestination::PlatformAccount, Cents::from(10_000)))
        .await
        .unwrap();

    engine.dispatch.accept_assignment(&order_id, &courier).await.unwrap();
    engine.orders.update_status(&order_id, OrderStatusType::InProgress, courier.as_str(), None).await.unwrap();
    let completed = engine.orders.complete_order(&order_id, courier.as_str()).await.unwrap();
    assert_eq!(completed.status, OrderStatusType::Completed);
    assert_eq!(completed.fulfiller_id, Some(courier.clone()));

    let profile = engine.db.fetch_actor(&courier).await.unwrap().unwrap();
    assert_eq!(profile.current_assignments, 0);
    assert_eq!(profile.completed_orders, 1);
    // 10,000 at the default 150 permille: 1,500 commission, 8,500 to the courier.
    assert_eq!(profile.total_earnings, Cents::from(8_500));

    // Completing again is a no-op, and the counters move exactly once.
    engine.orders.complete_order(&order_id, courier.as_str()).await.unwrap();
    let profile = engine.db.fetch_actor(&courier).await.unwrap().unwrap();
    assert_eq!(profile.completed_orders, 1);

    let history = engine.orders.status_history(&order_id).await.unwrap();
    let statuses: Vec<OrderStatusType> = history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatusType::Placed,
            OrderStatusType::Assigned,
            OrderStatusType::InProgress,
            OrderStatusType::Completed,
        ]
    );
}

#[tokio::test]
async fn cancelling_an_assigned_order_compensates_exactly_once() {
    let engine = engine().await;
    let centre = test_centre();
    let (_, courier) = seed_shop_and_courier(&engine, centre).await;
    let order_id = OrderId("life-3".to_string());
    engine.orders.create_order(delivery_order("life-3", "shop-1", centre)).await.unwrap();
    engine
        .orders
        .record_payment(NewPayment::new(order_id.clone(), "card", PaymentDestination::PlatformAccount, Cents::from(10_000)))
        .await
        .unwrap();
    engine.db.update_payment_status(&order_id, PaymentStatus::Paid).await.unwrap();
    engine.dispatch.accept_assignment(&order_id, &courier).await.unwrap();
    assert_eq!(engine.db.fetch_stock("prod-1").await.unwrap(), Some(7));

    let outcome = engine.orders.cancel_order(&order_id, "cust-life-3", Some("no longer needed")).await.unwrap();
    assert_eq!(outcome.order.status, OrderStatusType::Cancelled);
    assert_eq!(outcome.restored_items, 1);
    assert!(outcome.released_assignment);
    assert!(outcome.refund_marked);

    // Stock back to its pre-reservation value, counter released, payment refund-due.
    assert_eq!(engine.db.fetch_stock("prod-1").await.unwrap(), Some(10));
    let profile = engine.db.fetch_actor(&courier).await.unwrap().unwrap();
    assert_eq!(profile.current_assignments, 0);
    let payment = engine.db.fetch_payment(&order_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::RefundDue);

    // A cancelled-after-assignment order keeps its fulfiller on record.
    assert_eq!(outcome.order.fulfiller_id, Some(courier.clone()));

    // Cancelling again compensates nothing further.
    let again = engine.orders.cancel_order(&order_id, "cust-life-3", None).await.unwrap();
    assert_eq!(again.restored_items, 0);
    assert!(!again.released_assignment);
    assert!(!again.refund_marked);
    assert_eq!(engine.db.fetch_stock("prod-1").await.unwrap(), Some(10));
    let profile = engine.db.fetch_actor(&courier).await.unwrap().unwrap();
    assert_eq!(profile.current_assignments, 0);
}

#[tokio::test]
async fn a_released_assignment_clears_the_fulfiller_and_can_be_redispatched() {
    let engine = engine().await;
    let centre = test_centre();
    let (_, courier) = seed_shop_and_courier(&engine, centre).await;
    let order_id = OrderId("life-4".to_string());
    engine.orders.create_order(delivery_order("life-4", "shop-1", centre)).await.unwrap();
    engine.dispatch.accept_assignment(&order_id, &courier).await.unwrap();

    let released = engine.orders.release_assignment(&order_id, courier.as_str(), Some("vehicle broke down")).await.unwrap();
    assert_eq!(released.status, OrderStatusType::Rejected);
    assert_eq!(released.fulfiller_id, None);
    let profile = engine.db.fetch_actor(&courier).await.unwrap().unwrap();
    assert_eq!(profile.current_assignments, 0);

    // Rejected orders re-enter dispatch.
    assert!(OrderStatusType::Rejected.may_transition_to(OrderStatusType::Searching));
    let run = engine.dispatch.run_dispatch(&order_id).await;
    // The courier is the only actor and was already notified on claim-free rounds; either an
    // assignment (if they are offered and accept) or exhaustion is acceptable here — what matters
    // is that the run is legal from Rejected.
    match run {
        Ok(order) => assert_eq!(order.status, OrderStatusType::Assigned),
        Err(e) => assert!(matches!(e, fulfillment_engine::DispatchError::NoActorFound(_))),
    }
}

#[tokio::test]
async fn line_total_is_frozen_after_assignment_unless_admin_overrides() {
    let engine = engine().await;
    let centre = test_centre();
    let (_, courier) = seed_shop_and_courier(&engine, centre).await;
    let order_id = OrderId("life-5".to_string());
    engine.orders.create_order(delivery_order("life-5", "shop-1", centre)).await.unwrap();

    // Pre-assignment changes are allowed.
    let updated = engine.orders.modify_line_total(&order_id, Cents::from(12_000), "admin", false).await.unwrap();
    assert_eq!(updated.line_total, Cents::from(12_000));

    engine.dispatch.accept_assignment(&order_id, &courier).await.unwrap();
    let refused = engine.orders.modify_line_total(&order_id, Cents::from(9_000), "cust", false).await;
    assert!(matches!(refused, Err(FulfillmentError::OrderModificationForbidden)));

    let overridden = engine.orders.modify_line_total(&order_id, Cents::from(9_000), "admin", true).await.unwrap();
    assert_eq!(overridden.line_total, Cents::from(9_000));

    // The override left an audit trail.
    let history = engine.orders.status_history(&order_id).await.unwrap();
    assert!(history.iter().any(|h| h.note.as_deref().map(|n| n.contains("line total")).unwrap_or(false)));
}
