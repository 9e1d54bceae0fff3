//! The single most safety-critical property in the system: no matter how many actors accept
//! concurrently, exactly one claim lands.

mod support;

use fulfillment_engine::{
    db_types::{ActorId, ActorKind, FulfillmentKind, NewActor, NewOrder, OrderId},
    traits::{ActorManagement, FulfillmentError},
};
use mfb_common::Cents;
use support::{engine, test_centre};

const NUM_ACTORS: usize = 16;

#[tokio::test]
async fn exactly_one_of_many_concurrent_claims_succeeds() {
    let engine = engine().await;
    let centre = test_centre();

    let mut actor_ids = Vec::with_capacity(NUM_ACTORS);
    for i in 0..NUM_ACTORS {
        let id = format!("claimant-{i}");
        let actor = NewActor::new(ActorId::from(id.as_str()), ActorKind::Provider, id.as_str(), centre);
        engine.db.upsert_actor(actor).await.unwrap();
        actor_ids.push(ActorId::from(id));
    }

    let order_id = OrderId("race-1".to_string());
    let order = NewOrder::new(
        order_id.clone(),
        "cust-1".to_string(),
        FulfillmentKind::Service,
        Cents::from(5_000),
        centre,
        centre,
    );
    engine.orders.create_order(order).await.unwrap();

    let mut claims = Vec::with_capacity(NUM_ACTORS);
    for actor_id in &actor_ids {
        let dispatch = engine.dispatch.clone();
        let order_id = order_id.clone();
        let actor_id = actor_id.clone();
        claims.push(tokio::spawn(async move { dispatch.accept_assignment(&order_id, &actor_id).await }));
    }

    let mut winners = Vec::new();
    let mut losers = 0;
    for claim in claims {
        match claim.await.unwrap() {
            Ok(order) => winners.push(order),
            Err(FulfillmentError::AlreadyClaimed(_)) => losers += 1,
            Err(e) => panic!("unexpected claim failure: {e}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one claim must succeed");
    assert_eq!(losers, NUM_ACTORS - 1);

    let winner = winners.pop().unwrap();
    let fulfiller = winner.fulfiller_id.clone().expect("winner's order must carry the fulfiller");

    // The stored order agrees with the winner's view.
    let stored = engine.orders.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(stored.fulfiller_id.as_ref(), Some(&fulfiller));
    assert_eq!(stored.status, fulfillment_engine::db_types::OrderStatusType::Assigned);

    // Exactly one assignment counter moved.
    let mut total_assignments = 0;
    for actor_id in &actor_ids {
        let profile = engine.db.fetch_actor(actor_id).await.unwrap().unwrap();
        total_assignments += profile.current_assignments;
        if actor_id == &fulfiller {
            assert_eq!(profile.current_assignments, 1);
        } else {
            assert_eq!(profile.current_assignments, 0);
        }
    }
    assert_eq!(total_assignments, 1);
}

#[tokio::test]
async fn claiming_a_cancelled_order_is_a_stale_state() {
    let engine = engine().await;
    let centre = test_centre();
    let actor = NewActor::new(ActorId::from("late-actor"), ActorKind::Provider, "late", centre);
    engine.db.upsert_actor(actor).await.unwrap();

    let order_id = OrderId("race-2".to_string());
    let order = NewOrder::new(
        order_id.clone(),
        "cust-2".to_string(),
        FulfillmentKind::Service,
        Cents::from(1_000),
        centre,
        centre,
    );
    engine.orders.create_order(order).await.unwrap();
    engine.orders.cancel_order(&order_id, "cust-2", None).await.unwrap();

    // A notification round that completes after cancellation must be rejected by the ledger.
    let result = engine.dispatch.accept_assignment(&order_id, &ActorId::from("late-actor")).await;
    assert!(matches!(result, Err(FulfillmentError::StaleState(_, _))));

    let profile = engine.db.fetch_actor(&ActorId::from("late-actor")).await.unwrap().unwrap();
    assert_eq!(profile.current_assignments, 0, "a refused claim must leave no side effects");
}
