//! Dispatch coordinator behaviour: candidate queries, the accept path, escalation monotonicity,
//! exhaustion, and cancellation observation.

mod support;

use std::time::Duration as StdDuration;

use fulfillment_engine::{
    db_types::{ActorId, ActorKind, DispatchResponse, FulfillmentKind, NewActor, NewOrder, OrderId, OrderStatusType},
    resilience::AdmissionQueue,
    traits::{ActorManagement, CandidateFilter, FulfillmentDatabase},
    DispatchApi,
    DispatchError,
};
use mfb_common::{Cents, Coordinates};
use support::{engine, fast_dispatch_config, test_centre};

fn offset_east(centre: Coordinates, km: f64) -> Coordinates {
    Coordinates::new(centre.latitude, centre.longitude + km / 111.0)
}

fn service_order(id: &str, centre: Coordinates) -> NewOrder {
    NewOrder::new(
        OrderId(id.to_string()),
        format!("cust-{id}"),
        FulfillmentKind::Service,
        Cents::from(2_000),
        centre,
        centre,
    )
}

async fn wait_for_offer(engine: &support::TestEngine, order_id: &OrderId, actor_id: &ActorId) {
    for _ in 0..100 {
        let tickets = engine.db.fetch_notified_actors(order_id).await.unwrap();
        if tickets.iter().any(|t| &t.actor_id == actor_id && t.response == DispatchResponse::Pending) {
            return;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    panic!("actor {actor_id} never received an offer for {order_id}");
}

#[tokio::test]
async fn candidates_are_radius_filtered_and_sorted_nearest_first() {
    let engine = engine().await;
    let centre = test_centre();
    for (id, km) in [("near", 0.2), ("mid", 0.6), ("far", 2.5)] {
        let actor = NewActor::new(ActorId::from(id), ActorKind::Provider, id, offset_east(centre, km));
        engine.db.upsert_actor(actor).await.unwrap();
    }
    // Unavailable actors never surface, however close.
    let off_duty =
        NewActor::new(ActorId::from("off-duty"), ActorKind::Provider, "off-duty", centre).unavailable();
    engine.db.upsert_actor(off_duty).await.unwrap();

    let filter = CandidateFilter::for_kind(ActorKind::Provider);
    let hits = engine.db.find_candidates(centre, 1.0, &filter).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|c| c.actor_id.as_str()).collect();
    assert_eq!(ids, vec!["near", "mid"]);
    assert!(hits[0].distance_km < hits[1].distance_km);

    // An empty result is a valid, non-error outcome.
    let none = engine.db.find_candidates(offset_east(centre, 200.0), 1.0, &filter).await.unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn category_filter_and_exclusions_narrow_the_pool() {
    let engine = engine().await;
    let centre = test_centre();
    let plumber = NewActor::new(ActorId::from("plumber"), ActorKind::Provider, "plumber", centre)
        .with_categories("plumbing");
    let sparky = NewActor::new(ActorId::from("sparky"), ActorKind::Provider, "sparky", centre)
        .with_categories("electrical");
    engine.db.upsert_actor(plumber).await.unwrap();
    engine.db.upsert_actor(sparky).await.unwrap();

    let filter = CandidateFilter::for_kind(ActorKind::Provider).with_category("plumbing");
    let hits = engine.db.find_candidates(centre, 1.0, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].actor_id.as_str(), "plumber");

    let filter = CandidateFilter::for_kind(ActorKind::Provider).excluding(vec![ActorId::from("plumber")]);
    let hits = engine.db.find_candidates(centre, 1.0, &filter).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].actor_id.as_str(), "sparky");
}

#[tokio::test]
async fn dispatch_assigns_the_accepting_actor() {
    let engine = engine().await;
    let centre = test_centre();
    let actor_id = ActorId::from("provider-1");
    let actor = NewActor::new(actor_id.clone(), ActorKind::Provider, "provider-1", offset_east(centre, 0.3));
    engine.db.upsert_actor(actor).await.unwrap();

    let order_id = OrderId("dispatch-1".to_string());
    engine.orders.create_order(service_order("dispatch-1", centre)).await.unwrap();

    let run = {
        let api = engine.dispatch.clone();
        let order_id = order_id.clone();
        tokio::spawn(async move { api.run_dispatch(&order_id).await })
    };

    wait_for_offer(&engine, &order_id, &actor_id).await;
    engine.dispatch.accept_assignment(&order_id, &actor_id).await.unwrap();

    let assigned = run.await.unwrap().expect("dispatch should finish with an assignment");
    assert_eq!(assigned.status, OrderStatusType::Assigned);
    assert_eq!(assigned.fulfiller_id, Some(actor_id.clone()));

    // The winner's ticket reads Accepted; nothing is left Pending.
    let tickets = engine.db.fetch_notified_actors(&order_id).await.unwrap();
    assert_eq!(tickets.iter().filter(|t| t.response == DispatchResponse::Accepted).count(), 1);
    assert!(!tickets.iter().any(|t| t.response == DispatchResponse::Pending));

    // The customer heard about the offer outcome.
    assert!(engine.notifier.count_titled("Order assigned") >= 1);
}

#[tokio::test]
async fn exhaustion_is_terminal_and_bounded() {
    let engine = engine().await;
    let centre = test_centre();
    let config = fast_dispatch_config();
    // No actors seeded at all: every round comes back empty.
    let order_id = OrderId("dispatch-2".to_string());
    engine.orders.create_order(service_order("dispatch-2", centre)).await.unwrap();

    let result = engine.dispatch.run_dispatch(&order_id).await;
    assert!(matches!(result, Err(DispatchError::NoActorFound(_))));

    let order = engine.orders.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::NoActorFound);
    assert!(order.search_attempts <= config.max_attempts);
    assert!(order.search_radius_km <= config.max_radius_km);
    // Radius grew monotonically from the initial value.
    assert!(order.search_radius_km >= config.service_radius_km);

    // The terminal failure is recorded and reported, never silently retried.
    let history = engine.orders.status_history(&order_id).await.unwrap();
    let statuses: Vec<OrderStatusType> = history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![OrderStatusType::Placed, OrderStatusType::Searching, OrderStatusType::NoActorFound]
    );
    assert!(engine.notifier.count_titled("No one available") >= 1);
}

#[tokio::test]
async fn a_rejected_round_escalates_early_and_widens_the_radius() {
    let engine = engine().await;
    let centre = test_centre();
    let near = ActorId::from("near-provider");
    engine
        .db
        .upsert_actor(NewActor::new(near.clone(), ActorKind::Provider, "near", offset_east(centre, 0.2)))
        .await
        .unwrap();

    let order_id = OrderId("dispatch-3".to_string());
    engine.orders.create_order(service_order("dispatch-3", centre)).await.unwrap();

    let run = {
        let api = engine.dispatch.clone();
        let order_id = order_id.clone();
        tokio::spawn(async move { api.run_dispatch(&order_id).await })
    };

    wait_for_offer(&engine, &order_id, &near).await;
    let radius_before = engine.orders.fetch_order(&order_id).await.unwrap().unwrap().search_radius_km;
    engine.dispatch.reject_assignment(&order_id, &near).await.unwrap();

    // With its only candidate gone, dispatch escalates until it exhausts.
    let result = run.await.unwrap();
    assert!(matches!(result, Err(DispatchError::NoActorFound(_))));

    let order = engine.orders.fetch_order(&order_id).await.unwrap().unwrap();
    assert!(order.search_radius_km > radius_before, "radius must grow across attempts");
    let tickets = engine.db.fetch_notified_actors(&order_id).await.unwrap();
    assert_eq!(tickets.iter().filter(|t| t.response == DispatchResponse::Rejected).count(), 1);
}

#[tokio::test]
async fn cancellation_halts_dispatch_and_times_out_pending_offers() {
    let engine = engine().await;
    let centre = test_centre();
    let actor_id = ActorId::from("slow-provider");
    engine
        .db
        .upsert_actor(NewActor::new(actor_id.clone(), ActorKind::Provider, "slow", offset_east(centre, 0.2)))
        .await
        .unwrap();

    let order_id = OrderId("dispatch-4".to_string());
    engine.orders.create_order(service_order("dispatch-4", centre)).await.unwrap();

    let run = {
        let api = engine.dispatch.clone();
        let order_id = order_id.clone();
        tokio::spawn(async move { api.run_dispatch(&order_id).await })
    };

    wait_for_offer(&engine, &order_id, &actor_id).await;
    engine.orders.cancel_order(&order_id, "customer", Some("changed my mind")).await.unwrap();
    engine.dispatch.halt(&order_id).await;

    let result = run.await.unwrap();
    assert!(matches!(result, Err(DispatchError::Halted(_, OrderStatusType::Cancelled))));

    let tickets = engine.db.fetch_notified_actors(&order_id).await.unwrap();
    assert!(tickets.iter().all(|t| t.response == DispatchResponse::TimedOut));

    // The in-flight offer cannot be accepted after the cancellation.
    let late = engine.dispatch.accept_assignment(&order_id, &actor_id).await;
    assert!(late.is_err());
}

#[tokio::test]
async fn a_full_admission_queue_fails_fast() {
    let engine = engine().await;
    let centre = test_centre();
    let order_id = OrderId("dispatch-5".to_string());
    engine.orders.create_order(service_order("dispatch-5", centre)).await.unwrap();

    let choked = AdmissionQueue::new(0, 0, StdDuration::from_millis(10));
    let dispatch = DispatchApi::new(
        engine.db.clone(),
        engine.notifier.clone(),
        fast_dispatch_config(),
        choked,
        fulfillment_engine::events::EventProducers::default(),
    );
    let result = dispatch.run_dispatch(&order_id).await;
    assert!(matches!(result, Err(DispatchError::Overloaded)));

    // Refusal left the order untouched for a later retry.
    let order = engine.orders.fetch_order(&order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatusType::Placed);
}
