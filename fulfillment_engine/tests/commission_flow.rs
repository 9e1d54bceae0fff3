//! Commission engine: branch arithmetic, the obligation lifecycle, sweep idempotence, and refund
//! reversals.

mod support;

use chrono::{Duration, Utc};
use fulfillment_engine::{
    config::CommissionConfig,
    db_types::{
        ActorId,
        ActorKind,
        FulfillmentKind,
        NewActor,
        NewOrder,
        NewPayment,
        ObligationStatus,
        OrderId,
        PaymentDestination,
        PaymentStatus,
        PayoutStatus,
    },
    traits::{ActorManagement, CommissionApiError, CommissionManagement, FulfillmentDatabase, MarkPaidOutcome},
    CommissionError,
};
use mfb_common::Cents;
use support::{engine, engine_with, fast_dispatch_config, test_centre};

async fn settled_order(
    engine: &support::TestEngine,
    id: &str,
    destination: PaymentDestination,
    amount: i64,
) -> OrderId {
    let centre = test_centre();
    let actor = ActorId::from("earner-1");
    if engine.db.fetch_actor(&actor).await.unwrap().is_none() {
        engine.db.upsert_actor(NewActor::new(actor.clone(), ActorKind::Provider, "earner", centre)).await.unwrap();
    }
    let order_id = OrderId(id.to_string());
    let order = NewOrder::new(
        order_id.clone(),
        format!("cust-{id}"),
        FulfillmentKind::Service,
        Cents::from(amount),
        centre,
        centre,
    );
    engine.orders.create_order(order).await.unwrap();
    engine.orders.record_payment(NewPayment::new(order_id.clone(), "card", destination, Cents::from(amount))).await.unwrap();
    engine.db.update_payment_status(&order_id, PaymentStatus::Paid).await.unwrap();
    engine.dispatch.accept_assignment(&order_id, &actor).await.unwrap();
    order_id
}

#[tokio::test]
async fn platform_account_settlement_deducts_commission_up_front() {
    let engine = engine().await;
    let order_id = settled_order(&engine, "comm-1", PaymentDestination::PlatformAccount, 1_000).await;

    let record = engine.commissions.settle_payment(&order_id).await.unwrap();
    // 1000 at 150 permille: 150 kept, 850 paid out, nothing owed back.
    assert_eq!(record.amount, Cents::from(1_000));
    assert_eq!(record.commission, Cents::from(150));
    assert_eq!(record.owner_earning, Cents::from(850));
    assert_eq!(record.obligation_status, ObligationStatus::NotApplicable);
    assert_eq!(record.due_date, None);
    assert_eq!(record.payout_status, Some(PayoutStatus::Initiated));
    assert!(record.payout_id.is_some());

    // Settling again returns the same record instead of splitting twice.
    let again = engine.commissions.settle_payment(&order_id).await.unwrap();
    assert_eq!(again.id, record.id);
    let records = engine.commissions.records_for_order(&order_id).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn personal_account_settlement_creates_a_pending_obligation() {
    let engine = engine().await;
    let order_id = settled_order(&engine, "comm-2", PaymentDestination::PersonalAccount, 1_000).await;

    let before = Utc::now();
    let record = engine.commissions.settle_payment(&order_id).await.unwrap();
    // The actor keeps the full 1000; 200 (20%) becomes an obligation due in 7 days.
    assert_eq!(record.owner_earning, Cents::from(1_000));
    assert_eq!(record.commission, Cents::from(200));
    assert_eq!(record.obligation_status, ObligationStatus::Pending);
    let due = record.due_date.expect("a personal-account settlement must carry a due date");
    let expected = before + Duration::days(7);
    assert!((due - expected).num_minutes().abs() < 5, "due date should be settle time + grace period");
}

#[tokio::test]
async fn mark_paid_requires_a_live_obligation() {
    let engine = engine().await;
    let personal = settled_order(&engine, "comm-3", PaymentDestination::PersonalAccount, 1_000).await;
    let record = engine.commissions.settle_payment(&personal).await.unwrap();

    let outcome = engine.commissions.mark_paid(record.id, "EFT-12345").await.unwrap();
    let paid = match outcome {
        MarkPaidOutcome::Marked(r) => r,
        other => panic!("expected Marked, got {other:?}"),
    };
    assert_eq!(paid.obligation_status, ObligationStatus::Paid);
    assert!(paid.paid_date.is_some());
    assert_eq!(paid.paid_proof.as_deref(), Some("EFT-12345"));

    // Marking again is a no-op, and the frozen dates stay put.
    let again = engine.commissions.mark_paid(record.id, "EFT-99999").await.unwrap();
    let again = match again {
        MarkPaidOutcome::AlreadyPaid(r) => r,
        other => panic!("expected AlreadyPaid, got {other:?}"),
    };
    assert_eq!(again.paid_date, paid.paid_date);
    assert_eq!(again.paid_proof.as_deref(), Some("EFT-12345"));

    // NotApplicable records reject the operation outright.
    let platform = settled_order(&engine, "comm-4", PaymentDestination::PlatformAccount, 1_000).await;
    let record = engine.commissions.settle_payment(&platform).await.unwrap();
    let refused = engine.commissions.mark_paid(record.id, "EFT-1").await;
    assert!(matches!(
        refused,
        Err(CommissionError::Api(CommissionApiError::PreconditionFailed { .. }))
    ));
}

#[tokio::test]
async fn overdue_sweep_is_idempotent_and_reminders_respect_the_cadence() {
    // Zero grace period: the obligation is due the moment it is settled.
    let config = CommissionConfig {
        grace_period: Duration::zero(),
        reminder_cadence: Duration::hours(24),
        ..CommissionConfig::default()
    };
    let engine = engine_with(fast_dispatch_config(), config).await;
    let order_id = settled_order(&engine, "comm-5", PaymentDestination::PersonalAccount, 1_000).await;
    let record = engine.commissions.settle_payment(&order_id).await.unwrap();
    assert_eq!(record.obligation_status, ObligationStatus::Pending);

    let flipped = engine.commissions.run_overdue_sweep().await.unwrap();
    assert_eq!(flipped.len(), 1);
    assert_eq!(flipped[0].id, record.id);
    assert_eq!(engine.notifier.count_titled("Commission overdue"), 1);

    // Second run: same final state, no second flip, no second reminder inside the cadence.
    let flipped = engine.commissions.run_overdue_sweep().await.unwrap();
    assert!(flipped.is_empty());
    assert_eq!(engine.notifier.count_titled("Commission overdue"), 1);

    let record = engine.db.fetch_commission_record(record.id).await.unwrap().unwrap();
    assert_eq!(record.obligation_status, ObligationStatus::Overdue);
    assert!(record.last_reminder_at.is_some());

    // An overdue obligation can still be settled manually.
    let outcome = engine.commissions.mark_paid(record.id, "EFT-late").await.unwrap();
    assert!(matches!(outcome, MarkPaidOutcome::Marked(_)));
}

#[tokio::test]
async fn refunds_write_a_reversing_record_instead_of_mutating_history() {
    let engine = engine().await;
    let order_id = settled_order(&engine, "comm-6", PaymentDestination::PlatformAccount, 1_000).await;
    let original = engine.commissions.settle_payment(&order_id).await.unwrap();

    engine.db.update_payment_status(&order_id, PaymentStatus::RefundDue).await.unwrap();
    let reversal = engine.commissions.settle_refund(&order_id).await.unwrap();
    assert_eq!(reversal.reversal_of, Some(original.id));
    assert_eq!(reversal.amount, -original.amount);
    assert_eq!(reversal.commission, -original.commission);
    assert_eq!(reversal.owner_earning, -original.owner_earning);

    // The original record is untouched, and re-running the refund settles nothing new.
    let records = engine.commissions.records_for_order(&order_id).await.unwrap();
    assert_eq!(records.len(), 2);
    let stored_original = records.iter().find(|r| r.id == original.id).unwrap();
    assert_eq!(stored_original.commission, original.commission);
    let again = engine.commissions.settle_refund(&order_id).await.unwrap();
    assert_eq!(again.id, reversal.id);
}

#[tokio::test]
async fn settling_an_unassigned_order_is_refused() {
    let engine = engine().await;
    let centre = test_centre();
    let order_id = OrderId("comm-7".to_string());
    let order = NewOrder::new(
        order_id.clone(),
        "cust-comm-7".to_string(),
        FulfillmentKind::Service,
        Cents::from(1_000),
        centre,
        centre,
    );
    engine.orders.create_order(order).await.unwrap();
    let result = engine.commissions.settle_payment(&order_id).await;
    assert!(matches!(result, Err(CommissionError::NoFulfiller(_))));
}
