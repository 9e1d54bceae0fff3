//! Shared scaffolding for the integration tests: an in-memory engine with fast dispatch timing
//! and a notifier that records what it sent.
#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use futures_util::future::BoxFuture;
use fulfillment_engine::{
    config::{CommissionConfig, DispatchConfig},
    events::EventProducers,
    resilience::AdmissionQueue,
    traits::{LogPayoutProvider, Notifier},
    CommissionApi,
    DispatchApi,
    OrderFlowApi,
    SqliteDatabase,
};
use mfb_common::Coordinates;

pub fn prepare_test_env() {
    let _ = dotenvy::dotenv();
    let _ = env_logger::try_init();
}

pub async fn memory_db() -> SqliteDatabase {
    SqliteDatabase::new_with_url("sqlite::memory:", 1).await.expect("in-memory database should always open")
}

/// Dispatch timing tightened so a full escalation runs in well under a second.
pub fn fast_dispatch_config() -> DispatchConfig {
    DispatchConfig {
        delivery_radius_km: 1.0,
        service_radius_km: 1.0,
        radius_step_km: 1.0,
        max_radius_km: 3.0,
        max_attempts: 3,
        round_timeout: StdDuration::from_millis(250),
        escalation_backoff: StdDuration::from_millis(20),
    }
}

pub fn test_centre() -> Coordinates {
    Coordinates::new(-33.9249, 18.4241)
}

#[derive(Debug, Clone)]
pub struct SentNote {
    pub recipient: String,
    pub title: String,
}

/// Notifier that records every send. Always reports successful delivery.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SentNote>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNote> {
        self.sent.lock().unwrap().clone()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| n.title == title).count()
    }

    pub fn count_for(&self, recipient: &str) -> usize {
        self.sent.lock().unwrap().iter().filter(|n| n.recipient == recipient).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, recipient: &str, title: &str, _body: &str, _data: serde_json::Value) -> BoxFuture<'static, bool> {
        let sent = Arc::clone(&self.sent);
        let note = SentNote { recipient: recipient.to_string(), title: title.to_string() };
        Box::pin(async move {
            sent.lock().unwrap().push(note);
            true
        })
    }
}

pub struct TestEngine {
    pub db: SqliteDatabase,
    pub orders: OrderFlowApi<SqliteDatabase, RecordingNotifier, LogPayoutProvider>,
    pub dispatch: DispatchApi<SqliteDatabase, RecordingNotifier>,
    pub commissions: CommissionApi<SqliteDatabase, RecordingNotifier, LogPayoutProvider>,
    pub notifier: RecordingNotifier,
}

pub async fn engine() -> TestEngine {
    engine_with(fast_dispatch_config(), CommissionConfig::default()).await
}

pub async fn engine_with(dispatch_config: DispatchConfig, commission_config: CommissionConfig) -> TestEngine {
    prepare_test_env();
    let db = memory_db().await;
    let notifier = RecordingNotifier::default();
    let producers = EventProducers::default();
    let commissions = CommissionApi::new(
        db.clone(),
        notifier.clone(),
        LogPayoutProvider,
        commission_config,
        producers.clone(),
    );
    let orders = OrderFlowApi::new(db.clone(), notifier.clone(), commissions.clone(), producers.clone());
    let admission = AdmissionQueue::new(16, 16, StdDuration::from_millis(500));
    let dispatch = DispatchApi::new(db.clone(), notifier.clone(), dispatch_config, admission, producers);
    TestEngine { db, orders, dispatch, commissions, notifier }
}
