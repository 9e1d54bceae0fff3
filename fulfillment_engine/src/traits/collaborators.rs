//! Contracts of the services this engine consumes but does not implement: notification delivery
//! (push/SMS/email mechanics) and money movement to actors. Production deployments plug real
//! integrations in here; the `Log*` implementations are the defaults for tests and local runs.
//!
//! Both traits return boxed futures so engine flows that hold them can be spawned as tasks.

use futures_util::future::BoxFuture;
use log::*;
use mfb_common::Cents;
use rand::Rng;
use thiserror::Error;

use crate::db_types::ActorId;

/// Best-effort, fire-and-forget notification delivery. A `false` return (or any internal failure)
/// is logged by callers and never blocks order progress.
pub trait Notifier: Clone + Send + Sync + 'static {
    fn notify(&self, recipient: &str, title: &str, body: &str, data: serde_json::Value) -> BoxFuture<'static, bool>;
}

/// Default notifier: writes the notification to the log and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, title: &str, body: &str, data: serde_json::Value) -> BoxFuture<'static, bool> {
        let line = format!("📣️ [{recipient}] {title}: {body} {data}");
        Box::pin(async move {
            debug!("{line}");
            true
        })
    }
}

/// Asynchronous payout initiation. The engine records the returned payout id; settlement of the
/// payout itself happens outside this core. Failures are retryable and never block completion.
pub trait PayoutProvider: Clone + Send + Sync + 'static {
    fn initiate_payout(&self, actor_id: &ActorId, amount: Cents) -> BoxFuture<'static, Result<String, PayoutError>>;
}

#[derive(Debug, Clone, Error)]
#[error("Payout could not be initiated: {0}")]
pub struct PayoutError(pub String);

/// Default payout provider: logs the request and fabricates a payout id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPayoutProvider;

impl PayoutProvider for LogPayoutProvider {
    fn initiate_payout(&self, actor_id: &ActorId, amount: Cents) -> BoxFuture<'static, Result<String, PayoutError>> {
        let actor_id = actor_id.clone();
        Box::pin(async move {
            let payout_id = format!("payout-{:08x}", rand::thread_rng().gen::<u32>());
            info!("💸️ Initiating payout {payout_id} of {amount} to actor {actor_id}");
            Ok(payout_id)
        })
    }
}
