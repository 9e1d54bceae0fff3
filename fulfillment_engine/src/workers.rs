//! Long-running background jobs. Each worker owns a `tokio::time::interval` loop over the
//! SQLite backend; none of the returned handles should be awaited, as they run indefinitely.

use std::time::Duration as StdDuration;

use chrono::Duration;
use log::*;
use tokio::task::JoinHandle;

use crate::{
    api::{dispatch_api::DispatchApi, errors::DispatchError},
    db_types::{Order, OrderId},
    resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError},
    sqlite::SqliteDatabase,
    traits::{Notifier, PayoutProvider},
    CommissionApi,
    OrderFlowApi,
};

/// Starts the commission sweep worker: flips due obligations to overdue and sends cadence-limited
/// reminders. The sweep itself is idempotent, so the interval can be generous or tight.
///
/// Calls run behind a circuit breaker: a persistently failing store trips the breaker and the
/// worker backs off to fast failures until the cooldown probe succeeds.
pub fn start_overdue_sweep_worker<N, P>(
    api: CommissionApi<SqliteDatabase, N, P>,
    every: StdDuration,
) -> JoinHandle<()>
where
    N: Notifier,
    P: PayoutProvider,
{
    tokio::spawn(async move {
        let breaker = CircuitBreaker::new("commission-sweep", CircuitBreakerConfig::default());
        let mut timer = tokio::time::interval(every);
        info!("🕰️ Commission overdue sweep worker started");
        loop {
            timer.tick().await;
            match breaker.call(api.run_overdue_sweep()).await {
                Ok(flipped) if flipped.is_empty() => trace!("🕰️ Overdue sweep: nothing to do"),
                Ok(flipped) => info!("🕰️ Overdue sweep flipped {} obligation(s)", flipped.len()),
                Err(CircuitBreakerError::CircuitOpen) => {
                    debug!("🕰️ Overdue sweep skipped: circuit open");
                },
                Err(CircuitBreakerError::OperationFailed(e)) => {
                    error!("🕰️ Error running overdue sweep: {e}");
                },
            }
        }
    })
}

/// Starts the stale-dispatch expiry worker: cancels (with full compensations) orders that sat in
/// `Placed`/`Searching` beyond `stale_limit`. This is the recovery path for coordinators that died
/// mid-wait — after a restart nothing holds those orders, and this sweep returns them to the
/// customer instead of leaving them stranded.
pub fn start_stale_order_worker<N, P>(
    api: OrderFlowApi<SqliteDatabase, N, P>,
    stale_limit: Duration,
    every: StdDuration,
) -> JoinHandle<()>
where
    N: Notifier,
    P: PayoutProvider,
{
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(every);
        info!("🕰️ Stale order expiry worker started");
        loop {
            timer.tick().await;
            match api.expire_stale_orders(stale_limit).await {
                Ok(expired) if expired.is_empty() => trace!("🕰️ Stale order sweep: nothing to do"),
                Ok(expired) => info!("🕰️ {} stale order(s) expired: {}", expired.len(), order_list(&expired)),
                Err(e) => error!("🕰️ Error running stale order sweep: {e}"),
            }
        }
    })
}

/// Spawns one dispatch run as its own task. The handle resolves to the assignment outcome; detach
/// it if only the side effects matter.
pub fn spawn_dispatch<N>(
    api: DispatchApi<SqliteDatabase, N>,
    order_id: OrderId,
) -> JoinHandle<Result<Order, DispatchError>>
where
    N: Notifier,
{
    tokio::spawn(async move { api.run_dispatch(&order_id).await })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_id: {} cust_id: {}", o.id, o.order_id, o.customer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
