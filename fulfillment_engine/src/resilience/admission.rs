use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use log::*;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded admission for in-flight engine operations.
///
/// `capacity` permits run concurrently; at most `max_waiting` callers may queue behind them, each
/// for at most `acquire_timeout`. Anything beyond that is refused immediately with
/// [`AdmissionError::Overloaded`] — the caller gets an explicit "try later" instead of unbounded
/// queuing.
#[derive(Clone)]
pub struct AdmissionQueue {
    permits: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_waiting: usize,
    acquire_timeout: Duration,
}

impl AdmissionQueue {
    pub fn new(capacity: usize, max_waiting: usize, acquire_timeout: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_waiting,
            acquire_timeout,
        }
    }

    /// Acquires a permit or fails fast. The permit is released when the returned guard drops.
    pub async fn admit(&self) -> Result<AdmissionPermit, AdmissionError> {
        if self.waiting.fetch_add(1, Ordering::SeqCst) >= self.max_waiting {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            debug!("🚦️ Admission refused: waiting ceiling reached");
            return Err(AdmissionError::Overloaded);
        }
        let acquired = tokio::time::timeout(self.acquire_timeout, Arc::clone(&self.permits).acquire_owned()).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        match acquired {
            Ok(Ok(permit)) => Ok(AdmissionPermit { _permit: permit }),
            // The semaphore is never closed, but refusing is still the right answer if it were.
            Ok(Err(_)) => Err(AdmissionError::Overloaded),
            Err(_) => {
                debug!("🚦️ Admission refused: acquire timed out after {:?}", self.acquire_timeout);
                Err(AdmissionError::Overloaded)
            },
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// RAII guard for one admitted operation.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("The service is overloaded; try again later")]
    Overloaded,
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn admits_up_to_capacity() {
        let queue = AdmissionQueue::new(2, 0, Duration::from_millis(10));
        let p1 = queue.admit().await.unwrap();
        let _p2 = queue.admit().await.unwrap();
        assert_eq!(queue.available(), 0);

        // Full, and nobody may wait: immediate refusal.
        assert_eq!(queue.admit().await.unwrap_err(), AdmissionError::Overloaded);

        drop(p1);
        assert!(queue.admit().await.is_ok());
    }

    #[tokio::test]
    async fn waiting_callers_time_out() {
        let queue = AdmissionQueue::new(1, 4, Duration::from_millis(30));
        let _held = queue.admit().await.unwrap();
        let start = std::time::Instant::now();
        assert_eq!(queue.admit().await.unwrap_err(), AdmissionError::Overloaded);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn released_permit_unblocks_a_waiter() {
        let queue = AdmissionQueue::new(1, 4, Duration::from_millis(500));
        let held = queue.admit().await.unwrap();
        let q2 = queue.clone();
        let waiter = tokio::spawn(async move { q2.admit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap().is_ok());
    }
}
