//! Simple stateless pub-sub event plumbing.
//!
//! Engine components publish lifecycle events through [`EventProducer`]s; each configured hook
//! runs in its own [`EventHandler`] task. Handlers are stateless: all they receive is the event
//! itself, but they may be async and take as long as they like without blocking the publisher
//! (beyond the channel's buffer).

use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, listener) = mpsc::channel(buffer_size);
        Self { listener, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped. Each event is handled in its own task so one
    /// slow hook cannot stall the queue.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event handler started");
        // Dropping the internal sender means the loop below ends as soon as the last external
        // producer goes away.
        drop(self.sender);
        while let Some(event) = self.listener.recv().await {
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                (handler)(event).await;
            });
        }
        debug!("📬️ Event handler shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to publish event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test]
    async fn handler_sees_every_event_from_every_producer() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicU64::new(0));
        let sum = Arc::clone(&total);
        let handler: Handler<u64> = Arc::new(move |v| {
            let sum = Arc::clone(&sum);
            Box::pin(async move {
                sum.fetch_add(v, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let event_handler = EventHandler::new(4, handler);
        let p1 = event_handler.subscribe();
        let p2 = event_handler.subscribe();
        tokio::spawn(async move {
            for v in 0..10u64 {
                p1.publish_event(v).await;
            }
        });
        tokio::spawn(async move {
            for v in 10..20u64 {
                p2.publish_event(v).await;
            }
        });
        event_handler.start_handler().await;
        // handlers are spawned; give the last few a beat to finish
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(total.load(Ordering::SeqCst), (0..20).sum::<u64>());
    }
}
