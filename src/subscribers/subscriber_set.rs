//! # Per-subscriber delivery queues.
//!
//! The orchestrator's listener hands every bus event to [`SubscriberSet::emit`], which pushes
//! it into one bounded queue per subscriber. Each queue is drained by its own worker, so a
//! slow subscriber only ever delays itself.
//!
//! ```text
//! emit(event) ──try_send──► queue ──► worker ──► on_event()
//!                   │                    └─ panic ──► SubscriberPanicked
//!                   └─ full/closed ──► SubscriberOverflow
//! ```
//!
//! A panic is caught with `AssertUnwindSafe`, which can leave shared state inconsistent if a
//! subscriber panics while holding a lock.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::panic_message;
use crate::events::{Bus, Event};
use crate::subscribers::Subscribe;

/// One subscriber's queue and the task draining it.
struct Worker {
    name: &'static str,
    queue: mpsc::Sender<Arc<Event>>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(sub: Arc<dyn Subscribe>, bus: Bus) -> Self {
        let name = sub.name();
        let (queue, rx) = mpsc::channel(sub.queue_capacity().max(1));
        let handle = tokio::spawn(drain(sub, rx, bus));
        Self {
            name,
            queue,
            handle,
        }
    }

    /// Queues `event`; on failure returns why it was dropped.
    fn offer(&self, event: &Arc<Event>) -> Result<(), &'static str> {
        match self.queue.try_send(Arc::clone(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err("full"),
            Err(TrySendError::Closed(_)) => Err("closed"),
        }
    }
}

async fn drain(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(event) = rx.recv().await {
        let handled = AssertUnwindSafe(sub.on_event(&event)).catch_unwind().await;
        if let Err(panic) = handled {
            let info = panic_message(&*panic);
            warn!(subscriber = sub.name(), %info, "subscriber panicked");
            bus.publish(Event::subscriber_panicked(sub.name(), info));
        }
    }
}

/// Subscribers attached to one orchestration, each behind its own worker.
pub(crate) struct SubscriberSet {
    workers: Vec<Worker>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns a worker per subscriber; must run inside a Tokio runtime.
    pub(crate) fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let workers = subs
            .into_iter()
            .map(|sub| Worker::spawn(sub, bus.clone()))
            .collect();
        Self { workers, bus }
    }

    /// Offers `event` to every subscriber without waiting.
    ///
    /// A dropped overflow report is not reported again.
    pub(crate) fn emit(&self, event: &Event) {
        let shared = Arc::new(event.clone());
        for worker in &self.workers {
            if let Err(reason) = worker.offer(&shared) {
                if !shared.is_subscriber_overflow() {
                    self.bus
                        .publish(Event::subscriber_overflow(worker.name, reason));
                }
            }
        }
    }

    /// Closes every queue and waits until the workers have delivered what was queued.
    pub(crate) async fn shutdown(self) {
        let handles: Vec<_> = self
            .workers
            .into_iter()
            .map(|worker| worker.handle)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topic;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.seen.lock().unwrap().push(ev.topic.to_string());
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber bug");
        }
        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    /// Never returns from its first event.
    struct Stuck;

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _ev: &Event) {
            std::future::pending::<()>().await;
        }
        fn name(&self) -> &'static str {
            "stuck"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_drains_on_shutdown() {
        let bus = Bus::new(16);
        let rec = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![rec.clone()], bus);

        set.emit(&Event::new(Topic::InitStart));
        set.emit(&Event::new(Topic::ready("a")));
        set.emit(&Event::new(Topic::InitEnd));
        set.shutdown().await;

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec!["init.start", "init.a", "init.end"]
        );
    }

    #[tokio::test]
    async fn panics_are_reported_on_the_bus() {
        let bus = Bus::new(16);
        let mut sub = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Panicky)], bus.clone());

        set.emit(&Event::new(Topic::InitStart));
        let ev = sub.next_matching(&Topic::SubscriberPanicked).await.unwrap();
        assert_eq!(ev.service.as_deref(), Some("panicky"));
        assert_eq!(ev.error.as_deref(), Some("subscriber bug"));
        set.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_drops_for_that_subscriber_only() {
        let bus = Bus::new(16);
        let mut sub = bus.subscribe();
        let rec = Arc::new(Recorder::default());
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(Stuck), rec.clone()];
        let set = SubscriberSet::new(subs, bus.clone());

        for _ in 0..3 {
            set.emit(&Event::new(Topic::InitStart));
            tokio::task::yield_now().await;
        }
        let ev = sub.next_matching(&Topic::SubscriberOverflow).await.unwrap();
        assert_eq!(ev.service.as_deref(), Some("stuck"));

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while rec.seen.lock().unwrap().len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(rec.seen.lock().unwrap().len(), 3);
    }
}
