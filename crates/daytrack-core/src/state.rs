use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

use crate::filter::FilterState;
use crate::task::Task;

/// One published view of the filtered list and its counters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Snapshot {
    pub version: u64,
    pub filter: FilterState,
    pub summary: String,
    pub tasks: Vec<Task>,
    pub immediate_count: u32,
    pub completed_today: u32,
    pub completed_total: u32,
}

/// A one-shot notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum UiEffect {
    Message(String),
    ShowCompletionSummary(Task),
}

#[derive(Debug, Default)]
struct HubInner {
    latest: Arc<Snapshot>,
    subscribers: Vec<Sender<Arc<Snapshot>>>,
}

/// Holds the latest snapshot and fans each new one out to subscribers.
#[derive(Debug, Default)]
pub struct StateHub {
    inner: Mutex<HubInner>,
}

impl StateHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.lock().latest)
    }

    /// New subscribers receive the current snapshot first.
    pub fn subscribe(&self) -> Receiver<Arc<Snapshot>> {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        if inner.latest.version > 0 {
            let _ = tx.send(Arc::clone(&inner.latest));
        }
        inner.subscribers.push(tx);
        rx
    }

    /// Stamps the next version on `snapshot` and sends it to every live
    /// subscriber. Returns the version assigned.
    pub fn publish(&self, mut snapshot: Snapshot) -> u64 {
        let mut inner = self.lock();
        snapshot.version = inner.latest.version + 1;
        let snapshot = Arc::new(snapshot);
        inner.latest = Arc::clone(&snapshot);

        let before = inner.subscribers.len();
        inner
            .subscribers
            .retain(|tx| tx.send(Arc::clone(&snapshot)).is_ok());
        let dropped = before - inner.subscribers.len();

        debug!(
            version = snapshot.version,
            tasks = snapshot.tasks.len(),
            subscribers = inner.subscribers.len(),
            dropped,
            "published snapshot"
        );
        snapshot.version
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// FIFO of pending effects; each is handed out exactly once.
#[derive(Debug, Default)]
pub struct EffectQueue {
    pending: VecDeque<UiEffect>,
}

impl EffectQueue {
    pub fn push(&mut self, effect: UiEffect) {
        self.pending.push_back(effect);
    }

    pub fn message(&mut self, text: impl Into<String>) {
        self.push(UiEffect::Message(text.into()));
    }

    pub fn drain(&mut self) -> Vec<UiEffect> {
        self.pending.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(summary: &str) -> Snapshot {
        Snapshot {
            summary: summary.to_string(),
            ..Snapshot::default()
        }
    }

    #[test]
    fn publish_bumps_version_and_reaches_subscribers() {
        let hub = StateHub::new();
        let rx = hub.subscribe();

        assert_eq!(hub.publish(snapshot("first")), 1);
        assert_eq!(hub.publish(snapshot("second")), 2);

        let got: Vec<u64> = rx.try_iter().map(|snap| snap.version).collect();
        assert_eq!(got, vec![1, 2]);
        assert_eq!(hub.current().summary, "second");
    }

    #[test]
    fn late_subscriber_gets_current_snapshot() {
        let hub = StateHub::new();
        hub.publish(snapshot("ready"));

        let rx = hub.subscribe();
        let first = rx.try_recv().expect("replayed snapshot");
        assert_eq!(first.version, 1);
        assert_eq!(first.summary, "ready");
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let hub = StateHub::new();
        let keep = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.subscriber_count(), 2);

        hub.publish(snapshot("x"));
        assert_eq!(hub.subscriber_count(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn effects_drain_once_in_order() {
        let mut queue = EffectQueue::default();
        queue.message("one");
        queue.message("two");

        assert_eq!(
            queue.drain(),
            vec![
                UiEffect::Message("one".to_string()),
                UiEffect::Message("two".to_string()),
            ]
        );
        assert!(queue.drain().is_empty());
        assert!(queue.is_empty());
    }
}
