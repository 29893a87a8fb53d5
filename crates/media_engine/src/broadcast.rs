use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use engine_logging::engine_debug;
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize, Serializer};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Size label paired with `pct = 100` when a job finishes, whatever its result.
pub const DONE_LABEL: &str = "done";

/// One progress update as observers see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Whole percentages go out as integers (`42`, not `42.0`).
    #[serde(serialize_with = "serialize_pct")]
    pub pct: Option<f64>,
    pub size: Option<String>,
}

impl ProgressEvent {
    pub fn percent(pct: f64, size: Option<String>) -> Self {
        Self {
            pct: Some(pct),
            size,
        }
    }

    pub fn done() -> Self {
        Self {
            pct: Some(100.0),
            size: Some(DONE_LABEL.to_string()),
        }
    }

    pub fn is_done(&self) -> bool {
        self.size.as_deref() == Some(DONE_LABEL)
    }
}

fn serialize_pct<S: Serializer>(pct: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match pct {
        Some(value) if value.fract() == 0.0 && value.abs() <= i64::MAX as f64 => {
            serializer.serialize_some(&(*value as i64))
        }
        Some(value) => serializer.serialize_some(value),
        None => serializer.serialize_none(),
    }
}

pub type SubscriberId = u64;

/// Events queued per subscriber; a reader further behind than this misses
/// the newest events until it catches up.
pub const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: BTreeMap<SubscriberId, mpsc::Sender<ProgressEvent>>,
}

/// Fan-out of progress events to every live subscriber.
///
/// Cloning yields another handle to the same subscriber set. Events are not
/// buffered for later subscribers.
#[derive(Debug, Clone, Default)]
pub struct ProgressBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl ProgressBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, tx);
        engine_debug!(
            "progress subscriber {} added ({} total)",
            id,
            registry.subscribers.len()
        );
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Returns whether the subscriber was still registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        lock(&self.registry).subscribers.remove(&id).is_some()
    }

    /// Deliver `event` to every subscriber without blocking. Closed ones are
    /// dropped from the set; full ones skip this event. Returns how many
    /// received it.
    pub fn publish(&self, event: ProgressEvent) -> usize {
        let mut registry = lock(&self.registry);
        let mut delivered = 0;
        registry
            .subscribers
            .retain(|id, tx| match tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    engine_debug!("progress subscriber {} lagging, event dropped", id);
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    engine_debug!("progress subscriber {} gone, removing", id);
                    false
                }
            });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live feed of progress events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<ProgressEvent>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event; `None` once the broadcaster is gone or this subscriber was
    /// removed.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        stream::unfold(self, |mut subscription| async move {
            let event = subscription.recv().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.remove(&self.id);
        }
    }
}
