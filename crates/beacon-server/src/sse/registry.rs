//! Subscriber registry and broadcast.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use beacon_core::update::StoredUpdate;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::subscriber::{SendOutcome, SseSubscriber};

/// Lifetime frame drops before a slow subscriber is evicted.
const MAX_TOTAL_DROPS: u64 = 100;

/// The sentinel first frame, so clients can tell "stream open" from
/// "stream silent".
pub const CONNECTED_FRAME: &str = r#"{"type":"connected"}"#;

/// Registry of live `/api/events` subscribers.
///
/// All operations are synchronous (`parking_lot` locks around short
/// critical sections), so unsubscribe can run from a stream-drop guard
/// without a runtime handle.
pub struct SseRegistry {
    subscribers: RwLock<HashMap<String, Arc<SseSubscriber>>>,
    active: AtomicUsize,
    buffer: usize,
}

impl SseRegistry {
    /// Create a registry with the given per-subscriber frame buffer.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            active: AtomicUsize::new(0),
            buffer: buffer.max(1),
        }
    }

    /// Register a new subscriber.
    ///
    /// The connected sentinel is queued as the first frame before the
    /// subscriber becomes visible to broadcasts, so it is always delivered
    /// first.
    pub fn subscribe(&self) -> (Arc<SseSubscriber>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let subscriber = Arc::new(SseSubscriber::new(Uuid::now_v7().to_string(), tx));
        let _ = subscriber.send(Arc::new(CONNECTED_FRAME.to_string()));

        let mut subs = self.subscribers.write();
        if subs
            .insert(subscriber.id.clone(), subscriber.clone())
            .is_none()
        {
            let _ = self.active.fetch_add(1, Ordering::Relaxed);
        }
        debug!(id = %subscriber.id, "sse subscriber connected");
        (subscriber, rx)
    }

    /// Remove a subscriber. Idempotent — stream-drop guards and broadcast
    /// eviction can race without harm.
    pub fn unsubscribe(&self, id: &str) {
        let mut subs = self.subscribers.write();
        if subs.remove(id).is_some() {
            let _ = self.active.fetch_sub(1, Ordering::Relaxed);
            debug!(id, "sse subscriber disconnected");
        }
    }

    /// Fan an accepted update out to every subscriber.
    ///
    /// The frame is serialized once and shared. A closed channel evicts the
    /// subscriber immediately; a full buffer counts a drop and evicts after
    /// [`MAX_TOTAL_DROPS`]. Per-subscriber failures never abort delivery to
    /// the rest. Returns the number of subscribers the frame was queued for.
    pub fn broadcast(&self, update: &StoredUpdate) -> usize {
        let frame = match serde_json::to_string(update) {
            Ok(json) => Arc::new(json),
            Err(error) => {
                warn!(%error, "failed to serialize update for fanout");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut to_remove = Vec::new();
        {
            let subs = self.subscribers.read();
            for sub in subs.values() {
                match sub.send(Arc::clone(&frame)) {
                    SendOutcome::Sent => delivered += 1,
                    SendOutcome::Closed => to_remove.push(sub.id.clone()),
                    SendOutcome::Full => {
                        let drops = sub.drop_count();
                        if drops >= MAX_TOTAL_DROPS {
                            warn!(id = %sub.id, drops, "evicting slow sse subscriber");
                            to_remove.push(sub.id.clone());
                        } else {
                            warn!(id = %sub.id, drops, "sse frame dropped (buffer full)");
                        }
                    }
                }
            }
        }
        for id in &to_remove {
            self.unsubscribe(id);
        }
        delivered
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// Unsubscribes when the response stream is dropped (client or network
/// initiated close).
pub struct SubscriptionGuard {
    registry: Arc<SseRegistry>,
    id: String,
}

impl SubscriptionGuard {
    /// Guard the given subscription.
    #[must_use]
    pub fn new(registry: Arc<SseRegistry>, id: String) -> Self {
        Self { registry, id }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.registry.unsubscribe(&self.id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
