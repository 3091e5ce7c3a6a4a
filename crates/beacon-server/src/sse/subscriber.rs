//! One registered SSE connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;

/// Result of offering a frame to a subscriber's buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame queued for delivery.
    Sent,
    /// Buffer full; frame dropped and counted.
    Full,
    /// Receiver gone — the client disconnected.
    Closed,
}

/// A connected `/api/events` reader.
///
/// Frames are pre-serialized once per broadcast and shared as
/// `Arc<String>`; the subscriber only owns a bounded channel to its
/// response stream, so one slow reader can never block the broadcaster.
pub struct SseSubscriber {
    /// Registry key (UUID v7).
    pub id: String,
    tx: mpsc::Sender<Arc<String>>,
    /// When the connection was registered.
    pub connected_at: Instant,
    dropped_frames: AtomicU64,
}

impl SseSubscriber {
    /// Create a subscriber around the sending half of its frame channel.
    #[must_use]
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Offer a frame without blocking.
    pub fn send(&self, frame: Arc<String>) -> SendOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => SendOutcome::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Lifetime count of frames dropped on a full buffer.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}
