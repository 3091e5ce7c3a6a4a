//! The owned sync service: journal + canonical state behind one handle.
//!
//! `SyncStore` replaces the module-level globals of a typical single-file
//! server with a single service constructed at startup and shared as
//! `Arc<SyncStore>`. All mutation goes through these methods; locks are
//! short `parking_lot` critical sections never held across an await point,
//! which serializes writers the way an event loop would.

use beacon_core::errors::SyncError;
use beacon_core::update::{StoredUpdate, UpdatePayload};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};

use crate::journal::UpdateJournal;
use crate::persist::JournalFile;
use crate::state::{self, PatchOutcome, StateDoc};

/// Journal + canonical state for one deployment.
pub struct SyncStore {
    journal: RwLock<UpdateJournal>,
    state: RwLock<Option<StateDoc>>,
    /// Legacy snapshot blob carried through the journal file untouched.
    snapshot: RwLock<Option<Value>>,
}

impl SyncStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(journal: UpdateJournal) -> Self {
        Self {
            journal: RwLock::new(journal),
            state: RwLock::new(None),
            snapshot: RwLock::new(None),
        }
    }

    /// Create a store from persisted parts (boot path).
    #[must_use]
    pub fn from_parts(journal: UpdateJournal, state: Option<StateDoc>, snapshot: Option<Value>) -> Self {
        Self {
            journal: RwLock::new(journal),
            state: RwLock::new(state),
            snapshot: RwLock::new(snapshot),
        }
    }

    // ── Journal operations ──────────────────────────────────────────

    /// Accept one update: journal it, then fold it into canonical state.
    ///
    /// The fold is best-effort: a patch failure is logged and swallowed, and
    /// the journal append stands (at-least-once application — state stays
    /// stale until the next full sync or retried push).
    pub fn push(&self, payload: UpdatePayload) -> Result<StoredUpdate, SyncError> {
        let stored = self.journal.write().append(payload)?;

        if let Some(doc) = self.state.write().as_mut() {
            match state::apply_patch(doc, &stored) {
                Ok(PatchOutcome::Applied(collection)) => {
                    debug!(
                        kind = %stored.kind,
                        action = %stored.action,
                        collection,
                        "update folded into canonical state"
                    );
                }
                Ok(PatchOutcome::Ignored) => {
                    debug!(kind = %stored.kind, action = %stored.action, "update not folded (no-op pair)");
                }
                Err(e) => {
                    warn!(error = %e, "patch failed; canonical state stale until next full sync");
                }
            }
        }
        Ok(stored)
    }

    /// Accept a batch of updates (journal only — no folding, no fanout).
    pub fn push_batch(&self, payloads: Vec<UpdatePayload>) -> Result<Vec<StoredUpdate>, SyncError> {
        self.journal.write().append_batch(payloads)
    }

    /// Delta poll; see [`UpdateJournal::poll`].
    #[must_use]
    pub fn poll(&self, since: Option<&str>) -> Vec<StoredUpdate> {
        self.journal.read().poll(since)
    }

    /// Full journal snapshot.
    #[must_use]
    pub fn all_updates(&self) -> Vec<StoredUpdate> {
        self.journal.read().all()
    }

    /// Number of journaled updates.
    #[must_use]
    pub fn update_count(&self) -> usize {
        self.journal.read().len()
    }

    /// Timestamp of the newest journaled update.
    #[must_use]
    pub fn last_update_ts(&self) -> Option<String> {
        self.journal.read().last_ts().map(str::to_string)
    }

    /// Trim the journal to its cap; returns the discard count.
    pub fn trim(&self) -> usize {
        self.journal.write().trim()
    }

    // ── Canonical state operations ──────────────────────────────────

    /// The current canonical state, if any.
    #[must_use]
    pub fn state(&self) -> Option<Value> {
        self.state.read().as_ref().cloned().map(Value::Object)
    }

    /// Full-state resync: additively merge `incoming` over the current
    /// document and make the result canonical. Returns the new state.
    pub fn replace_state(&self, incoming: Value) -> Value {
        let mut guard = self.state.write();
        let merged = match guard.as_ref() {
            Some(current) => state::additive_merge(current, incoming),
            None => {
                // First upload: nothing to merge against, but the notes
                // sanitation pass still applies.
                let mut doc = match incoming {
                    Value::Object(map) => map,
                    _ => StateDoc::new(),
                };
                state::sanitize_notes(&mut doc);
                doc
            }
        };
        *guard = Some(merged.clone());
        Value::Object(merged)
    }

    // ── Persistence snapshots ───────────────────────────────────────

    /// Snapshot the journal for the durability layer.
    #[must_use]
    pub fn journal_file(&self) -> JournalFile {
        JournalFile {
            updates: self.journal.read().all(),
            snapshot: self.snapshot.read().clone(),
        }
    }

    /// Snapshot the canonical state document for the durability layer.
    #[must_use]
    pub fn state_doc(&self) -> Option<StateDoc> {
        self.state.read().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
