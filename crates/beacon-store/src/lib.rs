//! # beacon-store
//!
//! The sync engine behind the Beacon server:
//!
//! - [`journal`]: append-only, time-ordered update journal with delta polling
//!   and FIFO trimming
//! - [`state`]: the canonical state document — additive full-state merge and
//!   typed incremental patching
//! - [`SyncStore`]: the owned service combining journal and state behind
//!   process-lifetime locks
//! - [`persist`]: dual-format (plaintext + encrypted) persistence with
//!   rotating backups
//! - [`crypto`]: the at-rest encryption envelope and key bootstrap
//!
//! Journal and state operations are purely in-memory and never touch disk;
//! durability is a separate, best-effort concern that degrades without ever
//! failing a request.

#![deny(unsafe_code)]

pub mod crypto;
pub mod journal;
pub mod persist;
pub mod service;
pub mod state;

pub use journal::UpdateJournal;
pub use persist::{JournalFile, Persister, StorePaths};
pub use service::SyncStore;
pub use state::StateDoc;
