//! # beacon-core
//!
//! Foundation types for the Beacon sync server.
//!
//! This crate provides the shared vocabulary the other Beacon crates depend on:
//!
//! - **Update events**: [`UpdatePayload`] (client-submitted) and
//!   [`StoredUpdate`] (journaled, server-timestamped)
//! - **Patch dispatch**: [`EntityKind`] / [`ActionKind`] closed enums and the
//!   [`PatchOp`] resolution table for typed state patching
//! - **Timestamps**: millisecond ISO-8601 UTC strings whose lexicographic
//!   order equals chronological order
//! - **Errors**: [`SyncError`] hierarchy via `thiserror`

#![deny(unsafe_code)]

pub mod errors;
pub mod time;
pub mod update;

pub use errors::{PatchError, PersistenceError, SyncError};
pub use update::{ActionKind, EntityKind, PatchOp, StoredUpdate, UpdatePayload};
