//! Error hierarchy for the Beacon sync server.
//!
//! Three error domains exist:
//!
//! - [`SyncError`]: request-level failures surfaced to API callers
//!   (`InvalidRequest` → 400, `Unauthorized` → 401)
//! - [`PersistenceError`]: disk I/O failures in the durability layer; logged
//!   and swallowed, never surfaced — the in-memory write already succeeded
//! - [`PatchError`]: failures folding an accepted update into canonical
//!   state; logged and swallowed, the journal append is not rolled back

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request-level error surfaced to API callers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The request is missing required fields or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The bearer token is absent or wrong on a write endpoint.
    #[error("Unauthorized")]
    Unauthorized,
}

impl SyncError {
    /// Shorthand for an [`SyncError::InvalidRequest`].
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// Disk operation kind, for persistence error context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskOperation {
    /// Reading a file.
    Read,
    /// Writing a file.
    Write,
    /// Copying a file (backups).
    Copy,
    /// Deleting a file (backup pruning).
    Delete,
}

impl fmt::Display for DiskOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Copy => write!(f, "copy"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Disk I/O failure in the durability layer.
///
/// Carries the artifact (journal, state, key, backup) and the operation so a
/// log line alone pinpoints what degraded.
#[derive(Debug, Error)]
#[error("persistence {operation} failed for {artifact}: {message}")]
pub struct PersistenceError {
    /// Artifact being written or read (`journal`, `state`, `backup`, ...).
    pub artifact: String,
    /// Operation that failed.
    pub operation: DiskOperation,
    /// Human-readable message.
    pub message: String,
    /// Original cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl PersistenceError {
    /// Create a new persistence error.
    #[must_use]
    pub fn new(
        artifact: impl Into<String>,
        operation: DiskOperation,
        message: impl Into<String>,
    ) -> Self {
        Self {
            artifact: artifact.into(),
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Set the error cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

/// Failure while folding an accepted update into canonical state.
#[derive(Debug, Error)]
#[error("patch {kind}/{action} failed: {message}")]
pub struct PatchError {
    /// Entity kind of the offending update.
    pub kind: String,
    /// Action of the offending update.
    pub action: String,
    /// Human-readable message.
    pub message: String,
}

impl PatchError {
    /// Create a new patch error.
    #[must_use]
    pub fn new(
        kind: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_request_display() {
        let err = SyncError::invalid("Missing type, action, or data");
        assert_eq!(
            err.to_string(),
            "invalid request: Missing type, action, or data"
        );
    }

    #[test]
    fn unauthorized_display() {
        assert_eq!(SyncError::Unauthorized.to_string(), "Unauthorized");
    }

    #[test]
    fn persistence_error_context() {
        let err = PersistenceError::new("journal", DiskOperation::Write, "disk full");
        assert_eq!(err.artifact, "journal");
        assert!(err.to_string().contains("write"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn persistence_error_with_source() {
        let cause = std::io::Error::other("permission denied");
        let err =
            PersistenceError::new("state", DiskOperation::Read, "load failed").with_source(cause);
        assert!(err.source.is_some());
    }

    #[test]
    fn disk_operation_display() {
        assert_eq!(DiskOperation::Read.to_string(), "read");
        assert_eq!(DiskOperation::Write.to_string(), "write");
        assert_eq!(DiskOperation::Copy.to_string(), "copy");
        assert_eq!(DiskOperation::Delete.to_string(), "delete");
    }

    #[test]
    fn patch_error_display() {
        let err = PatchError::new("log", "add", "collection logs is not an array");
        assert_eq!(
            err.to_string(),
            "patch log/add failed: collection logs is not an array"
        );
    }

    #[test]
    fn errors_are_std_error() {
        let _: &dyn std::error::Error = &SyncError::Unauthorized;
        let _: &dyn std::error::Error =
            &PersistenceError::new("journal", DiskOperation::Write, "x");
        let _: &dyn std::error::Error = &PatchError::new("task", "update", "x");
    }
}
