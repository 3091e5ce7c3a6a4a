//! Durability layer: dual-format persistence and rotating backups.
//!
//! The journal and canonical state live in memory; this module makes them
//! survive restarts. Every operation is best-effort: boot loads fall back
//! to empty defaults, and flush/backup failures are returned as
//! [`PersistenceError`] for the caller to log and swallow — a full disk
//! degrades durability, never serving availability.
//!
//! File layout under the data directory:
//!
//! - `journal.json` — plaintext journal (`{updates, snapshot}` wrapper)
//! - `state.json` — plaintext canonical state document
//! - `journal.enc`, `state.enc` — encrypted siblings (`nonceHex:cipherHex`)
//! - `.encryption-key` — hex-encoded 32-byte key, mode 600
//! - `backups/` — timestamped copies of both plaintext files

use std::path::{Path, PathBuf};

use beacon_core::errors::{DiskOperation, PersistenceError};
use beacon_core::time;
use beacon_core::update::StoredUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::crypto::Envelope;
use crate::state::StateDoc;

/// On-disk journal wrapper.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JournalFile {
    /// Journaled updates, oldest first.
    #[serde(default)]
    pub updates: Vec<StoredUpdate>,
    /// Legacy snapshot blob, carried through untouched.
    #[serde(default)]
    pub snapshot: Option<Value>,
}

/// Resolved file locations under one data directory.
#[derive(Clone, Debug)]
pub struct StorePaths {
    data_dir: PathBuf,
}

impl StorePaths {
    /// Create paths rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// The data directory itself.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Plaintext journal file.
    #[must_use]
    pub fn journal_file(&self) -> PathBuf {
        self.data_dir.join("journal.json")
    }

    /// Plaintext canonical state file.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    /// Encrypted journal sibling.
    #[must_use]
    pub fn encrypted_journal_file(&self) -> PathBuf {
        self.data_dir.join("journal.enc")
    }

    /// Encrypted state sibling.
    #[must_use]
    pub fn encrypted_state_file(&self) -> PathBuf {
        self.data_dir.join("state.enc")
    }

    /// Key file for the encryption envelope.
    #[must_use]
    pub fn key_file(&self) -> PathBuf {
        self.data_dir.join(".encryption-key")
    }

    /// Backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

/// Writes journal and state snapshots to disk, plaintext and encrypted.
pub struct Persister {
    paths: StorePaths,
    envelope: Option<Envelope>,
    backup_retain: usize,
}

impl Persister {
    /// Create a persister. `envelope` is `None` when key setup failed; the
    /// encrypted path is then skipped while plaintext keeps working.
    #[must_use]
    pub fn new(paths: StorePaths, envelope: Option<Envelope>, backup_retain: usize) -> Self {
        Self {
            paths,
            envelope,
            backup_retain,
        }
    }

    /// Resolved file locations.
    #[must_use]
    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Whether the encrypted path is active.
    #[must_use]
    pub fn encryption_enabled(&self) -> bool {
        self.envelope.is_some()
    }

    /// Create the data and backup directories.
    pub fn ensure_dirs(&self) -> Result<(), PersistenceError> {
        std::fs::create_dir_all(self.paths.backup_dir()).map_err(|e| {
            PersistenceError::new("data dir", DiskOperation::Write, "create failed").with_source(e)
        })
    }

    // ── Boot loads (best-effort, default on failure) ────────────────

    /// Load the journal file, falling back to an empty default on any
    /// missing-file, I/O, or parse failure.
    #[must_use]
    pub fn load_journal(&self) -> JournalFile {
        let path = self.paths.journal_file();
        if !path.exists() {
            return JournalFile::default();
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()))
        {
            Ok(file) => file,
            Err(error) => {
                warn!(%error, ?path, "journal load failed, starting fresh");
                JournalFile::default()
            }
        }
    }

    /// Load the canonical state document, or `None` when missing/corrupt.
    #[must_use]
    pub fn load_state(&self) -> Option<StateDoc> {
        let path = self.paths.state_file();
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()))
        {
            Ok(Value::Object(doc)) => Some(doc),
            Ok(_) => {
                warn!(?path, "state file is not a JSON object, ignoring");
                None
            }
            Err(error) => {
                warn!(%error, ?path, "state load failed, starting empty");
                None
            }
        }
    }

    // ── Plaintext flushes ───────────────────────────────────────────

    /// Overwrite the plaintext journal file.
    pub fn flush_journal(&self, file: &JournalFile) -> Result<(), PersistenceError> {
        let body = serde_json::to_string_pretty(file).map_err(|e| {
            PersistenceError::new("journal", DiskOperation::Write, "serialize failed")
                .with_source(e)
        })?;
        std::fs::write(self.paths.journal_file(), body).map_err(|e| {
            PersistenceError::new("journal", DiskOperation::Write, "write failed").with_source(e)
        })
    }

    /// Overwrite the plaintext state file.
    pub fn flush_state(&self, doc: &StateDoc) -> Result<(), PersistenceError> {
        let body = serde_json::to_string(doc).map_err(|e| {
            PersistenceError::new("state", DiskOperation::Write, "serialize failed").with_source(e)
        })?;
        std::fs::write(self.paths.state_file(), body).map_err(|e| {
            PersistenceError::new("state", DiskOperation::Write, "write failed").with_source(e)
        })
    }

    // ── Encrypted flushes (independent of the plaintext path) ───────

    /// Overwrite the encrypted journal sibling with a fresh envelope.
    /// Returns `false` when encryption is unavailable.
    pub fn flush_encrypted_journal(&self, file: &JournalFile) -> Result<bool, PersistenceError> {
        let Some(envelope) = &self.envelope else {
            return Ok(false);
        };
        let body = serde_json::to_string(file).map_err(|e| {
            PersistenceError::new("journal.enc", DiskOperation::Write, "serialize failed")
                .with_source(e)
        })?;
        self.write_envelope(envelope, &body, &self.paths.encrypted_journal_file(), "journal.enc")
    }

    /// Overwrite the encrypted state sibling with a fresh envelope.
    /// Returns `false` when encryption is unavailable.
    pub fn flush_encrypted_state(&self, doc: &StateDoc) -> Result<bool, PersistenceError> {
        let Some(envelope) = &self.envelope else {
            return Ok(false);
        };
        let body = serde_json::to_string(doc).map_err(|e| {
            PersistenceError::new("state.enc", DiskOperation::Write, "serialize failed")
                .with_source(e)
        })?;
        self.write_envelope(envelope, &body, &self.paths.encrypted_state_file(), "state.enc")
    }

    fn write_envelope(
        &self,
        envelope: &Envelope,
        body: &str,
        path: &Path,
        artifact: &str,
    ) -> Result<bool, PersistenceError> {
        let sealed = envelope.encrypt(body).map_err(|e| {
            PersistenceError::new(artifact, DiskOperation::Write, "encrypt failed").with_source(e)
        })?;
        std::fs::write(path, sealed).map_err(|e| {
            PersistenceError::new(artifact, DiskOperation::Write, "write failed").with_source(e)
        })?;
        Ok(true)
    }

    /// Decrypt and parse an encrypted sibling (recovery tooling).
    #[must_use]
    pub fn load_encrypted(&self, path: &Path) -> Option<Value> {
        let envelope = self.envelope.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&envelope.decrypt(&raw)).ok()
    }

    // ── Backups ─────────────────────────────────────────────────────

    /// Copy the current plaintext files into the backup directory with
    /// sortable timestamped names, then prune to the retention limit per
    /// artifact. Returns the backup names written.
    pub fn rotate_backups(&self) -> Result<Vec<String>, PersistenceError> {
        let backup_dir = self.paths.backup_dir();
        std::fs::create_dir_all(&backup_dir).map_err(|e| {
            PersistenceError::new("backup", DiskOperation::Write, "create dir failed")
                .with_source(e)
        })?;

        let stamp = time::now_file_stamp();
        let mut written = Vec::new();
        for (source, prefix) in [
            (self.paths.journal_file(), "journal-"),
            (self.paths.state_file(), "state-"),
        ] {
            if !source.exists() {
                continue;
            }
            let name = format!("{prefix}{stamp}.json");
            let _ = std::fs::copy(&source, backup_dir.join(&name)).map_err(|e| {
                PersistenceError::new("backup", DiskOperation::Copy, format!("copy {name} failed"))
                    .with_source(e)
            })?;
            written.push(name);
            self.prune_backups(&backup_dir, prefix)?;
        }
        Ok(written)
    }

    /// Delete the oldest backups for one artifact past the retention limit.
    /// Filenames embed sortable timestamps, so lexicographic order is
    /// chronological.
    fn prune_backups(&self, backup_dir: &Path, prefix: &str) -> Result<(), PersistenceError> {
        let read_dir = std::fs::read_dir(backup_dir).map_err(|e| {
            PersistenceError::new("backup", DiskOperation::Read, "list failed").with_source(e)
        })?;
        let mut names: Vec<String> = read_dir
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort_unstable();

        while names.len() > self.backup_retain {
            let oldest = names.remove(0);
            std::fs::remove_file(backup_dir.join(&oldest)).map_err(|e| {
                PersistenceError::new(
                    "backup",
                    DiskOperation::Delete,
                    format!("prune {oldest} failed"),
                )
                .with_source(e)
            })?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
