//! Settings sections and defaults.
//!
//! The settings file is camelCase JSON; every section carries
//! `#[serde(default)]` so partial files merge cleanly over defaults.

use serde::{Deserialize, Serialize};

/// Top-level Beacon settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconSettings {
    /// Settings schema version.
    pub version: u32,
    /// Network and HTTP surface settings.
    pub server: ServerSettings,
    /// Write-endpoint authorization.
    pub auth: AuthSettings,
    /// Durability layer settings.
    pub storage: StorageSettings,
    /// Update journal settings.
    pub journal: JournalSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP port.
    pub port: u16,
    /// Per-subscriber SSE frame buffer (frames).
    pub sse_buffer: usize,
    /// SSE keep-alive comment interval in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3737,
            sse_buffer: 64,
            keep_alive_interval_ms: 30_000,
            max_body_bytes: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Write-endpoint authorization settings.
///
/// The server only consumes a yes/no answer from this; session and 2FA
/// handling live outside this service.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Bearer token required on write endpoints.
    pub api_key: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            api_key: "CHANGE_ME".to_string(),
        }
    }
}

/// Durability layer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Data directory (journal, state, key, backups). `~` expands to `$HOME`.
    pub data_dir: String,
    /// Plaintext flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Encrypted flush interval in milliseconds.
    pub encrypted_flush_interval_ms: u64,
    /// Backup rotation interval in milliseconds.
    pub backup_interval_ms: u64,
    /// Backups retained per artifact.
    pub backup_retain: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.beacon".to_string(),
            flush_interval_ms: 300_000,
            encrypted_flush_interval_ms: 300_000,
            backup_interval_ms: 21_600_000, // 6 hours
            backup_retain: 20,
        }
    }
}

/// Update journal settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JournalSettings {
    /// Entries retained after a trim pass.
    pub max_entries: usize,
    /// Trim interval in milliseconds.
    pub trim_interval_ms: u64,
    /// Entries returned by `poll` without a `since` parameter.
    pub default_poll_limit: usize,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            max_entries: 2000,
            trim_interval_ms: 60_000,
            default_poll_limit: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "0.0.0.0");
        assert_eq!(s.port, 3737);
        assert_eq!(s.sse_buffer, 64);
        assert_eq!(s.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn storage_defaults() {
        let s = StorageSettings::default();
        assert_eq!(s.flush_interval_ms, 300_000);
        assert_eq!(s.backup_interval_ms, 21_600_000);
        assert_eq!(s.backup_retain, 20);
    }

    #[test]
    fn journal_defaults() {
        let j = JournalSettings::default();
        assert_eq!(j.max_entries, 2000);
        assert_eq!(j.trim_interval_ms, 60_000);
        assert_eq!(j.default_poll_limit, 100);
    }

    #[test]
    fn serde_camel_case() {
        let s = BeaconSettings::default();
        let json = serde_json::to_value(&s).unwrap();
        assert!(json["server"].get("sseBuffer").is_some());
        assert!(json["storage"].get("dataDir").is_some());
        assert!(json["storage"].get("backupIntervalMs").is_some());
        assert!(json["journal"].get("maxEntries").is_some());
        assert!(json["auth"].get("apiKey").is_some());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = serde_json::json!({
            "server": {"port": 9000},
            "journal": {"maxEntries": 500}
        });
        let s: BeaconSettings = serde_json::from_value(json).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.journal.max_entries, 500);
        assert_eq!(s.journal.default_poll_limit, 100);
    }

    #[test]
    fn default_api_key_is_placeholder() {
        assert_eq!(AuthSettings::default().api_key, "CHANGE_ME");
    }
}
