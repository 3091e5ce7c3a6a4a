//! Scheduled maintenance: journal trim, flushes, and backup rotation.
//!
//! Each job is an owned tokio task watching the shared cancellation token,
//! so the lifecycle is explicit and tests can stop everything without
//! leaked timers. The flush jobs and the encrypted flush jobs are
//! independent — an unavailable envelope never affects the plaintext path.
//!
//! All disk failures land here as logged warnings; request handlers never
//! see them.

use std::sync::Arc;
use std::time::Duration;

use beacon_store::{Persister, SyncStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Intervals for the maintenance jobs.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceConfig {
    /// Journal trim cadence.
    pub trim_interval: Duration,
    /// Plaintext flush cadence.
    pub flush_interval: Duration,
    /// Encrypted flush cadence.
    pub encrypted_flush_interval: Duration,
    /// Backup rotation cadence (first run fires immediately — the boot
    /// backup).
    pub backup_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            trim_interval: Duration::from_secs(60),
            flush_interval: Duration::from_secs(300),
            encrypted_flush_interval: Duration::from_secs(300),
            backup_interval: Duration::from_secs(6 * 60 * 60),
        }
    }
}

/// Spawn the four maintenance jobs. Returns their handles for draining.
pub fn spawn_maintenance(
    store: Arc<SyncStore>,
    persister: Arc<Persister>,
    config: MaintenanceConfig,
    token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_trim(store.clone(), config.trim_interval, token.clone()),
        spawn_flush(
            store.clone(),
            persister.clone(),
            config.flush_interval,
            token.clone(),
        ),
        spawn_encrypted_flush(
            store.clone(),
            persister.clone(),
            config.encrypted_flush_interval,
            token.clone(),
        ),
        spawn_backups(persister, config.backup_interval, token),
    ]
}

/// Flush journal and state plaintext files, logging failures.
pub fn flush_plaintext(store: &SyncStore, persister: &Persister) {
    if let Err(error) = persister.flush_journal(&store.journal_file()) {
        warn!(%error, "journal flush failed");
    }
    if let Some(doc) = store.state_doc() {
        if let Err(error) = persister.flush_state(&doc) {
            warn!(%error, "state flush failed");
        }
    }
}

/// Flush the encrypted siblings, logging failures. A disabled envelope is
/// a quiet no-op.
pub fn flush_encrypted(store: &SyncStore, persister: &Persister) {
    if let Err(error) = persister.flush_encrypted_journal(&store.journal_file()) {
        warn!(%error, "encrypted journal flush failed");
    }
    if let Some(doc) = store.state_doc() {
        if let Err(error) = persister.flush_encrypted_state(&doc) {
            warn!(%error, "encrypted state flush failed");
        }
    }
}

fn spawn_trim(
    store: Arc<SyncStore>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let discarded = store.trim();
                    if discarded > 0 {
                        info!(discarded, "trimmed old journal entries");
                    }
                }
                () = token.cancelled() => break,
            }
        }
    })
}

fn spawn_flush(
    store: Arc<SyncStore>,
    persister: Arc<Persister>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    flush_plaintext(&store, &persister);
                    debug!("plaintext flush pass complete");
                }
                () = token.cancelled() => break,
            }
        }
    })
}

fn spawn_encrypted_flush(
    store: Arc<SyncStore>,
    persister: Arc<Persister>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    flush_encrypted(&store, &persister);
                }
                () = token.cancelled() => break,
            }
        }
    })
}

fn spawn_backups(
    persister: Arc<Persister>,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match persister.rotate_backups() {
                        Ok(written) if !written.is_empty() => {
                            info!(?written, "backup rotation complete");
                        }
                        Ok(_) => {}
                        Err(error) => warn!(%error, "backup rotation failed"),
                    }
                }
                () = token.cancelled() => break,
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::update::UpdatePayload;
    use beacon_store::crypto::Envelope;
    use beacon_store::{StorePaths, UpdateJournal};
    use serde_json::json;

    fn setup(dir: &std::path::Path) -> (Arc<SyncStore>, Arc<Persister>) {
        let store = Arc::new(SyncStore::new(UpdateJournal::new(5, 100)));
        let persister = Arc::new(Persister::new(
            StorePaths::new(dir),
            Some(Envelope::new([1u8; 32])),
            20,
        ));
        persister.ensure_dirs().unwrap();
        (store, persister)
    }

    fn payloads(n: usize) -> Vec<UpdatePayload> {
        (0..n)
            .map(|i| UpdatePayload::new("log", "add", json!({"id": format!("l{i}")})))
            .collect()
    }

    #[tokio::test]
    async fn trim_task_enforces_cap() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _persister) = setup(dir.path());
        let _ = store.push_batch(payloads(12)).unwrap();

        let token = CancellationToken::new();
        let handle = spawn_trim(store.clone(), Duration::from_millis(10), token.clone());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.update_count(), 5);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn flush_task_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let (store, persister) = setup(dir.path());
        let _ = store.push_batch(payloads(3)).unwrap();
        let _ = store.replace_state(json!({"tasks": []}));

        let token = CancellationToken::new();
        let handle = spawn_flush(
            store.clone(),
            persister.clone(),
            Duration::from_millis(10),
            token.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(persister.paths().journal_file().exists());
        assert!(persister.paths().state_file().exists());
        assert_eq!(persister.load_journal().updates.len(), 3);
    }

    #[tokio::test]
    async fn encrypted_flush_task_writes_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let (store, persister) = setup(dir.path());
        let _ = store.push_batch(payloads(1)).unwrap();
        let _ = store.replace_state(json!({"notes": []}));

        let token = CancellationToken::new();
        let handle = spawn_encrypted_flush(
            store.clone(),
            persister.clone(),
            Duration::from_millis(10),
            token.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        assert!(persister.paths().encrypted_journal_file().exists());
        assert!(persister.paths().encrypted_state_file().exists());
    }

    #[tokio::test]
    async fn backup_task_runs_at_boot() {
        let dir = tempfile::tempdir().unwrap();
        let (store, persister) = setup(dir.path());
        flush_plaintext(&store, &persister);

        let token = CancellationToken::new();
        // Long interval: only the immediate first tick fires.
        let handle = spawn_backups(persister.clone(), Duration::from_secs(3600), token.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        handle.await.unwrap();

        let backups = std::fs::read_dir(persister.paths().backup_dir())
            .unwrap()
            .count();
        assert!(backups >= 1);
    }

    #[tokio::test]
    async fn spawn_maintenance_returns_four_cancellable_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let (store, persister) = setup(dir.path());
        let token = CancellationToken::new();
        let handles = spawn_maintenance(
            store,
            persister,
            MaintenanceConfig::default(),
            token.clone(),
        );
        assert_eq!(handles.len(), 4);
        token.cancel();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("task did not stop")
                .unwrap();
        }
    }

    #[test]
    fn default_intervals_match_service_contract() {
        let cfg = MaintenanceConfig::default();
        assert_eq!(cfg.trim_interval, Duration::from_secs(60));
        assert_eq!(cfg.flush_interval, Duration::from_secs(300));
        assert_eq!(cfg.encrypted_flush_interval, Duration::from_secs(300));
        assert_eq!(cfg.backup_interval, Duration::from_secs(21_600));
    }
}
