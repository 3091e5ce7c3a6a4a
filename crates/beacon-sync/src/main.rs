//! # beacon-sync
//!
//! Beacon sync server binary — wires the store, durability layer, and HTTP
//! surface together and runs until SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beacon_server::maintenance::{self, MaintenanceConfig};
use beacon_server::{ServerConfig, SyncServer, shutdown};
use beacon_settings::BeaconSettings;
use beacon_store::crypto::Envelope;
use beacon_store::{Persister, StorePaths, SyncStore, UpdateJournal};
use clap::Parser;
use tracing::{info, warn};

/// Beacon sync server.
#[derive(Parser, Debug)]
#[command(name = "beacon-sync", about = "Beacon sync server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Data directory for journal, state, key, and backups.
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

/// Expand a leading `~` to `$HOME`.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}

fn server_config(settings: &BeaconSettings, args: &Cli) -> ServerConfig {
    ServerConfig {
        host: args
            .host
            .clone()
            .unwrap_or_else(|| settings.server.host.clone()),
        port: args.port.unwrap_or(settings.server.port),
        api_key: settings.auth.api_key.clone(),
        sse_buffer: settings.server.sse_buffer,
        keep_alive_interval_ms: settings.server.keep_alive_interval_ms,
        max_body_bytes: settings.server.max_body_bytes,
    }
}

fn maintenance_config(settings: &BeaconSettings) -> MaintenanceConfig {
    MaintenanceConfig {
        trim_interval: Duration::from_millis(settings.journal.trim_interval_ms),
        flush_interval: Duration::from_millis(settings.storage.flush_interval_ms),
        encrypted_flush_interval: Duration::from_millis(
            settings.storage.encrypted_flush_interval_ms,
        ),
        backup_interval: Duration::from_millis(settings.storage.backup_interval_ms),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Cli::parse();
    let settings = beacon_settings::load_settings().unwrap_or_else(|error| {
        warn!(%error, "settings load failed, using defaults");
        BeaconSettings::default()
    });
    if settings.auth.api_key == "CHANGE_ME" {
        warn!("using the default API key — set BEACON_API_KEY");
    }

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| expand_home(&settings.storage.data_dir));
    let paths = StorePaths::new(&data_dir);

    // Key setup failure disables the encrypted path for the process
    // lifetime; plaintext persistence keeps working.
    let envelope = match Envelope::from_key_file(&paths.key_file()) {
        Ok(envelope) => Some(envelope),
        Err(error) => {
            warn!(%error, "encryption key setup failed, encrypted snapshots disabled");
            None
        }
    };
    let encryption_on = envelope.is_some();

    let persister = Arc::new(Persister::new(
        paths,
        envelope,
        settings.storage.backup_retain,
    ));
    if let Err(error) = persister.ensure_dirs() {
        warn!(%error, "could not create data directories, persistence degraded");
    }

    // Boot loads are best-effort: a corrupt file starts fresh rather than
    // failing startup.
    let journal_file = persister.load_journal();
    let state = persister.load_state();
    info!(
        updates = journal_file.updates.len(),
        has_state = state.is_some(),
        data_dir = %data_dir.display(),
        encryption = encryption_on,
        "loaded persisted data"
    );

    let store = Arc::new(SyncStore::from_parts(
        UpdateJournal::with_entries(
            journal_file.updates,
            settings.journal.max_entries,
            settings.journal.default_poll_limit,
        ),
        state,
        journal_file.snapshot,
    ));

    let config = server_config(&settings, &args);
    let server = SyncServer::new(config, store.clone());

    // Maintenance tasks share the server's shutdown token. The backup
    // task's immediate first tick doubles as the boot backup.
    let mut handles = maintenance::spawn_maintenance(
        store.clone(),
        persister.clone(),
        maintenance_config(&settings),
        server.shutdown().token(),
    );

    let (addr, serve_handle) = server.listen().await.context("failed to bind server")?;
    handles.push(serve_handle);
    info!("beacon sync server listening on http://{addr}");

    shutdown::wait_for_signal().await;
    info!("shutting down");

    // Final synchronous flush before the process exits.
    maintenance::flush_plaintext(&store, &persister);
    server.shutdown().drain(handles, None).await;

    info!("shutdown complete");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
