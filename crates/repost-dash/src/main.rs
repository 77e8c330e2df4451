use anyhow::Context;

use repost_dash::{api::ApiClient, app::App, store::SnapshotStore};
use repost_proto::cache::{FileStore, PersistentCache};
use repost_proto::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = repost_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let log_path = data_dir.join("dash.log");
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    // Allow RUST_LOG override; default to debug for app code but suppress noisy
    // connection-level DEBUG from HTTP client internals (hyper_util, reqwest).
    let log_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "debug,hyper_util=warn,reqwest=warn,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(log_filter.as_str())
        .with_ansi(false)
        .init();

    // The terminal belongs to the UI; print the log path so it can be tailed.
    eprintln!("repost-dash log: {}", log_path.display());
    tracing::info!("repost-dash starting…");

    // ── Load settings ────────────────────────────────────────────────────────
    let settings = Settings::load().unwrap_or_else(|e| {
        tracing::warn!("settings unreadable ({:#}); using defaults", e);
        let mut settings = Settings::default();
        settings.apply_env_overrides();
        settings
    });
    tracing::info!(
        "settings: api={} cache={} backups={}",
        settings.api_base(),
        settings.paths.cache_dir.display(),
        settings.paths.backup_dir.display()
    );

    // ── Snapshot store seeded from the cache ─────────────────────────────────
    let cache = PersistentCache::new(FileStore::new(settings.paths.cache_dir.clone()));
    let store = SnapshotStore::from_cache(cache);

    let api = ApiClient::new(settings.api_base()).context("building HTTP client")?;

    // ── Run TUI ──────────────────────────────────────────────────────────────
    App::new(settings, api, store).run().await?;

    tracing::info!("repost-dash exited");
    Ok(())
}
