//! Operator actions.
//!
//! Each action goes through three steps:
//! 1. [`prepare`] validates the [`Command`] against the snapshot and builds a
//!    [`Job`], or rejects it locally with a warning.
//! 2. [`execute`] runs the job's requests off the event loop and produces a
//!    [`ControlOutcome`].
//! 3. [`apply_outcome`] folds the outcome back into the store and returns the
//!    notice for the operator.
//!
//! Failures here are user-triggered, so every one of them is surfaced.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use repost_proto::config::SyncSettings;
use repost_proto::protocol::{ChannelRef, ClearQueueResult, Config, PostConfig, Status};
use repost_proto::selection::SelectionError;

use crate::api::{with_deadline, ApiClient};
use crate::engine::Notice;
use crate::error::ApiError;
use crate::store::SnapshotStore;

/// What the operator asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start,
    Stop,
    PostNow,
    ClearQueue,
    Export,
    Import(PathBuf),
    Reload,
    SavePostConfig(PostConfig),
    SetStockChannel(ChannelRef),
    ToggleDestination(String),
    AddDestination(ChannelRef),
    RemoveDestination(String),
    RenameDestination { channel_id: String, channel: ChannelRef },
}

/// A validated command, ready to hit the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Start(Config),
    Stop,
    PostNow,
    ClearQueue,
    Export,
    Import(PathBuf),
    Reload,
    PostConfig(PostConfig),
    StockChannel(ChannelRef),
    Destinations(Vec<ChannelRef>),
}

impl Job {
    pub fn kind(&self) -> ControlKind {
        match self {
            Job::Start(_) => ControlKind::Start,
            Job::Stop => ControlKind::Stop,
            Job::PostNow => ControlKind::PostNow,
            Job::ClearQueue => ControlKind::ClearQueue,
            Job::Export => ControlKind::Export,
            Job::Import(_) => ControlKind::Import,
            Job::Reload => ControlKind::Reload,
            Job::PostConfig(_) => ControlKind::PostConfig,
            Job::StockChannel(_) => ControlKind::StockChannel,
            Job::Destinations(_) => ControlKind::Destinations,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Start,
    Stop,
    PostNow,
    ClearQueue,
    Export,
    Import,
    Reload,
    PostConfig,
    StockChannel,
    Destinations,
}

impl ControlKind {
    pub fn label(self) -> &'static str {
        match self {
            ControlKind::Start => "Start",
            ControlKind::Stop => "Stop",
            ControlKind::PostNow => "Post now",
            ControlKind::ClearQueue => "Clear queue",
            ControlKind::Export => "Export",
            ControlKind::Import => "Import",
            ControlKind::Reload => "Reload",
            ControlKind::PostConfig => "Save post settings",
            ControlKind::StockChannel => "Set stock channel",
            ControlKind::Destinations => "Save destinations",
        }
    }
}

#[derive(Debug)]
pub enum ControlOutcome {
    Started(String),
    Stopped(String),
    PostedNow(String),
    QueueCleared(ClearQueueResult),
    Exported(PathBuf),
    Imported {
        config: Config,
        export_date: Option<String>,
    },
    Reloaded(Config),
    PostConfigSaved(PostConfig),
    StockChannelSet(ChannelRef),
    DestinationsSaved(Vec<ChannelRef>),
    Failed {
        kind: ControlKind,
        error: ApiError,
    },
}

// ── Step 1: local validation ─────────────────────────────────────────────────

pub fn prepare(store: &mut SnapshotStore, command: Command) -> Result<Job, Notice> {
    match command {
        Command::Start => {
            if !store.config().can_start() {
                return Err(Notice::warning(
                    "Set a stock channel and at least one destination first",
                ));
            }
            match store.progress().status {
                Status::Running => Err(Notice::info("Already running")),
                Status::Completed => Err(Notice::warning("Run completed; reload to start over")),
                Status::Idle | Status::Stopped => Ok(Job::Start(store.config().clone())),
            }
        }
        Command::Stop => {
            if store.progress().status != Status::Running {
                return Err(Notice::info("Not running"));
            }
            Ok(Job::Stop)
        }
        Command::PostNow => {
            if store.progress().status != Status::Running {
                return Err(Notice::warning("Post now only works while running"));
            }
            Ok(Job::PostNow)
        }
        Command::ClearQueue => Ok(Job::ClearQueue),
        Command::Export => Ok(Job::Export),
        Command::Import(path) => {
            if path.as_os_str().is_empty() {
                return Err(Notice::warning("No backup file given"));
            }
            Ok(Job::Import(path))
        }
        Command::Reload => Ok(Job::Reload),
        Command::SavePostConfig(post_config) => store
            .config()
            .with_post_config(post_config)
            .map(|c| Job::PostConfig(c.post_config))
            .map_err(|e| Notice::warning(e.to_string())),
        Command::SetStockChannel(channel) => {
            if channel.channel_id.is_empty() {
                return Err(Notice::warning("Stock channel id is empty"));
            }
            Ok(Job::StockChannel(channel))
        }
        Command::ToggleDestination(channel_id) => {
            destination_job(store, |store| store.toggle_selection(&channel_id))
        }
        Command::AddDestination(channel) => {
            destination_job(store, |store| store.selection().with_added(channel))
        }
        Command::RemoveDestination(channel_id) => {
            destination_job(store, |store| store.selection().with_removed(&channel_id))
        }
        Command::RenameDestination {
            channel_id,
            channel,
        } => destination_job(store, |store| {
            store.selection().with_renamed(&channel_id, channel)
        }),
    }
}

/// Destination edits are serialised: while one write is in flight the next
/// edit is rejected.
fn destination_job(
    store: &mut SnapshotStore,
    edit: impl FnOnce(&mut SnapshotStore) -> Result<Vec<ChannelRef>, SelectionError>,
) -> Result<Job, Notice> {
    if store.destinations_pending() {
        return Err(Notice::warning("Destination list is still saving; try again"));
    }
    let channels = edit(store).map_err(|e| Notice::warning(e.to_string()))?;
    store.begin_destination_write();
    Ok(Job::Destinations(channels))
}

// ── Step 2: requests ─────────────────────────────────────────────────────────

pub async fn execute(
    api: &ApiClient,
    job: Job,
    backup_dir: &Path,
    sync: &SyncSettings,
) -> ControlOutcome {
    let kind = job.kind();
    info!("control: {}", kind.label());
    let result = match job {
        Job::Start(config) => start(api, &config).await,
        Job::Stop => api.stop().await.map(|ack| ControlOutcome::Stopped(ack.message)),
        Job::PostNow => api
            .post_now()
            .await
            .map(|ack| ControlOutcome::PostedNow(ack.message)),
        Job::ClearQueue => api.clear_queue().await.map(ControlOutcome::QueueCleared),
        Job::Export => export(api, backup_dir).await.map(ControlOutcome::Exported),
        Job::Import(path) => import(api, &path, sync).await,
        Job::Reload => with_deadline(sync.config_timeout(), api.get_config())
            .await
            .map(ControlOutcome::Reloaded),
        Job::PostConfig(post_config) => api
            .set_post_config(&post_config)
            .await
            .map(ControlOutcome::PostConfigSaved),
        Job::StockChannel(channel) => api
            .set_stock_channel(&channel)
            .await
            .map(ControlOutcome::StockChannelSet),
        Job::Destinations(channels) => api
            .set_destination_channels(&channels)
            .await
            .map(ControlOutcome::DestinationsSaved),
    };
    result.unwrap_or_else(|error| {
        warn!("control: {} failed: {}", kind.label(), error);
        ControlOutcome::Failed { kind, error }
    })
}

/// Persist the working config, then start the worker.
async fn start(api: &ApiClient, config: &Config) -> Result<ControlOutcome, ApiError> {
    api.save_config(config).await?;
    let ack = api.start().await?;
    Ok(ControlOutcome::Started(ack.message))
}

/// File name for a backup taken on `date`.
pub fn backup_file_name(date: chrono::NaiveDate) -> String {
    format!("repost-backup-{}.json", date.format("%Y-%m-%d"))
}

async fn export(api: &ApiClient, backup_dir: &Path) -> Result<PathBuf, ApiError> {
    let bytes = api.export_config().await?;
    tokio::fs::create_dir_all(backup_dir).await?;
    let path = backup_dir.join(backup_file_name(chrono::Local::now().date_naive()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

async fn import(api: &ApiClient, path: &Path, sync: &SyncSettings) -> Result<ControlOutcome, ApiError> {
    let contents = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup.json".to_string());
    let result = api.import_config(&file_name, contents).await?;

    // Prefer what the server now reports; the echoed config is the fallback.
    let config = match with_deadline(sync.config_timeout(), api.get_config()).await {
        Ok(config) => config,
        Err(e) => {
            warn!("control: re-fetch after import failed: {}", e);
            result.config
        }
    };
    Ok(ControlOutcome::Imported {
        config,
        export_date: result.export_date,
    })
}

// ── Step 3: fold back ────────────────────────────────────────────────────────

pub fn apply_outcome(store: &mut SnapshotStore, outcome: ControlOutcome) -> Notice {
    match outcome {
        ControlOutcome::Started(message) => {
            store.set_status(Status::Running);
            Notice::success(non_empty(message, "Posting started"))
        }
        ControlOutcome::Stopped(message) => {
            store.set_status(Status::Stopped);
            Notice::success(non_empty(message, "Posting stopped"))
        }
        ControlOutcome::PostedNow(message) => {
            Notice::success(non_empty(message, "Next post goes out now"))
        }
        ControlOutcome::QueueCleared(result) => Notice::success(format!(
            "{} ({} removed)",
            non_empty(result.message, "Queue cleared"),
            result.count
        )),
        ControlOutcome::Exported(path) => {
            Notice::success(format!("Backup saved to {}", path.display()))
        }
        ControlOutcome::Imported {
            config,
            export_date,
        } => {
            store.set_config(config);
            match export_date {
                Some(date) => Notice::success(format!("Backup imported (exported {})", date)),
                None => Notice::success("Backup imported"),
            }
        }
        ControlOutcome::Reloaded(config) => {
            store.set_config(config);
            Notice::info("Config reloaded")
        }
        ControlOutcome::PostConfigSaved(post_config) => {
            let config = Config {
                post_config,
                ..store.config().clone()
            };
            store.set_config(config);
            Notice::success("Post settings saved")
        }
        ControlOutcome::StockChannelSet(channel) => {
            let text = format!("Stock channel set to {}", channel.name);
            let config = Config {
                stock_channel: Some(channel),
                ..store.config().clone()
            };
            store.set_config(config);
            Notice::success(text)
        }
        ControlOutcome::DestinationsSaved(channels) => {
            let n = channels.len();
            store.set_destinations(channels);
            Notice::success(format!("{} destination channel(s) saved", n))
        }
        ControlOutcome::Failed { kind, error } => {
            if kind == ControlKind::Destinations {
                store.restore_selection();
            }
            Notice::error(format!("{} failed: {}", kind.label(), error.operator_text()))
        }
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repost_proto::cache::PersistentCache;
    use repost_proto::protocol::{LogLevel, Progress};

    fn store_with(config: Config) -> SnapshotStore {
        let mut store = SnapshotStore::from_cache(PersistentCache::in_memory());
        store.set_config(config);
        store
    }

    fn ready() -> Config {
        Config {
            stock_channel: Some(ChannelRef::new("@stock", "")),
            destination_channels: vec![ChannelRef::new("@a", "A"), ChannelRef::new("@b", "B")],
            ..Config::default()
        }
    }

    #[test]
    fn start_requires_stock_and_destination() {
        let mut store = store_with(Config::default());
        let notice = prepare(&mut store, Command::Start).unwrap_err();
        assert_eq!(notice.level, LogLevel::Warning);

        let mut store = store_with(ready());
        assert!(matches!(prepare(&mut store, Command::Start), Ok(Job::Start(_))));
    }

    #[test]
    fn invalid_delays_never_become_a_job() {
        let mut store = store_with(ready());
        let bad = PostConfig {
            delay_min: 10,
            delay_max: 5,
            ..PostConfig::default()
        };
        let before = store.config().post_config.clone();
        assert!(prepare(&mut store, Command::SavePostConfig(bad)).is_err());
        assert_eq!(store.config().post_config, before);
    }

    #[test]
    fn duplicate_destination_is_rejected_locally() {
        let mut store = store_with(ready());
        let err = prepare(
            &mut store,
            Command::AddDestination(ChannelRef::new("@a", "again")),
        )
        .unwrap_err();
        assert!(err.text.contains("@a"));
    }

    #[test]
    fn toggle_builds_the_outgoing_list() {
        let mut store = store_with(ready());
        let job = prepare(&mut store, Command::ToggleDestination("@a".into())).unwrap();
        assert_eq!(job, Job::Destinations(vec![ChannelRef::new("@b", "B")]));
    }

    #[test]
    fn failed_destination_write_restores_selection() {
        let mut store = store_with(ready());
        prepare(&mut store, Command::ToggleDestination("@a".into())).unwrap();
        assert!(!store.selection().is_selected("@a"));

        let notice = apply_outcome(
            &mut store,
            ControlOutcome::Failed {
                kind: ControlKind::Destinations,
                error: ApiError::Status {
                    status: 500,
                    detail: "boom".into(),
                },
            },
        );
        assert_eq!(notice.level, LogLevel::Error);
        assert!(notice.text.contains("boom"));
        assert!(store.selection().is_selected("@a"));
    }

    #[test]
    fn saved_destinations_replace_config_and_selection() {
        let mut store = store_with(ready());
        let out = vec![ChannelRef::new("@b", "B"), ChannelRef::new("@c", "C")];
        apply_outcome(&mut store, ControlOutcome::DestinationsSaved(out.clone()));
        assert_eq!(store.config().destination_channels, out);
        assert!(store.selection().is_selected("@c"));
        assert!(!store.selection().is_selected("@a"));
    }

    #[test]
    fn start_and_stop_move_status() {
        let mut store = store_with(ready());
        apply_outcome(&mut store, ControlOutcome::Started(String::new()));
        assert_eq!(store.progress().status, Status::Running);
        assert_eq!(store.config().status, Status::Running);
        assert!(matches!(prepare(&mut store, Command::PostNow), Ok(Job::PostNow)));

        apply_outcome(&mut store, ControlOutcome::Stopped("stopped".into()));
        assert_eq!(store.progress().status, Status::Stopped);
        assert!(prepare(&mut store, Command::PostNow).is_err());
    }

    #[test]
    fn import_notice_mentions_export_date() {
        let mut store = store_with(Config::default());
        let notice = apply_outcome(
            &mut store,
            ControlOutcome::Imported {
                config: ready(),
                export_date: Some("2026-02-03T10:00:00".into()),
            },
        );
        assert!(notice.text.contains("2026-02-03"));
        assert!(store.config().can_start());
    }

    #[test]
    fn backup_name_uses_the_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
        assert_eq!(backup_file_name(date), "repost-backup-2026-10-16.json");
    }

    #[test]
    fn stop_needs_a_running_worker() {
        let mut store = store_with(ready());
        store.apply_progress(&Progress::default());
        assert!(prepare(&mut store, Command::Stop).is_err());
    }

    #[test]
    fn second_destination_edit_waits_for_the_first_reply() {
        let mut store = store_with(Config {
            destination_channels: vec![
                ChannelRef::new("@a", "A"),
                ChannelRef::new("@b", "B"),
                ChannelRef::new("@c", "C"),
            ],
            ..ready()
        });
        let first = match prepare(&mut store, Command::ToggleDestination("@a".into())).unwrap() {
            Job::Destinations(channels) => channels,
            other => panic!("unexpected job: {:?}", other),
        };

        let notice = prepare(&mut store, Command::ToggleDestination("@b".into())).unwrap_err();
        assert_eq!(notice.level, LogLevel::Warning);
        assert!(store.selection().is_selected("@b"));

        apply_outcome(&mut store, ControlOutcome::DestinationsSaved(first));
        let listed: Vec<&str> = store
            .config()
            .destination_channels
            .iter()
            .map(|c| c.channel_id.as_str())
            .collect();
        assert_eq!(listed, vec!["@b", "@c"]);
        for id in &listed {
            assert!(store.selection().is_selected(id));
        }
        assert_eq!(store.selection().selected_ids().len(), listed.len());

        // Settled: the next edit goes through.
        assert!(prepare(&mut store, Command::ToggleDestination("@b".into())).is_ok());
    }

    #[test]
    fn failed_destination_write_unblocks_the_next_edit() {
        let mut store = store_with(ready());
        prepare(&mut store, Command::RemoveDestination("@a".into())).unwrap();
        apply_outcome(
            &mut store,
            ControlOutcome::Failed {
                kind: ControlKind::Destinations,
                error: ApiError::StreamEnded,
            },
        );
        assert!(!store.destinations_pending());
        assert!(prepare(&mut store, Command::AddDestination(ChannelRef::new("@n", ""))).is_ok());
    }

    #[test]
    fn reload_cannot_regress_a_running_status() {
        let mut store = store_with(ready());
        store.set_status(Status::Running);
        apply_outcome(
            &mut store,
            ControlOutcome::Reloaded(Config {
                status: Status::Idle,
                ..ready()
            }),
        );
        assert_eq!(store.config().status, Status::Running);
        assert_eq!(store.progress().status, Status::Running);
    }
}
