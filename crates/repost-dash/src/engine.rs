//! Sync engine: applies background results to the snapshot store.
//!
//! Background tasks (event stream, pollers, initial load, operator jobs) never
//! touch the store.  They send a [`SyncMessage`] to the event loop, which
//! calls [`SyncEngine::apply`].  [`SyncTasks`] owns those tasks and tears all
//! of them down when dropped.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use repost_proto::config::SyncSettings;
use repost_proto::protocol::{
    ChannelStats, ChannelStatsSummary, Config, LogEntry, LogLevel, Progress, StreamEvent,
};
use repost_proto::reconcile::{resolve_log_seed, SeedSource};

use crate::api::{with_deadline, ApiClient};
use crate::control::{self, Command, ControlOutcome, Job};
use crate::poller::{PollKind, Poller, StatsPoll, StatusPoll};
use crate::store::{PollGate, Snapshot, SnapshotStore};
use crate::stream::StreamManager;

// ── Messages ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SyncMessage {
    /// The event stream connected.
    StreamOpened,
    /// The event stream dropped; a reconnect is already scheduled.
    StreamLost(String),
    /// A classified stream payload.
    Stream(StreamEvent),
    /// A status snapshot from one of the pollers.
    Polled(PollKind, Progress),
    Stats {
        summary: ChannelStatsSummary,
        channels: Vec<ChannelStats>,
    },
    Loaded(InitialLoad),
    /// The loading deadline elapsed.
    LoadDeadline,
    Control(ControlOutcome),
}

/// Result of the startup fetch sequence.  `config: None` means the config
/// request failed and nothing after it was attempted.
#[derive(Debug, Clone, Default)]
pub struct InitialLoad {
    pub config: Option<Config>,
    pub status: Option<Progress>,
    pub history: Option<Vec<LogEntry>>,
}

/// Something the operator should see (rendered as a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: LogLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Info,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Success,
            text: text.into(),
        }
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Warning,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: LogLevel::Error,
            text: text.into(),
        }
    }
}

// ── Initial load ──────────────────────────────────────────────────────────────

/// Config (with its deadline), then status, then history.  Failures are
/// logged; they never abort the dashboard.
pub async fn load_initial(api: &ApiClient, sync: &SyncSettings) -> InitialLoad {
    let config = match with_deadline(sync.config_timeout(), api.get_config()).await {
        Ok(config) => config,
        Err(e) => {
            warn!("initial load: config fetch failed: {}", e);
            return InitialLoad::default();
        }
    };

    let status = with_deadline(sync.status_timeout(), api.get_status())
        .await
        .map_err(|e| warn!("initial load: status fetch failed: {}", e))
        .ok();

    let history = match with_deadline(sync.config_timeout(), api.log_history()).await {
        Ok(history) => history,
        Err(e) => {
            warn!("initial load: history fetch failed: {}", e);
            Vec::new()
        }
    };

    InitialLoad {
        config: Some(config),
        status,
        history: Some(history),
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct SyncEngine {
    store: SnapshotStore,
    gate_tx: watch::Sender<PollGate>,
}

impl SyncEngine {
    pub fn new(store: SnapshotStore) -> (Self, watch::Receiver<PollGate>) {
        let (gate_tx, gate_rx) = watch::channel(store.gate());
        (Self { store, gate_tx }, gate_rx)
    }

    pub fn snapshot(&self) -> &Snapshot {
        self.store.snapshot()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Apply one background result.  Returns a notice when the operator
    /// should hear about it; background sync failures never produce one.
    pub fn apply(&mut self, msg: SyncMessage) -> Option<Notice> {
        let notice = match msg {
            SyncMessage::StreamOpened => {
                info!("event stream connected");
                self.store.set_stream_connected(true);
                None
            }
            SyncMessage::StreamLost(reason) => {
                debug!("event stream lost: {}", reason);
                self.store.set_stream_connected(false);
                None
            }
            SyncMessage::Stream(StreamEvent::Log(entry)) => {
                self.store.append_log(entry);
                None
            }
            SyncMessage::Stream(StreamEvent::Progress(progress)) => {
                self.store.apply_progress(&progress);
                None
            }
            SyncMessage::Polled(kind, progress) => {
                debug!("{} poll: {:?} {}/{}", kind.name(), progress.status, progress.current, progress.total);
                self.store.apply_progress(&progress);
                None
            }
            SyncMessage::Stats { summary, channels } => {
                self.store.set_stats(summary, channels);
                None
            }
            SyncMessage::Loaded(load) => {
                self.apply_initial_load(load);
                None
            }
            SyncMessage::LoadDeadline => {
                if self.store.is_loading() {
                    warn!("initial load still pending at deadline; unblocking pollers");
                    self.store.set_loading(false);
                }
                None
            }
            SyncMessage::Control(outcome) => Some(control::apply_outcome(&mut self.store, outcome)),
        };
        self.publish_gate();
        notice
    }

    /// Validate an operator command against the current snapshot.  A
    /// rejected command yields the notice to show and nothing is sent.
    pub fn prepare(&mut self, command: Command) -> Result<Job, Notice> {
        control::prepare(&mut self.store, command)
    }

    fn apply_initial_load(&mut self, load: InitialLoad) {
        let Some(config) = load.config else {
            info!("initial load: using default config");
            self.store.set_config(Config::default());
            self.store.set_loading(false);
            return;
        };
        self.store.set_config(config);

        if let Some(status) = load.status {
            self.store.apply_progress(&status);
        }

        // The cached seed is whatever the buffer holds now (cache plus any
        // stream lines that beat the load).  Non-empty history replaces it.
        let current = self.store.snapshot().logs.clone();
        let (logs, source) = resolve_log_seed(load.history, Some(current));
        match source {
            SeedSource::History => {
                info!("log seed: {} entries from history", logs.len());
                self.store.replace_logs(logs);
            }
            SeedSource::Cache => info!("log seed: kept {} cached entries", logs.len()),
            SeedSource::Empty => debug!("log seed: nothing to show"),
        }

        self.store.set_loading(false);
    }

    fn publish_gate(&self) {
        let gate = self.store.gate();
        self.gate_tx.send_if_modified(|current| {
            if *current == gate {
                false
            } else {
                *current = gate;
                true
            }
        });
    }
}

// ── Task ownership ────────────────────────────────────────────────────────────

/// Owns every background sync task.  Dropping it cancels pending timers and
/// closes the live connection; nothing spawned here outlives it.
pub struct SyncTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl SyncTasks {
    pub fn spawn(
        api: ApiClient,
        sync: &SyncSettings,
        gate: watch::Receiver<PollGate>,
        tx: mpsc::Sender<SyncMessage>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        // Initial load
        {
            let api = api.clone();
            let sync = sync.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    load = load_initial(&api, &sync) => {
                        let _ = tx.send(SyncMessage::Loaded(load)).await;
                    }
                }
            }));
        }

        // Loading deadline
        {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let deadline = sync.load_deadline();
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        let _ = tx.send(SyncMessage::LoadDeadline).await;
                    }
                }
            }));
        }

        // Event stream
        let stream = StreamManager::new(api.clone(), sync.reconnect_delay(), tx.clone());
        handles.push(tokio::spawn(stream.run(cancel.clone())));

        // Pollers
        let fast = Poller::new(PollKind::Fast, sync.fast_poll(), sync.status_timeout(), StatusPoll(api.clone()));
        handles.push(tokio::spawn(fast.run(gate.clone(), tx.clone(), cancel.clone())));

        let background = Poller::new(
            PollKind::Background,
            sync.background_poll(),
            sync.status_timeout(),
            StatusPoll(api.clone()),
        );
        handles.push(tokio::spawn(background.run(gate.clone(), tx.clone(), cancel.clone())));

        let stats = Poller::new(PollKind::Stats, sync.stats_poll(), sync.status_timeout(), StatsPoll(api));
        handles.push(tokio::spawn(stats.run(gate, tx, cancel.clone())));

        Self { cancel, handles }
    }

    /// Child token for operator jobs so they are cancelled with the rest.
    pub fn job_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for SyncTasks {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

/// Run an operator job off the event loop and report its outcome.
pub fn spawn_job(
    api: ApiClient,
    job: Job,
    backup_dir: std::path::PathBuf,
    sync: SyncSettings,
    tx: mpsc::Sender<SyncMessage>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            outcome = control::execute(&api, job, &backup_dir, &sync) => {
                let _ = tx.send(SyncMessage::Control(outcome)).await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use repost_proto::cache::{MemoryStore, PersistentCache};
    use repost_proto::protocol::{ChannelRef, LogLevel, Status, DEFAULT_DELAY_SECS};
    use repost_proto::reconcile::{append_log, LogBuffer};
    use std::time::Duration;
    use tokio::time::Instant;

    fn entry(msg: &str) -> LogEntry {
        LogEntry {
            timestamp: "2026-03-01T12:00:00".into(),
            message: msg.into(),
            level: LogLevel::Info,
        }
    }

    fn engine_with_cached_logs(msgs: &[&str]) -> (SyncEngine, watch::Receiver<PollGate>) {
        let mem = MemoryStore::new();
        let mut logs = LogBuffer::new();
        for m in msgs {
            logs = append_log(logs, entry(m));
        }
        PersistentCache::new(mem.clone()).save_logs(&logs);
        SyncEngine::new(SnapshotStore::from_cache(PersistentCache::new(mem)))
    }

    fn configured() -> Config {
        Config {
            stock_channel: Some(ChannelRef::new("@stock", "Stock")),
            destination_channels: vec![ChannelRef::new("@a", "A")],
            ..Config::default()
        }
    }

    #[test]
    fn empty_history_keeps_the_cached_buffer() {
        let (mut engine, _gate) = engine_with_cached_logs(&["one", "two", "three"]);
        engine.apply(SyncMessage::Loaded(InitialLoad {
            config: Some(configured()),
            status: None,
            history: Some(vec![]),
        }));
        let msgs: Vec<_> = engine.snapshot().logs.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["one", "two", "three"]);
        assert!(!engine.snapshot().loading);
    }

    #[test]
    fn non_empty_history_replaces_the_cache() {
        let (mut engine, _gate) = engine_with_cached_logs(&["cached"]);
        engine.apply(SyncMessage::Loaded(InitialLoad {
            config: Some(configured()),
            status: None,
            history: Some(vec![entry("h1"), entry("h2")]),
        }));
        let msgs: Vec<_> = engine.snapshot().logs.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(msgs, vec!["h1", "h2"]);
    }

    #[test]
    fn failed_config_installs_defaults() {
        let (mut engine, _gate) = engine_with_cached_logs(&["kept"]);
        engine.apply(SyncMessage::Loaded(InitialLoad::default()));
        let snap = engine.snapshot();
        assert_eq!(snap.config.post_config.delay_min, DEFAULT_DELAY_SECS);
        assert_eq!(snap.config.post_config.delay_max, DEFAULT_DELAY_SECS);
        assert!(snap.config.destination_channels.is_empty());
        assert_eq!(snap.logs.len(), 1);
        assert!(!snap.loading);
    }

    #[test]
    fn stream_then_poll_takes_poll_status_and_keeps_totals() {
        let (mut engine, _gate) = engine_with_cached_logs(&[]);
        engine.apply(SyncMessage::Stream(StreamEvent::Progress(Progress {
            status: Status::Completed,
            total_posts_ever: Some(42),
            ..Progress::default()
        })));
        engine.apply(SyncMessage::Polled(
            PollKind::Fast,
            Progress {
                status: Status::Running,
                current: 3,
                total: 10,
                ..Progress::default()
            },
        ));
        let snap = engine.snapshot();
        assert_eq!(snap.progress.status, Status::Running);
        assert_eq!(snap.config.status, Status::Running);
        assert_eq!(snap.totals.posts_ever, 42);
    }

    #[test]
    fn gate_follows_loading_and_status() {
        let (mut engine, gate) = engine_with_cached_logs(&[]);
        assert_eq!(*gate.borrow(), PollGate { loaded: false, running: false });

        engine.apply(SyncMessage::LoadDeadline);
        assert_eq!(*gate.borrow(), PollGate { loaded: true, running: false });

        engine.apply(SyncMessage::Stream(StreamEvent::Progress(Progress {
            status: Status::Running,
            ..Progress::default()
        })));
        assert!(gate.borrow().running);
    }

    #[test]
    fn late_load_after_deadline_is_still_applied() {
        let (mut engine, _gate) = engine_with_cached_logs(&[]);
        engine.apply(SyncMessage::LoadDeadline);
        engine.apply(SyncMessage::Loaded(InitialLoad {
            config: Some(configured()),
            status: Some(Progress {
                status: Status::Stopped,
                ..Progress::default()
            }),
            history: Some(vec![]),
        }));
        let snap = engine.snapshot();
        assert!(snap.config.can_start());
        assert_eq!(snap.config.status, Status::Stopped);
        assert!(snap.selection.is_selected("@a"));
    }

    #[test]
    fn stream_connection_flag_tracks_open_and_loss() {
        let (mut engine, _gate) = engine_with_cached_logs(&[]);
        assert!(engine.apply(SyncMessage::StreamOpened).is_none());
        assert!(engine.snapshot().stream_connected);
        assert!(engine.apply(SyncMessage::StreamLost("eof".into())).is_none());
        assert!(!engine.snapshot().stream_connected);
    }

    // ── Timers against a backend that never answers ──────────────────────────

    /// Bound but never accepting: every request hangs until a deadline.
    async fn silent_backend() -> (tokio::net::TcpListener, ApiClient) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api = ApiClient::new(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        (listener, api)
    }

    #[tokio::test(start_paused = true)]
    async fn hung_config_fetch_gives_up_at_the_config_deadline() {
        let (_listener, api) = silent_backend().await;
        let started = Instant::now();
        let load = load_initial(&api, &SyncSettings::default()).await;
        let waited = started.elapsed();

        assert!(load.config.is_none());
        assert!(load.status.is_none());
        assert!(load.history.is_none());
        assert!(
            waited >= Duration::from_secs(8) && waited < Duration::from_secs(9),
            "gave up after {:?}",
            waited
        );
    }

    #[tokio::test(start_paused = true)]
    async fn load_deadline_fires_while_the_load_hangs() {
        let (_listener, api) = silent_backend().await;
        let sync = SyncSettings {
            config_timeout_secs: 60,
            ..SyncSettings::default()
        };
        let (_gate_tx, gate_rx) = watch::channel(PollGate::default());
        let (tx, mut rx) = mpsc::channel(16);
        let started = Instant::now();
        let _tasks = SyncTasks::spawn(api, &sync, gate_rx, tx);

        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, SyncMessage::LoadDeadline), "got {:?}", msg);
        assert_eq!(started.elapsed().as_secs(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_tasks_stops_every_background_sender() {
        let (_listener, api) = silent_backend().await;
        let (_gate_tx, gate_rx) = watch::channel(PollGate {
            loaded: true,
            running: true,
        });
        let (tx, mut rx) = mpsc::channel(64);
        let tasks = SyncTasks::spawn(api, &SyncSettings::default(), gate_rx, tx);

        // Pollers keep timing out, the load gives up at 8s, the deadline fires at 10s.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!tasks.is_cancelled());
        drop(tasks);

        // Every task held a sender; the channel closes only once all are gone.
        let delivered = tokio::time::timeout(Duration::from_secs(60), async {
            let mut n = 0;
            while rx.recv().await.is_some() {
                n += 1;
            }
            n
        })
        .await
        .expect("a background task outlived SyncTasks");
        assert_eq!(delivered, 2);
    }
}
