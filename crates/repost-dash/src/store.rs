//! Snapshot store: the single in-memory source of truth the dashboard renders.
//!
//! Owned by the event loop; nothing else mutates it.  Every mutation replaces
//! a whole value (never an in-place field edit) and every Progress or log
//! mutation is written through to the persistent cache.

use repost_proto::cache::PersistentCache;
use repost_proto::protocol::{
    ChannelRef, ChannelStats, ChannelStatsSummary, Config, LogEntry, Progress, Status,
};
use repost_proto::reconcile::{self, LogBuffer, Totals};
use repost_proto::selection::{ChannelSelection, SelectionError};

/// What the poll schedulers need to know to decide whether a tick fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollGate {
    pub loaded: bool,
    pub running: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub config: Config,
    pub progress: Progress,
    pub totals: Totals,
    pub logs: LogBuffer,
    pub loading: bool,
    pub stream_connected: bool,
    pub stats_summary: Option<ChannelStatsSummary>,
    pub channel_stats: Vec<ChannelStats>,
    pub selection: ChannelSelection,
    /// A destination list write is on its way to the backend.
    pub destinations_pending: bool,
}

pub struct SnapshotStore {
    snap: Snapshot,
    cache: PersistentCache,
}

impl SnapshotStore {
    /// Build the store from whatever the cache holds.  This is the only
    /// time the cache is read.
    pub fn from_cache(cache: PersistentCache) -> Self {
        let progress = cache.load_progress().unwrap_or_default();
        let logs = cache.load_logs().unwrap_or_default();
        let totals = Totals::default().merge(&progress);
        let snap = Snapshot {
            config: Config::default(),
            progress,
            totals,
            logs,
            loading: true,
            ..Snapshot::default()
        };
        Self { snap, cache }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snap
    }

    pub fn config(&self) -> &Config {
        &self.snap.config
    }

    pub fn progress(&self) -> &Progress {
        &self.snap.progress
    }

    pub fn selection(&self) -> &ChannelSelection {
        &self.snap.selection
    }

    pub fn is_loading(&self) -> bool {
        self.snap.loading
    }

    pub fn gate(&self) -> PollGate {
        PollGate {
            loaded: !self.snap.loading,
            running: self.snap.progress.status == Status::Running,
        }
    }

    // ── Progress / totals / status ───────────────────────────────────────────

    /// Apply a full Progress snapshot from the stream or a poll.
    pub fn apply_progress(&mut self, incoming: &Progress) {
        let progress = reconcile::merge_progress(&self.snap.progress, incoming);
        self.snap.totals = self.snap.totals.merge(incoming);
        self.snap.config = reconcile::mirror_status(&self.snap.config, &progress);
        self.snap.progress = progress;
        self.cache.save_progress(&self.snap.progress);
    }

    /// Force the run status locally (after a successful start/stop).
    pub fn set_status(&mut self, status: Status) {
        let progress = self.snap.progress.with_status(status);
        self.apply_progress(&progress);
    }

    // ── Logs ─────────────────────────────────────────────────────────────────

    pub fn append_log(&mut self, entry: LogEntry) {
        let logs = std::mem::take(&mut self.snap.logs);
        self.snap.logs = reconcile::append_log(logs, entry);
        self.cache.save_logs(&self.snap.logs);
    }

    pub fn replace_logs(&mut self, logs: LogBuffer) {
        self.snap.logs = logs;
        self.cache.save_logs(&self.snap.logs);
    }

    // ── Config / selection ───────────────────────────────────────────────────

    /// Replace the working Config and reconcile the selection against its
    /// destination list.  The run status always follows Progress.
    pub fn set_config(&mut self, config: Config) {
        let config = reconcile::mirror_status(&config, &self.snap.progress);
        self.snap.selection.reconcile(&config.destination_channels);
        self.snap.config = config;
    }

    /// Install the list the backend stored.  The selection is rebuilt from it
    /// exactly and the pending write is settled.
    pub fn set_destinations(&mut self, channels: Vec<ChannelRef>) {
        let config = Config {
            destination_channels: channels,
            ..self.snap.config.clone()
        };
        self.snap.selection = ChannelSelection::from_channels(&config.destination_channels);
        self.snap.config = reconcile::mirror_status(&config, &self.snap.progress);
        self.snap.destinations_pending = false;
    }

    pub fn destinations_pending(&self) -> bool {
        self.snap.destinations_pending
    }

    pub fn begin_destination_write(&mut self) {
        self.snap.destinations_pending = true;
    }

    pub fn toggle_selection(&mut self, channel_id: &str) -> Result<Vec<ChannelRef>, SelectionError> {
        self.snap.selection.toggle(channel_id)
    }

    /// Rebuild the selection from the Config list (after a failed write).
    pub fn restore_selection(&mut self) {
        self.snap.selection = ChannelSelection::from_channels(&self.snap.config.destination_channels);
        self.snap.destinations_pending = false;
    }

    // ── Flags / stats ────────────────────────────────────────────────────────

    pub fn set_loading(&mut self, loading: bool) {
        self.snap.loading = loading;
    }

    pub fn set_stream_connected(&mut self, connected: bool) {
        self.snap.stream_connected = connected;
    }

    pub fn set_stats(&mut self, summary: ChannelStatsSummary, channels: Vec<ChannelStats>) {
        self.snap.stats_summary = Some(summary);
        self.snap.channel_stats = channels;
    }
}
