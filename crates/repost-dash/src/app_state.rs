//! AppState: shared read-only data passed to all components during render/event.
//!
//! Components read this for the synced snapshot, but never mutate it.
//! The App event-loop is the only thing that writes to AppState, and it
//! refreshes `snap` from the sync engine after every applied message.

use repost_proto::protocol::ChannelStats;

use crate::store::Snapshot;
use crate::widgets::status_bar::InputMode;

#[derive(Debug, Clone)]
pub struct AppState {
    pub snap: Snapshot,
    pub input_mode: InputMode,
    pub api_url: String,
}

impl AppState {
    pub fn new(snap: Snapshot, api_url: impl Into<String>) -> Self {
        Self {
            snap,
            input_mode: InputMode::Normal,
            api_url: api_url.into(),
        }
    }

    /// Latest statistics for a destination, if the stats poller has seen it.
    pub fn stats_for(&self, channel_id: &str) -> Option<&ChannelStats> {
        self.snap
            .channel_stats
            .iter()
            .find(|s| s.channel_id == channel_id)
    }

    /// (selected, listed) destination counts.
    pub fn destination_counts(&self) -> (usize, usize) {
        let selection = &self.snap.selection;
        (selection.selected_ids().len(), selection.channels().len())
    }
}
