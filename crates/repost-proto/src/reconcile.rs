//! Pure merge rules applied to every inbound update before it touches the
//! snapshot.  Nothing in here does I/O; every function takes the current
//! value and returns its replacement.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::protocol::{Config, LogEntry, Progress};

/// Most recent log entries kept in memory and in the cache.
pub const LOG_CAPACITY: usize = 100;

/// Bounded FIFO of log entries in arrival order, oldest evicted first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<LogEntry>", into = "Vec<LogEntry>")]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the last `LOG_CAPACITY` entries of `entries`, in order.
    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        let skip = entries.len().saturating_sub(LOG_CAPACITY);
        Self {
            entries: entries.into_iter().skip(skip).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &LogEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }
}

impl From<Vec<LogEntry>> for LogBuffer {
    fn from(entries: Vec<LogEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<LogBuffer> for Vec<LogEntry> {
    fn from(buf: LogBuffer) -> Self {
        buf.entries.into()
    }
}

/// Append then truncate to the cap.  No deduplication.
pub fn append_log(mut buffer: LogBuffer, entry: LogEntry) -> LogBuffer {
    buffer.entries.push_back(entry);
    while buffer.entries.len() > LOG_CAPACITY {
        buffer.entries.pop_front();
    }
    buffer
}

/// Last writer wins: the incoming snapshot replaces the current one wholesale.
pub fn merge_progress(_current: &Progress, incoming: &Progress) -> Progress {
    incoming.clone()
}

/// Lifetime counters mirrored from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub posts_ever: u64,
    pub failures_ever: u64,
}

impl Totals {
    /// Each counter is replaced when the event carries it and left alone
    /// when it does not.  Never resets on a partial event.
    pub fn merge(self, incoming: &Progress) -> Totals {
        Totals {
            posts_ever: incoming.total_posts_ever.unwrap_or(self.posts_ever),
            failures_ever: incoming.total_failures_ever.unwrap_or(self.failures_ever),
        }
    }
}

/// `Config.status` follows `Progress.status`; everything else is untouched.
pub fn mirror_status(config: &Config, progress: &Progress) -> Config {
    if config.status == progress.status {
        return config.clone();
    }
    config.with_status(progress.status)
}

/// Which source provided the initial log buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedSource {
    History,
    Cache,
    Empty,
}

/// Pick the initial log buffer.  Non-empty backend history wins; otherwise
/// the cached buffer.  The two are never interleaved.
pub fn resolve_log_seed(
    history: Option<Vec<LogEntry>>,
    cached: Option<LogBuffer>,
) -> (LogBuffer, SeedSource) {
    match (history, cached) {
        (Some(h), _) if !h.is_empty() => (LogBuffer::from_entries(h), SeedSource::History),
        (_, Some(c)) if !c.is_empty() => (c, SeedSource::Cache),
        _ => (LogBuffer::new(), SeedSource::Empty),
    }
}
