use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Seconds used for both delays when the backend has never been configured.
pub const DEFAULT_DELAY_SECS: u64 = 3600;

/// Run state of the repost worker.  Unknown strings from the backend read as
/// `Idle`, which is also what the dashboard shows before anything is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    #[default]
    Idle,
    Running,
    Stopped,
    Completed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Idle => "idle",
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Completed => "completed",
        }
    }

    /// Short label for the header badge.
    pub fn label(self) -> &'static str {
        match self {
            Status::Idle => "IDLE",
            Status::Running => "RUNNING",
            Status::Stopped => "STOPPED",
            Status::Completed => "DONE",
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        match s.as_str() {
            "running" => Status::Running,
            "stopped" => Status::Stopped,
            "completed" => Status::Completed,
            _ => Status::Idle,
        }
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        s.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub channel_id: String,
    pub name: String,
}

impl ChannelRef {
    /// Build a channel reference, falling back to the id when no name is given.
    pub fn new(channel_id: impl Into<String>, name: impl Into<String>) -> Self {
        let channel_id = channel_id.into().trim().to_string();
        let name = name.into().trim().to_string();
        let name = if name.is_empty() {
            channel_id.clone()
        } else {
            name
        };
        Self { channel_id, name }
    }
}

/// Rejected local edit.  Nothing is written when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("minimum delay must be at least 1s (got {0}s)")]
    DelayMinTooSmall(u64),
    #[error("minimum delay {min}s exceeds maximum delay {max}s")]
    DelayRange { min: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostConfig {
    #[serde(default)]
    pub template_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_url: Option<String>,
    #[serde(default = "default_delay")]
    pub delay_min: u64,
    #[serde(default = "default_delay")]
    pub delay_max: u64,
}

fn default_delay() -> u64 {
    DEFAULT_DELAY_SECS
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            template_text: String::new(),
            button_label: None,
            button_url: None,
            delay_min: DEFAULT_DELAY_SECS,
            delay_max: DEFAULT_DELAY_SECS,
        }
    }
}

impl PostConfig {
    pub fn validate(&self) -> Result<(), EditError> {
        if self.delay_min < 1 {
            return Err(EditError::DelayMinTooSmall(self.delay_min));
        }
        if self.delay_min > self.delay_max {
            return Err(EditError::DelayRange {
                min: self.delay_min,
                max: self.delay_max,
            });
        }
        Ok(())
    }

    /// Copy with both delays replaced, or the reason the pair is invalid.
    pub fn with_delays(&self, delay_min: u64, delay_max: u64) -> Result<Self, EditError> {
        let candidate = Self {
            delay_min,
            delay_max,
            ..self.clone()
        };
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn with_delay_min(&self, delay_min: u64) -> Result<Self, EditError> {
        self.with_delays(delay_min, self.delay_max)
    }

    pub fn with_delay_max(&self, delay_max: u64) -> Result<Self, EditError> {
        self.with_delays(self.delay_min, delay_max)
    }
}

/// The operator's editable document, owned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_channel: Option<ChannelRef>,
    #[serde(default)]
    pub destination_channels: Vec<ChannelRef>,
    #[serde(default)]
    pub post_config: PostConfig,
    #[serde(default)]
    pub status: Status,
}

impl Config {
    /// Posting needs a source and at least one destination.
    pub fn can_start(&self) -> bool {
        self.stock_channel.is_some() && !self.destination_channels.is_empty()
    }

    /// New config with `post_config` replaced, rejecting invalid candidates.
    pub fn with_post_config(&self, post_config: PostConfig) -> Result<Self, EditError> {
        post_config.validate()?;
        Ok(Self {
            post_config,
            ..self.clone()
        })
    }

    pub fn with_status(&self, status: Status) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Snapshot of the worker's run.  Both the stream and the status endpoint
/// deliver the whole thing; the lifetime totals are optional on every event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default, deserialize_with = "lenient_count")]
    pub current: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub total: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    pub remaining_time: u64,
    #[serde(default, deserialize_with = "nullable_status")]
    pub status: Status,
    #[serde(
        default,
        deserialize_with = "present_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_posts_ever: Option<u64>,
    #[serde(
        default,
        deserialize_with = "present_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub total_failures_ever: Option<u64>,
}

impl Progress {
    pub fn with_status(&self, status: Status) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Fraction done in 0.0..=1.0 (0 when the total is unknown).
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).clamp(0.0, 1.0)
        }
    }
}

/// Accepts integers, floats and null; negatives clamp to zero.
fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v: Option<f64> = Option::deserialize(d)?;
    Ok(v.map(|n| n.max(0.0) as u64).unwrap_or(0))
}

/// A null status reads as `Idle`.
fn nullable_status<'de, D: Deserializer<'de>>(d: D) -> Result<Status, D::Error> {
    let v: Option<String> = Option::deserialize(d)?;
    Ok(v.map(Status::from).unwrap_or_default())
}

/// Only called when the key is present, so absent stays `None` and a present
/// null reads as zero.
fn present_count<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    lenient_count(d).map(Some)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => LogLevel::Success,
            "warning" | "warn" => LogLevel::Warning,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl From<LogLevel> for String {
    fn from(l: LogLevel) -> Self {
        l.as_str().to_string()
    }
}

/// One line of the worker's activity log.  Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel_id: String,
    pub name: String,
    #[serde(default)]
    pub total_posts: u64,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub last_post_date: Option<String>,
    #[serde(default)]
    pub last_failure_date: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_unknown")]
    pub status: String,
}

fn default_true() -> bool {
    true
}

fn default_unknown() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelStatsSummary {
    #[serde(default)]
    pub total_channels: u64,
    #[serde(default)]
    pub active_channels: u64,
    #[serde(default)]
    pub inactive_channels: u64,
    #[serde(default)]
    pub channels_with_errors: u64,
    #[serde(default)]
    pub total_posts: u64,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub success_rate: f64,
}

/// Body of the control endpoints (`start`, `stop`, `post-now`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControlAck {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearQueueResult {
    pub message: String,
    #[serde(default)]
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub message: String,
    pub config: Config,
    #[serde(default)]
    pub export_date: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// FastAPI-style error body (`{"detail": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

// ── Push-stream payload classification ───────────────────────────────────────

/// A stream payload that was recognised.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Log(LogEntry),
    Progress(Progress),
}

/// Why a payload was dropped.  None of these tear down the connection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Discarded {
    #[error("empty payload")]
    Empty,
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("server error envelope: {0}")]
    ErrorEnvelope(String),
    #[error("unrecognised payload shape")]
    Unrecognised,
}

/// Shapes a stream payload can take.  There is no reliable discriminant on the
/// wire, so the shape is decided by the first matching rule in `SHAPE_RULES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    Log,
    TypedProgress,
    BareProgress,
}

type ShapeRule = (PayloadShape, fn(&Map<String, Value>) -> bool);

const SHAPE_RULES: [ShapeRule; 3] = [
    (PayloadShape::Log, has_timestamp),
    (PayloadShape::TypedProgress, is_typed_progress),
    (PayloadShape::BareProgress, looks_like_progress),
];

fn has_timestamp(obj: &Map<String, Value>) -> bool {
    obj.contains_key("timestamp")
}

fn is_typed_progress(obj: &Map<String, Value>) -> bool {
    obj.get("type").and_then(Value::as_str) == Some("progress")
}

fn looks_like_progress(obj: &Map<String, Value>) -> bool {
    obj.contains_key("current") || obj.contains_key("status")
}

impl PayloadShape {
    pub fn detect(obj: &Map<String, Value>) -> Option<Self> {
        SHAPE_RULES
            .iter()
            .find(|(_, matches)| matches(obj))
            .map(|(shape, _)| *shape)
    }
}

/// Classify one decoded payload.
pub fn classify(value: Value) -> Result<StreamEvent, Discarded> {
    let Value::Object(obj) = value else {
        return Err(Discarded::Unrecognised);
    };

    if let Some(err) = obj.get("error") {
        let msg = err
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(Discarded::ErrorEnvelope(msg));
    }

    let shape = PayloadShape::detect(&obj).ok_or(Discarded::Unrecognised)?;
    let value = Value::Object(obj);
    match shape {
        PayloadShape::Log => serde_json::from_value(value)
            .map(StreamEvent::Log)
            .map_err(|e| Discarded::Malformed(e.to_string())),
        PayloadShape::TypedProgress | PayloadShape::BareProgress => serde_json::from_value(value)
            .map(StreamEvent::Progress)
            .map_err(|e| Discarded::Malformed(e.to_string())),
    }
}

/// Parse and classify the text of one stream payload.
pub fn parse_stream_payload(data: &str) -> Result<StreamEvent, Discarded> {
    let data = data.trim();
    if data.is_empty() {
        return Err(Discarded::Empty);
    }
    let value: Value =
        serde_json::from_str(data).map_err(|e| Discarded::Malformed(e.to_string()))?;
    classify(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamp_wins_over_progress_markers() {
        let ev = classify(json!({
            "timestamp": "2026-01-01T10:00:00",
            "message": "posted",
            "level": "success",
            "type": "progress",
            "current": 4
        }))
        .unwrap();
        match ev {
            StreamEvent::Log(entry) => {
                assert_eq!(entry.message, "posted");
                assert_eq!(entry.level, LogLevel::Success);
            }
            other => panic!("expected log, got {:?}", other),
        }
    }

    #[test]
    fn typed_progress_fills_missing_fields() {
        let ev = classify(json!({"type": "progress", "total_posts_ever": 42})).unwrap();
        assert_eq!(
            ev,
            StreamEvent::Progress(Progress {
                total_posts_ever: Some(42),
                ..Progress::default()
            })
        );
    }

    #[test]
    fn bare_progress_by_current_or_status() {
        let ev = classify(json!({"current": 3, "total": 10})).unwrap();
        assert!(matches!(ev, StreamEvent::Progress(p) if p.current == 3 && p.total == 10));

        let ev = classify(json!({"status": "running"})).unwrap();
        assert!(matches!(ev, StreamEvent::Progress(p) if p.status == Status::Running));
    }

    #[test]
    fn null_status_still_marks_a_progress_payload() {
        let ev = classify(json!({"status": null, "total": 4})).unwrap();
        assert_eq!(
            ev,
            StreamEvent::Progress(Progress {
                total: 4,
                ..Progress::default()
            })
        );
    }

    #[test]
    fn error_envelope_is_never_classified() {
        let err = classify(json!({"error": "queue exploded", "status": "running"})).unwrap_err();
        assert_eq!(err, Discarded::ErrorEnvelope("queue exploded".into()));
    }

    #[test]
    fn unknown_shapes_are_discarded() {
        assert_eq!(classify(json!({"foo": 1})), Err(Discarded::Unrecognised));
        assert_eq!(classify(json!([1, 2])), Err(Discarded::Unrecognised));
    }

    #[test]
    fn empty_and_malformed_text() {
        assert_eq!(parse_stream_payload("   "), Err(Discarded::Empty));
        assert!(matches!(
            parse_stream_payload("{not json"),
            Err(Discarded::Malformed(_))
        ));
        assert!(matches!(
            parse_stream_payload(r#"{"timestamp": 12}"#),
            Err(Discarded::Malformed(_))
        ));
    }

    #[test]
    fn null_total_reads_as_zero_but_absent_stays_none() {
        let p: Progress =
            serde_json::from_str(r#"{"current": 1.0, "total_posts_ever": null}"#).unwrap();
        assert_eq!(p.current, 1);
        assert_eq!(p.total_posts_ever, Some(0));
        assert_eq!(p.total_failures_ever, None);
    }

    #[test]
    fn unknown_status_reads_as_idle() {
        let p: Progress = serde_json::from_str(r#"{"status": "paused"}"#).unwrap();
        assert_eq!(p.status, Status::Idle);
        assert_eq!(serde_json::to_value(Status::Completed).unwrap(), json!("completed"));
    }

    #[test]
    fn delay_edits_are_validated() {
        let pc = PostConfig::default();
        assert_eq!(
            pc.with_delays(10, 5),
            Err(EditError::DelayRange { min: 10, max: 5 })
        );
        assert_eq!(pc.with_delay_min(0), Err(EditError::DelayMinTooSmall(0)));
        let ok = pc.with_delays(60, 120).unwrap();
        assert_eq!((ok.delay_min, ok.delay_max), (60, 120));
    }

    #[test]
    fn invalid_post_config_leaves_config_untouched() {
        let config = Config::default();
        let bad = PostConfig {
            delay_min: 10,
            delay_max: 5,
            ..PostConfig::default()
        };
        assert!(config.with_post_config(bad).is_err());
        assert_eq!(config.post_config, PostConfig::default());
    }

    #[test]
    fn can_start_needs_stock_and_destination() {
        let mut config = Config::default();
        assert!(!config.can_start());
        config.stock_channel = Some(ChannelRef::new("@stock", ""));
        assert!(!config.can_start());
        config.destination_channels.push(ChannelRef::new("@dest", "Dest"));
        assert!(config.can_start());
        assert_eq!(config.stock_channel.unwrap().name, "@stock");
    }
}
