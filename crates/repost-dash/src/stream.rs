//! Event stream connection manager.
//!
//! Keeps exactly one connection to `/api/logs/stream` open.  The body is read
//! as raw bytes, split into lines, stripped of SSE framing and classified.
//! Any transport error (including an orderly end of body) schedules one
//! reconnect after a fixed delay; the loop never gives up and stops only
//! when its cancellation token fires.

use std::future::Future;
use std::time::Duration;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use repost_proto::protocol::{parse_stream_payload, Discarded};

use crate::api::ApiClient;
use crate::engine::SyncMessage;
use crate::error::ApiError;

pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ApiError>>;

/// Something that can open the push stream.
pub trait EventSource: Send + Sync + 'static {
    fn connect(&self) -> impl Future<Output = Result<ByteStream, ApiError>> + Send;
}

impl EventSource for ApiClient {
    async fn connect(&self) -> Result<ByteStream, ApiError> {
        let resp = self.open_event_stream().await?;
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ApiError::from))
            .boxed())
    }
}

// ── Line framing ──────────────────────────────────────────────────────────────

/// Longest line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Reassembles lines across chunk boundaries.  A line that outgrows
/// [`MAX_LINE_BYTES`] is dropped up to its newline.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
    discarding: bool,
}

impl LineDecoder {
    /// Feed a chunk; returns every line it completed, without the newline.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if std::mem::take(&mut self.discarding) {
                continue;
            }
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        if self.pending.len() > MAX_LINE_BYTES {
            warn!("stream: dropping a line longer than {} bytes", MAX_LINE_BYTES);
            self.pending = Vec::new();
            self.discarding = true;
        }
        lines
    }
}

/// The JSON payload carried by one line, if any.  Handles both SSE framing
/// (`data: {...}`) and bare newline-delimited JSON.
pub fn payload_of(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(rest) = line.strip_prefix("data:") {
        let rest = rest.trim_start();
        return (!rest.is_empty()).then_some(rest);
    }
    if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
        return None;
    }
    Some(line)
}

// ── Manager ───────────────────────────────────────────────────────────────────

pub struct StreamManager<S> {
    source: S,
    reconnect_delay: Duration,
    tx: mpsc::Sender<SyncMessage>,
}

impl<S: EventSource> StreamManager<S> {
    pub fn new(source: S, reconnect_delay: Duration, tx: mpsc::Sender<SyncMessage>) -> Self {
        Self {
            source,
            reconnect_delay,
            tx,
        }
    }

    /// Connect, read, and reconnect until `cancel` fires.  The live
    /// connection is dropped on every exit path.
    pub async fn run(self, cancel: CancellationToken) {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            debug!("stream: connecting (attempt {})", attempt);
            let err = tokio::select! {
                _ = cancel.cancelled() => break,
                err = self.session() => err,
            };
            let err = match err {
                Some(err) => err,
                // Receiver gone: the dashboard is shutting down.
                None => break,
            };
            warn!("stream: {}; reconnecting in {:?}", err, self.reconnect_delay);
            if self.tx.send(SyncMessage::StreamLost(err.to_string())).await.is_err() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }
        debug!("stream: stopped after {} attempt(s)", attempt);
    }

    /// One connection's lifetime.  Returns the error that ended it, or
    /// `None` when the message channel closed.
    async fn session(&self) -> Option<ApiError> {
        let mut body = match self.source.connect().await {
            Ok(body) => body,
            Err(e) => return Some(e),
        };
        info!("stream: connected");
        self.tx.send(SyncMessage::StreamOpened).await.ok()?;

        let mut decoder = LineDecoder::default();
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Some(e),
            };
            for line in decoder.push(&chunk) {
                let Some(payload) = payload_of(&line) else {
                    continue;
                };
                match parse_stream_payload(payload) {
                    Ok(event) => {
                        self.tx.send(SyncMessage::Stream(event)).await.ok()?;
                    }
                    Err(Discarded::ErrorEnvelope(msg)) => {
                        warn!("stream: server reported error: {}", msg);
                    }
                    Err(Discarded::Empty) => {}
                    Err(other) => {
                        trace!("stream: dropped payload ({}): {}", other, payload);
                    }
                }
            }
        }
        Some(ApiError::StreamEnded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use repost_proto::protocol::{LogLevel, StreamEvent};
    use tokio::time::Instant;

    enum Script {
        Refuse,
        Body(Vec<&'static str>),
        Hang,
    }

    #[derive(Clone, Default)]
    struct FakeSource {
        script: Arc<Mutex<VecDeque<Script>>>,
        attempts: Arc<Mutex<Vec<Instant>>>,
    }

    impl FakeSource {
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                attempts: Arc::default(),
            }
        }

        fn attempts(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    impl EventSource for FakeSource {
        async fn connect(&self) -> Result<ByteStream, ApiError> {
            self.attempts.lock().unwrap().push(Instant::now());
            let next = self.script.lock().unwrap().pop_front().unwrap_or(Script::Refuse);
            match next {
                Script::Refuse => Err(ApiError::Status {
                    status: 502,
                    detail: "bad gateway".into(),
                }),
                Script::Body(chunks) => Ok(futures_util::stream::iter(
                    chunks
                        .into_iter()
                        .map(|c| Ok::<_, ApiError>(c.as_bytes().to_vec())),
                )
                .boxed()),
                Script::Hang => {
                    Ok(futures_util::stream::pending::<Result<Vec<u8>, ApiError>>().boxed())
                }
            }
        }
    }

    fn drain(rx: &mut mpsc::Receiver<SyncMessage>) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn decoder_joins_lines_split_across_chunks() {
        let mut dec = LineDecoder::default();
        assert!(dec.push(b"data: {\"timest").is_empty());
        let lines = dec.push(b"amp\": \"t\"}\r\n\ndata: x\n");
        assert_eq!(lines, vec!["data: {\"timestamp\": \"t\"}", "", "data: x"]);
        assert!(dec.push(b"tail").is_empty());
    }

    #[test]
    fn oversized_line_is_dropped_up_to_its_newline() {
        let mut dec = LineDecoder::default();
        let flood = vec![b'x'; MAX_LINE_BYTES + 1];
        assert!(dec.push(&flood).is_empty());
        assert!(dec.pending.is_empty());

        // The rest of the flooded line goes too; the next line survives.
        let lines = dec.push(b"xxxx}\ndata: {\"a\":1}\n");
        assert_eq!(lines, vec!["data: {\"a\":1}"]);
        assert!(!dec.discarding);
    }

    #[test]
    fn sse_framing_is_stripped() {
        assert_eq!(payload_of("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(payload_of("data:{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(payload_of("{\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(payload_of(": keep-alive"), None);
        assert_eq!(payload_of("event: message"), None);
        assert_eq!(payload_of("retry: 3000"), None);
        assert_eq!(payload_of("data:   "), None);
        assert_eq!(payload_of("   "), None);
    }

    #[tokio::test(start_paused = true)]
    async fn payloads_are_classified_and_junk_is_ignored() {
        let source = FakeSource::new(vec![
            Script::Body(vec![
                ": hello\n\n",
                "data: {\"timestamp\":\"2026-01-01T00:00:00\",\"message\":\"posted\",\"level\":\"success\"}\n\n",
                "data: {\"error\": \"boom\"}\n\n",
                "data: not json\n\n",
                "data: {\"type\":\"progr",
                "ess\",\"current\":2,\"total\":5}\n\n",
                "data: {\"something\":\"else\"}\n\n",
            ]),
            Script::Hang,
        ]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            StreamManager::new(source.clone(), Duration::from_secs(3), tx).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let msgs = drain(&mut rx);

        let events: Vec<&StreamEvent> = msgs
            .iter()
            .filter_map(|m| match m {
                SyncMessage::Stream(ev) => Some(ev),
                _ => None,
            })
            .collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Log(e) if e.level == LogLevel::Success));
        assert!(matches!(events[1], StreamEvent::Progress(p) if p.current == 2 && p.total == 5));

        // End of the first body counts as an error and reconnects.
        assert!(msgs.iter().any(|m| matches!(m, SyncMessage::StreamLost(_))));
        assert_eq!(source.attempts().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn n_errors_give_n_reconnects_spaced_by_the_delay() {
        let source = FakeSource::new(vec![
            Script::Refuse,
            Script::Refuse,
            Script::Refuse,
            Script::Hang,
        ]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            StreamManager::new(source.clone(), Duration::from_secs(3), tx).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        let attempts = source.attempts();
        // First connect plus one reconnect per error.
        assert_eq!(attempts.len(), 4);
        for pair in attempts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(3));
        }
        let msgs = drain(&mut rx);
        let lost = msgs.iter().filter(|m| matches!(m, SyncMessage::StreamLost(_))).count();
        let opened = msgs.iter().filter(|m| matches!(m, SyncMessage::StreamOpened)).count();
        assert_eq!((lost, opened), (3, 1));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_during_the_wait_prevents_the_next_attempt() {
        let source = FakeSource::new(vec![]);
        let (tx, _rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            StreamManager::new(source.clone(), Duration::from_secs(3), tx).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.attempts().len(), 1);

        cancel.cancel();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.attempts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_closes_a_live_connection() {
        let source = FakeSource::new(vec![Script::Hang]);
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            StreamManager::new(source.clone(), Duration::from_secs(3), tx).run(cancel.clone()),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(rx.try_recv(), Ok(SyncMessage::StreamOpened)));

        cancel.cancel();
        handle.await.unwrap();
        // The manager (and with it the sender) is gone.
        assert!(rx.recv().await.is_none());
    }
}
