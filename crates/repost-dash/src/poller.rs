//! Poll schedulers.
//!
//! Each poller is a fixed-cadence timer.  On every tick it reads the current
//! [`PollGate`] and either skips the tick or performs exactly one request
//! under a deadline.  A failed or timed-out request is logged and dropped;
//! the next tick is the retry.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use repost_proto::protocol::{ChannelStats, ChannelStatsSummary, Progress};

use crate::api::{with_deadline, ApiClient};
use crate::engine::SyncMessage;
use crate::error::ApiError;
use crate::store::PollGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    /// Status while running.
    Fast,
    /// Status regardless of run state.
    Background,
    /// Channel statistics.
    Stats,
}

impl PollKind {
    pub fn name(self) -> &'static str {
        match self {
            PollKind::Fast => "fast",
            PollKind::Background => "background",
            PollKind::Stats => "stats",
        }
    }

    /// Whether a tick should fire under `gate`.
    pub fn admits(self, gate: PollGate) -> bool {
        match self {
            PollKind::Fast => gate.loaded && gate.running,
            PollKind::Background | PollKind::Stats => gate.loaded,
        }
    }
}

/// One pull request and how its result is reported.
pub trait PollSource: Send + Sync + 'static {
    type Output: Send + 'static;

    fn fetch(&self) -> impl Future<Output = Result<Self::Output, ApiError>> + Send;

    fn message(kind: PollKind, output: Self::Output) -> SyncMessage;
}

/// `GET /api/control/status`.
pub struct StatusPoll(pub ApiClient);

impl PollSource for StatusPoll {
    type Output = Progress;

    async fn fetch(&self) -> Result<Progress, ApiError> {
        self.0.get_status().await
    }

    fn message(kind: PollKind, output: Progress) -> SyncMessage {
        SyncMessage::Polled(kind, output)
    }
}

/// Stats summary plus the per-channel list.
pub struct StatsPoll(pub ApiClient);

impl PollSource for StatsPoll {
    type Output = (ChannelStatsSummary, Vec<ChannelStats>);

    async fn fetch(&self) -> Result<Self::Output, ApiError> {
        let summary = self.0.channel_stats_summary().await?;
        let channels = self.0.channel_stats().await?;
        Ok((summary, channels))
    }

    fn message(_kind: PollKind, (summary, channels): Self::Output) -> SyncMessage {
        SyncMessage::Stats { summary, channels }
    }
}

pub struct Poller<S> {
    kind: PollKind,
    period: Duration,
    timeout: Duration,
    source: S,
}

impl<S: PollSource> Poller<S> {
    pub fn new(kind: PollKind, period: Duration, timeout: Duration, source: S) -> Self {
        Self {
            kind,
            period,
            timeout,
            source,
        }
    }

    pub async fn run(
        self,
        gate: watch::Receiver<PollGate>,
        tx: mpsc::Sender<SyncMessage>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; polling starts one period in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let current = *gate.borrow();
            if !self.kind.admits(current) {
                continue;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                r = with_deadline(self.timeout, self.source.fetch()) => r,
            };
            match result {
                Ok(output) => {
                    if tx.send(S::message(self.kind, output)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{} poll failed: {}", self.kind.name(), e),
            }
        }
        debug!("{} poller stopped", self.kind.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use repost_proto::protocol::Status;

    #[derive(Clone)]
    struct CountingSource {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                delay,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PollSource for CountingSource {
        type Output = Progress;

        async fn fetch(&self) -> Result<Progress, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Progress {
                status: Status::Running,
                ..Progress::default()
            })
        }

        fn message(kind: PollKind, output: Progress) -> SyncMessage {
            SyncMessage::Polled(kind, output)
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn gating_rules() {
        let idle = PollGate {
            loaded: true,
            running: false,
        };
        let running = PollGate {
            loaded: true,
            running: true,
        };
        let loading = PollGate {
            loaded: false,
            running: true,
        };
        assert!(!PollKind::Fast.admits(idle));
        assert!(PollKind::Fast.admits(running));
        assert!(!PollKind::Fast.admits(loading));
        assert!(PollKind::Background.admits(idle));
        assert!(!PollKind::Background.admits(loading));
        assert!(!PollKind::Stats.admits(loading));
    }

    #[tokio::test(start_paused = true)]
    async fn fast_poller_waits_for_load_then_ticks_every_period() {
        let source = CountingSource::new(Duration::ZERO);
        let (gate_tx, gate_rx) = watch::channel(PollGate {
            loaded: false,
            running: true,
        });
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollKind::Fast, secs(2), secs(5), source.clone());
        let handle = tokio::spawn(poller.run(gate_rx, tx, cancel.clone()));

        // Ticks at 2s and 4s are suppressed while loading.
        tokio::time::sleep(secs(5)).await;
        assert_eq!(source.calls(), 0);

        gate_tx.send_replace(PollGate {
            loaded: true,
            running: true,
        });
        // Ticks at 6s and 8s fire.
        tokio::time::sleep(secs(4)).await;
        assert_eq!(source.calls(), 2);
        assert!(matches!(rx.try_recv(), Ok(SyncMessage::Polled(PollKind::Fast, _))));

        // Not running: suspended without stopping the timer.
        gate_tx.send_replace(PollGate {
            loaded: true,
            running: false,
        });
        tokio::time::sleep(secs(6)).await;
        assert_eq!(source.calls(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn background_poller_ignores_run_state() {
        let source = CountingSource::new(Duration::ZERO);
        let (_gate_tx, gate_rx) = watch::channel(PollGate {
            loaded: true,
            running: false,
        });
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollKind::Background, secs(5), secs(5), source.clone());
        let handle = tokio::spawn(poller.run(gate_rx, tx, cancel.clone()));

        tokio::time::sleep(secs(16)).await;
        assert_eq!(source.calls(), 3);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_request_leaves_nothing_behind() {
        let source = CountingSource::new(secs(60));
        let (_gate_tx, gate_rx) = watch::channel(PollGate {
            loaded: true,
            running: true,
        });
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollKind::Fast, secs(2), secs(5), source.clone());
        let handle = tokio::spawn(poller.run(gate_rx, tx, cancel.clone()));

        tokio::time::sleep(secs(20)).await;
        assert!(source.calls() >= 2, "the timer keeps retrying");
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_an_in_flight_request() {
        let source = CountingSource::new(secs(60));
        let (_gate_tx, gate_rx) = watch::channel(PollGate {
            loaded: true,
            running: false,
        });
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let poller = Poller::new(PollKind::Background, secs(5), secs(30), source.clone());
        let handle = tokio::spawn(poller.run(gate_rx, tx, cancel.clone()));

        tokio::time::sleep(secs(6)).await;
        assert_eq!(source.calls(), 1);
        cancel.cancel();
        handle.await.unwrap();
    }
}
