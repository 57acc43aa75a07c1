use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::media::{
    diagnostics::{RelayEvent, SharedDiagnostics, StopReason},
    error::RelayError,
    pacing::PacingState,
    pipeline::FramePipeline,
    source::{FrameSource, read_with_policy},
    stream::FrameOutput,
    types::{DrainPolicy, PipelineConfig, StreamEndpoint},
};

static NEXT_RELAY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Streaming,
    BackingOff,
}

/// Everything one supervisor needs besides its source and endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct SupervisorConfig {
    pub pipeline: PipelineConfig,
    pub target_fps: Option<f64>,
    pub reconnect_backoff: Duration,
    pub drain_policy: DrainPolicy,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            target_fps: None,
            reconnect_backoff: Duration::from_secs(5),
            drain_policy: DrainPolicy::Next,
        }
    }
}

/// Counters for one supervisor run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SupervisorStats {
    pub connect_attempts: u64,
    pub backoffs: u64,
    pub releases: u64,
    pub frames_emitted: u64,
    pub frames_dropped: u64,
    pub frames_discarded: u64,
}

enum Step {
    Continue,
    ReadFailed(RelayError),
    Stop(StopReason),
}

/// Keeps one upstream connection alive for as long as its output is wanted:
/// connect, stream until a read fails, release, wait, reconnect.
pub struct ConnectionSupervisor<S: FrameSource> {
    id: u64,
    source: S,
    endpoint: StreamEndpoint,
    pipeline: FramePipeline,
    drain_policy: DrainPolicy,
    backoff: Duration,
    pacing: PacingState,
    state: SupervisorState,
    stats: SupervisorStats,
    diagnostics: SharedDiagnostics,
    cancel: CancellationToken,
}

impl<S: FrameSource> ConnectionSupervisor<S> {
    pub fn new(
        source: S,
        endpoint: StreamEndpoint,
        config: &SupervisorConfig,
        diagnostics: SharedDiagnostics,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: NEXT_RELAY_ID.fetch_add(1, Ordering::Relaxed),
            source,
            endpoint,
            pipeline: FramePipeline::new(config.pipeline),
            drain_policy: config.drain_policy,
            backoff: config.reconnect_backoff,
            pacing: PacingState::new(config.target_fps),
            state: SupervisorState::Disconnected,
            stats: SupervisorStats::default(),
            diagnostics,
            cancel,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn stats(&self) -> SupervisorStats {
        self.stats
    }

    /// Drive the state machine until cancelled or until `output` reports
    /// that nobody is listening. Any open connection is released exactly
    /// once on the way out.
    pub async fn run<O: FrameOutput>(mut self, mut output: O) -> SupervisorStats {
        let cancel = self.cancel.clone();
        let mut connection: Option<S::Connection> = None;

        let reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if output.is_closed() {
                break StopReason::OutputClosed;
            }

            match self.state {
                SupervisorState::Disconnected => self.transition(SupervisorState::Connecting),
                SupervisorState::Connecting => {
                    self.stats.connect_attempts += 1;
                    let connected = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                        result = self.source.connect(&self.endpoint) => result,
                    };
                    match connected {
                        Ok(opened) => {
                            connection = Some(opened);
                            self.record(RelayEvent::Connected {
                                endpoint: self.endpoint.to_string(),
                            });
                            self.transition(SupervisorState::Streaming);
                        }
                        Err(err) => {
                            self.record(RelayEvent::ConnectFailed {
                                error: err.to_string(),
                            });
                            self.enter_backoff();
                        }
                    }
                }
                SupervisorState::Streaming => {
                    let Some(open) = connection.as_mut() else {
                        self.transition(SupervisorState::Connecting);
                        continue;
                    };
                    match self.stream_once(open, &mut output, &cancel).await {
                        Step::Continue => {}
                        Step::ReadFailed(err) => {
                            self.record(RelayEvent::ReadFailed {
                                error: err.to_string(),
                            });
                            self.release(&mut connection);
                            self.enter_backoff();
                        }
                        Step::Stop(reason) => break reason,
                    }
                }
                SupervisorState::BackingOff => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                        _ = tokio::time::sleep(self.backoff) => {}
                    }
                    self.transition(SupervisorState::Connecting);
                }
            }
        };

        self.release(&mut connection);
        self.transition(SupervisorState::Disconnected);
        self.record(RelayEvent::Stopped { reason });
        self.stats
    }

    /// One streaming iteration: read, transform, emit, pace.
    async fn stream_once<O: FrameOutput>(
        &mut self,
        connection: &mut S::Connection,
        output: &mut O,
        cancel: &CancellationToken,
    ) -> Step {
        self.pacing.begin_iteration(Instant::now());

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Stop(StopReason::Cancelled),
            read = read_with_policy(&mut self.source, connection, self.drain_policy) => read,
        };
        let drained = match read {
            Ok(drained) => drained,
            Err(err) => return Step::ReadFailed(err),
        };
        if drained.discarded > 0 {
            self.stats.frames_discarded += drained.discarded as u64;
            self.record(RelayEvent::FramesDiscarded {
                count: drained.discarded,
            });
        }

        let processed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Stop(StopReason::Cancelled),
            processed = self.pipeline.process(drained.frame) => processed,
        };
        let frame = match processed {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.frames_dropped += 1;
                self.record(RelayEvent::FrameDropped {
                    error: err.to_string(),
                });
                return Step::Continue;
            }
        };

        let bytes = frame.len();
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Step::Stop(StopReason::Cancelled),
            sent = output.emit(frame) => sent,
        };
        if sent.is_err() {
            return Step::Stop(StopReason::OutputClosed);
        }
        self.stats.frames_emitted += 1;
        self.record(RelayEvent::FrameEmitted { bytes });

        let delay = self.pacing.frame_emitted(Instant::now());
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Step::Stop(StopReason::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Step::Continue
    }

    fn enter_backoff(&mut self) {
        self.stats.backoffs += 1;
        self.record(RelayEvent::BackingOff {
            delay: self.backoff,
        });
        self.transition(SupervisorState::BackingOff);
    }

    fn release(&mut self, connection: &mut Option<S::Connection>) {
        if let Some(mut open) = connection.take() {
            self.source.release(&mut open);
            self.stats.releases += 1;
            self.record(RelayEvent::Released);
        }
    }

    fn transition(&mut self, to: SupervisorState) {
        if self.state != to {
            let from = self.state;
            self.state = to;
            self.record(RelayEvent::StateChanged { from, to });
        }
    }

    fn record(&self, event: RelayEvent) {
        self.diagnostics.record(self.id, event);
    }
}

#[cfg(test)]
#[path = "supervisor_test.rs"]
mod supervisor_test;
