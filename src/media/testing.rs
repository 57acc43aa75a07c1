//! Scripted source and recording diagnostics shared by the media tests.

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::media::{
    diagnostics::{Diagnostics, RelayEvent, SharedDiagnostics},
    error::RelayError,
    source::FrameSource,
    supervisor::SupervisorConfig,
    types::{PipelineConfig, RawFrame, StreamEndpoint},
};

#[derive(Clone, Debug)]
pub enum MockRead {
    Frame(RawFrame),
    Fail,
    Hang,
}

#[derive(Default)]
struct MockState {
    connect_failures: usize,
    connect_delay: Duration,
    reads: VecDeque<MockRead>,
    queued: VecDeque<RawFrame>,
    read_delay: Duration,
    hang_when_idle: bool,
    connects: usize,
    reads_done: usize,
    release_calls: usize,
    released: usize,
    open: usize,
}

/// In-memory upstream. Connects succeed unless scripted to fail; reads
/// come from the queued frames first, then from the read script, then an
/// endless supply of 2x2 grey frames.
#[derive(Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug)]
pub struct MockConnection {
    pub id: usize,
    open: bool,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connects(self, count: usize) -> Self {
        self.state.lock().unwrap().connect_failures = count;
        self
    }

    pub fn connect_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().connect_delay = delay;
        self
    }

    pub fn script_reads(self, reads: impl IntoIterator<Item = MockRead>) -> Self {
        self.state.lock().unwrap().reads.extend(reads);
        self
    }

    pub fn queue_frames(self, frames: impl IntoIterator<Item = RawFrame>) -> Self {
        self.state.lock().unwrap().queued.extend(frames);
        self
    }

    pub fn read_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().read_delay = delay;
        self
    }

    /// Once the script runs out, reads never complete.
    pub fn hang_when_idle(self) -> Self {
        self.state.lock().unwrap().hang_when_idle = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn reads(&self) -> usize {
        self.state.lock().unwrap().reads_done
    }

    pub fn release_calls(&self) -> usize {
        self.state.lock().unwrap().release_calls
    }

    /// Connections actually closed; repeated releases do not count.
    pub fn released(&self) -> usize {
        self.state.lock().unwrap().released
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().unwrap().open
    }
}

impl FrameSource for MockSource {
    type Connection = MockConnection;

    fn connect(
        &mut self,
        _endpoint: &StreamEndpoint,
    ) -> impl Future<Output = Result<MockConnection, RelayError>> + Send {
        let state = self.state.clone();
        async move {
            let delay = state.lock().unwrap().connect_delay;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let mut state = state.lock().unwrap();
            state.connects += 1;
            if state.connect_failures > 0 {
                state.connect_failures -= 1;
                return Err(RelayError::not_opened(anyhow::anyhow!("connection refused")));
            }
            state.open += 1;
            Ok(MockConnection {
                id: state.connects,
                open: true,
            })
        }
    }

    fn read_frame(
        &mut self,
        connection: &mut MockConnection,
    ) -> impl Future<Output = Result<RawFrame, RelayError>> + Send {
        let state = self.state.clone();
        let open = connection.open;
        async move {
            let (delay, next) = {
                let mut state = state.lock().unwrap();
                state.reads_done += 1;
                if !open {
                    (Duration::ZERO, MockRead::Fail)
                } else if let Some(frame) = state.queued.pop_front() {
                    (Duration::ZERO, MockRead::Frame(frame))
                } else if let Some(read) = state.reads.pop_front() {
                    (state.read_delay, read)
                } else if state.hang_when_idle {
                    (Duration::ZERO, MockRead::Hang)
                } else {
                    (state.read_delay, MockRead::Frame(RawFrame::solid(2, 2, [128, 128, 128])))
                }
            };
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match next {
                MockRead::Frame(mut frame) => {
                    frame.captured_at = tokio::time::Instant::now();
                    Ok(frame)
                }
                MockRead::Fail => Err(RelayError::read_failed(anyhow::anyhow!("stream reset"))),
                MockRead::Hang => std::future::pending().await,
            }
        }
    }

    fn pending(&self, _connection: &MockConnection) -> usize {
        self.state.lock().unwrap().queued.len()
    }

    fn release(&mut self, connection: &mut MockConnection) {
        let mut state = self.state.lock().unwrap();
        state.release_calls += 1;
        if connection.open {
            connection.open = false;
            state.released += 1;
            state.open -= 1;
        }
    }
}

/// Keeps every event in order.
#[derive(Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<(u64, RelayEvent)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&RelayEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, event)| predicate(event))
            .count()
    }

    pub fn shared(self: &Arc<Self>) -> SharedDiagnostics {
        self.clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn record(&self, relay: u64, event: RelayEvent) {
        self.events.lock().unwrap().push((relay, event));
    }
}

/// Small output so tests do not spend their time in the JPEG encoder.
pub fn test_config() -> SupervisorConfig {
    SupervisorConfig {
        pipeline: PipelineConfig {
            width: 16,
            height: 12,
            jpeg_quality: 80,
        },
        target_fps: None,
        reconnect_backoff: Duration::from_secs(5),
        ..SupervisorConfig::default()
    }
}

pub fn endpoint() -> StreamEndpoint {
    StreamEndpoint::new("rtmp://mock.invalid/live/stream")
}
