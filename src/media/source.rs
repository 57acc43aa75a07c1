use std::future::Future;

use ffmpeg_capture::{Capture, CaptureTask};

use crate::media::{
    error::RelayError,
    types::{DrainPolicy, RawFrame, StreamEndpoint},
};

/// Producer of decoded frames from one upstream.
///
/// Implementations never retry on their own; reconnecting is the
/// supervisor's job. `release` must be idempotent.
pub trait FrameSource: Send + 'static {
    type Connection: Send + 'static;

    fn connect(
        &mut self,
        endpoint: &StreamEndpoint,
    ) -> impl Future<Output = Result<Self::Connection, RelayError>> + Send;

    /// Wait for the next frame. End of stream is a `ReadFailed`.
    fn read_frame(
        &mut self,
        connection: &mut Self::Connection,
    ) -> impl Future<Output = Result<RawFrame, RelayError>> + Send;

    /// Frames already decoded and waiting behind the next one.
    fn pending(&self, connection: &Self::Connection) -> usize;

    fn release(&mut self, connection: &mut Self::Connection);
}

/// A frame together with how many stale frames were skipped to get it.
#[derive(Debug)]
pub struct DrainedFrame {
    pub frame: RawFrame,
    pub discarded: usize,
}

/// Read one frame honouring `policy`. With `DrainPolicy::Latest` the frames
/// already queued behind the first read are consumed and only the last one
/// is returned. The backlog is counted once, so a producer that keeps up
/// with the drain cannot hold the caller forever.
pub async fn read_with_policy<S: FrameSource>(
    source: &mut S,
    connection: &mut S::Connection,
    policy: DrainPolicy,
) -> Result<DrainedFrame, RelayError> {
    let mut frame = source.read_frame(connection).await?;
    let mut discarded = 0;
    if policy == DrainPolicy::Latest {
        let backlog = source.pending(connection);
        while discarded < backlog {
            frame = source.read_frame(connection).await?;
            discarded += 1;
        }
    }
    Ok(DrainedFrame { frame, discarded })
}

/// Frames decoded ahead when draining is enabled. RGB24 at 1080p is about
/// 6 MiB per frame.
pub const DRAIN_QUEUE_CAPACITY: usize = 4;

/// FFmpeg backed source. Each connection runs its own reader on the blocking
/// pool; with `DrainPolicy::Next` it decodes a single frame ahead.
#[derive(Clone, Copy, Debug)]
pub struct FfmpegSource {
    queue: usize,
}

impl FfmpegSource {
    pub fn new(policy: DrainPolicy) -> Self {
        let queue = match policy {
            DrainPolicy::Next => 1,
            DrainPolicy::Latest => DRAIN_QUEUE_CAPACITY,
        };
        Self { queue }
    }
}

impl Default for FfmpegSource {
    fn default() -> Self {
        Self::new(DrainPolicy::Next)
    }
}

#[derive(Default)]
pub struct FfmpegConnection {
    task: Option<CaptureTask>,
}

impl FfmpegConnection {
    pub fn new(task: CaptureTask) -> Self {
        Self { task: Some(task) }
    }

    pub fn is_open(&self) -> bool {
        self.task.is_some()
    }
}

impl FrameSource for FfmpegSource {
    type Connection = FfmpegConnection;

    fn connect(
        &mut self,
        endpoint: &StreamEndpoint,
    ) -> impl Future<Output = Result<FfmpegConnection, RelayError>> + Send {
        let url = endpoint.url().to_string();
        let backend = endpoint.backend().map(str::to_string);
        let queue = self.queue;
        async move {
            let capture =
                tokio::task::spawn_blocking(move || Capture::open(&url, backend.as_deref()))
                    .await
                    .map_err(RelayError::not_opened)?
                    .map_err(RelayError::not_opened)?;
            Ok(FfmpegConnection::new(CaptureTask::start(capture, queue)))
        }
    }

    fn read_frame(
        &mut self,
        connection: &mut FfmpegConnection,
    ) -> impl Future<Output = Result<RawFrame, RelayError>> + Send {
        async move {
            let task = connection
                .task
                .as_mut()
                .ok_or_else(|| RelayError::read_failed(anyhow::anyhow!("connection closed")))?;
            task.next_frame()
                .await
                .map(RawFrame::from)
                .map_err(RelayError::read_failed)
        }
    }

    fn pending(&self, connection: &FfmpegConnection) -> usize {
        connection.task.as_ref().map_or(0, CaptureTask::queued)
    }

    fn release(&mut self, connection: &mut FfmpegConnection) {
        if let Some(mut task) = connection.task.take() {
            log::debug!("closing capture {}", task.url());
            task.stop();
        }
    }
}
