use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{capture::Capture, frame::RgbFrame};

/// Demux and decode on the blocking pool, ahead of the consumer.
///
/// Decoded frames wait in a bounded queue, so a consumer that falls behind
/// can see how many are waiting ([`CaptureTask::queued`]) and skip them.
/// Once the queue is full the reader blocks and the remaining backlog stays
/// with the transport. The first read error is delivered in order and ends
/// the task.
pub struct CaptureTask {
    url: String,
    frames: mpsc::Receiver<anyhow::Result<RgbFrame>>,
    cancel: CancellationToken,
}

impl CaptureTask {
    pub fn start(mut capture: Capture, capacity: usize) -> Self {
        let url = capture.url().to_string();
        Self::spawn(url, capacity, move || capture.read_frame())
    }

    /// Run `read` in a loop until it fails, the task is stopped, or the
    /// consumer goes away. Each call may block.
    pub fn spawn<F>(url: String, capacity: usize, mut read: F) -> Self
    where
        F: FnMut() -> anyhow::Result<RgbFrame> + Send + 'static,
    {
        let (sender, frames) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let cancel_inner = cancel.clone();
        let task_url = url.clone();

        tokio::task::spawn_blocking(move || {
            loop {
                if cancel_inner.is_cancelled() {
                    break;
                }
                let result = read();
                let failed = result.is_err();
                if sender.blocking_send(result).is_err() || failed {
                    break;
                }
            }
            log::debug!("capture {}: reader stopped", task_url);
        });

        Self {
            url,
            frames,
            cancel,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Decoded frames ready to be taken without waiting.
    pub fn queued(&self) -> usize {
        self.frames.len()
    }

    /// Next frame in decode order. Cancel safe.
    pub async fn next_frame(&mut self) -> anyhow::Result<RgbFrame> {
        match self.frames.recv().await {
            Some(result) => result,
            None => Err(anyhow::anyhow!("capture {}: reader stopped", self.url)),
        }
    }

    /// Ask the reader to exit. A read in progress is not interrupted; the
    /// capture is closed once it returns.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.frames.close();
    }
}

impl Drop for CaptureTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
