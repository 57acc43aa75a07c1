use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::media::{
    diagnostics::SharedDiagnostics,
    source::FrameSource,
    supervisor::{ConnectionSupervisor, SupervisorConfig, SupervisorStats},
    types::{EncodedFrame, StreamEndpoint},
};

type SupervisorRun = Pin<Box<dyn Future<Output = SupervisorStats> + Send>>;

/// Entry point for per-viewer relays.
pub struct StreamRelay;

impl StreamRelay {
    /// Prepare an independent supervisor for one consumer and return its
    /// frames. Nothing connects until the stream is first polled.
    ///
    /// The sequence never ends on its own. Dropping it, calling
    /// [`RelayStream::close`], or cancelling `parent` stops the supervisor,
    /// which then releases its connection.
    pub fn open<S: FrameSource>(
        source: S,
        endpoint: StreamEndpoint,
        config: &SupervisorConfig,
        diagnostics: SharedDiagnostics,
        parent: &CancellationToken,
    ) -> RelayStream {
        let cancel = parent.child_token();
        // capacity 1: the supervisor is never more than one frame ahead
        let (tx, rx) = mpsc::channel(1);
        let supervisor =
            ConnectionSupervisor::new(source, endpoint, config, diagnostics, cancel.clone());

        RelayStream {
            id: supervisor.id(),
            rx,
            cancel,
            pending: Some(Box::pin(supervisor.run(tx))),
            task: None,
        }
    }
}

pub struct RelayStream {
    id: u64,
    rx: mpsc::Receiver<EncodedFrame>,
    cancel: CancellationToken,
    // supervisor not yet spawned
    pending: Option<SupervisorRun>,
    task: Option<JoinHandle<SupervisorStats>>,
}

impl RelayStream {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the supervisor and wait until it has released its connection.
    /// `None` if it never started or its task failed.
    pub async fn close(mut self) -> Option<SupervisorStats> {
        self.cancel.cancel();
        self.rx.close();
        self.pending = None;
        let task = self.task.take()?;
        match task.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                log::error!("relay {}: supervisor task failed: {}", self.id, e);
                None
            }
        }
    }
}

impl Stream for RelayStream {
    type Item = EncodedFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(run) = this.pending.take() {
            this.task = Some(tokio::spawn(run));
        }
        this.rx.poll_recv(cx)
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;
    use crate::media::testing::{MockSource, RecordingDiagnostics, endpoint, test_config};

    fn open(
        source: &MockSource,
        diagnostics: &std::sync::Arc<RecordingDiagnostics>,
        root: &CancellationToken,
    ) -> RelayStream {
        StreamRelay::open(
            source.clone(),
            endpoint(),
            &test_config(),
            diagnostics.shared(),
            root,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_yields_jpeg_frames() {
        let source = MockSource::new();
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let mut relay = open(&source, &diagnostics, &root);

        for _ in 0..3 {
            let frame = relay.next().await.unwrap();
            assert_eq!(&frame.data()[..2], &[0xFF, 0xD8]);
        }

        let stats = relay.close().await.unwrap();
        assert!(stats.frames_emitted >= 3);
        assert_eq!(stats.releases, 1);
        assert_eq!(source.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_open_gets_its_own_connection() {
        let source = MockSource::new();
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let mut first = open(&source, &diagnostics, &root);
        let mut second = open(&source, &diagnostics, &root);
        assert_ne!(first.id(), second.id());

        first.next().await.unwrap();
        second.next().await.unwrap();
        assert_eq!(source.connects(), 2);
        assert_eq!(source.open_connections(), 2);

        first.close().await;
        assert_eq!(source.open_connections(), 1);
        second.close().await;
        assert_eq!(source.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_relay_releases_connection() {
        let source = MockSource::new().hang_when_idle();
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let mut relay = open(&source, &diagnostics, &root);

        let waited = tokio::time::timeout(Duration::from_secs(1), relay.next()).await;
        assert!(waited.is_err());
        assert_eq!(source.open_connections(), 1);
        drop(relay);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.open_connections(), 0);
        assert_eq!(source.release_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_ends_stream() {
        let source = MockSource::new();
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let mut relay = open(&source, &diagnostics, &root);

        relay.next().await.unwrap();
        root.cancel();

        // at most the one buffered frame remains, then the stream ends
        let mut rest = 0;
        while relay.next().await.is_some() {
            rest += 1;
        }
        assert!(rest <= 1);
        assert_eq!(source.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_upstream_stalls_without_ending() {
        let source = MockSource::new().fail_connects(usize::MAX);
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let mut relay = open(&source, &diagnostics, &root);

        let waited = tokio::time::timeout(Duration::from_secs(60), relay.next()).await;
        assert!(waited.is_err(), "relay must stay open while reconnecting");
        assert!(source.connects() >= 12);
        relay.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_connects_on_first_poll() {
        let source = MockSource::new();
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let mut relay = open(&source, &diagnostics, &root);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.connects(), 0);
        assert_eq!(source.reads(), 0);

        relay.next().await.unwrap();
        assert_eq!(source.connects(), 1);
        assert!(source.reads() >= 1);
        relay.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closing_unpolled_relay_never_connects() {
        let source = MockSource::new();
        let diagnostics = RecordingDiagnostics::new();
        let root = CancellationToken::new();
        let relay = open(&source, &diagnostics, &root);

        assert_eq!(relay.close().await, None);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.connects(), 0);
    }
}
