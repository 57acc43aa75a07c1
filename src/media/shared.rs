use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::media::{
    diagnostics::SharedDiagnostics,
    source::FrameSource,
    stream::{BroadcastOutput, FrameStream},
    supervisor::{ConnectionSupervisor, SupervisorConfig},
    types::{EncodedFrame, StreamEndpoint},
};

/// Frames each viewer may fall behind before it starts skipping.
pub const VIEWER_QUEUE_CAPACITY: usize = 2;

/// One upstream connection shared by every viewer.
///
/// The supervisor starts with the first subscriber and stops once it finds
/// nobody listening; the next subscriber starts a fresh one.
pub struct SharedRelay<S: FrameSource + Clone> {
    source: S,
    endpoint: StreamEndpoint,
    config: SupervisorConfig,
    diagnostics: SharedDiagnostics,
    cancel: CancellationToken,
    tx: broadcast::Sender<EncodedFrame>,
    // true while a supervisor is publishing into `tx`
    active: Arc<Mutex<bool>>,
}

impl<S: FrameSource + Clone> SharedRelay<S> {
    pub fn new(
        source: S,
        endpoint: StreamEndpoint,
        config: SupervisorConfig,
        diagnostics: SharedDiagnostics,
        parent: &CancellationToken,
    ) -> Self {
        let (tx, _) = broadcast::channel(VIEWER_QUEUE_CAPACITY);
        Self {
            source,
            endpoint,
            config,
            diagnostics,
            cancel: parent.child_token(),
            tx,
            active: Arc::new(Mutex::new(false)),
        }
    }

    /// Add a viewer. A viewer that lags skips the frames it missed.
    pub fn subscribe(&self) -> FrameStream {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let rx = self.tx.subscribe();
        if !*active && !self.cancel.is_cancelled() {
            *active = true;
            let supervisor = ConnectionSupervisor::new(
                self.source.clone(),
                self.endpoint.clone(),
                &self.config,
                self.diagnostics.clone(),
                self.cancel.clone(),
            );
            log::info!("shared relay: starting supervisor {}", supervisor.id());
            let output = BroadcastOutput::new(self.tx.clone(), self.active.clone());
            tokio::spawn(supervisor.run(output));
        }
        Box::pin(tokio_stream::StreamExt::filter_map(
            BroadcastStream::new(rx),
            |frame| frame.ok(),
        ))
    }

    pub fn viewers(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
