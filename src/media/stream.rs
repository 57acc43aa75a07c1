use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
};

use futures::Stream;
use tokio::sync::{broadcast, mpsc};

use crate::media::types::EncodedFrame;

/// Boxed sequence of encoded frames handed to the HTTP layer.
pub type FrameStream = Pin<Box<dyn Stream<Item = EncodedFrame> + Send>>;

/// The consumer side of a relay is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputClosed;

/// Where a supervisor delivers encoded frames.
pub trait FrameOutput: Send + 'static {
    /// Hand over one frame, waiting while the consumer is busy.
    fn emit(
        &mut self,
        frame: EncodedFrame,
    ) -> impl Future<Output = Result<(), OutputClosed>> + Send;

    /// True once nobody will ever read another frame.
    fn is_closed(&self) -> bool;
}

impl FrameOutput for mpsc::Sender<EncodedFrame> {
    fn emit(
        &mut self,
        frame: EncodedFrame,
    ) -> impl Future<Output = Result<(), OutputClosed>> + Send {
        async move { self.send(frame).await.map_err(|_| OutputClosed) }
    }

    fn is_closed(&self) -> bool {
        mpsc::Sender::is_closed(self)
    }
}

/// Fan-out output: every subscriber owns its own bounded queue and only
/// ever reads from it; this output is the single writer.
pub struct BroadcastOutput {
    tx: broadcast::Sender<EncodedFrame>,
    active: Arc<Mutex<bool>>,
}

impl BroadcastOutput {
    /// `active` is cleared, under its lock, when the last subscriber is gone.
    pub fn new(tx: broadcast::Sender<EncodedFrame>, active: Arc<Mutex<bool>>) -> Self {
        Self { tx, active }
    }

    fn publish(&self, frame: EncodedFrame) -> Result<(), OutputClosed> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if self.tx.receiver_count() == 0 {
            *active = false;
            return Err(OutputClosed);
        }
        // Only fails without receivers, which the lock rules out.
        self.tx.send(frame).map(|_| ()).map_err(|_| OutputClosed)
    }
}

impl FrameOutput for BroadcastOutput {
    fn emit(
        &mut self,
        frame: EncodedFrame,
    ) -> impl Future<Output = Result<(), OutputClosed>> + Send {
        std::future::ready(self.publish(frame))
    }

    fn is_closed(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if self.tx.receiver_count() == 0 {
            *active = false;
        }
        !*active
    }
}
