//! Relay diagnostics. Components report what happens to an injected sink
//! instead of touching a global logger, so tests can observe the exact
//! sequence of events.

use std::{sync::Arc, time::Duration};

use crate::media::supervisor::SupervisorState;

/// Why a supervisor stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The relay was cancelled (client gone, relay closed, process shutdown).
    Cancelled,
    /// Nobody is consuming the output any more.
    OutputClosed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RelayEvent {
    StateChanged {
        from: SupervisorState,
        to: SupervisorState,
    },
    Connected {
        endpoint: String,
    },
    ConnectFailed {
        error: String,
    },
    ReadFailed {
        error: String,
    },
    BackingOff {
        delay: Duration,
    },
    FramesDiscarded {
        count: usize,
    },
    FrameDropped {
        error: String,
    },
    FrameEmitted {
        bytes: usize,
    },
    Released,
    Stopped {
        reason: StopReason,
    },
}

pub trait Diagnostics: Send + Sync {
    fn record(&self, relay: u64, event: RelayEvent);
}

pub type SharedDiagnostics = Arc<dyn Diagnostics>;

/// Forwards events to the `log` facade. Per-frame events go out at debug
/// level so they can be switched on with `RUST_LOG`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogDiagnostics;

impl LogDiagnostics {
    pub fn shared() -> SharedDiagnostics {
        Arc::new(Self)
    }
}

impl Diagnostics for LogDiagnostics {
    fn record(&self, relay: u64, event: RelayEvent) {
        match event {
            RelayEvent::StateChanged { from, to } => {
                log::debug!("relay {}: {:?} -> {:?}", relay, from, to)
            }
            RelayEvent::Connected { endpoint } => {
                log::info!("relay {}: connected to {}", relay, endpoint)
            }
            RelayEvent::ConnectFailed { error } => {
                log::error!("relay {}: could not open upstream: {}", relay, error)
            }
            RelayEvent::ReadFailed { error } => {
                log::warn!("relay {}: failed to read frame, reconnecting: {}", relay, error)
            }
            RelayEvent::BackingOff { delay } => {
                log::info!("relay {}: retrying in {:?}", relay, delay)
            }
            RelayEvent::FramesDiscarded { count } => {
                log::debug!("relay {}: discarded {} stale frames", relay, count)
            }
            RelayEvent::FrameDropped { error } => {
                log::warn!("relay {}: dropped frame: {}", relay, error)
            }
            RelayEvent::FrameEmitted { bytes } => {
                log::debug!("relay {}: emitted frame of {} bytes", relay, bytes)
            }
            RelayEvent::Released => log::debug!("relay {}: upstream released", relay),
            RelayEvent::Stopped { reason } => log::info!("relay {}: stopped ({:?})", relay, reason),
        }
    }
}
