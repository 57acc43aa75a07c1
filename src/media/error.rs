use std::sync::Arc;

/// Failures of the acquisition loop. None of them is fatal to a relay: the
/// first two send the supervisor into backoff, the last drops one frame.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RelayError {
    #[error("upstream not opened: {0:#}")]
    NotOpened(Arc<anyhow::Error>),

    #[error("frame read failed: {0:#}")]
    ReadFailed(Arc<anyhow::Error>),

    #[error("frame transform failed: {0:#}")]
    TransformFailed(Arc<anyhow::Error>),
}

impl RelayError {
    pub fn not_opened(err: impl Into<anyhow::Error>) -> Self {
        Self::NotOpened(Arc::new(err.into()))
    }

    pub fn read_failed(err: impl Into<anyhow::Error>) -> Self {
        Self::ReadFailed(Arc::new(err.into()))
    }

    pub fn transform_failed(err: impl Into<anyhow::Error>) -> Self {
        Self::TransformFailed(Arc::new(err.into()))
    }
}
