//! Relay core: pull frames from one upstream, turn them into JPEGs and hand
//! them to HTTP responses.
//!
//! Data Flow:
//! ```text
//!  FrameSource ──► ConnectionSupervisor ──► FramePipeline ──► FrameOutput
//!  (connect/read)   (reconnect, pacing)      (resize, JPEG)        │
//!                                                    ┌─────────────┴──────────┐
//!                                                    ▼                        ▼
//!                                            StreamRelay (mpsc)      SharedRelay (broadcast)
//!                                            one per viewer          one for all viewers
//! ```

pub mod diagnostics;
pub mod error;
pub mod multipart;
pub mod pacing;
pub mod pipeline;
pub mod relay;
pub mod shared;
pub mod source;
pub mod stream;
pub mod supervisor;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
