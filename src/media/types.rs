use std::fmt::{Display, Formatter};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Upstream location plus an optional FFmpeg input format name ("flv",
/// "live_flv", ...). `None` lets FFmpeg probe the stream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEndpoint {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backend: Option<String>,
}

impl StreamEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backend: None,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }
}

impl Display for StreamEndpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match &self.backend {
            Some(backend) => write!(f, "{} ({})", self.url, backend),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Decoded RGB24 picture, `width * height * 3` bytes.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub captured_at: Instant,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    /// Single-colour frame, handy for synthetic sources.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self::new(data, width, height)
    }
}

impl From<ffmpeg_capture::RgbFrame> for RawFrame {
    fn from(frame: ffmpeg_capture::RgbFrame) -> Self {
        Self {
            data: frame.data,
            width: frame.width,
            height: frame.height,
            captured_at: Instant::from_std(frame.decoded_at),
        }
    }
}

impl Display for RawFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "RawFrame {{ {}x{}, data: {} }}",
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// A complete JPEG image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    data: Bytes,
}

impl EncodedFrame {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// What `read_frame` does when decoded frames pile up behind the one it is
/// about to return.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrainPolicy {
    /// Return frames in arrival order, never dropping any.
    #[default]
    Next,
    /// Skip queued frames and return the freshest one.
    Latest,
}

/// Output geometry and JPEG settings for the frame pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            jpeg_quality: 90,
        }
    }
}
