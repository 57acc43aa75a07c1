use bytes::Bytes;
use image::{RgbImage, imageops::FilterType};

use crate::media::{
    error::RelayError,
    types::{EncodedFrame, PipelineConfig, RawFrame},
};

/// Resize + JPEG encode. Stateless apart from its settings, so one copy is
/// moved into the blocking pool per frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramePipeline {
    config: PipelineConfig,
}

impl FramePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the whole transform off the async workers.
    pub async fn process(&self, frame: RawFrame) -> Result<EncodedFrame, RelayError> {
        let pipeline = *self;
        tokio::task::spawn_blocking(move || pipeline.transform(frame))
            .await
            .map_err(RelayError::transform_failed)?
    }

    pub fn transform(&self, frame: RawFrame) -> Result<EncodedFrame, RelayError> {
        let resized = self.resize(frame)?;
        self.encode(&resized)
    }

    /// Scale to the configured output size with bilinear filtering.
    pub fn resize(&self, frame: RawFrame) -> Result<RawFrame, RelayError> {
        let (width, height) = (self.config.width, self.config.height);
        if width == 0 || height == 0 {
            return Err(RelayError::transform_failed(anyhow::anyhow!(
                "invalid output size {}x{}",
                width,
                height
            )));
        }

        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.width == 0 || frame.height == 0 || frame.data.len() != expected {
            return Err(RelayError::transform_failed(anyhow::anyhow!(
                "frame {}x{} carries {} bytes, expected {}",
                frame.width,
                frame.height,
                frame.data.len(),
                expected
            )));
        }

        if frame.width == width && frame.height == height {
            return Ok(frame);
        }

        let source = RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or_else(|| RelayError::transform_failed(anyhow::anyhow!("bad RGB buffer")))?;
        let scaled = image::imageops::resize(&source, width, height, FilterType::Triangle);

        Ok(RawFrame {
            data: Bytes::from(scaled.into_raw()),
            width,
            height,
            captured_at: frame.captured_at,
        })
    }

    pub fn encode(&self, frame: &RawFrame) -> Result<EncodedFrame, RelayError> {
        let width = u16::try_from(frame.width).map_err(RelayError::transform_failed)?;
        let height = u16::try_from(frame.height).map_err(RelayError::transform_failed)?;
        let quality = self.config.jpeg_quality.clamp(1, 100);

        let mut buffer = Vec::with_capacity(frame.data.len() / 8);
        let encoder = jpeg_encoder::Encoder::new(&mut buffer, quality);
        encoder
            .encode(&frame.data, width, height, jpeg_encoder::ColorType::Rgb)
            .map_err(RelayError::transform_failed)?;

        Ok(EncodedFrame::new(buffer))
    }
}
