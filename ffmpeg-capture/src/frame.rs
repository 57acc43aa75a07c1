use std::{
    fmt::{Display, Formatter},
    time::Instant,
};

use bytes::Bytes;

use crate::scaler::Scaler;

/// Tightly packed RGB24 picture (`width * height * 3` bytes, no row padding).
#[derive(Clone, Debug)]
pub struct RgbFrame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub pts: Option<i64>,
    pub decoded_at: Instant,
}

impl RgbFrame {
    /// Convert a decoded frame of any pixel format, rebuilding `scaler` when
    /// the source geometry changes mid-stream.
    pub fn convert(
        frame: &ffmpeg_next::frame::Video,
        scaler: &mut Option<Scaler>,
    ) -> anyhow::Result<Self> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());
        if width == 0 || height == 0 {
            anyhow::bail!("invalid video size {}x{}", width, height);
        }

        let rebuild = match scaler.as_ref() {
            Some(s) => !s.matches(format, width, height),
            None => true,
        };
        if rebuild {
            *scaler = Some(Scaler::to_rgb24(format, width, height)?);
        }
        let Some(converter) = scaler.as_mut() else {
            anyhow::bail!("scaler unavailable");
        };

        let mut rgb = ffmpeg_next::frame::Video::empty();
        converter.run(frame, &mut rgb)?;

        let data = pack_rows(rgb.data(0), rgb.stride(0), width as usize * 3, height as usize)?;
        Ok(Self {
            data: Bytes::from(data),
            width,
            height,
            pts: frame.pts(),
            decoded_at: Instant::now(),
        })
    }
}

/// Strip per-row padding from a plane with `stride` bytes per row.
pub fn pack_rows(
    plane: &[u8],
    stride: usize,
    row_len: usize,
    rows: usize,
) -> anyhow::Result<Vec<u8>> {
    if stride < row_len {
        anyhow::bail!("stride {} shorter than row {}", stride, row_len);
    }
    if rows > 0 && plane.len() < stride * (rows - 1) + row_len {
        anyhow::bail!("plane of {} bytes too small for {} rows", plane.len(), rows);
    }
    if stride == row_len {
        return Ok(plane[..row_len * rows].to_vec());
    }

    let mut packed = Vec::with_capacity(row_len * rows);
    for row in 0..rows {
        let start = row * stride;
        packed.extend_from_slice(&plane[start..start + row_len]);
    }
    Ok(packed)
}

impl Display for RgbFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "RgbFrame {}x{} data_len: {}, pts: {:?}",
            self.width,
            self.height,
            self.data.len(),
            self.pts
        )
    }
}
