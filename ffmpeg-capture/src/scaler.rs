use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling::{Context, flag::Flags};

/// Pixel format converter bound to one source geometry.
pub struct Scaler {
    context: Context,
    source: (Pixel, u32, u32),
}

impl Scaler {
    /// Converter from `format`/`width`/`height` to RGB24 at the same size.
    pub fn to_rgb24(format: Pixel, width: u32, height: u32) -> anyhow::Result<Self> {
        let context = Context::get(
            format,
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            Flags::BILINEAR,
        )?;
        Ok(Self {
            context,
            source: (format, width, height),
        })
    }

    /// Whether this scaler was built for frames of the given shape.
    pub fn matches(&self, format: Pixel, width: u32, height: u32) -> bool {
        self.source == (format, width, height)
    }

    pub fn run(
        &mut self,
        frame: &ffmpeg_next::frame::Video,
        dst: &mut ffmpeg_next::frame::Video,
    ) -> anyhow::Result<()> {
        self.context.run(frame, dst).map_err(|e| e.into())
    }
}

unsafe impl Send for Scaler {}
