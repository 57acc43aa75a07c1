//! Blocking FFmpeg capture: demux a live URL, decode its video stream and hand
//! out RGB24 frames one at a time.

/// Registers FFmpeg components (formats, network protocols). Call once at
/// startup before opening any input.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::format::network::init();
    Ok(())
}

pub mod capture;
pub mod decoder;
pub mod frame;
pub mod input;
pub mod scaler;
pub mod task;

pub use capture::Capture;
pub use frame::RgbFrame;
pub use task::CaptureTask;
