use std::collections::VecDeque;

use crate::{decoder::Decoder, frame::RgbFrame, input::AvInput, scaler::Scaler};

/// An open upstream: demuxer plus video decoder. A packet can decode into
/// several pictures; the extras wait here until asked for.
pub struct Capture {
    url: String,
    input: AvInput,
    decoder: Decoder,
    scaler: Option<Scaler>,
    queued: VecDeque<RgbFrame>,
    eof: bool,
}

impl Capture {
    /// Open `url` and prepare a decoder for its best video stream. Blocks
    /// until the transport has connected and probed the stream.
    pub fn open(url: &str, format: Option<&str>) -> anyhow::Result<Self> {
        let input = AvInput::open(url, format, None)?;
        let decoder = Decoder::new(input.video(), input.video_parameters()?)?;
        log::debug!(
            "capture {}: video stream {}, {}x{} @ {:.2} fps",
            url,
            decoder.track().index,
            decoder.width(),
            decoder.height(),
            decoder.track().fps()
        );

        Ok(Self {
            url: url.to_string(),
            input,
            decoder,
            scaler: None,
            queued: VecDeque::new(),
            eof: false,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next decoded frame in RGB24. Blocks on the network; end of stream and
    /// transport errors are both reported as errors since a live source
    /// never ends normally.
    pub fn read_frame(&mut self) -> anyhow::Result<RgbFrame> {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Ok(frame);
            }
            if self.eof {
                anyhow::bail!("end of stream: {}", self.url);
            }

            match self.input.next_video_packet()? {
                Some(packet) => {
                    if let Err(e) = self.decoder.send_packet(packet) {
                        // Corrupt packets are common right after joining a live stream.
                        log::warn!("capture {}: send packet error: {}", self.url, e);
                        continue;
                    }
                }
                None => {
                    if let Err(e) = self.decoder.send_eof() {
                        log::warn!("capture {}: decoder send eof error: {}", self.url, e);
                    }
                    self.eof = true;
                }
            }

            self.drain_decoder()?;
        }
    }

    fn drain_decoder(&mut self) -> anyhow::Result<()> {
        while let Some(decoded) = self.decoder.receive_frame()? {
            let frame = RgbFrame::convert(&decoded, &mut self.scaler)?;
            self.queued.push_back(frame);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "capture_test.rs"]
mod capture_test;
