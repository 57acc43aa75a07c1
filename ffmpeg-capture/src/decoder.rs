use ffmpeg_next::{Packet, Rational, codec::Parameters, frame::Video};

use crate::input::VideoTrack;

/// Video decoder fed with packets of one track.
pub struct Decoder {
    track: VideoTrack,
    inner: ffmpeg_next::codec::decoder::Video,
    time_base: Rational,
}

impl Decoder {
    pub fn new(track: VideoTrack, parameters: Parameters) -> anyhow::Result<Self> {
        if parameters.medium() != ffmpeg_next::media::Type::Video {
            anyhow::bail!("stream {} is not video", track.index);
        }

        let mut context = ffmpeg_next::codec::Context::from_parameters(parameters)?;
        unsafe {
            (*context.as_mut_ptr()).time_base = track.time_base.into();
        }
        let inner = context.decoder().video()?;
        if inner.format() == ffmpeg_next::format::Pixel::None || inner.width() == 0 || inner.height() == 0 {
            anyhow::bail!("stream {}: missing codec parameters", track.index);
        }

        let time_base = inner.time_base();
        Ok(Self {
            track,
            inner,
            time_base,
        })
    }

    pub fn track(&self) -> VideoTrack {
        self.track
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn send_packet(&mut self, mut packet: Packet) -> anyhow::Result<()> {
        packet.rescale_ts(self.track.time_base, self.time_base);
        self.inner.send_packet(&packet)?;
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()?;
        Ok(())
    }

    /// One decoded picture, or `None` while the decoder wants more input.
    pub fn receive_frame(&mut self) -> anyhow::Result<Option<Video>> {
        let mut frame = Video::empty();
        match self.inner.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(ffmpeg_next::Error::Other { errno }) if errno == ffmpeg_next::util::error::EAGAIN => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
