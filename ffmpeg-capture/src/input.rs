use std::{ffi::CString, path::Path};

use ffmpeg_next::{Dictionary, Packet, Rational, codec::Parameters, format::format::Format};

/// Where the decodable video lives inside an input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoTrack {
    pub index: usize,
    pub time_base: Rational,
    pub frame_rate: Rational,
}

impl VideoTrack {
    /// 0.0 when the container does not advertise a rate, which is common
    /// for live FLV.
    pub fn fps(&self) -> f64 {
        if self.frame_rate.denominator() == 0 {
            return 0.0;
        }
        f64::from(self.frame_rate)
    }
}

/// Demuxer over a URL or file, bound to its best video stream. Every call
/// blocks on the underlying transport.
pub struct AvInput {
    inner: ffmpeg_next::format::context::Input,
    video: VideoTrack,
}

impl AvInput {
    // av_find_input_format, e.g. "flv" or "live_flv"
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            anyhow::bail!("input format not found: {}", name);
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    pub fn open(url: &str, format: Option<&str>, options: Option<Dictionary>) -> anyhow::Result<Self> {
        let path = Path::new(url);
        let inner = match format {
            Some(name) => {
                let format = Format::Input(Self::find_input_format(name)?);
                let options = options.unwrap_or_else(Dictionary::new);
                ffmpeg_next::format::open_with(path, &format, options)?.input()
            }
            None => match options {
                Some(options) => ffmpeg_next::format::input_with_dictionary(path, options)?,
                None => ffmpeg_next::format::input(path)?,
            },
        };

        let video = inner
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .map(|stream| VideoTrack {
                index: stream.index(),
                time_base: stream.time_base(),
                frame_rate: stream.avg_frame_rate(),
            })
            .ok_or_else(|| anyhow::anyhow!("no video stream in {}", url))?;

        Ok(Self { inner, video })
    }

    pub fn video(&self) -> VideoTrack {
        self.video
    }

    pub fn video_parameters(&self) -> anyhow::Result<Parameters> {
        self.inner
            .stream(self.video.index)
            .map(|stream| stream.parameters())
            .ok_or_else(|| anyhow::anyhow!("video stream {} vanished", self.video.index))
    }

    /// Next packet of the video stream, `None` at end of input. Packets of
    /// other streams are skipped; any other read error is returned.
    pub fn next_video_packet(&mut self) -> anyhow::Result<Option<Packet>> {
        loop {
            let mut packet = Packet::empty();
            if end_of_input(packet.read(&mut self.inner))? {
                return Ok(None);
            }
            if packet.stream() == self.video.index {
                return Ok(Some(packet));
            }
        }
    }
}

/// `Eof` ends the input. Everything else, timeouts and I/O errors from a
/// dead socket included, is a failed read.
fn end_of_input(result: Result<(), ffmpeg_next::Error>) -> anyhow::Result<bool> {
    match result {
        Ok(()) => Ok(false),
        Err(ffmpeg_next::Error::Eof) => Ok(true),
        Err(e) => Err(anyhow::anyhow!("read packet: {}", e)),
    }
}
