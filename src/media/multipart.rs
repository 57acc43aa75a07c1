//! `multipart/x-mixed-replace` framing for MJPEG over HTTP.

use std::convert::Infallible;

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::media::types::EncodedFrame;

pub const BOUNDARY: &str = "frame";
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEAD: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TAIL: &[u8] = b"\r\n";

/// One body part: boundary line, part header, blank line, JPEG, CRLF.
pub fn part(frame: &EncodedFrame) -> Bytes {
    let mut buf = BytesMut::with_capacity(PART_HEAD.len() + frame.len() + PART_TAIL.len());
    buf.put_slice(PART_HEAD);
    buf.put_slice(frame.data());
    buf.put_slice(PART_TAIL);
    buf.freeze()
}

/// Body stream for a response. There is no closing delimiter; the body ends
/// only when `frames` does.
pub fn body_stream<S>(frames: S) -> impl Stream<Item = Result<Bytes, Infallible>> + Send
where
    S: Stream<Item = EncodedFrame> + Send,
{
    frames.map(|frame| Ok(part(&frame)))
}
