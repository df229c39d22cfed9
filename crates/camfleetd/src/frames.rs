//! Frame extraction from a worker's stdout byte stream.
//!
//! Workers emit MJPEG: raw JPEG images back to back, no container. The
//! decoder splits that stream on the JPEG SOI/EOI markers, keeping partial
//! trailing data buffered until the rest arrives, so a frame split across
//! reads decodes identically to one delivered whole. Inside entropy-coded
//! JPEG data every 0xFF byte is zero-stuffed, so a bare SOI/EOI pair only
//! occurs as an actual marker.

use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// JPEG start-of-image marker.
const SOI: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker.
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Metadata delivered alongside each decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMeta {
    /// The camera's stream host; keys the snapshot directory.
    pub device_ip: String,

    /// 1-based frame counter within the worker's lifetime.
    pub sequence: u64,
}

/// Callback invoked for every frame a worker produces.
///
/// Called from the worker's frame-pump task; must not block. Slow work goes
/// through [`crate::sink::AsyncSink`].
pub type FrameCallback = Arc<dyn Fn(Bytes, FrameMeta) + Send + Sync>;

/// Splits a concatenated-JPEG stream into whole frames.
#[derive(Debug, Default)]
pub struct JpegFrameDecoder {
    /// How far EOI scanning has progressed, so buffered-but-incomplete
    /// frames are not rescanned from the start on every read.
    scanned: usize,
}

impl JpegFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for JpegFrameDecoder {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        // Align the buffer to the next SOI, discarding leading garbage
        // (stray stderr bytes, truncated first frame after a mid-stream
        // attach). A trailing 0xFF may be half a split marker; keep it.
        if self.scanned == 0 {
            match find_marker(src, SOI, 0) {
                Some(0) => {}
                Some(pos) => src.advance(pos),
                None => {
                    let keep = usize::from(src.last() == Some(&0xFF));
                    let len = src.len();
                    src.advance(len - keep);
                    return Ok(None);
                }
            }
        }

        // Scan for the closing EOI, starting past the SOI.
        let from = self.scanned.max(SOI.len());
        match find_marker(src, EOI, from) {
            Some(end) => {
                self.scanned = 0;
                Ok(Some(src.split_to(end + EOI.len()).freeze()))
            }
            None => {
                // Remember progress; the final byte may be half an EOI.
                self.scanned = src.len().saturating_sub(1).max(SOI.len());
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        // A worker killed mid-frame leaves a truncated tail; discard it
        // rather than surface a framing error at EOF.
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                src.clear();
                self.scanned = 0;
                Ok(None)
            }
        }
    }
}

/// First position of a two-byte marker at or after `from`.
fn find_marker(buf: &BytesMut, marker: [u8; 2], from: usize) -> Option<usize> {
    if buf.len() < from + marker.len() {
        return None;
    }
    buf[from..]
        .windows(marker.len())
        .position(|w| w == marker)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(payload: &[u8]) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&EOI);
        frame
    }

    fn decode_all(decoder: &mut JpegFrameDecoder, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = decoder.decode(buf) {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_frame() {
        let mut decoder = JpegFrameDecoder::new();
        let mut buf = BytesMut::from(&jpeg(b"abc")[..]);

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &jpeg(b"abc")[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_two_frames_one_feed() {
        let mut decoder = JpegFrameDecoder::new();
        let mut bytes = jpeg(b"one");
        bytes.extend_from_slice(&jpeg(b"two"));
        let mut buf = BytesMut::from(&bytes[..]);

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &jpeg(b"one")[..]);
        assert_eq!(&frames[1][..], &jpeg(b"two")[..]);
    }

    #[test]
    fn test_frame_split_across_feeds() {
        let mut decoder = JpegFrameDecoder::new();
        let whole = jpeg(b"split-me");
        let mut buf = BytesMut::new();

        // Feed byte by byte: exercises every split point, including a split
        // in the middle of the SOI and EOI markers themselves.
        let mut frames = Vec::new();
        for byte in &whole {
            buf.extend_from_slice(&[*byte]);
            frames.extend(decode_all(&mut decoder, &mut buf));
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &whole[..]);
    }

    #[test]
    fn test_garbage_before_soi_is_skipped() {
        let mut decoder = JpegFrameDecoder::new();
        let mut bytes = b"noise".to_vec();
        bytes.extend_from_slice(&jpeg(b"frame"));
        let mut buf = BytesMut::from(&bytes[..]);

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &jpeg(b"frame")[..]);
    }

    #[test]
    fn test_incomplete_frame_stays_buffered() {
        let mut decoder = JpegFrameDecoder::new();
        let mut buf = BytesMut::from(&SOI[..]);
        buf.extend_from_slice(b"no end marker yet");

        assert!(decode_all(&mut decoder, &mut buf).is_empty());

        buf.extend_from_slice(&EOI);
        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_minimal_frame() {
        // SOI immediately followed by EOI
        let mut decoder = JpegFrameDecoder::new();
        let mut bytes = SOI.to_vec();
        bytes.extend_from_slice(&EOI);
        let mut buf = BytesMut::from(&bytes[..]);

        let frames = decode_all(&mut decoder, &mut buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 4);
    }
}
