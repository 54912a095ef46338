//! Delimiter-based line framing over the inbound byte stream.
//!
//! Grounded on `tokio_util::codec::Decoder` — the same crate and `codec`
//! feature `duesee-imap-codec`'s `tokio` feature enables for an equivalent
//! framing job on IMAP. Frames are split on `\r\n` with the delimiter
//! stripped; lines exceeding `max_line_length` fail the session with
//! [`FailureType::InvalidServerResponse`].

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::{Error, FailureType};

/// A `\r\n`-delimited line decoder with a configurable maximum line length.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_line_length: usize,
}

impl LineCodec {
    /// Creates a codec that fails lines longer than `max_line_length` bytes
    /// (not counting the `\r\n` terminator).
    #[must_use]
    pub const fn new(max_line_length: usize) -> Self {
        Self { max_line_length }
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(pos) = find_crlf(src) {
            let line = src.split_to(pos);
            src.advance(2); // consume the CRLF itself
            let text = String::from_utf8_lossy(&line).into_owned();
            return Ok(Some(text));
        }

        if src.len() > self.max_line_length {
            return Err(Error::new(FailureType::InvalidServerResponse).with_detail(format!(
                "server line exceeded {} bytes without a terminator",
                self.max_line_length
            )));
        }

        Ok(None)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decode(buf)
    }
}

fn find_crlf(buf: &BytesMut) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_line() {
        let mut codec = LineCodec::new(512);
        let mut buf = BytesMut::from(&b"220 ok\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line, "220 ok");
        assert!(buf.is_empty());
    }

    #[test]
    fn returns_none_without_terminator() {
        let mut codec = LineCodec::new(512);
        let mut buf = BytesMut::from(&b"220 o"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decodes_multiple_queued_lines_one_at_a_time() {
        let mut codec = LineCodec::new(512);
        let mut buf = BytesMut::from(&b"250-a\r\n250 b\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "250-a");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "250 b");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn fails_when_line_exceeds_max_length() {
        let mut codec = LineCodec::new(8);
        let mut buf = BytesMut::from(&b"this line has no terminator yet"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.failure_type(), FailureType::InvalidServerResponse);
    }
}
