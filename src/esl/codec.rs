// src/esl/codec.rs
//! Framing for the event socket wire format.
//!
//! A frame is a block of header lines closed by an empty line, optionally
//! followed by exactly `Content-Length` bytes of body.

use crate::error::EslError;
use crate::esl::event::EslEvent;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

pub const MAX_HEADER_BYTES: usize = 64 * 1024;
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct EslCodec {
    // Header block waiting for its body.
    pending: Option<(EslEvent, usize)>,
}

impl EslCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Position just past the blank line ending the header block, if present.
fn header_end(buf: &[u8]) -> Option<usize> {
    let mut line_start = 0;
    for (i, byte) in buf.iter().enumerate() {
        if *byte != b'\n' {
            continue;
        }
        let line = &buf[line_start..i];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() && line_start > 0 {
            return Some(i + 1);
        }
        line_start = i + 1;
    }
    None
}

impl Decoder for EslCodec {
    type Item = EslEvent;
    type Error = EslError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<EslEvent>, EslError> {
        if self.pending.is_none() {
            // Stray line breaks between frames
            while matches!(src.first(), Some(b'\n') | Some(b'\r')) {
                src.advance(1);
            }

            let end = match header_end(src) {
                Some(end) => end,
                None if src.len() > MAX_HEADER_BYTES => {
                    return Err(EslError::Protocol(format!(
                        "header block exceeds {} bytes",
                        MAX_HEADER_BYTES
                    )))
                }
                None => return Ok(None),
            };

            let header_bytes = src.split_to(end);
            let header_text = String::from_utf8_lossy(&header_bytes);
            let envelope = EslEvent::parse(&header_text);

            let body_len = envelope.content_length()?.unwrap_or(0);

            if body_len > MAX_BODY_BYTES {
                return Err(EslError::Protocol(format!(
                    "Content-Length {} exceeds {} bytes",
                    body_len, MAX_BODY_BYTES
                )));
            }

            if body_len == 0 {
                return Ok(Some(envelope));
            }

            self.pending = Some((envelope, body_len));
        }

        let body_len = match &self.pending {
            Some((_, len)) => *len,
            None => return Ok(None),
        };

        if src.len() < body_len {
            src.reserve(body_len - src.len());
            return Ok(None);
        }

        let body = src.split_to(body_len);
        match self.pending.take() {
            Some((mut envelope, _)) => {
                envelope.set_body(String::from_utf8_lossy(&body).into_owned());
                Ok(Some(envelope))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<String> for EslCodec {
    type Error = EslError;

    fn encode(&mut self, command: String, dst: &mut BytesMut) -> Result<(), EslError> {
        let command = command.trim_end_matches('\n');
        dst.reserve(command.len() + 2);
        dst.put_slice(command.as_bytes());
        dst.put_slice(b"\n\n");
        Ok(())
    }
}
