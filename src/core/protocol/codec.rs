// src/core/protocol/codec.rs

//! Implements the newline-delimited wire format and the corresponding
//! `Encoder` and `Decoder` for network communication.
//!
//! Inbound frames are plain UTF-8 lines. Outbound frames carry a type tag so a
//! receiver can tell text replies from file transfers:
//!
//! ```text
//! type:string%%%<payload>\n
//! type:file%%%<filename>%%%<byteCount>\n<raw bytes>
//! ```

use crate::core::AccessError;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

pub const TYPE_PREFIX: &str = "type:";
pub const FIELD_SEPARATOR: &str = "%%%";
pub const KIND_STRING: &str = "string";
pub const KIND_FILE: &str = "file";

/// An outbound frame as it appears on the wire (the file body is streamed separately).
#[derive(Debug, Clone, PartialEq)]
pub enum WireFrame {
    Text(String),
    FileHeader { name: String, size: u64 },
}

/// A decoded outbound header, used by peers reading server replies.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    File { name: String, size: u64 },
}

impl Reply {
    /// Parses one reply line (without its trailing newline).
    pub fn parse(line: &str) -> Option<Reply> {
        let rest = line.strip_prefix(TYPE_PREFIX)?;
        let (kind, payload) = rest.split_once(FIELD_SEPARATOR)?;
        match kind {
            KIND_STRING => Some(Reply::Text(payload.to_string())),
            KIND_FILE => {
                let (name, size) = payload.rsplit_once(FIELD_SEPARATOR)?;
                Some(Reply::File {
                    name: name.to_string(),
                    size: size.parse().ok()?,
                })
            }
            _ => None,
        }
    }
}

/// A `tokio_util::codec` implementation for the line protocol.
#[derive(Debug)]
pub struct WireCodec {
    max_frame_length: usize,
    /// Where the newline search resumes, so partial frames are scanned once.
    next_index: usize,
}

impl WireCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length,
            next_index: 0,
        }
    }
}

impl Decoder for WireCodec {
    type Item = String;
    type Error = AccessError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let search_from = self.next_index.min(src.len());
        match src[search_from..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let newline_at = search_from + offset;
                self.next_index = 0;
                if newline_at > self.max_frame_length {
                    return Err(AccessError::FrameTooLong(self.max_frame_length));
                }
                let raw = src.split_to(newline_at + 1);
                let mut line = &raw[..newline_at];
                if let Some(stripped) = line.strip_suffix(b"\r") {
                    line = stripped;
                }
                Ok(Some(String::from_utf8_lossy(line).into_owned()))
            }
            None if src.len() > self.max_frame_length => {
                Err(AccessError::FrameTooLong(self.max_frame_length))
            }
            None => {
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                // An unterminated tail is not a frame.
                if !src.is_empty() {
                    debug!("Discarding {} unterminated bytes at EOF", src.len());
                    src.clear();
                }
                self.next_index = 0;
                Ok(None)
            }
        }
    }
}

impl Encoder<WireFrame> for WireCodec {
    type Error = AccessError;

    fn encode(&mut self, item: WireFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            WireFrame::Text(text) => {
                dst.reserve(TYPE_PREFIX.len() + KIND_STRING.len() + FIELD_SEPARATOR.len() + text.len() + 1);
                dst.put_slice(TYPE_PREFIX.as_bytes());
                dst.put_slice(KIND_STRING.as_bytes());
                dst.put_slice(FIELD_SEPARATOR.as_bytes());
                // A payload must never split into two frames.
                for b in text.bytes() {
                    dst.put_u8(if b == b'\n' || b == b'\r' { b' ' } else { b });
                }
                dst.put_u8(b'\n');
            }
            WireFrame::FileHeader { name, size } => {
                let header = format!(
                    "{TYPE_PREFIX}{KIND_FILE}{FIELD_SEPARATOR}{name}{FIELD_SEPARATOR}{size}\n"
                );
                dst.put_slice(header.as_bytes());
            }
        }
        Ok(())
    }
}
