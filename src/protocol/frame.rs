//! Wire framing
//!
//! Text frames carry JSON control messages. Binary frames carry a one-byte
//! channel tag followed by the channel payload:
//!
//! ```text
//! ┌─────────┬──────────────────────────────┐
//! │ tag (1) │ payload (frame length - 1)   │
//! └─────────┴──────────────────────────────┘
//!   0 = video frame (opaque image bytes, e.g. JPEG)
//!   1 = audio (little-endian i16 PCM, mono)
//! ```

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::error::{Error, Result};
use crate::protocol::audio::encode_audio_frame;

/// Leading byte of a binary frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelTag {
    /// Image payload
    Video = 0,
    /// PCM audio payload
    Audio = 1,
}

impl ChannelTag {
    /// Wire value of the tag
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ChannelTag {
    type Error = FrameError;

    fn try_from(byte: u8) -> std::result::Result<Self, Self::Error> {
        match byte {
            0 => Ok(ChannelTag::Video),
            1 => Ok(ChannelTag::Audio),
            other => Err(FrameError::UnknownTag(other)),
        }
    }
}

/// Reasons a binary frame is not delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Binary frame with no tag byte
    #[error("empty binary frame")]
    Empty,

    /// Tag byte outside the defined channels
    #[error("unknown channel tag {0}")]
    UnknownTag(u8),
}

/// A decoded binary frame, borrowing its payload from the received buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFrame<'a> {
    Video(&'a [u8]),
    Audio(&'a [u8]),
}

impl<'a> InboundFrame<'a> {
    /// Channel the frame belongs to
    pub fn tag(&self) -> ChannelTag {
        match self {
            InboundFrame::Video(_) => ChannelTag::Video,
            InboundFrame::Audio(_) => ChannelTag::Audio,
        }
    }

    /// Payload bytes after the tag
    pub fn payload(&self) -> &'a [u8] {
        match *self {
            InboundFrame::Video(bytes) | InboundFrame::Audio(bytes) => bytes,
        }
    }
}

/// Split a binary frame into its channel and payload
pub fn decode_binary(data: &[u8]) -> std::result::Result<InboundFrame<'_>, FrameError> {
    let (&tag, payload) = data.split_first().ok_or(FrameError::Empty)?;
    match ChannelTag::try_from(tag)? {
        ChannelTag::Video => Ok(InboundFrame::Video(payload)),
        ChannelTag::Audio => Ok(InboundFrame::Audio(payload)),
    }
}

/// Parse a text frame as a JSON control message
pub fn decode_text(text: &str) -> std::result::Result<Value, serde_json::Error> {
    serde_json::from_str(text)
}

/// A fully encoded frame waiting to be written to the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl OutboundFrame {
    /// Serialize a control message into a text frame
    pub fn control<T: Serialize + ?Sized>(message: &T) -> Result<Self> {
        serde_json::to_string(message)
            .map(OutboundFrame::Text)
            .map_err(Error::Encode)
    }

    /// Quantize mono samples into an audio frame
    pub fn audio(samples: &[f32]) -> Self {
        OutboundFrame::Binary(encode_audio_frame(samples))
    }

    /// Size on the wire, excluding WebSocket framing
    pub fn len(&self) -> usize {
        match self {
            OutboundFrame::Text(text) => text.len(),
            OutboundFrame::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_message(self) -> WsMessage {
        match self {
            OutboundFrame::Text(text) => WsMessage::Text(text),
            OutboundFrame::Binary(bytes) => WsMessage::Binary(bytes),
        }
    }
}
