//! Binary frame envelope exchanged with the voice bot over the websocket
//!
//! The remote pipeline speaks protobuf: one `Frame` message per websocket
//! binary message, with exactly one of `text`, `audio`, `transcription` or
//! `message` populated. The prost types are kept private to this module and
//! the rest of the workspace works with the [`Frame`] sum type.

use prost::Message as _;

use crate::errors::{SharedError, SharedResult};

/// Plain text payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFrame {
    pub text: String,
}

/// Raw PCM audio payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub id: u64,
    pub name: String,
    pub audio: Vec<u8>,
    pub sample_rate: u32,
    pub num_channels: u32,
}

/// Speech-to-text result produced by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionFrame {
    pub text: String,
    pub user_id: String,
    pub timestamp: String,
}

/// Opaque text payload carrying a nested RTVI envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFrame {
    pub data: String,
}

/// One wire-level message unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(MessageFrame),
    Audio(AudioFrame),
    Transcription(TranscriptionFrame),
    Text(TextFrame),
}

/// Result of decoding one inbound binary message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A structured frame with exactly one populated variant
    Frame(Frame),
    /// Well-formed bytes in which no known variant was populated
    Unrecognized(Vec<u8>),
}

impl Frame {
    pub fn message(data: impl Into<String>) -> Self {
        Frame::Message(MessageFrame { data: data.into() })
    }

    pub fn audio(id: u64, audio: Vec<u8>, sample_rate: u32, num_channels: u32) -> Self {
        Frame::Audio(AudioFrame {
            id,
            name: "audio".to_string(),
            audio,
            sample_rate,
            num_channels,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        Frame::Text(TextFrame { text: text.into() })
    }

    pub fn transcription(text: impl Into<String>, user_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Frame::Transcription(TranscriptionFrame {
            text: text.into(),
            user_id: user_id.into(),
            timestamp: timestamp.into(),
        })
    }

    /// Short variant name, used in logs and message records
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Message(_) => "message",
            Frame::Audio(_) => "audio",
            Frame::Transcription(_) => "transcription",
            Frame::Text(_) => "text",
        }
    }

    /// Serialize to the protobuf envelope. Never fails.
    pub fn encode(&self) -> Vec<u8> {
        wire::FrameEnvelope::from(self).encode_to_vec()
    }
}

/// Decode one binary websocket message.
///
/// A parse failure yields [`SharedError::MalformedFrame`]; callers are
/// expected to skip the message and keep reading.
pub fn decode_frame(bytes: &[u8]) -> SharedResult<Decoded> {
    let envelope = wire::FrameEnvelope::decode(bytes).map_err(|e| SharedError::malformed(e.to_string()))?;

    Ok(match envelope.payload {
        Some(payload) => Decoded::Frame(payload.into()),
        None => Decoded::Unrecognized(bytes.to_vec()),
    })
}

/// Serialize a frame; shorthand for [`Frame::encode`]
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    frame.encode()
}

mod wire {
    //! Field numbers follow pipecat's `frames.proto`

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TextFrame {
        #[prost(uint64, tag = "1")]
        pub id: u64,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(string, tag = "3")]
        pub text: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AudioRawFrame {
        #[prost(uint64, tag = "1")]
        pub id: u64,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(bytes = "vec", tag = "3")]
        pub audio: Vec<u8>,
        #[prost(uint32, tag = "4")]
        pub sample_rate: u32,
        #[prost(uint32, tag = "5")]
        pub num_channels: u32,
        #[prost(uint64, optional, tag = "6")]
        pub pts: Option<u64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct TranscriptionFrame {
        #[prost(uint64, tag = "1")]
        pub id: u64,
        #[prost(string, tag = "2")]
        pub name: String,
        #[prost(string, tag = "3")]
        pub text: String,
        #[prost(string, tag = "4")]
        pub user_id: String,
        #[prost(string, tag = "5")]
        pub timestamp: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessageFrame {
        #[prost(string, tag = "1")]
        pub data: String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FrameEnvelope {
        #[prost(oneof = "Payload", tags = "1, 2, 3, 4")]
        pub payload: Option<Payload>,
    }

    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "1")]
        Text(TextFrame),
        #[prost(message, tag = "2")]
        Audio(AudioRawFrame),
        #[prost(message, tag = "3")]
        Transcription(TranscriptionFrame),
        #[prost(message, tag = "4")]
        Message(MessageFrame),
    }

    impl From<&super::Frame> for FrameEnvelope {
        fn from(frame: &super::Frame) -> Self {
            let payload = match frame {
                super::Frame::Text(f) => Payload::Text(TextFrame {
                    id: 0,
                    name: String::new(),
                    text: f.text.clone(),
                }),
                super::Frame::Audio(f) => Payload::Audio(AudioRawFrame {
                    id: f.id,
                    name: f.name.clone(),
                    audio: f.audio.clone(),
                    sample_rate: f.sample_rate,
                    num_channels: f.num_channels,
                    pts: None,
                }),
                super::Frame::Transcription(f) => Payload::Transcription(TranscriptionFrame {
                    id: 0,
                    name: String::new(),
                    text: f.text.clone(),
                    user_id: f.user_id.clone(),
                    timestamp: f.timestamp.clone(),
                }),
                super::Frame::Message(f) => Payload::Message(MessageFrame { data: f.data.clone() }),
            };
            FrameEnvelope { payload: Some(payload) }
        }
    }

    impl From<Payload> for super::Frame {
        fn from(payload: Payload) -> Self {
            match payload {
                Payload::Text(f) => super::Frame::Text(super::TextFrame { text: f.text }),
                Payload::Audio(f) => super::Frame::Audio(super::AudioFrame {
                    id: f.id,
                    name: f.name,
                    audio: f.audio,
                    sample_rate: f.sample_rate,
                    num_channels: f.num_channels,
                }),
                Payload::Transcription(f) => super::Frame::Transcription(super::TranscriptionFrame {
                    text: f.text,
                    user_id: f.user_id,
                    timestamp: f.timestamp,
                }),
                Payload::Message(f) => super::Frame::Message(super::MessageFrame { data: f.data }),
            }
        }
    }
}
