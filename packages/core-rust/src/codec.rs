//! Envelope encoding for the broker wire.
//!
//! JSON is the protocol's wire format. MessagePack (named fields, via
//! `rmp_serde::to_vec_named`) is available for deployments where every peer
//! is configured for it; nothing on the wire announces which one is in use.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

/// Errors raised while encoding or decoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("{codec} encode failed: {message}")]
    Encode { codec: &'static str, message: String },
    #[error("{codec} decode failed: {message}")]
    Decode { codec: &'static str, message: String },
}

/// Generic (de)serialization of `Envelope<T>`.
pub trait EnvelopeCodec {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// MIME type set on outgoing broker messages.
    fn content_type(&self) -> &'static str;

    /// # Errors
    ///
    /// Returns `CodecError::Encode` if the payload cannot be serialized.
    fn encode<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<Bytes, CodecError>;

    /// # Errors
    ///
    /// Returns `CodecError::Decode` if `bytes` is not an envelope whose
    /// payload matches `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Envelope<T>, CodecError>;
}

/// JSON codec (the default wire format).
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl EnvelopeCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<Bytes, CodecError> {
        serde_json::to_vec(envelope)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode {
                codec: self.name(),
                message: e.to_string(),
            })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Envelope<T>, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            codec: self.name(),
            message: e.to_string(),
        })
    }
}

/// Named-field MessagePack codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsgPackCodec;

impl EnvelopeCodec for MsgPackCodec {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn encode<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<Bytes, CodecError> {
        rmp_serde::to_vec_named(envelope)
            .map(Bytes::from)
            .map_err(|e| CodecError::Encode {
                codec: self.name(),
                message: e.to_string(),
            })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Envelope<T>, CodecError> {
        rmp_serde::from_slice(bytes).map_err(|e| CodecError::Decode {
            codec: self.name(),
            message: e.to_string(),
        })
    }
}

/// Runtime-selectable codec shared by clients and responders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireCodec {
    #[default]
    Json,
    MsgPack,
}

impl EnvelopeCodec for WireCodec {
    fn name(&self) -> &'static str {
        match self {
            WireCodec::Json => JsonCodec.name(),
            WireCodec::MsgPack => MsgPackCodec.name(),
        }
    }

    fn content_type(&self) -> &'static str {
        match self {
            WireCodec::Json => JsonCodec.content_type(),
            WireCodec::MsgPack => MsgPackCodec.content_type(),
        }
    }

    fn encode<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<Bytes, CodecError> {
        match self {
            WireCodec::Json => JsonCodec.encode(envelope),
            WireCodec::MsgPack => MsgPackCodec.encode(envelope),
        }
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<Envelope<T>, CodecError> {
        match self {
            WireCodec::Json => JsonCodec.decode(bytes),
            WireCodec::MsgPack => MsgPackCodec.decode(bytes),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
