//! Error type for the protocol layer.

/// Errors raised while encoding, decoding, or validating wire events.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown event tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The event parsed but violates a protocol rule (e.g. an event sent
    /// before the connection joined any session).
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}
