//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering frame encoding and decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Failed to serialize a frame.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a frame. Covers malformed JSON, unknown
    /// `type` tags and payloads whose shape does not match their tag.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// A frame carried bytes that are not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_maps_to_deserialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: ProtocolError = err.into();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ProtocolError::Deserialization("unknown variant `bogus`".to_string());
        assert_eq!(
            err.to_string(),
            "deserialization failed: unknown variant `bogus`"
        );
    }
}
