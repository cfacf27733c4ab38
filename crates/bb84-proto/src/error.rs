//! Wire protocol errors.

use thiserror::Error;

/// Errors from frame encoding and decoding.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Input shorter than the frame requires.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes required
        expected: usize,
        /// Bytes available
        actual: usize,
    },

    /// Header does not start with the frame magic.
    #[error("invalid magic: {0:02x?}")]
    InvalidMagic([u8; 4]),

    /// Header carries a version this build does not speak.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the configured maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Announced size
        size: u32,
        /// Allowed maximum
        max: u32,
    },

    /// Payload is not a valid message.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtoError::Truncated { expected: 12, actual: 3 };
        assert_eq!(err.to_string(), "truncated frame: expected 12 bytes, got 3");

        let err = ProtoError::PayloadTooLarge { size: 5, max: 4 };
        assert_eq!(err.to_string(), "payload too large: 5 bytes (max 4)");
    }
}
