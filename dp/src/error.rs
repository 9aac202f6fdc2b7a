//! Codec error types

use thiserror::Error;

/// Errors raised while encoding, decoding or framing envelopes
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u32, actual: u32 },

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    /// True when the bytes themselves were malformed, as opposed to a transport failure
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            CodecError::Json(_) | CodecError::VersionMismatch { .. } | CodecError::FrameTooLarge(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_malformed() {
        assert!(CodecError::FrameTooLarge(10).is_malformed());
        assert!(
            CodecError::VersionMismatch {
                expected: 1,
                actual: 2
            }
            .is_malformed()
        );

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        assert!(!CodecError::Io(io).is_malformed());
    }

    #[test]
    fn test_version_mismatch_display() {
        let err = CodecError::VersionMismatch {
            expected: 1,
            actual: 7,
        };
        assert_eq!(err.to_string(), "Schema version mismatch: expected 1, got 7");
    }
}
