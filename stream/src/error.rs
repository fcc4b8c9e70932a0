//! Error types for stream operations.

use thiserror::Error;

/// Errors reported by [`BufferedStream`](crate::BufferedStream).
///
/// Everything else the stream encounters is handled in place: source
/// exhaustion follows the `end_with_source` policy, and a close during a
/// blocking read surfaces as an end-of-stream read of 0 bytes.
#[derive(Error, Debug)]
pub enum StreamError {
    /// `open` was called while a session is already running. No state is
    /// mutated; the running session is untouched.
    #[error("stream: already open")]
    AlreadyOpen,

    /// The construction-time configuration is inconsistent.
    #[error("stream: invalid config: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", StreamError::AlreadyOpen), "stream: already open");
        let err = StreamError::InvalidConfig("capacity must be greater than 0".into());
        assert!(format!("{}", err).contains("capacity"));
    }
}
