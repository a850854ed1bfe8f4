//! Error types for gattlink.

use thiserror::Error;

/// Main error type for all gattlink operations.
#[derive(Debug, Error)]
pub enum GattLinkError {
    /// Fewer bytes available than a feature's minimum frame size.
    ///
    /// This is a contract violation by the caller or the link (protocol or
    /// firmware-version mismatch), not a recoverable runtime condition.
    #[error("short frame: need {expected} bytes at offset {offset}, have {actual}")]
    ShortFrame {
        /// Minimum number of bytes the decoder needs.
        expected: usize,
        /// Bytes actually available past the offset.
        actual: usize,
        /// Offset the decode started at.
        offset: usize,
    },

    /// Malformed packet or framing violation on the wire.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON payload of an extended feature failed to parse.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Underlying link operation failed (reported by the `Link` implementation).
    #[error("link error: {0}")]
    Link(String),

    /// Audio codec failure (bad frame size, unconfigured codec, etc.).
    #[error("codec error: {0}")]
    Codec(String),
}

/// Result type alias using GattLinkError.
pub type Result<T> = std::result::Result<T, GattLinkError>;
