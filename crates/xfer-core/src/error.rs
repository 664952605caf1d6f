//! Error types for transfers
//!
//! Two families live here. [`ErrorCode`] is the protocol status a transfer
//! ends with; it crosses the wire in `AbortTransfer` and is what completions
//! carry. [`XferError`] covers everything around the protocol: configuration,
//! frame decoding and local I/O in helper APIs.

use thiserror::Error;
use xfer_transport::CodecError;

/// Terminal failure status of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorCode {
    /// Source does not exist (or a registered transfer was not found)
    #[error("file not found")]
    FileNotFound,

    /// Source exists but has no bytes
    #[error("file empty")]
    FileEmpty,

    /// Source or destination could not be opened
    #[error("cannot open file")]
    CannotOpenFile,

    /// The circuit to the remote host died
    #[error("circuit gone")]
    CircuitGone,

    /// Gave up waiting for a confirmation or for a registered transfer to be requested
    #[error("timed out")]
    TcpTimeout,

    /// A code received from a peer with no local meaning
    #[error("remote error {0}")]
    Other(i32),
}

impl ErrorCode {
    const CANNOT_OPEN_FILE: i32 = -42;
    const FILE_NOT_FOUND: i32 = -43;
    const FILE_EMPTY: i32 = -44;
    const TCP_TIMEOUT: i32 = -23016;
    const CIRCUIT_GONE: i32 = -23017;

    /// Wire value of this code
    #[must_use]
    pub const fn to_wire(self) -> i32 {
        match self {
            Self::FileNotFound => Self::FILE_NOT_FOUND,
            Self::FileEmpty => Self::FILE_EMPTY,
            Self::CannotOpenFile => Self::CANNOT_OPEN_FILE,
            Self::CircuitGone => Self::CIRCUIT_GONE,
            Self::TcpTimeout => Self::TCP_TIMEOUT,
            Self::Other(code) => code,
        }
    }

    /// Parse a wire value. `0` means no error and yields `None`.
    #[must_use]
    pub const fn from_wire(code: i32) -> Option<Self> {
        match code {
            0 => None,
            Self::FILE_NOT_FOUND => Some(Self::FileNotFound),
            Self::FILE_EMPTY => Some(Self::FileEmpty),
            Self::CANNOT_OPEN_FILE => Some(Self::CannotOpenFile),
            Self::CIRCUIT_GONE => Some(Self::CircuitGone),
            Self::TCP_TIMEOUT => Some(Self::TcpTimeout),
            other => Some(Self::Other(other)),
        }
    }
}

/// Outcome of a transfer step or of a whole transfer.
pub type XferStatus = std::result::Result<(), ErrorCode>;

/// Wire value of a status (`0` for success).
#[must_use]
pub fn status_to_wire(status: XferStatus) -> i32 {
    match status {
        Ok(()) => 0,
        Err(code) => code.to_wire(),
    }
}

/// Status from a wire value.
#[must_use]
pub fn status_from_wire(code: i32) -> XferStatus {
    match ErrorCode::from_wire(code) {
        None => Ok(()),
        Some(code) => Err(code),
    }
}

/// Errors outside the transfer protocol itself
#[derive(Debug, Error)]
pub enum XferError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Configuration serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Inbound frame could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for non-protocol operations
pub type Result<T> = std::result::Result<T, XferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_codes() {
        assert_eq!(ErrorCode::CannotOpenFile.to_wire(), -42);
        assert_eq!(ErrorCode::FileNotFound.to_wire(), -43);
        assert_eq!(ErrorCode::FileEmpty.to_wire(), -44);
        assert_eq!(ErrorCode::TcpTimeout.to_wire(), -23016);
        assert_eq!(ErrorCode::CircuitGone.to_wire(), -23017);
    }

    #[test]
    fn test_from_wire() {
        assert_eq!(ErrorCode::from_wire(0), None);
        assert_eq!(ErrorCode::from_wire(-43), Some(ErrorCode::FileNotFound));
        assert_eq!(ErrorCode::from_wire(-23017), Some(ErrorCode::CircuitGone));
        assert_eq!(ErrorCode::from_wire(-7), Some(ErrorCode::Other(-7)));
        assert_eq!(ErrorCode::Other(-7).to_wire(), -7);
    }

    #[test]
    fn test_status_wire() {
        assert_eq!(status_to_wire(Ok(())), 0);
        assert_eq!(status_to_wire(Err(ErrorCode::FileEmpty)), -44);
        assert_eq!(status_from_wire(0), Ok(()));
        assert_eq!(status_from_wire(-42), Err(ErrorCode::CannotOpenFile));
    }

    #[test]
    fn test_error_display() {
        let err = XferError::InvalidConfig("retry_limit must be non-zero".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid configuration: retry_limit must be non-zero"
        );
        assert_eq!(ErrorCode::Other(5).to_string(), "remote error 5");
    }
}
