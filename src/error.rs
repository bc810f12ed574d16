//! Error types for CFile reading and writing.

use std::io;
use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for CFile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred in the underlying storage medium.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file or one of its blocks is unreadable as written.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// The footer declares an encoding outside the implemented set,
    /// or a block could not be decoded with it.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The footer declares a compression codec that is unknown or not compiled in.
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// The operation is not available for this file (e.g. value seek without a value index).
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Caller misuse: write after finish, out-of-order values.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new unsupported operation error.
    pub fn unsupported_operation(msg: impl Into<String>) -> Self {
        Error::UnsupportedOperation(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// True when the bytes themselves are wrong; such errors are never worth retrying.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::Corruption(_) | Error::UnsupportedEncoding(_) | Error::UnsupportedCompression(_)
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Corruption(format!("record decode failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("bad magic");
        assert_eq!(err.to_string(), "Data corruption: bad magic");

        let err = Error::unsupported_operation("no value index");
        assert_eq!(err.to_string(), "Unsupported operation: no value index");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_is_corruption() {
        assert!(Error::corruption("x").is_corruption());
        assert!(Error::UnsupportedCompression("tag 9".into()).is_corruption());
        assert!(!Error::invalid_state("finished").is_corruption());
    }
}
