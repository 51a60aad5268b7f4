//! Error types for skiff

use std::fmt;

/// Unified error type for all skiff operations
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Protocol error (malformed frame, unexpected packet, bad field)
    Protocol(String),

    /// The remote peer reported a non-OK status for a single request
    Status {
        /// Numeric status code as carried on the wire
        code: u32,
        /// Human-readable message from the status reply
        message: String,
    },

    /// The connection is latched broken; every pending and future
    /// operation on it fails with this error
    ConnectionLost(String),

    /// Operation not supported by the remote peer
    Unsupported(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Error::Status { code, message } => {
                write!(f, "Remote status {}: {}", code, message)
            }
            Error::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

/// Result type for skiff operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config("Invalid configuration".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration"
        );
    }

    #[test]
    fn test_status_display() {
        let err = Error::Status {
            code: 2,
            message: "No such file".to_string(),
        };
        assert_eq!(err.to_string(), "Remote status 2: No such file");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_result_type() {
        fn example() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
