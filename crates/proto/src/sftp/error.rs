//! SFTP status codes and their mapping to the host error taxonomy.

use skiff_platform::Error;

/// SFTP status codes (SSH_FX_*).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum StatusCode {
    /// SSH_FX_OK - Success
    Ok = 0,
    /// SSH_FX_EOF - End of file
    Eof = 1,
    /// SSH_FX_NO_SUCH_FILE - No such file
    NoSuchFile = 2,
    /// SSH_FX_PERMISSION_DENIED - Permission denied
    PermissionDenied = 3,
    /// SSH_FX_FAILURE - General failure
    Failure = 4,
    /// SSH_FX_BAD_MESSAGE - Bad message
    BadMessage = 5,
    /// SSH_FX_NO_CONNECTION - No connection
    NoConnection = 6,
    /// SSH_FX_CONNECTION_LOST - Connection lost
    ConnectionLost = 7,
    /// SSH_FX_OP_UNSUPPORTED - Operation not supported
    OpUnsupported = 8,
}

impl StatusCode {
    /// Convert from the wire representation.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Eof),
            2 => Some(Self::NoSuchFile),
            3 => Some(Self::PermissionDenied),
            4 => Some(Self::Failure),
            5 => Some(Self::BadMessage),
            6 => Some(Self::NoConnection),
            7 => Some(Self::ConnectionLost),
            8 => Some(Self::OpUnsupported),
            _ => None,
        }
    }

    /// Conventional message for the code.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Ok => "Success",
            Self::Eof => "End of file",
            Self::NoSuchFile => "No such file or directory",
            Self::PermissionDenied => "Permission denied",
            Self::Failure => "Failure",
            Self::BadMessage => "Bad message",
            Self::NoConnection => "No connection",
            Self::ConnectionLost => "Connection lost",
            Self::OpUnsupported => "Operation not supported",
        }
    }
}

/// Builds the error for a non-OK status reply.
pub fn status_error(code: StatusCode, message: impl Into<String>) -> Error {
    let message = message.into();
    let message = if message.is_empty() {
        code.message().to_string()
    } else {
        message
    };
    Error::Status {
        code: code as u32,
        message,
    }
}

/// The status code carried by an error, if any.
pub fn status_of(err: &Error) -> Option<StatusCode> {
    match err {
        Error::Status { code, .. } => StatusCode::from_u32(*code),
        _ => None,
    }
}

/// True if the error is an EOF status reply.
pub fn is_eof(err: &Error) -> bool {
    status_of(err) == Some(StatusCode::Eof)
}

/// Maps a host I/O error onto the status taxonomy: not-found becomes
/// `NO_SUCH_FILE`, permission problems become `PERMISSION_DENIED`,
/// unsupported operations become `OP_UNSUPPORTED`, everything else is
/// `FAILURE` with the message carried in the status reply.
pub fn status_from_io(err: &std::io::Error) -> StatusCode {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => StatusCode::NoSuchFile,
        ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        ErrorKind::Unsupported => StatusCode::OpUnsupported,
        ErrorKind::UnexpectedEof => StatusCode::Eof,
        _ => StatusCode::Failure,
    }
}
