//! Server error types.

use std::fmt;

use bb84_proto::ProtoError;

use crate::server_error::DriverError;

/// Errors that can occur in the server runtime.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error
    Config(String),

    /// Transport/network error
    Transport(String),

    /// Protocol error
    Protocol(String),

    /// Internal error
    Internal(String),

    /// Driver error
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ProtoError> for ServerError {
    fn from(err: ProtoError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn driver_errors_keep_their_source() {
        let err = ServerError::from(DriverError::UnknownConnection(0x2a));

        assert_eq!(err.to_string(), "driver error: unknown connection: 000000000000002a");
        assert!(err.source().is_some());
    }

    #[test]
    fn proto_errors_become_protocol_errors() {
        let err = ServerError::from(ProtoError::UnsupportedVersion(9));
        assert!(matches!(err, ServerError::Protocol(_)));
        assert!(err.source().is_none());
    }
}
