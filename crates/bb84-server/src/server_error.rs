//! Driver and executor error types.

use bb84_core::SessionError;
use bb84_proto::Role;
use thiserror::Error;

/// Errors produced while dispatching a participant action.
///
/// Everything except [`DriverError::UnknownConnection`] is answered with a
/// `rejected` message to the sender rather than surfaced to the runtime.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Event refers to a connection the registry does not know.
    #[error("unknown connection: {0:016x}")]
    UnknownConnection(u64),

    /// Connection has not joined under any role.
    #[error("connection has not joined a role")]
    NotJoined,

    /// Connection's role may not perform the action.
    #[error("{action} is reserved for {allowed}, connection is {actual}")]
    Unauthorized {
        /// Action attempted
        action: &'static str,
        /// Roles allowed to perform it
        allowed: RoleList,
        /// Role of the requesting connection
        actual: Role,
    },

    /// Session refused the transition.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl DriverError {
    /// True if the error should be reported back to the participant.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::UnknownConnection(_))
    }
}

/// Errors from handing frames to connection writer tasks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// No outbound queue is attached for the connection.
    #[error("connection not found: {0:016x}")]
    ConnectionNotFound(u64),

    /// The writer task has exited.
    #[error("connection {0:016x} is closed")]
    ConnectionClosed(u64),

    /// Queue stayed full through every attempt.
    #[error("outbound queue for {conn_id:016x} full after {attempts} attempt(s)")]
    QueueFull {
        /// Target connection
        conn_id: u64,
        /// Attempts made, including the first
        attempts: u32,
    },
}

/// Display helper for a set of roles ("alice", "alice or bob").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleList(pub Vec<Role>);

impl std::fmt::Display for RoleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, role) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            write!(f, "{role}")?;
        }
        Ok(())
    }
}
