//! Action execution for the production runtime.
//!
//! The driver decides *what* to send; [`ActionExecutor`] turns its actions
//! into encoded frames and hands them to per-connection writer tasks through
//! bounded queues. A full queue is handled according to the
//! [`BroadcastPolicy`].

use std::{collections::HashMap, time::Duration};

use bb84_core::Environment;
use bb84_proto::{Frame, ServerMessage};
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{
    driver::{LogLevel, ServerAction, ServerDriver},
    error::ServerError,
    server_error::ExecutorError,
};

/// Frames buffered per connection before the policy kicks in.
pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Policy for handling broadcast send failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BroadcastPolicy {
    /// Log failure and continue to next recipient.
    #[default]
    BestEffort,

    /// Retry full queues with exponential backoff.
    Retry {
        /// Maximum number of attempts, including the first
        max_attempts: u32,
        /// Backoff before the second attempt, in milliseconds
        initial_backoff_ms: u64,
    },
}

impl BroadcastPolicy {
    /// Backoff before attempt `attempt + 1`, or `None` when attempts are
    /// exhausted.
    pub fn backoff(self, attempt: u32) -> Option<Duration> {
        match self {
            Self::BestEffort => None,
            Self::Retry { max_attempts, initial_backoff_ms } => {
                if attempt >= max_attempts {
                    return None;
                }
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                Some(Duration::from_millis(initial_backoff_ms.saturating_mul(factor)))
            },
        }
    }
}

/// Item queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encoded frame to write on the control stream
    Frame(Bytes),
    /// Close the connection with a reason
    Close(String),
}

/// Executes driver actions against attached connection queues.
pub struct ActionExecutor<E: Environment> {
    outboxes: HashMap<u64, mpsc::Sender<Outbound>>,
    policy: BroadcastPolicy,
    queue_depth: usize,
    env: E,
}

impl<E: Environment> ActionExecutor<E> {
    /// Executor with the default queue depth.
    pub fn new(env: E, policy: BroadcastPolicy) -> Self {
        Self::with_queue_depth(env, policy, DEFAULT_QUEUE_DEPTH)
    }

    /// Executor with a custom per-connection queue depth.
    pub fn with_queue_depth(env: E, policy: BroadcastPolicy, queue_depth: usize) -> Self {
        Self { outboxes: HashMap::new(), policy, queue_depth: queue_depth.max(1), env }
    }

    /// Broadcast policy in effect.
    pub fn policy(&self) -> BroadcastPolicy {
        self.policy
    }

    /// Create the outbound queue for a connection. The receiver belongs to
    /// the connection's writer task.
    pub fn attach(&mut self, conn_id: u64) -> mpsc::Receiver<Outbound> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        if self.outboxes.insert(conn_id, tx).is_some() {
            tracing::warn!("Replaced outbound queue for {:016x}", conn_id);
        }
        rx
    }

    /// Drop a connection's queue. Its writer task ends once drained.
    pub fn detach(&mut self, conn_id: u64) {
        self.outboxes.remove(&conn_id);
    }

    /// Number of attached connections.
    pub fn attached(&self) -> usize {
        self.outboxes.len()
    }

    /// Queue one item for a connection, applying the broadcast policy when
    /// the queue is full.
    ///
    /// # Errors
    ///
    /// - `ExecutorError::ConnectionNotFound` if no queue is attached
    /// - `ExecutorError::ConnectionClosed` if the writer task is gone
    /// - `ExecutorError::QueueFull` once the policy gives up
    pub async fn deliver(&self, conn_id: u64, item: Outbound) -> Result<(), ExecutorError> {
        let sender = self.outboxes.get(&conn_id).ok_or(ExecutorError::ConnectionNotFound(conn_id))?;

        let mut item = item;
        let mut attempt = 1;
        loop {
            match sender.try_send(item) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(_)) => {
                    return Err(ExecutorError::ConnectionClosed(conn_id));
                },
                Err(TrySendError::Full(returned)) => {
                    let Some(backoff) = self.policy.backoff(attempt) else {
                        return Err(ExecutorError::QueueFull { conn_id, attempts: attempt });
                    };
                    tracing::debug!(
                        "Queue full for {:016x}, retrying in {:?} (attempt {})",
                        conn_id,
                        backoff,
                        attempt
                    );
                    self.env.sleep(backoff).await;
                    item = returned;
                    attempt += 1;
                },
            }
        }
    }

    /// Execute driver actions in order.
    ///
    /// Delivery failures are logged and skipped; one slow peer never stops a
    /// broadcast from reaching the rest.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Protocol` if a message cannot be framed.
    pub async fn execute(
        &mut self,
        driver: &ServerDriver<E>,
        actions: Vec<ServerAction>,
    ) -> Result<(), ServerError> {
        for action in actions {
            match action {
                ServerAction::SendToConnection { conn_id, message } => {
                    let frame = encode(&message)?;
                    self.send_frame(conn_id, frame).await;
                },

                ServerAction::Broadcast { audience, message } => {
                    let frame = encode(&message)?;
                    for conn_id in driver.recipients(audience) {
                        self.send_frame(conn_id, frame.clone()).await;
                    }
                },

                ServerAction::CloseConnection { conn_id, reason } => {
                    tracing::info!("Closing connection {:016x}: {}", conn_id, reason);
                    if let Err(e) = self.deliver(conn_id, Outbound::Close(reason)).await {
                        tracing::debug!("Close for {:016x} not queued: {}", conn_id, e);
                    }
                    self.detach(conn_id);
                },

                ServerAction::Log { level, message } => match level {
                    LogLevel::Debug => tracing::debug!("{}", message),
                    LogLevel::Info => tracing::info!("{}", message),
                    LogLevel::Warn => tracing::warn!("{}", message),
                    LogLevel::Error => tracing::error!("{}", message),
                },
            }
        }

        Ok(())
    }

    async fn send_frame(&self, conn_id: u64, frame: Bytes) {
        if let Err(e) = self.deliver(conn_id, Outbound::Frame(frame)).await {
            tracing::warn!("Dropped frame: {}", e);
        }
    }
}

fn encode(message: &ServerMessage) -> Result<Bytes, ServerError> {
    Ok(Frame::from_message(message)?.to_bytes())
}
