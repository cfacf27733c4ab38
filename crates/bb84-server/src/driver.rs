//! Sans-IO server driver.
//!
//! The driver is the single writer of the session and the roster. The
//! runtime feeds it [`ServerEvent`]s and executes the [`ServerAction`]s it
//! returns; the driver itself never touches a socket.
//!
//! ## Responsibilities
//!
//! - Roster: register connections, record joins, drop closed connections
//! - Dispatch: map participant actions onto session operations
//! - Authorization: check the sender's role before dispatching
//! - Publishing: full session snapshot after every mutation, plus the
//!   one-shot events (interception notice, delivered photons, sifted keys,
//!   relayed OTP envelopes)
//!
//! Refused actions leave the session untouched and produce a `rejected`
//! reply to the sender only.

use bb84_core::{Environment, Session, SessionConfig};
use bb84_proto::{ClientMessage, OtpEnvelope, Role, ServerMessage};

use crate::{
    registry::ConnectionRegistry,
    server_error::{DriverError, RoleList},
};

/// Driver configuration.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Connections beyond this are closed on accept.
    pub max_connections: usize,
    /// Restrict each action to the role that performs it in the protocol.
    pub enforce_roles: bool,
    /// Session configuration, reused on every restart.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { max_connections: 1024, enforce_roles: true, session: SessionConfig::default() }
    }
}

/// Input to the driver.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A transport connection is ready.
    ConnectionAccepted {
        /// Connection id
        conn_id: u64,
    },
    /// A connection went away.
    ConnectionClosed {
        /// Connection id
        conn_id: u64,
        /// Reason, for logs
        reason: String,
    },
    /// A decoded message arrived on a connection.
    MessageReceived {
        /// Connection id
        conn_id: u64,
        /// The message
        message: ClientMessage,
    },
}

/// Recipients of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every open connection, joined or not
    All,
    /// Connections that joined as this role
    Role(Role),
}

/// Log severity carried by [`ServerAction::Log`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug
    Debug,
    /// Info
    Info,
    /// Warn
    Warn,
    /// Error
    Error,
}

/// Output of the driver, executed by the runtime in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerAction {
    /// Send a message to one connection.
    SendToConnection {
        /// Target connection
        conn_id: u64,
        /// Message
        message: ServerMessage,
    },
    /// Send a message to a group of connections.
    Broadcast {
        /// Who receives it
        audience: Audience,
        /// Message
        message: ServerMessage,
    },
    /// Close a connection.
    CloseConnection {
        /// Target connection
        conn_id: u64,
        /// Reason sent to the peer
        reason: String,
    },
    /// Emit a log line.
    Log {
        /// Severity
        level: LogLevel,
        /// Text
        message: String,
    },
}

/// The authoritative server state machine.
pub struct ServerDriver<E: Environment> {
    session: Session,
    registry: ConnectionRegistry,
    env: E,
    config: ServerConfig,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a driver with a fresh session.
    pub fn new(env: E, config: ServerConfig) -> Self {
        let session = Session::new(&env, config.session);
        Self { session, registry: ConnectionRegistry::new(), env, config }
    }

    /// The session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The roster.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Driver configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Environment used for randomness and time.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Connection ids an audience currently resolves to.
    pub fn recipients(&self, audience: Audience) -> Vec<u64> {
        match audience {
            Audience::All => self.registry.connections().collect(),
            Audience::Role(role) => self.registry.connections_with_role(role).collect(),
        }
    }

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Returns `DriverError::UnknownConnection` for messages or closes from a
    /// connection that was never accepted. Protocol refusals are not errors;
    /// they come back as a `rejected` action.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, DriverError> {
        match event {
            ServerEvent::ConnectionAccepted { conn_id } => Ok(self.handle_accept(conn_id)),
            ServerEvent::ConnectionClosed { conn_id, reason } => {
                self.handle_close(conn_id, &reason)
            },
            ServerEvent::MessageReceived { conn_id, message } => {
                self.handle_message(conn_id, message)
            },
        }
    }

    fn handle_accept(&mut self, conn_id: u64) -> Vec<ServerAction> {
        if self.registry.len() >= self.config.max_connections {
            return vec![
                log(LogLevel::Warn, format!("Connection {conn_id:016x} refused: server full")),
                ServerAction::CloseConnection { conn_id, reason: "server full".to_string() },
            ];
        }

        if !self.registry.register(conn_id) {
            return vec![log(
                LogLevel::Warn,
                format!("Connection {conn_id:016x} already registered"),
            )];
        }

        vec![
            log(LogLevel::Debug, format!("Client connected: {conn_id:016x}")),
            ServerAction::SendToConnection {
                conn_id,
                message: ServerMessage::RosterUpdated { roles: self.registry.roles() },
            },
            ServerAction::SendToConnection { conn_id, message: self.session_message() },
        ]
    }

    fn handle_close(
        &mut self,
        conn_id: u64,
        reason: &str,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let info =
            self.registry.unregister(conn_id).ok_or(DriverError::UnknownConnection(conn_id))?;

        let mut actions =
            vec![log(LogLevel::Info, format!("Client disconnected: {conn_id:016x} ({reason})"))];
        if info.role.is_some() {
            actions.push(self.roster_broadcast());
        }
        Ok(actions)
    }

    fn handle_message(
        &mut self,
        conn_id: u64,
        message: ClientMessage,
    ) -> Result<Vec<ServerAction>, DriverError> {
        let action = message.action_name();

        match self.dispatch(conn_id, message) {
            Ok(actions) => Ok(actions),
            Err(err) if err.is_rejection() => Ok(vec![
                log(LogLevel::Warn, format!("Rejected {action} from {conn_id:016x}: {err}")),
                ServerAction::SendToConnection {
                    conn_id,
                    message: ServerMessage::Rejected {
                        action: action.to_string(),
                        reason: err.to_string(),
                    },
                },
            ]),
            Err(err) => Err(err),
        }
    }

    fn dispatch(
        &mut self,
        conn_id: u64,
        message: ClientMessage,
    ) -> Result<Vec<ServerAction>, DriverError> {
        match message {
            ClientMessage::Join { role } => self.handle_join(conn_id, role),

            ClientMessage::Transmit { photons } => {
                self.authorize(conn_id, "transmit", &[Role::Alice])?;
                let outcome = self.session.transmit(&self.env, photons)?;

                let mut actions = Vec::with_capacity(3);
                if outcome.intercepted > 0 {
                    actions.push(ServerAction::Broadcast {
                        audience: Audience::All,
                        message: ServerMessage::Intercepted { count: outcome.intercepted },
                    });
                }
                actions.push(ServerAction::Broadcast {
                    audience: Audience::Role(Role::Bob),
                    message: ServerMessage::PhotonsDelivered { photons: outcome.delivered },
                });
                actions.push(self.session_broadcast());
                Ok(actions)
            },

            ClientMessage::ReportMeasurements { bits } => {
                self.authorize(conn_id, "report_measurements", &[Role::Bob])?;
                self.session.report_measurements(bits)?;
                Ok(vec![self.session_broadcast()])
            },

            ClientMessage::PublishBases { bits } => {
                self.authorize(conn_id, "publish_bases", &[Role::Alice])?;
                let result = self.session.publish_bases(bits)?;
                Ok(vec![
                    ServerAction::Broadcast {
                        audience: Audience::All,
                        message: ServerMessage::Sifted {
                            alice_key: result.alice_key,
                            bob_key: result.bob_key,
                        },
                    },
                    self.session_broadcast(),
                ])
            },

            ClientMessage::CheckErrorRate => {
                self.authorize(conn_id, "check_error_rate", &[Role::Alice])?;
                self.session.check_error_rate()?;
                Ok(vec![self.session_broadcast()])
            },

            ClientMessage::FinalizeKey => {
                self.authorize(conn_id, "finalize_key", &[Role::Alice])?;
                self.session.finalize_key()?;
                Ok(vec![self.session_broadcast()])
            },

            ClientMessage::SetEavesdropping { active } => {
                self.authorize(conn_id, "set_eavesdropping", &[Role::Eve])?;
                self.session.set_eavesdropping(active);
                Ok(vec![self.session_broadcast()])
            },

            ClientMessage::Restart => {
                self.authorize(conn_id, "restart", &[Role::Alice, Role::Bob, Role::Eve])?;
                self.session.restart(&self.env);
                Ok(vec![self.session_broadcast()])
            },

            ClientMessage::RelayMessage(envelope) => self.handle_relay(conn_id, envelope),
        }
    }

    fn handle_join(&mut self, conn_id: u64, role: Role) -> Result<Vec<ServerAction>, DriverError> {
        let holders =
            self.registry.join(conn_id, role).ok_or(DriverError::UnknownConnection(conn_id))?;

        let mut actions = Vec::with_capacity(3);
        if !holders.is_empty() {
            actions.push(log(
                LogLevel::Warn,
                format!("{role} claimed by {conn_id:016x} while already held by {holders:016x?}"),
            ));
        }
        actions.push(log(LogLevel::Info, format!("Connection {conn_id:016x} joined as {role}")));
        actions.push(self.roster_broadcast());
        actions.push(self.session_broadcast());
        Ok(actions)
    }

    fn handle_relay(
        &mut self,
        conn_id: u64,
        envelope: OtpEnvelope,
    ) -> Result<Vec<ServerAction>, DriverError> {
        self.authorize(conn_id, "relay_message", &[envelope.from])?;

        Ok(vec![
            log(LogLevel::Info, format!("OTP message from {} to {}", envelope.from, envelope.to)),
            ServerAction::Broadcast {
                audience: Audience::Role(envelope.to),
                message: ServerMessage::MessageRelayed(envelope),
            },
        ])
    }

    /// Check that the sender may perform `action`.
    fn authorize(
        &self,
        conn_id: u64,
        action: &'static str,
        allowed: &[Role],
    ) -> Result<(), DriverError> {
        let info = self.registry.get(conn_id).ok_or(DriverError::UnknownConnection(conn_id))?;
        if !self.config.enforce_roles {
            return Ok(());
        }

        let role = info.role.ok_or(DriverError::NotJoined)?;
        if allowed.contains(&role) {
            Ok(())
        } else {
            Err(DriverError::Unauthorized {
                action,
                allowed: RoleList(allowed.to_vec()),
                actual: role,
            })
        }
    }

    fn session_message(&self) -> ServerMessage {
        ServerMessage::SessionUpdated(Box::new(self.session.snapshot()))
    }

    fn session_broadcast(&self) -> ServerAction {
        ServerAction::Broadcast { audience: Audience::All, message: self.session_message() }
    }

    fn roster_broadcast(&self) -> ServerAction {
        ServerAction::Broadcast {
            audience: Audience::All,
            message: ServerMessage::RosterUpdated { roles: self.registry.roles() },
        }
    }
}

impl<E: Environment> std::fmt::Debug for ServerDriver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerDriver")
            .field("session_id", &self.session.id())
            .field("phase", &self.session.phase())
            .field("connections", &self.registry.len())
            .finish_non_exhaustive()
    }
}

fn log(level: LogLevel, message: String) -> ServerAction {
    ServerAction::Log { level, message }
}
