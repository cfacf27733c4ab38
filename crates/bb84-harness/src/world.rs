//! Simulated world: one server driver and its connected participants.
//!
//! Stands in for the production runtime. Events go straight into the
//! [`ServerDriver`] and every resulting action is resolved to recipients and
//! appended to their inboxes before the call returns, so delivery order is
//! exactly the order the driver emitted.

use std::collections::BTreeMap;

use bb84_core::Session;
use bb84_proto::{ClientMessage, OtpEnvelope, PhotonPacket, Role, ServerMessage, SessionSnapshot};
use bb84_server::{DriverConfig, DriverError, LogLevel, ServerAction, ServerDriver, ServerEvent};

use crate::sim_env::SimEnv;

/// A connection's view of the server.
#[derive(Debug, Clone, Default)]
pub struct Participant {
    inbox: Vec<ServerMessage>,
    closed: Option<String>,
}

impl Participant {
    /// Everything received, oldest first.
    pub fn inbox(&self) -> &[ServerMessage] {
        &self.inbox
    }

    /// Close reason, if the server closed this connection.
    pub fn closed(&self) -> Option<&str> {
        self.closed.as_deref()
    }

    /// Most recent session snapshot.
    pub fn latest_snapshot(&self) -> Option<&SessionSnapshot> {
        self.inbox.iter().rev().find_map(|m| match m {
            ServerMessage::SessionUpdated(snapshot) => Some(snapshot.as_ref()),
            _ => None,
        })
    }

    /// Most recent roster.
    pub fn roster(&self) -> Option<&[Role]> {
        self.inbox.iter().rev().find_map(|m| match m {
            ServerMessage::RosterUpdated { roles } => Some(roles.as_slice()),
            _ => None,
        })
    }

    /// Most recent photon delivery.
    pub fn delivered_photons(&self) -> Option<&[PhotonPacket]> {
        self.inbox.iter().rev().find_map(|m| match m {
            ServerMessage::PhotonsDelivered { photons } => Some(photons.as_slice()),
            _ => None,
        })
    }

    /// Refusals as `(action, reason)`, oldest first.
    pub fn rejections(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inbox.iter().filter_map(|m| match m {
            ServerMessage::Rejected { action, reason } => Some((action.as_str(), reason.as_str())),
            _ => None,
        })
    }

    /// Envelopes relayed to this participant, oldest first.
    pub fn relayed(&self) -> impl Iterator<Item = &OtpEnvelope> {
        self.inbox.iter().filter_map(|m| match m {
            ServerMessage::MessageRelayed(envelope) => Some(envelope),
            _ => None,
        })
    }
}

/// The simulated server and its connections.
pub struct World {
    env: SimEnv,
    driver: ServerDriver<SimEnv>,
    participants: BTreeMap<u64, Participant>,
    next_conn_id: u64,
    warnings: usize,
}

impl World {
    /// Empty world around a fresh driver.
    pub fn new(env: SimEnv, config: DriverConfig) -> Self {
        let driver = ServerDriver::new(env.clone(), config);
        Self { env, driver, participants: BTreeMap::new(), next_conn_id: 1, warnings: 0 }
    }

    /// Shared environment.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// The server driver.
    pub fn driver(&self) -> &ServerDriver<SimEnv> {
        &self.driver
    }

    /// The authoritative session.
    pub fn session(&self) -> &Session {
        self.driver.session()
    }

    /// A connection's inbox.
    pub fn participant(&self, conn_id: u64) -> Option<&Participant> {
        self.participants.get(&conn_id)
    }

    /// Warnings the driver has logged so far.
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Open a new connection and return its id.
    pub fn connect(&mut self) -> Result<u64, DriverError> {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        self.participants.insert(conn_id, Participant::default());
        self.process(ServerEvent::ConnectionAccepted { conn_id })?;
        Ok(conn_id)
    }

    /// Open a connection and join it as `role`.
    pub fn join(&mut self, role: Role) -> Result<u64, DriverError> {
        let conn_id = self.connect()?;
        self.submit(conn_id, ClientMessage::Join { role })?;
        Ok(conn_id)
    }

    /// Drop a connection.
    pub fn disconnect(&mut self, conn_id: u64) -> Result<(), DriverError> {
        self.process(ServerEvent::ConnectionClosed { conn_id, reason: "disconnected".into() })?;
        self.participants.remove(&conn_id);
        Ok(())
    }

    /// Send a message from a connection.
    pub fn submit(&mut self, conn_id: u64, message: ClientMessage) -> Result<(), DriverError> {
        self.process(ServerEvent::MessageReceived { conn_id, message })
    }

    fn process(&mut self, event: ServerEvent) -> Result<(), DriverError> {
        let actions = self.driver.process_event(event)?;

        for action in actions {
            match action {
                ServerAction::SendToConnection { conn_id, message } => {
                    self.deliver(conn_id, message);
                },
                ServerAction::Broadcast { audience, message } => {
                    for conn_id in self.driver.recipients(audience) {
                        self.deliver(conn_id, message.clone());
                    }
                },
                ServerAction::CloseConnection { conn_id, reason } => {
                    if let Some(participant) = self.participants.get_mut(&conn_id) {
                        participant.closed = Some(reason);
                    }
                },
                ServerAction::Log { level, .. } => {
                    if level == LogLevel::Warn {
                        self.warnings += 1;
                    }
                },
            }
        }

        Ok(())
    }

    fn deliver(&mut self, conn_id: u64, message: ServerMessage) {
        if let Some(participant) = self.participants.get_mut(&conn_id)
            && participant.closed.is_none()
        {
            participant.inbox.push(message);
        }
    }
}
