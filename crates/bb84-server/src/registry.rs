//! Connection registry.
//!
//! Tracks every open connection and the role it declared. The roster
//! published to participants is derived from here. Nothing in the registry
//! touches session state.

use bb84_proto::Role;

/// One open connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Connection id assigned at accept time
    pub conn_id: u64,
    /// Declared role, `None` until the connection joins
    pub role: Option<Role>,
}

/// Open connections in accept order.
///
/// Role uniqueness is not enforced: two connections may both claim `alice`.
/// [`ConnectionRegistry::join`] reports when that happens so the caller can
/// log it.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Vec<ConnectionInfo>,
    /// Join order, so the roster is stable across rejoins of other roles.
    join_sequence: Vec<u64>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// True when no connection is open.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Look up a connection.
    pub fn get(&self, conn_id: u64) -> Option<&ConnectionInfo> {
        self.connections.iter().find(|c| c.conn_id == conn_id)
    }

    /// Role declared by a connection, if any.
    pub fn role_of(&self, conn_id: u64) -> Option<Role> {
        self.get(conn_id).and_then(|c| c.role)
    }

    /// Add a connection with no role. Returns false if already present.
    pub fn register(&mut self, conn_id: u64) -> bool {
        if self.get(conn_id).is_some() {
            return false;
        }
        self.connections.push(ConnectionInfo { conn_id, role: None });
        true
    }

    /// Record the role a connection joined as.
    ///
    /// Returns the other connections already holding that role, or `None` if
    /// the connection is unknown.
    pub fn join(&mut self, conn_id: u64, role: Role) -> Option<Vec<u64>> {
        let holders: Vec<u64> = self
            .connections
            .iter()
            .filter(|c| c.conn_id != conn_id && c.role == Some(role))
            .map(|c| c.conn_id)
            .collect();

        let entry = self.connections.iter_mut().find(|c| c.conn_id == conn_id)?;
        entry.role = Some(role);

        self.join_sequence.retain(|id| *id != conn_id);
        self.join_sequence.push(conn_id);

        Some(holders)
    }

    /// Remove a connection, returning its entry.
    pub fn unregister(&mut self, conn_id: u64) -> Option<ConnectionInfo> {
        let index = self.connections.iter().position(|c| c.conn_id == conn_id)?;
        self.join_sequence.retain(|id| *id != conn_id);
        Some(self.connections.remove(index))
    }

    /// Roles currently held, one entry per joined connection, in join order.
    pub fn roles(&self) -> Vec<Role> {
        self.join_sequence.iter().filter_map(|id| self.role_of(*id)).collect()
    }

    /// Every open connection id.
    pub fn connections(&self) -> impl Iterator<Item = u64> + '_ {
        self.connections.iter().map(|c| c.conn_id)
    }

    /// Connections that joined as `role`.
    pub fn connections_with_role(&self, role: Role) -> impl Iterator<Item = u64> + '_ {
        self.connections.iter().filter(move |c| c.role == Some(role)).map(|c| c.conn_id)
    }
}
