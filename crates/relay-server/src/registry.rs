//! Bidirectional mapping between live sockets and logical identities.
//!
//! Both directions must hold an entry for an agent to be reachable. The
//! system connection is tracked separately and there is at most one.

use std::collections::HashMap;

use crate::relay::{Connection, ConnectionId};

/// What a socket currently speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketRole {
    System,
    Agent(String),
}

#[derive(Default)]
pub struct ConnectionRegistry {
    roles: HashMap<ConnectionId, SocketRole>,
    agent_sockets: HashMap<String, Connection>,
    system: Option<Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `conn` as the system connection, replacing any previous one.
    /// Returns the connection that was replaced, if it was a different socket.
    pub fn register_system(&mut self, conn: Connection) -> Option<Connection> {
        if let Some(SocketRole::Agent(agent_id)) = self.roles.get(&conn.id()) {
            // The socket stops speaking for its agent identity.
            let agent_id = agent_id.clone();
            self.unbind_agent(&agent_id, conn.id());
        }
        self.roles.insert(conn.id(), SocketRole::System);
        let previous = self.system.replace(conn);
        match previous {
            Some(prev) if Some(prev.id()) != self.system.as_ref().map(Connection::id) => {
                // The old socket no longer speaks for the system.
                if self.roles.get(&prev.id()) == Some(&SocketRole::System) {
                    self.roles.remove(&prev.id());
                }
                Some(prev)
            }
            _ => None,
        }
    }

    /// Bind `conn ↔ agent_id` in both directions.
    pub fn register_agent(&mut self, conn: Connection, agent_id: &str) {
        if let Some(SocketRole::Agent(previous)) = self.roles.get(&conn.id()) {
            // Same socket re-announcing under another identity.
            if previous != agent_id {
                let previous = previous.clone();
                self.unbind_agent(&previous, conn.id());
            }
        }
        if self.system.as_ref().map(Connection::id) == Some(conn.id()) {
            self.system = None;
        }
        self.roles
            .insert(conn.id(), SocketRole::Agent(agent_id.to_string()));
        self.agent_sockets.insert(agent_id.to_string(), conn);
    }

    pub fn lookup_agent_by_socket(&self, id: ConnectionId) -> Option<&SocketRole> {
        self.roles.get(&id)
    }

    pub fn lookup_socket_by_agent(&self, agent_id: &str) -> Option<&Connection> {
        self.agent_sockets.get(agent_id)
    }

    pub fn system(&self) -> Option<&Connection> {
        self.system.as_ref()
    }

    /// Forget a closed socket. Agent identities stay known to the agent store;
    /// only the socket bindings are dropped, and only if they still point at
    /// this socket (a reconnect may already have rebound the identity).
    pub fn unregister_socket(&mut self, id: ConnectionId) -> Option<SocketRole> {
        let role = self.roles.remove(&id)?;
        match &role {
            SocketRole::System => {
                if self.system.as_ref().map(Connection::id) == Some(id) {
                    self.system = None;
                }
            }
            SocketRole::Agent(agent_id) => self.unbind_agent(agent_id, id),
        }
        Some(role)
    }

    fn unbind_agent(&mut self, agent_id: &str, id: ConnectionId) {
        if self
            .agent_sockets
            .get(agent_id)
            .is_some_and(|conn| conn.id() == id)
        {
            self.agent_sockets.remove(agent_id);
        }
    }

    pub fn connected_agents(&self) -> usize {
        self.agent_sockets.len()
    }
}
