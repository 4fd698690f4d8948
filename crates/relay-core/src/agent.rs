use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an agent as seen by the relay.
///
/// The relay only ever assigns [`AgentStatus::Init`]; the other values are
/// owned by the controlling system and are reported back verbatim in status
/// snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Init,
    Connected,
    Disconnected,
    Done,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Init => "init",
            AgentStatus::Connected => "connected",
            AgentStatus::Disconnected => "disconnected",
            AgentStatus::Done => "done",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
