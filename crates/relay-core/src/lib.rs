//! # relay-core
//!
//! Shared vocabulary for the task relay: the wire [`Packet`] envelope, the
//! closed set of [`PacketType`] tags, agent status values, and the unified
//! error type used by every other crate in the workspace.

pub mod agent;
pub mod error;
pub mod packet;

pub use agent::AgentStatus;
pub use error::{RelayError, Result};
pub use packet::{Packet, PacketType, SERVER_ID, SYSTEM_ID};
