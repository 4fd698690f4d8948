//! The wire envelope exchanged over every relay socket.
//!
//! On the wire a packet is a JSON object:
//!
//! ```json
//! {"packet_type": "agent_action", "sender_id": "a1", "receiver_id": "mephisto", "data": {}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{RelayError, Result};

/// Default sender id reserved for the controlling system connection.
pub const SYSTEM_ID: &str = "mephisto";

/// Default sender id the relay uses for packets it originates itself.
pub const SERVER_ID: &str = "mephisto_server";

/// Closed set of packet type tags understood by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    #[serde(rename = "alive")]
    Alive,
    #[serde(rename = "request_status")]
    RequestAgentStatus,
    #[serde(rename = "return_status")]
    ReturnAgentStatus,
    #[serde(rename = "initial_data_send")]
    InitData,
    #[serde(rename = "agent_action")]
    AgentAction,
    #[serde(rename = "register_agent")]
    RegisterAgent,
    #[serde(rename = "register_worker")]
    RegisterWorker,
    #[serde(rename = "init_data_request")]
    InitDataRequest,
    #[serde(rename = "provider_details")]
    ProviderDetails,
    #[serde(rename = "submit_onboarding")]
    SubmitOnboarding,
}

impl PacketType {
    pub const ALL: [PacketType; 10] = [
        PacketType::Alive,
        PacketType::RequestAgentStatus,
        PacketType::ReturnAgentStatus,
        PacketType::InitData,
        PacketType::AgentAction,
        PacketType::RegisterAgent,
        PacketType::RegisterWorker,
        PacketType::InitDataRequest,
        PacketType::ProviderDetails,
        PacketType::SubmitOnboarding,
    ];

    /// The wire tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Alive => "alive",
            PacketType::RequestAgentStatus => "request_status",
            PacketType::ReturnAgentStatus => "return_status",
            PacketType::InitData => "initial_data_send",
            PacketType::AgentAction => "agent_action",
            PacketType::RegisterAgent => "register_agent",
            PacketType::RegisterWorker => "register_worker",
            PacketType::InitDataRequest => "init_data_request",
            PacketType::ProviderDetails => "provider_details",
            PacketType::SubmitOnboarding => "submit_onboarding",
        }
    }

    /// Look up a wire tag. Returns `None` for tags the relay doesn't know.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == tag)
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single relay packet. Identity fields cannot be changed after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    packet_type: PacketType,
    sender_id: String,
    receiver_id: String,
    data: Value,
}

/// Loosely typed envelope used for the first parsing stage, so an unknown
/// type tag can be told apart from a structurally broken packet.
#[derive(Deserialize)]
struct Envelope {
    packet_type: String,
    sender_id: String,
    receiver_id: String,
    #[serde(default)]
    data: Value,
}

impl Packet {
    pub fn new(
        packet_type: PacketType,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            packet_type,
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            data,
        }
    }

    /// Parse a packet from its JSON text form.
    pub fn from_json(raw: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(raw).map_err(|e| RelayError::MalformedPacket(e.to_string()))?;
        let packet_type = PacketType::from_tag(&envelope.packet_type)
            .ok_or(RelayError::UnknownPacketType(envelope.packet_type))?;
        Ok(Self {
            packet_type,
            sender_id: envelope.sender_id,
            receiver_id: envelope.receiver_id,
            data: envelope.data,
        })
    }

    /// Serialize to the JSON text sent over a socket.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    pub fn sender_id(&self) -> &str {
        &self.sender_id
    }

    pub fn receiver_id(&self) -> &str {
        &self.receiver_id
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// `data.request_id` when present as a string.
    pub fn request_id(&self) -> Option<&str> {
        self.data.get("request_id").and_then(Value::as_str)
    }
}
