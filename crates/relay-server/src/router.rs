//! Inbound packet classification.
//!
//! Routing is synchronous and never touches a socket: every effect is a
//! registry update, an enqueue, or the completion of a parked HTTP caller.

use relay_core::{Packet, PacketType, RelayError};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bridge::Resolution;
use crate::relay::{Connection, Relay};

impl Relay {
    /// Parse and route one raw packet from `origin`. Malformed packets and
    /// unknown type tags are logged and dropped; the connection stays up.
    pub fn route(self: &Arc<Self>, origin: &Connection, raw: &str) {
        self.metrics().inc_packets_received();
        let packet = match Packet::from_json(raw) {
            Ok(packet) => packet,
            Err(RelayError::UnknownPacketType(tag)) => {
                self.metrics().inc_packets_rejected();
                warn!(connection = origin.id(), packet_type = %tag, "ignoring packet of unknown type");
                return;
            }
            Err(e) => {
                self.metrics().inc_packets_rejected();
                warn!(connection = origin.id(), error = %e, "discarding malformed packet");
                return;
            }
        };
        self.route_packet(origin, packet);
    }

    pub fn route_packet(self: &Arc<Self>, origin: &Connection, packet: Packet) {
        match packet.packet_type() {
            PacketType::Alive => self.handle_alive(origin, &packet),
            PacketType::RequestAgentStatus => self.handle_status_request(),
            PacketType::AgentAction => self.handle_agent_action(packet),
            PacketType::ProviderDetails | PacketType::InitData => self.handle_reply(packet),
            PacketType::ReturnAgentStatus
            | PacketType::RegisterAgent
            | PacketType::RegisterWorker
            | PacketType::InitDataRequest
            | PacketType::SubmitOnboarding => {
                debug!(
                    connection = origin.id(),
                    packet_type = %packet.packet_type(),
                    "outbound-only packet type received, ignoring"
                );
            }
        }
    }

    fn handle_alive(self: &Arc<Self>, origin: &Connection, packet: &Packet) {
        let sender = packet.sender_id();
        if sender.is_empty() {
            self.metrics().inc_packets_rejected();
            warn!(connection = origin.id(), "alive without a sender id, ignoring");
            return;
        }
        if self.is_system_id(sender) {
            let replaced = self.with_state(|state| state.registry.register_system(origin.clone()));
            match replaced {
                Some(prev) => info!(
                    connection = origin.id(),
                    replaced = prev.id(),
                    "system connection replaced"
                ),
                None => info!(connection = origin.id(), "system connection registered"),
            }
            self.ensure_dispatching();
            return;
        }

        let created = self.with_state(|state| {
            state.registry.register_agent(origin.clone(), sender);
            state.agents.ensure(sender)
        });
        if created {
            info!(connection = origin.id(), agent_id = %sender, "agent registered");
        } else {
            info!(connection = origin.id(), agent_id = %sender, "agent bound to socket");
        }
    }

    fn handle_status_request(&self) {
        let settings = self.settings();
        self.with_state(|state| {
            let snapshot = state.agents.snapshot();
            let data = serde_json::to_value(&snapshot).unwrap_or_default();
            state.system_queue.push_back(Packet::new(
                PacketType::ReturnAgentStatus,
                &settings.server_id,
                &settings.system_id,
                data,
            ));
        });
    }

    fn handle_agent_action(&self, packet: Packet) {
        let receiver = packet.receiver_id().to_string();
        if self.is_system_id(&receiver) {
            self.with_state(|state| state.system_queue.push_back(packet));
            return;
        }

        let queued = self.with_state(|state| state.agents.enqueue(&receiver, packet));
        if !queued {
            self.metrics().inc_packets_undeliverable();
            warn!(receiver = %receiver, "agent_action for unknown agent, dropping");
        }
    }

    /// Complete the parked HTTP caller for a reply packet. The correlation
    /// key is `data.request_id`, falling back to `receiver_id`.
    fn handle_reply(&self, packet: Packet) {
        let key = packet
            .request_id()
            .unwrap_or(packet.receiver_id())
            .to_string();
        let payload = reply_payload(packet.data());

        let resolution = self.with_state(|state| state.pending.resolve(&key, payload));
        match resolution {
            Resolution::Delivered => {
                self.metrics().inc_requests_resolved();
                debug!(request_id = %key, packet_type = %packet.packet_type(), "pending request resolved");
            }
            Resolution::CallerGone => {
                debug!(request_id = %key, "reply arrived after caller stopped waiting");
            }
            Resolution::Unknown => {
                self.metrics().inc_orphan_replies();
                warn!(
                    request_id = %key,
                    packet_type = %packet.packet_type(),
                    "reply for unknown or already resolved request, discarding"
                );
            }
        }
    }
}

/// The reply body handed to the HTTP caller: the packet data minus the
/// correlation key.
fn reply_payload(data: &Value) -> Value {
    match data {
        Value::Object(map) => {
            let mut map = map.clone();
            map.remove("request_id");
            Value::Object(map)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_payload_strips_request_id() {
        assert_eq!(
            reply_payload(&json!({"request_id": "r", "ok": true})),
            json!({"ok": true})
        );
        assert_eq!(reply_payload(&json!([1, 2])), json!([1, 2]));
    }
}
