//! Per-agent status and outbound queues.

use relay_core::{AgentStatus, Packet};
use std::collections::{BTreeMap, HashMap};

/// One task participant, independent of whichever socket it is using.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub agent_id: String,
    pub status: AgentStatus,
    outbound_queue: Vec<Packet>,
}

impl AgentRecord {
    fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            status: AgentStatus::Init,
            outbound_queue: Vec::new(),
        }
    }

    pub fn queued(&self) -> &[Packet] {
        &self.outbound_queue
    }

    /// Take the whole queue; later pushes start a new batch.
    pub fn take_batch(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outbound_queue)
    }

    /// Put packets a tick could not deliver back ahead of anything queued since.
    pub fn requeue_front(&mut self, mut undelivered: Vec<Packet>) {
        undelivered.append(&mut self.outbound_queue);
        self.outbound_queue = undelivered;
    }
}

#[derive(Default)]
pub struct AgentStore {
    records: HashMap<String, AgentRecord>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record in [`AgentStatus::Init`] unless one exists.
    /// Returns `true` if the agent was new.
    pub fn ensure(&mut self, agent_id: &str) -> bool {
        if self.records.contains_key(agent_id) {
            return false;
        }
        self.records
            .insert(agent_id.to_string(), AgentRecord::new(agent_id));
        true
    }

    pub fn get(&self, agent_id: &str) -> Option<&AgentRecord> {
        self.records.get(agent_id)
    }

    pub fn get_mut(&mut self, agent_id: &str) -> Option<&mut AgentRecord> {
        self.records.get_mut(agent_id)
    }

    /// Append to an agent's queue. Returns `false` when the agent is unknown.
    pub fn enqueue(&mut self, agent_id: &str, packet: Packet) -> bool {
        match self.records.get_mut(agent_id) {
            Some(record) => {
                record.outbound_queue.push(packet);
                true
            }
            None => false,
        }
    }

    /// `agent_id → status` for every known agent.
    pub fn snapshot(&self) -> BTreeMap<String, AgentStatus> {
        self.records
            .values()
            .map(|r| (r.agent_id.clone(), r.status))
            .collect()
    }

    /// Ids of agents with at least one queued packet.
    pub fn with_pending(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|r| !r.outbound_queue.is_empty())
            .map(|r| r.agent_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::PacketType;
    use serde_json::json;

    fn action(n: u64) -> Packet {
        Packet::new(PacketType::AgentAction, "mephisto", "a1", json!({ "n": n }))
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let mut store = AgentStore::new();
        assert!(store.ensure("a1"));
        store.enqueue("a1", action(1));
        assert!(!store.ensure("a1"));
        // Existing record (and its queue) is reused
        assert_eq!(store.get("a1").unwrap().queued().len(), 1);
        assert_eq!(store.get("a1").unwrap().status, AgentStatus::Init);
    }

    #[test]
    fn test_take_batch_preserves_order_and_empties() {
        let mut store = AgentStore::new();
        store.ensure("a1");
        for n in 0..5 {
            store.enqueue("a1", action(n));
        }
        let batch = store.get_mut("a1").unwrap().take_batch();
        let ns: Vec<u64> = batch.iter().map(|p| p.data()["n"].as_u64().unwrap()).collect();
        assert_eq!(ns, vec![0, 1, 2, 3, 4]);
        assert!(store.get("a1").unwrap().queued().is_empty());
        assert!(store.with_pending().is_empty());
    }

    #[test]
    fn test_requeue_front_keeps_order() {
        let mut store = AgentStore::new();
        store.ensure("a1");
        for n in 0..3 {
            store.enqueue("a1", action(n));
        }
        let mut batch = store.get_mut("a1").unwrap().take_batch();
        store.enqueue("a1", action(3));
        let tail = batch.split_off(1);
        store.get_mut("a1").unwrap().requeue_front(tail);

        let ns: Vec<u64> = store
            .get("a1")
            .unwrap()
            .queued()
            .iter()
            .map(|p| p.data()["n"].as_u64().unwrap())
            .collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[test]
    fn test_enqueue_unknown_agent() {
        let mut store = AgentStore::new();
        assert!(!store.enqueue("ghost", action(1)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshot_keys() {
        let mut store = AgentStore::new();
        store.ensure("b");
        store.ensure("a");
        let snap = store.snapshot();
        assert_eq!(snap.keys().cloned().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(snap.values().all(|s| *s == AgentStatus::Init));
    }
}
