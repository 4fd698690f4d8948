//! Outbound delivery.
//!
//! Routing only ever enqueues. A single self-rearming loop wakes every
//! `tick_interval`, takes every ready batch under the state lock, and writes
//! them to their sockets outside it. A tick finishes completely before the
//! next sleep starts, so ticks never overlap.

use async_trait::async_trait;
use futures::future::join_all;
use relay_core::{Packet, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::relay::{Connection, Relay};

/// Anything a packet can be written to: a WebSocket in production, a
/// [`MockSink`](crate::mock::MockSink) in tests.
#[async_trait]
pub trait PacketSink: Send + Sync {
    async fn send_packet(&self, packet: &Packet) -> Result<()>;

    /// A closed sink is skipped silently rather than treated as a failure.
    fn is_closed(&self) -> bool;
}

/// What happened to one packet handed to [`send_reliable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    SentOnRetry,
    Dropped,
    /// Socket was already closed; nothing attempted.
    Skipped,
}

/// Send once; on failure wait `retry_delay` and try exactly once more.
/// A second failure is logged and the packet dropped.
pub async fn send_reliable(
    sink: &dyn PacketSink,
    packet: &Packet,
    retry_delay: Duration,
    cancel: &CancellationToken,
) -> Delivery {
    if sink.is_closed() {
        return Delivery::Skipped;
    }

    let first = match sink.send_packet(packet).await {
        Ok(()) => return Delivery::Sent,
        Err(e) => e,
    };
    debug!(
        error = %first,
        packet_type = %packet.packet_type(),
        receiver = packet.receiver_id(),
        "send failed, retrying once"
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            warn!(packet_type = %packet.packet_type(), "relay stopped during resend delay, dropping packet");
            return Delivery::Dropped;
        }
        _ = tokio::time::sleep(retry_delay) => {}
    }

    if sink.is_closed() {
        return Delivery::Skipped;
    }
    match sink.send_packet(packet).await {
        Ok(()) => Delivery::SentOnRetry,
        Err(e) => {
            warn!(
                error = %e,
                packet_type = %packet.packet_type(),
                receiver = packet.receiver_id(),
                "resend failed, dropping packet"
            );
            Delivery::Dropped
        }
    }
}

/// Counts from one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub agent_packets: usize,
    pub system_packets: usize,
    pub dropped: usize,
}

impl Relay {
    /// Spawn the dispatch loop if nobody has yet.
    pub fn ensure_dispatching(self: &Arc<Self>) {
        if self.claim_dispatch_start() {
            let relay = Arc::clone(self);
            tokio::spawn(async move { relay.run_dispatch_loop().await });
        }
    }

    async fn run_dispatch_loop(self: Arc<Self>) {
        let interval = self.settings().tick_interval;
        let cancel = self.shutdown_token();
        info!(interval_ms = interval.as_millis() as u64, "dispatch loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.tick().await;
        }
        info!("dispatch loop stopped");
    }

    /// One dispatch tick: flush every bound agent's queue (agents in
    /// parallel, each batch in order), then the system queue in FIFO order.
    ///
    /// Queues of agents without an open socket, and the system queue while no
    /// open system socket is bound, are left in place for a later reconnect.
    /// A socket that closes partway through a batch gets the undelivered tail
    /// put back at the front of its queue.
    pub async fn tick(&self) -> TickReport {
        let (agent_batches, system_batch) = self.with_state(|state| {
            let mut batches = Vec::new();
            for agent_id in state.agents.with_pending() {
                let Some(conn) = state.registry.lookup_socket_by_agent(&agent_id).cloned() else {
                    continue;
                };
                if conn.sink().is_closed() {
                    continue;
                }
                if let Some(record) = state.agents.get_mut(&agent_id) {
                    batches.push((agent_id, conn, record.take_batch()));
                }
            }
            let system = match state.registry.system().cloned() {
                Some(conn) if !conn.sink().is_closed() && !state.system_queue.is_empty() => {
                    Some((conn, state.system_queue.drain(..).collect::<Vec<_>>()))
                }
                _ => None,
            };
            (batches, system)
        });

        let mut report = TickReport::default();
        let results = join_all(agent_batches.into_iter().map(|(agent_id, conn, batch)| async move {
            (agent_id, self.deliver_batch(&conn, batch).await)
        }))
        .await;
        let mut requeue = Vec::new();
        for (agent_id, outcome) in results {
            report.agent_packets += outcome.sent;
            report.dropped += outcome.dropped;
            if !outcome.undelivered.is_empty() {
                requeue.push((agent_id, outcome.undelivered));
            }
        }

        let mut system_tail = Vec::new();
        if let Some((conn, batch)) = system_batch {
            let outcome = self.deliver_batch(&conn, batch).await;
            report.system_packets = outcome.sent;
            report.dropped += outcome.dropped;
            system_tail = outcome.undelivered;
        }

        if !requeue.is_empty() || !system_tail.is_empty() {
            debug!(
                agents = requeue.len(),
                system_packets = system_tail.len(),
                "socket closed mid-batch, requeueing undelivered packets"
            );
            self.with_state(|state| {
                for (agent_id, tail) in requeue {
                    if let Some(record) = state.agents.get_mut(&agent_id) {
                        record.requeue_front(tail);
                    }
                }
                for packet in system_tail.into_iter().rev() {
                    state.system_queue.push_front(packet);
                }
            });
        }

        if report.agent_packets + report.system_packets + report.dropped > 0 {
            debug!(
                agent_packets = report.agent_packets,
                system_packets = report.system_packets,
                dropped = report.dropped,
                "dispatch tick"
            );
        }
        report
    }

    /// Send `batch` in order, stopping at the first packet whose socket turns
    /// out to be closed.
    async fn deliver_batch(&self, conn: &Connection, batch: Vec<Packet>) -> BatchOutcome {
        let cancel = self.shutdown_token();
        let delay = self.settings().retry_delay;
        let mut outcome = BatchOutcome::default();
        let mut packets = batch.into_iter();
        while let Some(packet) = packets.next() {
            let delivery = send_reliable(conn.sink().as_ref(), &packet, delay, &cancel).await;
            self.metrics().record_delivery(delivery);
            match delivery {
                Delivery::Sent | Delivery::SentOnRetry => outcome.sent += 1,
                Delivery::Dropped => outcome.dropped += 1,
                Delivery::Skipped => {
                    outcome.undelivered.push(packet);
                    outcome.undelivered.extend(packets.by_ref());
                    break;
                }
            }
        }
        outcome
    }
}

#[derive(Default)]
struct BatchOutcome {
    sent: usize,
    dropped: usize,
    /// Packets never attempted because the socket closed.
    undelivered: Vec<Packet>,
}
