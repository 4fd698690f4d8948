//! Prometheus-compatible metrics endpoint for the relay.
//!
//! Tracks packet flow, delivery outcomes, and HTTP bridge correlation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::dispatch::Delivery;

/// Relay metrics registry.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Total HTTP requests served.
    pub http_requests_total: AtomicU64,
    /// Total HTTP errors (4xx + 5xx).
    pub http_errors_total: AtomicU64,
    /// Total raw packets read from sockets.
    pub packets_received_total: AtomicU64,
    /// Malformed packets or unknown type tags.
    pub packets_rejected_total: AtomicU64,
    /// Agent actions addressed to an agent the relay has never seen.
    pub packets_undeliverable_total: AtomicU64,
    /// Packets written to a socket (first try or retry).
    pub packets_delivered_total: AtomicU64,
    /// Packets that only got through on the resend.
    pub send_retries_total: AtomicU64,
    /// Packets dropped after the resend also failed.
    pub send_drops_total: AtomicU64,
    /// Pending HTTP requests completed by a reply packet.
    pub requests_resolved_total: AtomicU64,
    /// Pending HTTP requests that gave up waiting.
    pub requests_timed_out_total: AtomicU64,
    /// Reply packets that matched no pending request.
    pub orphan_replies_total: AtomicU64,
    /// Server start time for uptime calculation.
    pub started_at: Instant,
}

/// Point-in-time values read from relay state when rendering.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gauges {
    pub known_agents: usize,
    pub connected_agents: usize,
    pub pending_requests: usize,
    pub system_queue_len: usize,
    pub system_connected: bool,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                http_requests_total: AtomicU64::new(0),
                http_errors_total: AtomicU64::new(0),
                packets_received_total: AtomicU64::new(0),
                packets_rejected_total: AtomicU64::new(0),
                packets_undeliverable_total: AtomicU64::new(0),
                packets_delivered_total: AtomicU64::new(0),
                send_retries_total: AtomicU64::new(0),
                send_drops_total: AtomicU64::new(0),
                requests_resolved_total: AtomicU64::new(0),
                requests_timed_out_total: AtomicU64::new(0),
                orphan_replies_total: AtomicU64::new(0),
                started_at: Instant::now(),
            }),
        }
    }

    pub fn inc_http_requests(&self) {
        self.inner
            .http_requests_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_http_errors(&self) {
        self.inner.http_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_packets_received(&self) {
        self.inner
            .packets_received_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_packets_rejected(&self) {
        self.inner
            .packets_rejected_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_packets_undeliverable(&self) {
        self.inner
            .packets_undeliverable_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_resolved(&self) {
        self.inner
            .requests_resolved_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_requests_timed_out(&self) {
        self.inner
            .requests_timed_out_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_orphan_replies(&self) {
        self.inner
            .orphan_replies_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, outcome: Delivery) {
        let m = &self.inner;
        match outcome {
            Delivery::Sent => {
                m.packets_delivered_total.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::SentOnRetry => {
                m.packets_delivered_total.fetch_add(1, Ordering::Relaxed);
                m.send_retries_total.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Dropped => {
                m.send_drops_total.fetch_add(1, Ordering::Relaxed);
            }
            Delivery::Skipped => {}
        }
    }

    pub fn requests_timed_out(&self) -> u64 {
        self.inner.requests_timed_out_total.load(Ordering::Relaxed)
    }

    pub fn orphan_replies(&self) -> u64 {
        self.inner.orphan_replies_total.load(Ordering::Relaxed)
    }

    /// Render metrics in Prometheus text exposition format.
    pub fn render_prometheus(&self, gauges: Gauges) -> String {
        let m = &self.inner;
        let uptime = m.started_at.elapsed().as_secs();

        format!(
            r#"# HELP relay_uptime_seconds Time since the server started.
# TYPE relay_uptime_seconds gauge
relay_uptime_seconds {}

# HELP relay_system_connected Whether a system connection is bound (0/1).
# TYPE relay_system_connected gauge
relay_system_connected {}

# HELP relay_known_agents Agents the relay has a record for.
# TYPE relay_known_agents gauge
relay_known_agents {}

# HELP relay_connected_agents Agents currently bound to a socket.
# TYPE relay_connected_agents gauge
relay_connected_agents {}

# HELP relay_pending_requests HTTP requests waiting for a system reply.
# TYPE relay_pending_requests gauge
relay_pending_requests {}

# HELP relay_system_queue_length Packets waiting for the system connection.
# TYPE relay_system_queue_length gauge
relay_system_queue_length {}

# HELP relay_http_requests_total Total HTTP requests served.
# TYPE relay_http_requests_total counter
relay_http_requests_total {}

# HELP relay_http_errors_total Total HTTP errors (4xx/5xx).
# TYPE relay_http_errors_total counter
relay_http_errors_total {}

# HELP relay_packets_received_total Total packets read from sockets.
# TYPE relay_packets_received_total counter
relay_packets_received_total {}

# HELP relay_packets_rejected_total Malformed or unknown-type packets.
# TYPE relay_packets_rejected_total counter
relay_packets_rejected_total {}

# HELP relay_packets_undeliverable_total Agent actions for unknown agents.
# TYPE relay_packets_undeliverable_total counter
relay_packets_undeliverable_total {}

# HELP relay_packets_delivered_total Packets written to a socket.
# TYPE relay_packets_delivered_total counter
relay_packets_delivered_total {}

# HELP relay_send_retries_total Packets delivered on the resend attempt.
# TYPE relay_send_retries_total counter
relay_send_retries_total {}

# HELP relay_send_drops_total Packets dropped after the resend failed.
# TYPE relay_send_drops_total counter
relay_send_drops_total {}

# HELP relay_requests_resolved_total Pending requests answered by the system.
# TYPE relay_requests_resolved_total counter
relay_requests_resolved_total {}

# HELP relay_requests_timed_out_total Pending requests that hit the timeout.
# TYPE relay_requests_timed_out_total counter
relay_requests_timed_out_total {}

# HELP relay_orphan_replies_total Replies that matched no pending request.
# TYPE relay_orphan_replies_total counter
relay_orphan_replies_total {}
"#,
            uptime,
            u8::from(gauges.system_connected),
            gauges.known_agents,
            gauges.connected_agents,
            gauges.pending_requests,
            gauges.system_queue_len,
            m.http_requests_total.load(Ordering::Relaxed),
            m.http_errors_total.load(Ordering::Relaxed),
            m.packets_received_total.load(Ordering::Relaxed),
            m.packets_rejected_total.load(Ordering::Relaxed),
            m.packets_undeliverable_total.load(Ordering::Relaxed),
            m.packets_delivered_total.load(Ordering::Relaxed),
            m.send_retries_total.load(Ordering::Relaxed),
            m.send_drops_total.load(Ordering::Relaxed),
            m.requests_resolved_total.load(Ordering::Relaxed),
            m.requests_timed_out_total.load(Ordering::Relaxed),
            m.orphan_replies_total.load(Ordering::Relaxed),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
