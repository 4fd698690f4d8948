//! The shared relay object: every map the router, dispatcher, and HTTP bridge
//! touch lives in one [`RelayState`] behind a single lock, and every caller
//! holds the lock only for a synchronous, non-awaiting critical section.

use parking_lot::Mutex;
use relay_config::RelayConfig;
use relay_core::Packet;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::PendingRequests;
use crate::dispatch::PacketSink;
use crate::metrics::Metrics;
use crate::registry::{ConnectionRegistry, SocketRole};
use crate::store::AgentStore;

pub type ConnectionId = u64;

/// A live socket: a process-unique id plus the sink packets are written to.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    sink: Arc<dyn PacketSink>,
}

impl Connection {
    pub fn new(id: ConnectionId, sink: Arc<dyn PacketSink>) -> Self {
        Self { id, sink }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn sink(&self) -> &Arc<dyn PacketSink> {
        &self.sink
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("closed", &self.sink.is_closed())
            .finish()
    }
}

/// Runtime knobs derived from [`RelayConfig`].
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub system_id: String,
    pub server_id: String,
    pub tick_interval: Duration,
    pub retry_delay: Duration,
    /// `None` parks HTTP callers until a reply arrives, however long that takes.
    pub request_timeout: Option<Duration>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        let timeout = config.bridge.request_timeout_secs;
        Self {
            system_id: config.bridge.system_id.clone(),
            server_id: config.bridge.server_id.clone(),
            tick_interval: Duration::from_millis(config.dispatch.tick_interval_ms),
            retry_delay: Duration::from_millis(config.dispatch.retry_delay_ms),
            request_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
        }
    }
}

/// Everything mutable in the relay.
#[derive(Default)]
pub struct RelayState {
    pub registry: ConnectionRegistry,
    pub agents: AgentStore,
    /// FIFO of packets bound for the system connection.
    pub system_queue: VecDeque<Packet>,
    pub pending: PendingRequests,
}

pub struct Relay {
    settings: RelaySettings,
    state: Mutex<RelayState>,
    metrics: Metrics,
    next_connection: AtomicU64,
    dispatch_started: AtomicBool,
    shutdown: CancellationToken,
}

impl Relay {
    pub fn new(settings: RelaySettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            state: Mutex::new(RelayState::default()),
            metrics: Metrics::new(),
            next_connection: AtomicU64::new(1),
            dispatch_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    /// A relay whose dispatch loop never starts on its own; tests drive
    /// delivery by calling [`Relay::tick`] directly.
    pub fn new_for_test(settings: RelaySettings) -> Arc<Self> {
        let relay = Self::new(settings);
        relay.dispatch_started.store(true, Ordering::SeqCst);
        relay
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_system_id(&self, id: &str) -> bool {
        id == self.settings.system_id
    }

    /// Allocate an id for a freshly accepted socket.
    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Run `f` with exclusive access to the relay state. `f` must not block.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut RelayState) -> R) -> R {
        f(&mut *self.state.lock())
    }

    /// Returns `true` exactly once per relay, for the caller that should
    /// spawn the dispatch loop.
    pub(crate) fn claim_dispatch_start(&self) -> bool {
        !self.dispatch_started.swap(true, Ordering::SeqCst)
    }

    /// Token cancelled when the relay shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop the dispatch loop and abort any pending resend delay.
    pub fn shutdown(&self) {
        info!("relay shutting down");
        self.shutdown.cancel();
    }

    /// Called by the transport when a socket closes.
    ///
    /// Bindings for the socket are dropped but agent records and queued
    /// packets are kept, so an agent that reconnects under the same id picks
    /// up anything queued while it was away.
    pub fn disconnect(&self, id: ConnectionId) {
        let role = self.with_state(|state| state.registry.unregister_socket(id));
        match role {
            Some(SocketRole::System) => info!(connection = id, "system connection closed"),
            Some(SocketRole::Agent(agent_id)) => {
                info!(connection = id, agent_id = %agent_id, "agent socket closed, keeping queue for reconnect")
            }
            None => debug!(connection = id, "unregistered socket closed"),
        }
    }
}
