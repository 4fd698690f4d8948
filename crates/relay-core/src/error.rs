use thiserror::Error;

/// Unified error type for the relay.
#[derive(Error, Debug)]
pub enum RelayError {
    // ── Packet errors ──────────────────────────────────────────
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("unknown packet type: {0}")]
    UnknownPacketType(String),

    // ── Delivery errors ────────────────────────────────────────
    #[error("socket send failed: {0}")]
    Send(String),

    #[error("socket closed")]
    SocketClosed,

    // ── Bridge errors ──────────────────────────────────────────
    #[error("upstream timeout waiting for reply to request {request_id}")]
    UpstreamTimeout { request_id: String },

    #[error("pending request {0} was dropped before a reply arrived")]
    RequestAbandoned(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    // ── Server errors ──────────────────────────────────────────
    #[error("server error: {0}")]
    Server(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
