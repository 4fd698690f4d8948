//! HTTP-to-socket correlation.
//!
//! An HTTP call that needs an answer from the system connection is turned
//! into a request packet carrying a fresh `request_id`, the caller is parked
//! on a oneshot channel under that id, and the packet router completes the
//! channel when the matching reply packet arrives.

use axum::extract::Multipart;
use base64::Engine;
use relay_core::{Packet, PacketType, RelayError, Result};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::relay::Relay;

/// Form field naming the agent that made a `/submit_task` submission.
pub const USED_AGENT_ID_FIELD: &str = "USED_AGENT_ID";

/// Synchronous endpoints that are answered by the system connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemRequest {
    InitialTaskData,
    RegisterWorker,
    RequestAgent,
    SubmitOnboarding,
}

impl SystemRequest {
    pub fn packet_type(self) -> PacketType {
        match self {
            SystemRequest::InitialTaskData => PacketType::InitDataRequest,
            SystemRequest::RegisterWorker => PacketType::RegisterWorker,
            SystemRequest::RequestAgent => PacketType::RegisterAgent,
            SystemRequest::SubmitOnboarding => PacketType::SubmitOnboarding,
        }
    }
}

/// Outcome of handing a reply to the pending table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Delivered,
    /// The entry existed but its HTTP caller had already gone away.
    CallerGone,
    /// No entry under that id: never issued, already resolved, or expired.
    Unknown,
}

/// Parked HTTP callers keyed by request id.
#[derive(Default)]
pub struct PendingRequests {
    waiting: HashMap<String, oneshot::Sender<Value>>,
}

impl PendingRequests {
    pub fn park(&mut self, request_id: String) -> oneshot::Receiver<Value> {
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(request_id, tx);
        rx
    }

    /// Remove the entry and hand `payload` to its caller. Each id resolves at most once.
    pub fn resolve(&mut self, request_id: &str, payload: Value) -> Resolution {
        match self.waiting.remove(request_id) {
            Some(tx) => match tx.send(payload) {
                Ok(()) => Resolution::Delivered,
                Err(_) => Resolution::CallerGone,
            },
            None => Resolution::Unknown,
        }
    }

    pub fn cancel(&mut self, request_id: &str) -> bool {
        self.waiting.remove(request_id).is_some()
    }

    pub fn contains(&self, request_id: &str) -> bool {
        self.waiting.contains_key(request_id)
    }

    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

/// Removes a pending entry when its HTTP caller stops waiting for any reason
/// (timeout, client disconnect). A no-op after a successful resolve.
struct PendingGuard<'a> {
    relay: &'a Relay,
    request_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self
            .relay
            .with_state(|state| state.pending.cancel(self.request_id))
        {
            debug!(request_id = self.request_id, "pending request withdrawn");
        }
    }
}

/// A completed task posted to `/submit_task`.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub agent_id: String,
    pub task_data: Map<String, Value>,
    pub files: Vec<SubmittedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedFile {
    pub field: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size: usize,
    /// Base64 of the raw file bytes.
    pub data: String,
}

impl Submission {
    /// Read a multipart form: `USED_AGENT_ID` names the agent, other text
    /// fields become task data, and file parts are carried inline.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut submission = Submission::default();
        let mut agent_id = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| RelayError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(filename) = field.file_name().map(str::to_string) {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| RelayError::BadRequest(e.to_string()))?;
                submission.files.push(SubmittedFile {
                    field: name,
                    filename,
                    content_type,
                    size: bytes.len(),
                    data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                });
                continue;
            }

            let text = field
                .text()
                .await
                .map_err(|e| RelayError::BadRequest(e.to_string()))?;
            if name == USED_AGENT_ID_FIELD {
                agent_id = Some(text);
            } else {
                submission.task_data.insert(name, Value::String(text));
            }
        }

        submission.agent_id = agent_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RelayError::BadRequest(format!("missing {USED_AGENT_ID_FIELD}")))?;
        Ok(submission)
    }
}

impl Relay {
    /// Ask the system connection for something and wait for its reply.
    ///
    /// Fails with [`RelayError::UpstreamTimeout`] when the configured
    /// timeout elapses first; the pending entry is removed either way.
    pub async fn request_from_system(
        &self,
        kind: SystemRequest,
        provider_data: Value,
    ) -> Result<Value> {
        let request_id = Uuid::new_v4().to_string();
        let packet = Packet::new(
            kind.packet_type(),
            &self.settings().server_id,
            &self.settings().system_id,
            json!({
                "provider_data": provider_data,
                "request_id": request_id,
            }),
        );

        let reply = self.with_state(|state| {
            let rx = state.pending.park(request_id.clone());
            state.system_queue.push_back(packet);
            rx
        });
        let _guard = PendingGuard {
            relay: self,
            request_id: &request_id,
        };
        debug!(request_id = %request_id, packet_type = %kind.packet_type(), "parked request for system");

        let outcome = match self.settings().request_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.metrics().inc_requests_timed_out();
                    warn!(
                        request_id = %request_id,
                        timeout_secs = limit.as_secs(),
                        "system did not answer in time"
                    );
                    return Err(RelayError::UpstreamTimeout {
                        request_id: request_id.clone(),
                    });
                }
            },
            None => reply.await,
        };

        outcome.map_err(|_| RelayError::RequestAbandoned(request_id.clone()))
    }

    /// Forward a completed task to the system. Does not wait for a reply.
    pub fn submit_task(&self, submission: Submission) {
        let file_count = submission.files.len();
        let packet = Packet::new(
            PacketType::AgentAction,
            submission.agent_id.as_str(),
            &self.settings().system_id,
            json!({
                "task_data": submission.task_data,
                "files": submission.files,
                "MEPHISTO_is_submit": true,
            }),
        );
        self.with_state(|state| state.system_queue.push_back(packet));
        info!(agent_id = %submission.agent_id, files = file_count, "task submitted");
    }
}
