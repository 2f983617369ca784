//! Tool-confirmation gate.
//!
//! Stands between "model wants to call tool X" and "tool X executes". Each
//! non-pre-approved request suspends on an externally delivered response,
//! bounded by a timeout. The protected call is never executed speculatively.

pub mod allowed;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::GateConfig;
use crate::events::{emit, EventSink, SessionEvent};
use crate::store::KeyValueStore;

pub use allowed::{AllowedTools, RememberScope};

/// A proposed tool call awaiting authorization.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub session_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

/// Externally delivered answer to a confirmation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationResponse {
    pub execution_id: Uuid,
    pub approved: bool,
    /// When set on an approval, the tool is written to the allow-list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remember: Option<RememberScope>,
}

/// Terminal state of one confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved,
    Denied,
    TimedOut,
    Canceled,
}

impl ConfirmationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Human-readable reason for the non-approved outcomes.
    pub fn denial_reason(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "the request was denied",
            Self::TimedOut => "no confirmation arrived before the timeout",
            Self::Canceled => "the run was canceled",
        }
    }
}

struct PendingConfirmation {
    tool_name: String,
    session_id: String,
    created_at: DateTime<Utc>,
    responder: oneshot::Sender<ConfirmationResponse>,
}

/// Event-driven, timeout-bound approval checkpoint.
pub struct ConfirmationGate {
    pending: Mutex<HashMap<Uuid, PendingConfirmation>>,
    allowed: AllowedTools,
    timeout: Duration,
    sink: Option<EventSink>,
}

impl ConfirmationGate {
    pub fn new(store: Arc<dyn KeyValueStore>, config: GateConfig, sink: Option<EventSink>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            allowed: AllowedTools::new(store),
            timeout: config.confirmation_timeout,
            sink,
        }
    }

    /// Authorize one proposed tool call.
    ///
    /// Pre-approved tools short-circuit to `Approved`. Otherwise the request
    /// is registered, announced through the sink, and suspended until a
    /// response, the timeout, or cancellation resolves it. A timeout also
    /// emits a synthetic denial event so front ends can reflect it.
    pub async fn authorize(
        &self,
        request: ConfirmationRequest,
        cancel: &CancellationToken,
    ) -> ConfirmationOutcome {
        if self
            .allowed
            .is_allowed(&request.session_id, &request.tool_name)
            .await
        {
            debug!(
                tool = %request.tool_name,
                session = %request.session_id,
                "tool pre-approved by allow-list"
            );
            return ConfirmationOutcome::Approved;
        }

        let execution_id = Uuid::new_v4();
        let (responder, mut response_rx) = oneshot::channel();
        self.pending.lock().await.insert(
            execution_id,
            PendingConfirmation {
                tool_name: request.tool_name.clone(),
                session_id: request.session_id.clone(),
                created_at: Utc::now(),
                responder,
            },
        );

        emit(
            &self.sink,
            SessionEvent::ConfirmationRequested {
                execution_id,
                session_id: request.session_id.clone(),
                tool_name: request.tool_name.clone(),
                arguments: request.arguments.clone(),
            },
        );

        let sleep = tokio::time::sleep(self.timeout);
        tokio::pin!(sleep);

        tokio::select! {
            biased;
            response = &mut response_rx => match response {
                Ok(response) => self.resolve_response(&request, response).await,
                // The responder was dropped without an answer: the entry was
                // cleared externally, treat like cancellation.
                Err(_) => ConfirmationOutcome::Canceled,
            },
            _ = cancel.cancelled() => {
                self.pending.lock().await.remove(&execution_id);
                debug!(execution_id = %execution_id, "confirmation released by cancellation");
                ConfirmationOutcome::Canceled
            }
            _ = &mut sleep => {
                if let Some(entry) = self.pending.lock().await.remove(&execution_id) {
                    debug!(
                        execution_id = %execution_id,
                        tool = %entry.tool_name,
                        waited_ms = (Utc::now() - entry.created_at).num_milliseconds(),
                        "confirmation timed out"
                    );
                    emit(
                        &self.sink,
                        SessionEvent::ConfirmationTimedOut {
                            execution_id,
                            session_id: request.session_id.clone(),
                            tool_name: request.tool_name.clone(),
                        },
                    );
                    ConfirmationOutcome::TimedOut
                } else {
                    // A response won the race against the timer; it is
                    // already sitting in the channel.
                    match response_rx.try_recv() {
                        Ok(response) => self.resolve_response(&request, response).await,
                        Err(_) => ConfirmationOutcome::Canceled,
                    }
                }
            }
        }
    }

    /// Deliver an external confirmation response.
    ///
    /// Resolves the pending entry exactly once: the entry is removed
    /// atomically before the waiting task is woken, so a duplicate or late
    /// response finds nothing and is ignored with a log record.
    pub async fn handle_confirmation_response(&self, response: ConfirmationResponse) {
        let entry = self.pending.lock().await.remove(&response.execution_id);
        match entry {
            Some(pending) => {
                if pending.responder.send(response).is_err() {
                    debug!(
                        tool = %pending.tool_name,
                        session = %pending.session_id,
                        "confirmation waiter already gone"
                    );
                }
            }
            None => {
                warn!(
                    execution_id = %response.execution_id,
                    "ignoring unknown or already-resolved confirmation response"
                );
            }
        }
    }

    /// Number of unresolved confirmations.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether an execution id is still awaiting resolution.
    pub async fn is_pending(&self, execution_id: Uuid) -> bool {
        self.pending.lock().await.contains_key(&execution_id)
    }

    async fn resolve_response(
        &self,
        request: &ConfirmationRequest,
        response: ConfirmationResponse,
    ) -> ConfirmationOutcome {
        if !response.approved {
            return ConfirmationOutcome::Denied;
        }
        if let Some(scope) = response.remember {
            if let Err(err) = self
                .allowed
                .remember(scope, &request.session_id, &request.tool_name)
                .await
            {
                warn!(
                    tool = %request.tool_name,
                    error = %err,
                    "failed to persist remembered approval"
                );
            }
        }
        ConfirmationOutcome::Approved
    }
}
