//! Session event stream types.
//!
//! Events are advisory: a missing or slow sink never affects run-loop
//! correctness. Confirmation events are the exception only in the sense that
//! a front end must eventually answer them for a non-pre-approved tool call
//! to proceed; the gate itself still times out safely without one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Events emitted by sessions and the confirmation gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Thinking {
        session_id: String,
    },
    Chunk {
        session_id: String,
        text: String,
    },
    ToolCallStarted {
        session_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    ToolResult {
        session_id: String,
        tool_name: String,
        result: serde_json::Value,
        is_error: bool,
    },
    Response {
        session_id: String,
        text: String,
    },
    ConversationReset {
        session_id: String,
    },
    ConfirmationRequested {
        execution_id: Uuid,
        session_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },
    /// Synthetic denial emitted when a confirmation times out, so a front
    /// end can reflect the timeout even though no response ever arrived.
    ConfirmationTimedOut {
        execution_id: Uuid,
        session_id: String,
        tool_name: String,
    },
}

/// Callback used for streaming session events.
pub type EventSink = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Forward an event to an optional sink.
pub(crate) fn emit(sink: &Option<EventSink>, event: SessionEvent) {
    if let Some(sink) = sink {
        sink(event);
    }
}
