//! Chat sessions and their orchestrator.

pub mod chat;
pub mod orchestrator;

pub use chat::ChatSession;
pub use orchestrator::SessionOrchestrator;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approvals::ConfirmationGate;
use crate::events::EventSink;
use crate::model::ModelRunner;
use crate::store::KeyValueStore;
use crate::toolserver::ConnectionManager;

/// Shared collaborators injected into every session.
#[derive(Clone)]
pub struct SessionContext {
    pub manager: Arc<ConnectionManager>,
    pub gate: Arc<ConfirmationGate>,
    pub runner: Arc<dyn ModelRunner>,
    pub store: Arc<dyn KeyValueStore>,
    pub sink: Option<EventSink>,
}

/// Persisted session metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMeta {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
}

impl SessionMeta {
    pub fn summary(&self, live: bool) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            message_count: self.message_count,
            live,
        }
    }
}

/// Point-in-time view of one session for listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub message_count: usize,
    pub live: bool,
}

pub(crate) fn meta_key(session_id: &str) -> String {
    format!("sessions/{session_id}/meta")
}

pub(crate) fn log_key(session_id: &str) -> String {
    format!("sessions/{session_id}/log")
}
