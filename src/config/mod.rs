//! Configuration types.
//!
//! Everything is constructor-injected; the crate keeps no module-level
//! mutable state, so multiple agents can run in one process without
//! cross-talk.

use std::time::Duration;

use crate::model::ModelBinding;

/// Capacity and lifetime policy for the session orchestrator.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// Maximum live (in-memory) sessions; the least-recently-active session
    /// is disposed to make room.
    pub max_sessions: usize,
    /// Idle time after which a session is disposed by the sweep.
    pub idle_ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 50,
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Per-session defaults applied at creation.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub binding: ModelBinding,
    pub system_prompt: Option<String>,
    /// Ceiling on model/tool iterations within one `run`.
    pub max_iterations: usize,
}

impl SessionDefaults {
    pub fn new(binding: ModelBinding) -> Self {
        Self {
            binding,
            system_prompt: None,
            max_iterations: 10,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Confirmation-gate policy.
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub confirmation_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}
