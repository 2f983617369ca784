//! Persisted allow-list of tools that bypass confirmation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;
use crate::store::KeyValueStore;

const GLOBAL_KEY: &str = "approvals/allowed/global";

fn session_key(session_id: &str) -> String {
    format!("approvals/allowed/session/{session_id}")
}

/// Scope of a remembered approval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RememberScope {
    Session,
    Global,
}

/// Store-backed set of pre-approved tool names, session-scoped or global.
///
/// Mutated only through [`remember`](Self::remember), which is a distinct,
/// audited write — never folded into confirmation resolution itself.
#[derive(Clone)]
pub struct AllowedTools {
    store: Arc<dyn KeyValueStore>,
}

impl AllowedTools {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Whether `tool_name` bypasses confirmation for this session. Store
    /// failures fail closed (not allowed) with a log record.
    pub async fn is_allowed(&self, session_id: &str, tool_name: &str) -> bool {
        self.contains(GLOBAL_KEY, tool_name).await
            || self.contains(&session_key(session_id), tool_name).await
    }

    /// Record an approved tool so future calls skip confirmation.
    pub async fn remember(
        &self,
        scope: RememberScope,
        session_id: &str,
        tool_name: &str,
    ) -> Result<()> {
        let key = match scope {
            RememberScope::Global => GLOBAL_KEY.to_owned(),
            RememberScope::Session => session_key(session_id),
        };
        let mut names = self.read_set(&key).await?;
        if !names.contains(&tool_name.to_owned()) {
            names.push(tool_name.to_owned());
            names.sort();
            self.store.set(&key, serde_json::to_value(&names)?).await?;
        }
        info!(
            tool = %tool_name,
            session = %session_id,
            scope = ?scope,
            "tool added to confirmation allow-list"
        );
        Ok(())
    }

    async fn contains(&self, key: &str, tool_name: &str) -> bool {
        match self.read_set(key).await {
            Ok(names) => names.iter().any(|n| n == tool_name),
            Err(err) => {
                warn!(key = %key, error = %err, "allow-list read failed; treating as not allowed");
                false
            }
        }
    }

    async fn read_set(&self, key: &str) -> Result<Vec<String>> {
        match self.store.get(key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}
