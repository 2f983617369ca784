//! Session orchestration: creation, lookup, expiry, and disposal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{SessionDefaults, SessionLimits};
use crate::error::Result;

use super::{log_key, meta_key, ChatSession, SessionContext, SessionMeta, SessionSummary};

/// Creates, looks up, expires, and destroys chat sessions, enforcing
/// capacity and time-to-live policies.
///
/// Disposal frees memory and durably persists history; it never deletes
/// persisted state. Only [`delete`](Self::delete) removes a session's
/// stored history.
pub struct SessionOrchestrator {
    live: Mutex<HashMap<String, Arc<ChatSession>>>,
    known: Mutex<HashMap<String, SessionMeta>>,
    ctx: SessionContext,
    defaults: SessionDefaults,
    limits: SessionLimits,
}

impl SessionOrchestrator {
    pub fn new(ctx: SessionContext, defaults: SessionDefaults, limits: SessionLimits) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            known: Mutex::new(HashMap::new()),
            ctx,
            defaults,
            limits,
        }
    }

    /// Reload known session metadata from the store, so a restart does not
    /// lose the set of known session ids. Histories are loaded lazily when
    /// a session is next referenced.
    pub async fn hydrate(&self) -> Result<usize> {
        let keys = self.ctx.store.list("sessions/").await?;
        let mut known = self.known.lock().await;
        let mut count = 0;
        for key in keys.iter().filter(|k| k.ends_with("/meta")) {
            let Some(value) = self.ctx.store.get(key).await? else {
                continue;
            };
            match serde_json::from_value::<SessionMeta>(value) {
                Ok(meta) => {
                    known.insert(meta.session_id.clone(), meta);
                    count += 1;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping unreadable session metadata");
                }
            }
        }
        Ok(count)
    }

    /// Get the live session for `session_id`, or create one (generating an
    /// id when none is supplied). A previously disposed session comes back
    /// with its persisted history re-materialized.
    pub async fn create_or_get(&self, session_id: Option<&str>) -> Result<Arc<ChatSession>> {
        let id = match session_id {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => Uuid::new_v4().to_string(),
        };

        if let Some(session) = self.live.lock().await.get(&id).cloned() {
            return Ok(session);
        }

        self.enforce_capacity().await;

        let session = Arc::new(ChatSession::new(id.clone(), &self.defaults, self.ctx.clone()));
        session.hydrate_history().await?;

        let session = {
            let mut live = self.live.lock().await;
            // Another task may have created the session while we hydrated.
            live.entry(id.clone()).or_insert(session).clone()
        };
        self.known
            .lock()
            .await
            .insert(id.clone(), session.meta().await);
        info!(session = %id, "session ready");
        Ok(session)
    }

    /// Look up a live session. `None` is the typed not-found: disposed or
    /// unknown ids simply are not live.
    pub async fn get(&self, session_id: &str) -> Option<Arc<ChatSession>> {
        self.live.lock().await.get(session_id).cloned()
    }

    /// Summaries of every known session, live and disposed.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let live: HashMap<String, Arc<ChatSession>> = self.live.lock().await.clone();
        let mut summaries: HashMap<String, SessionSummary> = self
            .known
            .lock()
            .await
            .iter()
            .map(|(id, meta)| (id.clone(), meta.summary(live.contains_key(id))))
            .collect();
        for (id, session) in &live {
            summaries.insert(id.clone(), session.summary().await);
        }
        let mut out: Vec<SessionSummary> = summaries.into_values().collect();
        out.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        out
    }

    /// Fully delete a session: live state, metadata, and persisted history.
    pub async fn delete(&self, session_id: &str) -> bool {
        let live = self.live.lock().await.remove(session_id);
        if let Some(session) = &live {
            session.mark_disposed();
        }
        let known = self.known.lock().await.remove(session_id).is_some();
        let meta_deleted = self
            .ctx
            .store
            .delete(&meta_key(session_id))
            .await
            .unwrap_or(false);
        let log_deleted = self
            .ctx
            .store
            .delete(&log_key(session_id))
            .await
            .unwrap_or(false);
        let deleted = live.is_some() || known || meta_deleted || log_deleted;
        if deleted {
            info!(session = %session_id, "session deleted");
        }
        deleted
    }

    /// Periodic sweep: dispose sessions idle longer than the TTL. Returns
    /// how many were disposed; eviction is a log event, never an error.
    pub async fn expire_idle(&self) -> usize {
        let now = Utc::now();
        let snapshot = self.live_snapshot().await;
        let mut disposed = 0;
        for (id, session) in snapshot {
            let idle = (now - session.last_activity().await)
                .to_std()
                .unwrap_or_default();
            if idle > self.limits.idle_ttl {
                self.dispose(&id).await;
                disposed += 1;
            }
        }
        if disposed > 0 {
            info!(count = disposed, "disposed idle sessions");
        }
        disposed
    }

    /// Number of live (in-memory) sessions.
    pub async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }

    /// Dispose least-recently-active sessions until a new one fits.
    async fn enforce_capacity(&self) {
        loop {
            let snapshot = self.live_snapshot().await;
            if snapshot.len() < self.limits.max_sessions {
                return;
            }
            let mut victim: Option<(String, chrono::DateTime<Utc>)> = None;
            for (id, session) in &snapshot {
                let at = session.last_activity().await;
                let replace = victim.as_ref().map(|(_, t)| at < *t).unwrap_or(true);
                if replace {
                    victim = Some((id.clone(), at));
                }
            }
            let Some((id, _)) = victim else { return };
            info!(session = %id, "disposing least-recently-active session for capacity");
            self.dispose(&id).await;
        }
    }

    /// Persist and drop one live session. Never deletes stored history.
    async fn dispose(&self, session_id: &str) {
        let session = self.live.lock().await.remove(session_id);
        let Some(session) = session else { return };
        if let Err(err) = session.persist().await {
            warn!(session = %session_id, error = %err, "failed to persist session during disposal");
        }
        session.mark_disposed();
        self.known
            .lock()
            .await
            .insert(session_id.to_owned(), session.meta().await);
        info!(session = %session_id, "session disposed");
    }

    async fn live_snapshot(&self) -> Vec<(String, Arc<ChatSession>)> {
        self.live
            .lock()
            .await
            .iter()
            .map(|(id, session)| (id.clone(), session.clone()))
            .collect()
    }
}
