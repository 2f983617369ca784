//! A single runnable conversation.
//!
//! One session owns its message log exclusively and processes at most one
//! `run` at a time; a second concurrent call is rejected, never interleaved.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::approvals::{ConfirmationOutcome, ConfirmationRequest};
use crate::config::SessionDefaults;
use crate::error::{ModelErrorKind, Result, TychoError};
use crate::events::{emit, SessionEvent};
use crate::format::ProviderPayload;
use crate::model::{ModelBinding, ModelChunk, ModelTurn};
use crate::toolserver::{ToolCatalog, ToolSchema};
use crate::types::{Attachment, ChatMessage};

use super::{log_key, meta_key, SessionContext, SessionMeta, SessionSummary};

/// Returned when the iteration ceiling is reached without a final answer.
pub const MAX_ITERATIONS_MESSAGE: &str =
    "I wasn't able to finish within the allowed number of tool steps.";

/// Returned when a run is canceled mid-flight.
pub const CANCELED_MESSAGE: &str = "The request was canceled before completion.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Idle,
    Running,
}

/// One conversation: message log, model binding, and the run loop gluing
/// the confirmation gate and connection manager together.
pub struct ChatSession {
    id: String,
    system_prompt: Option<String>,
    max_iterations: usize,
    created_at: DateTime<Utc>,
    binding: Mutex<ModelBinding>,
    messages: Mutex<Vec<ChatMessage>>,
    persisted_count: Mutex<usize>,
    state: Mutex<RunState>,
    cancel: Mutex<CancellationToken>,
    last_activity: Mutex<DateTime<Utc>>,
    disposed: AtomicBool,
    ctx: SessionContext,
}

impl ChatSession {
    pub fn new(id: impl Into<String>, defaults: &SessionDefaults, ctx: SessionContext) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            system_prompt: defaults.system_prompt.clone(),
            max_iterations: defaults.max_iterations,
            created_at: now,
            binding: Mutex::new(defaults.binding.clone()),
            messages: Mutex::new(Vec::new()),
            persisted_count: Mutex::new(0),
            state: Mutex::new(RunState::Idle),
            cancel: Mutex::new(CancellationToken::new()),
            last_activity: Mutex::new(now),
            disposed: AtomicBool::new(false),
            ctx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.lock().await
    }

    pub async fn message_count(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// A cloned snapshot of the message log; the log itself is never handed
    /// out for mutation.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.messages.lock().await.clone()
    }

    pub async fn binding(&self) -> ModelBinding {
        self.binding.lock().await.clone()
    }

    /// Rebind provider/model without losing history.
    pub async fn switch_model(&self, binding: ModelBinding) {
        debug!(session = %self.id, format = %binding.format, model = %binding.model, "model rebound");
        *self.binding.lock().await = binding;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_disposed(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    /// Run one turn of the conversation loop.
    pub async fn run(&self, user_text: impl Into<String>) -> Result<String> {
        self.run_with_attachments(user_text, Vec::new()).await
    }

    /// Run one turn with image attachments alongside the user text.
    ///
    /// # Errors
    ///
    /// `InvalidState` when a run is already in flight or the session is
    /// disposed; `MessageFormat` when the history cannot be rendered for the
    /// bound backend. Tool and model failures do not error: they surface in
    /// the returned text and the tool-result trail.
    pub async fn run_with_attachments(
        &self,
        user_text: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Result<String> {
        if self.is_disposed() {
            return Err(TychoError::InvalidState(format!(
                "session '{}' is disposed",
                self.id
            )));
        }
        self.begin_run()?;
        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();
        self.touch().await;

        let outcome = self.run_inner(user_text.into(), attachments, &cancel).await;

        if let Err(err) = self.persist().await {
            warn!(session = %self.id, error = %err, "failed to persist session state");
        }
        self.touch().await;
        *self.state.lock().await = RunState::Idle;
        outcome
    }

    /// Cancel the in-flight run, if any. Pending model/tool awaits abort
    /// promptly and any pending confirmation is released.
    pub async fn cancel(&self) {
        self.cancel.lock().await.cancel();
    }

    /// Clear the message log and its persisted counterpart. Idempotent.
    pub async fn reset(&self) -> Result<()> {
        {
            let mut log = self.messages.lock().await;
            log.clear();
            *self.persisted_count.lock().await = 0;
        }
        self.ctx.store.delete(&log_key(&self.id)).await?;
        self.save_meta().await?;
        emit(
            &self.ctx.sink,
            SessionEvent::ConversationReset {
                session_id: self.id.clone(),
            },
        );
        Ok(())
    }

    pub async fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity().await,
            message_count: self.message_count().await,
            live: !self.is_disposed(),
        }
    }

    pub(crate) async fn meta(&self) -> SessionMeta {
        SessionMeta {
            session_id: self.id.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity().await,
            message_count: self.message_count().await,
        }
    }

    /// Append unpersisted messages to the store and refresh metadata.
    pub(crate) async fn persist(&self) -> Result<()> {
        {
            let log = self.messages.lock().await;
            let mut persisted = self.persisted_count.lock().await;
            if *persisted > log.len() {
                // The log shrank (reset); rewrite from scratch.
                self.ctx.store.delete(&log_key(&self.id)).await?;
                *persisted = 0;
            }
            for message in log.iter().skip(*persisted) {
                self.ctx
                    .store
                    .append(&log_key(&self.id), serde_json::to_value(message)?)
                    .await?;
            }
            *persisted = log.len();
        }
        self.save_meta().await
    }

    /// Load persisted history, replacing the in-memory log.
    pub(crate) async fn hydrate_history(&self) -> Result<()> {
        let entries = self.ctx.store.range(&log_key(&self.id)).await?;
        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            messages.push(serde_json::from_value(entry)?);
        }
        let count = messages.len();
        *self.messages.lock().await = messages;
        *self.persisted_count.lock().await = count;
        Ok(())
    }

    // -- Run loop internals --

    fn begin_run(&self) -> Result<()> {
        let mut state = self
            .state
            .try_lock()
            .map_err(|_| TychoError::InvalidState(format!("session '{}' is busy", self.id)))?;
        if *state == RunState::Running {
            return Err(TychoError::InvalidState(format!(
                "session '{}' is busy",
                self.id
            )));
        }
        *state = RunState::Running;
        Ok(())
    }

    async fn touch(&self) {
        *self.last_activity.lock().await = Utc::now();
    }

    async fn run_inner(
        &self,
        user_text: String,
        attachments: Vec<Attachment>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        {
            let mut log = self.messages.lock().await;
            log.push(if attachments.is_empty() {
                ChatMessage::user(user_text)
            } else {
                ChatMessage::user_with_attachments(user_text, attachments)
            });
        }

        for iteration in 1..=self.max_iterations {
            emit(
                &self.ctx.sink,
                SessionEvent::Thinking {
                    session_id: self.id.clone(),
                },
            );

            let catalog = match self.ctx.manager.all_tools().await {
                Ok(catalog) => catalog,
                Err(err) => {
                    warn!(session = %self.id, error = %err, "tool catalog unavailable; continuing degraded");
                    ToolCatalog::default()
                }
            };

            let binding = self.binding.lock().await.clone();
            let payload = {
                let log = self.messages.lock().await;
                binding
                    .format
                    .payload(&log, self.system_prompt.as_deref(), catalog.tools())?
            };

            let turn = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Ok(self.conclude(CANCELED_MESSAGE.to_owned()).await);
                }
                turn = self.stream_turn(&payload, catalog.tools()) => turn,
            };
            let turn = match turn {
                Ok(turn) => turn,
                Err(err) => {
                    warn!(session = %self.id, iteration, error = %err, "model invocation failed");
                    return Ok(self
                        .conclude(format!("The model request could not be completed: {err}"))
                        .await);
                }
            };

            if turn.tool_calls.is_empty() {
                return Ok(self.conclude(turn.text).await);
            }

            let ModelTurn { text, tool_calls } = turn;
            self.messages.lock().await.push(ChatMessage::assistant_tool_calls(
                (!text.is_empty()).then_some(text),
                tool_calls.clone(),
            ));

            let mut canceled = false;
            for call in &tool_calls {
                // Once canceled, the remaining calls in this batch get error
                // results so every call stays paired in the log.
                if canceled || cancel.is_cancelled() {
                    self.push_tool_result(
                        call,
                        json!({ "error": "the run was canceled before this tool executed" }),
                        true,
                    )
                    .await;
                    canceled = true;
                    continue;
                }

                emit(
                    &self.ctx.sink,
                    SessionEvent::ToolCallStarted {
                        session_id: self.id.clone(),
                        tool_name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                );

                let outcome = self
                    .ctx
                    .gate
                    .authorize(
                        ConfirmationRequest {
                            session_id: self.id.clone(),
                            tool_name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                        cancel,
                    )
                    .await;

                let (value, is_error) = match outcome {
                    ConfirmationOutcome::Approved => {
                        let executed = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            result = self
                                .ctx
                                .manager
                                .call_tool(&call.name, call.arguments.clone()) => Some(result),
                        };
                        match executed {
                            Some(Ok(value)) => (value, false),
                            Some(Err(err)) => (json!({ "error": err.to_string() }), true),
                            None => {
                                canceled = true;
                                (
                                    json!({ "error": "the run was canceled before this tool executed" }),
                                    true,
                                )
                            }
                        }
                    }
                    ConfirmationOutcome::Canceled => {
                        canceled = true;
                        (
                            json!({ "error": "the run was canceled before this tool executed" }),
                            true,
                        )
                    }
                    denied => {
                        let err = TychoError::NotPermitted {
                            tool_name: call.name.clone(),
                            reason: denied.denial_reason().to_owned(),
                        };
                        (json!({ "error": err.to_string() }), true)
                    }
                };
                self.push_tool_result(call, value, is_error).await;
            }

            if canceled {
                return Ok(self.conclude(CANCELED_MESSAGE.to_owned()).await);
            }
        }

        Ok(self.conclude(MAX_ITERATIONS_MESSAGE.to_owned()).await)
    }

    /// Consume the model stream, forwarding text deltas as chunk events.
    async fn stream_turn(
        &self,
        payload: &ProviderPayload,
        tools: &[ToolSchema],
    ) -> Result<ModelTurn> {
        let mut stream = self.ctx.runner.invoke_stream(payload, tools).await?;
        let mut accumulated = String::new();
        let mut final_turn = None;

        while let Some(chunk) = stream.next().await {
            match chunk? {
                ModelChunk::TextDelta(delta) => {
                    if !delta.is_empty() {
                        emit(
                            &self.ctx.sink,
                            SessionEvent::Chunk {
                                session_id: self.id.clone(),
                                text: delta.clone(),
                            },
                        );
                        accumulated.push_str(&delta);
                    }
                }
                ModelChunk::Final(turn) => {
                    final_turn = Some(turn);
                    break;
                }
            }
        }

        let mut turn = final_turn.ok_or_else(|| TychoError::Model {
            kind: ModelErrorKind::Other,
            message: "model stream ended without a final turn".into(),
        })?;
        if turn.text.is_empty() {
            turn.text = accumulated;
        }
        Ok(turn)
    }

    async fn conclude(&self, text: String) -> String {
        self.messages
            .lock()
            .await
            .push(ChatMessage::assistant(text.clone()));
        emit(
            &self.ctx.sink,
            SessionEvent::Response {
                session_id: self.id.clone(),
                text: text.clone(),
            },
        );
        text
    }

    async fn push_tool_result(
        &self,
        call: &crate::types::ToolCall,
        value: serde_json::Value,
        is_error: bool,
    ) {
        self.messages.lock().await.push(ChatMessage::tool_result(
            call.id.clone(),
            call.name.clone(),
            value.clone(),
            is_error,
        ));
        emit(
            &self.ctx.sink,
            SessionEvent::ToolResult {
                session_id: self.id.clone(),
                tool_name: call.name.clone(),
                result: value,
                is_error,
            },
        );
    }

    async fn save_meta(&self) -> Result<()> {
        let meta = self.meta().await;
        self.ctx
            .store
            .set(&meta_key(&self.id), serde_json::to_value(&meta)?)
            .await
    }
}
