//! Model-runner collaborator interface.
//!
//! The actual network call to a language-model provider lives outside this
//! crate; sessions drive it through [`ModelRunner`]. Implementations return
//! typed errors ([`crate::error::ModelErrorKind`]) so callers can decide
//! retry vs abort — the run loop itself never retries.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::{ProviderPayload, WireFormat};
use crate::toolserver::schema::ToolSchema;
use crate::types::ToolCall;

/// The provider/model binding of a session: which wire format to speak,
/// which model to address, and free-form routing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelBinding {
    pub format: WireFormat,
    pub model: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ModelBinding {
    pub fn new(format: WireFormat, model: impl Into<String>) -> Self {
        Self {
            format,
            model: model.into(),
            params: HashMap::new(),
        }
    }
}

/// One completed model turn: final text, plus any requested tool calls.
/// An empty `tool_calls` list means the turn is a final answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelTurn {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
        }
    }
}

/// Incremental output from the streaming variant: text deltas followed by
/// exactly one terminal [`ModelChunk::Final`] carrying the complete shape.
#[derive(Debug, Clone)]
pub enum ModelChunk {
    TextDelta(String),
    Final(ModelTurn),
}

/// External model invocation collaborator.
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Invoke the model once with a provider-shaped payload.
    async fn invoke(&self, payload: &ProviderPayload, tools: &[ToolSchema]) -> Result<ModelTurn>;

    /// Streaming variant. The default implementation performs a single
    /// [`invoke`](Self::invoke) and yields its result as the terminal chunk.
    async fn invoke_stream(
        &self,
        payload: &ProviderPayload,
        tools: &[ToolSchema],
    ) -> Result<BoxStream<'static, Result<ModelChunk>>> {
        let turn = self.invoke(payload, tools).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(ModelChunk::Final(turn))
        })))
    }
}
