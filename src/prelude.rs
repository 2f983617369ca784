//! Convenience re-exports for common usage.

pub use crate::approvals::{
    AllowedTools, ConfirmationGate, ConfirmationOutcome, ConfirmationRequest,
    ConfirmationResponse, RememberScope,
};
pub use crate::config::{GateConfig, SessionDefaults, SessionLimits};
pub use crate::error::{ModelErrorKind, Result, TychoError};
pub use crate::events::{EventSink, SessionEvent};
pub use crate::format::{ProviderPayload, WireFormat};
pub use crate::model::{ModelBinding, ModelChunk, ModelRunner, ModelTurn};
pub use crate::session::{
    ChatSession, SessionContext, SessionMeta, SessionOrchestrator, SessionSummary,
};
pub use crate::store::{KeyValueStore, MemoryStore};
pub use crate::toolserver::{
    ConnectionManager, SocketTransport, StdioTransport, ToolCatalog, ToolSchema,
    ToolServerConnection, ToolServerSpec, ToolTransport, TransportKind,
};
pub use crate::types::{Attachment, ChatMessage, ContentPart, Role, ToolCall, ToolResult};
