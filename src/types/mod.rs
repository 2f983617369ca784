//! Core data types.

pub mod message;

pub use message::{
    Attachment, ChatMessage, ContentPart, ImageContent, Role, ToolCall, ToolResult,
};
