//! Generic wire shape: a lossless transcript of the internal form.
//!
//! Useful for local or self-hosted backends that accept the internal
//! representation directly, and as the reference output in tests.

use crate::error::Result;
use crate::toolserver::schema::ToolSchema;
use crate::types::ChatMessage;

pub(super) fn render(
    history: &[ChatMessage],
    system_prompt: Option<&str>,
    tools: &[ToolSchema],
) -> Result<serde_json::Value> {
    let mut body = serde_json::json!({
        "messages": serde_json::to_value(history)?,
    });
    if let Some(system) = system_prompt {
        body["system"] = system.into();
    }
    if !tools.is_empty() {
        body["tools"] = serde_json::to_value(tools)?;
    }
    Ok(body)
}
