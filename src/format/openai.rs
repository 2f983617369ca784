//! OpenAI Chat Completions wire shape.

use tracing::warn;

use crate::error::Result;
use crate::toolserver::schema::ToolSchema;
use crate::types::message::unresolved_call_ids;
use crate::types::{ChatMessage, ContentPart, Role};

pub(super) fn render(
    history: &[ChatMessage],
    system_prompt: Option<&str>,
    tools: &[ToolSchema],
) -> Result<serde_json::Value> {
    let unresolved = unresolved_call_ids(history);
    let mut messages = Vec::with_capacity(history.len() + 1);

    if let Some(system) = system_prompt {
        messages.push(serde_json::json!({ "role": "system", "content": system }));
    }

    for msg in history {
        match msg.role {
            Role::System => {
                messages.push(serde_json::json!({ "role": "system", "content": msg.text() }));
            }
            Role::User => messages.push(render_user(msg)),
            Role::Assistant => messages.push(render_assistant(msg, &unresolved)),
            Role::Tool => {
                for result in msg.tool_results() {
                    messages.push(serde_json::json!({
                        "role": "tool",
                        "tool_call_id": result.tool_call_id,
                        "content": result.result.to_string(),
                    }));
                }
            }
        }
    }

    let mut body = serde_json::json!({ "messages": messages });
    if !tools.is_empty() {
        let defs: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description.clone().unwrap_or_default(),
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = defs.into();
    }
    Ok(body)
}

fn render_user(msg: &ChatMessage) -> serde_json::Value {
    // Single text part collapses to a plain string content.
    if msg.content.len() == 1 {
        if let ContentPart::Text { text } = &msg.content[0] {
            return serde_json::json!({ "role": "user", "content": text });
        }
    }

    let parts: Vec<serde_json::Value> = msg
        .content
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(serde_json::json!({
                "type": "text",
                "text": text,
            })),
            ContentPart::Image(img) => Some(serde_json::json!({
                "type": "image_url",
                "image_url": {
                    "url": format!("data:{};base64,{}", img.mime_type, img.data)
                }
            })),
            _ => None,
        })
        .collect();
    serde_json::json!({ "role": "user", "content": parts })
}

fn render_assistant(
    msg: &ChatMessage,
    unresolved: &std::collections::HashSet<String>,
) -> serde_json::Value {
    let calls = msg.tool_calls();
    if calls.is_empty() {
        return serde_json::json!({ "role": "assistant", "content": msg.text() });
    }

    // Dangling calls stay on the wire for this backend; the result side is
    // simply absent from the transcript.
    for call in &calls {
        if unresolved.contains(&call.id) {
            warn!(
                call_id = %call.id,
                tool = %call.name,
                "emitting tool call without a paired result"
            );
        }
    }

    let tool_calls: Vec<serde_json::Value> = calls
        .iter()
        .map(|call| {
            serde_json::json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": call.arguments.to_string(),
                }
            })
        })
        .collect();

    let text = msg.text();
    serde_json::json!({
        "role": "assistant",
        "content": if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::Value::String(text)
        },
        "tool_calls": tool_calls,
    })
}
