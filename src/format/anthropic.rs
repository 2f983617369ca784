//! Anthropic Messages wire shape.
//!
//! Tool results are nested inside user-role content blocks, and system text
//! travels in a top-level field rather than the message list. One assistant
//! turn keeps all of its `tool_use` blocks in a single message.

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
    let mut system_parts: Vec<String> = system_prompt.map(|s| vec![s.to_owned()]).unwrap_or_default();
    let mut messages = Vec::new();

    for msg in history {
        match msg.role {
            Role::System => system_parts.push(msg.text()),
            Role::User => {
                let content: Vec<serde_json::Value> = msg
                    .content
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(serde_json::json!({
                            "type": "text",
                            "text": text,
                        })),
                        ContentPart::Image(img) => Some(serde_json::json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": img.mime_type,
                                "data": img.data,
                            }
                        })),
                        _ => None,
                    })
                    .collect();
                messages.push(serde_json::json!({ "role": "user", "content": content }));
            }
            Role::Assistant => {
                let mut content: Vec<serde_json::Value> = Vec::new();
                for part in &msg.content {
                    match part {
                        ContentPart::Text { text } => {
                            if !text.is_empty() {
                                content.push(serde_json::json!({ "type": "text", "text": text }));
                            }
                        }
                        ContentPart::ToolCall(call) => {
                            // This backend rejects a tool_use with no paired
                            // tool_result, so dangling calls are dropped and
                            // both sides disappear together.
                            if unresolved.contains(&call.id) {
                                warn!(
                                    call_id = %call.id,
                                    tool = %call.name,
                                    "omitting tool call with no paired result"
                                );
                                continue;
                            }
                            content.push(serde_json::json!({
                                "type": "tool_use",
                                "id": call.id,
                                "name": call.name,
                                "input": call.arguments,
                            }));
                        }
                        _ => {}
                    }
                }
                if !content.is_empty() {
                    messages.push(serde_json::json!({
                        "role": "assistant",
                        "content": content,
                    }));
                }
            }
            Role::Tool => {
                for result in msg.tool_results() {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": result.tool_call_id,
                            "content": result.result.to_string(),
                            "is_error": result.is_error,
                        }],
                    }));
                }
            }
        }
    }

    let mut body = serde_json::json!({ "messages": messages });
    if !system_parts.is_empty() {
        body["system"] = system_parts.join("\n").into();
    }
    if !tools.is_empty() {
        let defs: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "name": t.name,
                    "description": t.description.clone().unwrap_or_default(),
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        body["tools"] = defs.into();
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::ToolCall;
    use serde_json::json;

    #[test]
    fn system_text_travels_in_the_top_level_field() {
        let history = vec![ChatMessage::system("stay terse"), ChatMessage::user("hi")];
        let body = render(&history, Some("be helpful"), &[]).expect("render");
        assert_eq!(body["system"], "be helpful\nstay terse");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn tool_results_nest_inside_user_content() {
        let history = vec![
            ChatMessage::user("2+2?"),
            ChatMessage::assistant_tool_calls(
                Some("let me check".into()),
                vec![ToolCall {
                    id: "toolu_1".into(),
                    name: "add".into(),
                    arguments: json!({"a": 2, "b": 2}),
                }],
            ),
            ChatMessage::tool_result("toolu_1", "add", json!(4), false),
        ];
        let body = render(&history, None, &[]).expect("render");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 3);

        let assistant = &messages[1];
        assert_eq!(assistant["content"][0]["type"], "text");
        assert_eq!(assistant["content"][1]["type"], "tool_use");
        assert_eq!(assistant["content"][1]["input"], json!({"a": 2, "b": 2}));

        let result = &messages[2];
        assert_eq!(result["role"], "user");
        assert_eq!(result["content"][0]["type"], "tool_result");
        assert_eq!(result["content"][0]["tool_use_id"], "toolu_1");
        assert_eq!(result["content"][0]["is_error"], false);
    }

    #[test]
    fn multiple_calls_stay_in_one_assistant_message() {
        let history = vec![
            ChatMessage::user("do both"),
            ChatMessage::assistant_tool_calls(
                None,
                vec![
                    ToolCall {
                        id: "toolu_1".into(),
                        name: "add".into(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        id: "toolu_2".into(),
                        name: "mul".into(),
                        arguments: json!({}),
                    },
                ],
            ),
            ChatMessage::tool_result("toolu_1", "add", json!(4), false),
            ChatMessage::tool_result("toolu_2", "mul", json!(8), false),
        ];
        let body = render(&history, None, &[]).expect("render");
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 4);
        let blocks = messages[1]["content"].as_array().expect("blocks");
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b["type"] == "tool_use"));
    }

    #[test]
    fn dangling_call_is_omitted_entirely() {
        let history = vec![
            ChatMessage::user("2+2?"),
            ChatMessage::assistant_tool_calls(
                None,
                vec![ToolCall {
                    id: "toolu_1".into(),
                    name: "add".into(),
                    arguments: json!({}),
                }],
            ),
        ];
        let body = render(&history, None, &[]).expect("render");
        let messages = body["messages"].as_array().expect("messages");
        // The assistant message collapses to nothing once its only block is
        // dropped, leaving just the user turn.
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn tool_catalog_uses_input_schema_naming() {
        let tools = vec![ToolSchema::new("search", "query the index")];
        let body = render(&[ChatMessage::user("hi")], None, &tools).expect("render");
        assert_eq!(body["tools"][0]["name"], "search");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }
}
