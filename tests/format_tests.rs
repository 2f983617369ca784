//! Cross-variant adapter invariants.

use pretty_assertions::assert_eq;
use serde_json::json;

use tycho::error::TychoError;
use tycho::format::WireFormat;
use tycho::toolserver::ToolSchema;
use tycho::types::message::ToolCall;
use tycho::types::ChatMessage;

const ALL_FORMATS: [WireFormat; 3] = [
    WireFormat::OpenAi,
    WireFormat::Anthropic,
    WireFormat::Generic,
];

fn paired_history() -> Vec<ChatMessage> {
    vec![
        ChatMessage::user("what is 2+2, then double it?"),
        ChatMessage::assistant_tool_calls(
            None,
            vec![ToolCall {
                id: "c1".into(),
                name: "add".into(),
                arguments: json!({"a": 2, "b": 2}),
            }],
        ),
        ChatMessage::tool_result("c1", "add", json!(4), false),
        ChatMessage::assistant_tool_calls(
            Some("now doubling".into()),
            vec![ToolCall {
                id: "c2".into(),
                name: "mul".into(),
                arguments: json!({"a": 4, "b": 2}),
            }],
        ),
        ChatMessage::tool_result("c2", "mul", json!(8), false),
        ChatMessage::assistant("8"),
    ]
}

fn call_position(rendered: &str, id: &str) -> usize {
    rendered.find(id).expect("id must appear in the payload")
}

#[test]
fn every_variant_keeps_call_before_result_order() {
    let history = paired_history();
    for format in ALL_FORMATS {
        let payload = format
            .payload(&history, None, &[])
            .expect("paired history renders");
        let rendered = payload.body.to_string();
        // Both ids appear, and each call body precedes its result body.
        for (id, result_text) in [("c1", "4"), ("c2", "8")] {
            let call_at = call_position(&rendered, id);
            let result_at = rendered
                .rfind(result_text)
                .expect("result must appear after the call");
            assert!(
                call_at < result_at,
                "{format}: call {id} at {call_at} not before result at {result_at}"
            );
        }
    }
}

#[test]
fn every_variant_rejects_an_orphan_tool_result() {
    let history = vec![
        ChatMessage::user("hi"),
        ChatMessage::tool_result("ghost", "add", json!(4), false),
    ];
    for format in ALL_FORMATS {
        let err = format
            .payload(&history, None, &[])
            .expect_err("orphan result must be rejected");
        assert!(
            matches!(err, TychoError::MessageFormat(_)),
            "{format} returned the wrong error kind"
        );
    }
}

#[test]
fn no_variant_renames_a_tool() {
    let history = paired_history();
    for format in ALL_FORMATS {
        let payload = format.payload(&history, None, &[]).expect("render");
        let rendered = payload.body.to_string();
        assert!(rendered.contains("add"), "{format} lost the add tool name");
        assert!(rendered.contains("mul"), "{format} lost the mul tool name");
    }
}

#[test]
fn tool_catalog_is_present_in_every_variant() {
    let tools = vec![ToolSchema::new("search", "query the index")];
    for format in ALL_FORMATS {
        let payload = format
            .payload(&[ChatMessage::user("hi")], None, &tools)
            .expect("render");
        assert!(
            payload.body.get("tools").is_some(),
            "{format} dropped the tool catalog"
        );
    }
}

#[test]
fn envelope_differences_stay_inside_the_adapters() {
    let history = paired_history();

    // OpenAI: flat tool-role message.
    let openai = WireFormat::OpenAi
        .payload(&history, None, &[])
        .expect("render");
    let openai_roles: Vec<String> = openai.body["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| m["role"].as_str().unwrap_or_default().to_owned())
        .collect();
    assert!(openai_roles.contains(&"tool".to_owned()));

    // Anthropic: no tool role at all; results ride in user content.
    let anthropic = WireFormat::Anthropic
        .payload(&history, None, &[])
        .expect("render");
    let anthropic_roles: Vec<String> = anthropic.body["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .map(|m| m["role"].as_str().unwrap_or_default().to_owned())
        .collect();
    assert!(!anthropic_roles.contains(&"tool".to_owned()));
    assert!(anthropic.body["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .any(|m| m["content"]
            .as_array()
            .map(|parts| parts.iter().any(|p| p["type"] == "tool_result"))
            .unwrap_or(false)));

    // The internal history is untouched by rendering.
    assert_eq!(history.len(), 6);
}
