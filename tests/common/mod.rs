//! Shared test helpers: scripted model runner and fake tool servers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use tycho::error::{ModelErrorKind, Result, TychoError};
use tycho::events::{EventSink, SessionEvent};
use tycho::format::ProviderPayload;
use tycho::model::{ModelRunner, ModelTurn};
use tycho::toolserver::{
    ConnectionManager, ToolSchema, ToolServerConnection, ToolTransport,
};
use tycho::types::ToolCall;

/// A model runner that replays a scripted sequence of turns.
pub struct ScriptedRunner {
    turns: StdMutex<VecDeque<ModelTurn>>,
    pub invocations: AtomicUsize,
}

impl ScriptedRunner {
    pub fn new(turns: Vec<ModelTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: StdMutex::new(turns.into()),
            invocations: AtomicUsize::new(0),
        })
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelRunner for ScriptedRunner {
    async fn invoke(&self, _payload: &ProviderPayload, _tools: &[ToolSchema]) -> Result<ModelTurn> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.turns
            .lock()
            .expect("turns lock")
            .pop_front()
            .ok_or_else(|| TychoError::Model {
                kind: ModelErrorKind::Other,
                message: "no scripted turns left".into(),
            })
    }
}

/// A model runner that always fails with the given kind.
pub struct FailingRunner {
    pub kind: ModelErrorKind,
}

#[async_trait]
impl ModelRunner for FailingRunner {
    async fn invoke(&self, _payload: &ProviderPayload, _tools: &[ToolSchema]) -> Result<ModelTurn> {
        Err(TychoError::Model {
            kind: self.kind,
            message: "scripted failure".into(),
        })
    }
}

/// Build a tool-call turn with a single call.
pub fn tool_call_turn(id: &str, name: &str, arguments: serde_json::Value) -> ModelTurn {
    ModelTurn::tool_calls(vec![ToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }])
}

pub type CallLog = Arc<StdMutex<Vec<(String, serde_json::Value)>>>;

/// Transport-level fake tool server: answers initialize, tools/list, and
/// tools/call from canned data, recording every tool call.
pub struct FakeToolServer {
    tools: Vec<ToolSchema>,
    results: HashMap<String, serde_json::Value>,
    calls: CallLog,
    replies: VecDeque<serde_json::Value>,
    fail_listing: bool,
}

impl FakeToolServer {
    pub fn new(tools: Vec<ToolSchema>, results: HashMap<String, serde_json::Value>) -> Self {
        Self {
            tools,
            results,
            calls: Arc::new(StdMutex::new(Vec::new())),
            replies: VecDeque::new(),
            fail_listing: false,
        }
    }

    pub fn failing_listing() -> Self {
        let mut server = Self::new(Vec::new(), HashMap::new());
        server.fail_listing = true;
        server
    }

    pub fn call_log(&self) -> CallLog {
        self.calls.clone()
    }
}

#[async_trait]
impl ToolTransport for FakeToolServer {
    async fn send(&mut self, message: serde_json::Value) -> Result<()> {
        let id = message["id"].clone();
        let method = message["method"].as_str().unwrap_or_default().to_owned();
        let reply = match method.as_str() {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "serverInfo": { "name": "fake", "version": "0.0.1" } }
            }),
            "tools/list" => {
                if self.fail_listing {
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": { "code": -32000, "message": "listing failed" }
                    })
                } else {
                    json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": { "tools": self.tools }
                    })
                }
            }
            "tools/call" => {
                let name = message["params"]["name"].as_str().unwrap_or_default();
                let arguments = message["params"]["arguments"].clone();
                self.calls
                    .lock()
                    .expect("call log lock")
                    .push((name.to_owned(), arguments));
                match self.results.get(name) {
                    Some(value) => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": { "content": value, "isError": false }
                    }),
                    None => json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "result": { "content": format!("unknown tool '{name}'"), "isError": true }
                    }),
                }
            }
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {other}") }
            }),
        };
        self.replies.push_back(reply);
        Ok(())
    }

    async fn receive(&mut self) -> Result<serde_json::Value> {
        self.replies
            .pop_front()
            .ok_or_else(|| TychoError::Connectivity {
                server: "fake".into(),
                message: "no pending reply".into(),
            })
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Handshake a fake server and register it with the manager. Returns the
/// server's call log for assertions.
pub async fn connect_fake(
    manager: &ConnectionManager,
    name: &str,
    tools: Vec<ToolSchema>,
    results: HashMap<String, serde_json::Value>,
) -> CallLog {
    let server = FakeToolServer::new(tools, results);
    let log = server.call_log();
    let mut connection =
        ToolServerConnection::new(name, Box::new(server), Duration::from_secs(5));
    connection.handshake().await.expect("fake handshake");
    manager.register(connection).await.expect("register fake");
    log
}

/// A sink that records every event.
pub fn recording_sink() -> (EventSink, Arc<StdMutex<Vec<SessionEvent>>>) {
    let events: Arc<StdMutex<Vec<SessionEvent>>> = Arc::new(StdMutex::new(Vec::new()));
    let captured = events.clone();
    let sink: EventSink = Arc::new(move |event| {
        captured.lock().expect("event lock").push(event);
    });
    (sink, events)
}
