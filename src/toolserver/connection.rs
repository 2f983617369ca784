//! A single link to one tool-provider server.
//!
//! The connection owns its transport exclusively and speaks JSON-RPC 2.0:
//! `initialize` (handshake), `tools/list`, `tools/call`. It is live only
//! after the handshake succeeds.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use crate::error::{Result, TychoError};
use crate::util::with_timeout;

use super::schema::ToolSchema;
use super::transport::ToolTransport;
use super::ToolServerSpec;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Ready,
    Closed,
}

/// One transport-level link to an external tool server.
pub struct ToolServerConnection {
    name: String,
    transport: Box<dyn ToolTransport>,
    call_timeout: Duration,
    next_id: u64,
    state: ConnectionState,
}

impl ToolServerConnection {
    /// Create a connection from an explicit transport. It is not live until
    /// [`handshake`](Self::handshake) completes.
    pub fn new(name: impl Into<String>, transport: Box<dyn ToolTransport>, call_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            transport,
            call_timeout,
            next_id: 0,
            state: ConnectionState::Disconnected,
        }
    }

    /// Build the transport described by `spec` and perform the handshake.
    pub async fn open(name: impl Into<String>, spec: &ToolServerSpec) -> Result<Self> {
        let name = name.into();
        let transport = spec.build_transport()?;
        let mut connection = Self::new(name, transport, spec.call_timeout());
        connection.handshake().await?;
        Ok(connection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Perform the protocol handshake; only afterwards is the connection
    /// live. Failures carry the originating error and are not retried here.
    pub async fn handshake(&mut self) -> Result<()> {
        if self.state == ConnectionState::Ready {
            return Ok(());
        }
        if self.state == ConnectionState::Closed {
            return Err(self.closed_error());
        }

        let outcome = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(err) => {
                return Err(TychoError::Handshake {
                    server: self.name.clone(),
                    message: err.to_string(),
                });
            }
        };

        debug!(
            server = %self.name,
            server_info = %result.get("serverInfo").cloned().unwrap_or_default(),
            "tool server handshake complete"
        );
        self.state = ConnectionState::Ready;
        Ok(())
    }

    /// List the tools this server exposes.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolSchema>> {
        self.ensure_ready()?;
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| TychoError::InvalidArgument(format!(
                "server '{}' returned a tools/list result without tools",
                self.name
            )))?;
        Ok(serde_json::from_value(tools)?)
    }

    /// Execute a tool, bounded by this connection's call timeout.
    pub async fn call_tool(&mut self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value> {
        self.ensure_ready()?;
        let arguments = coerce_arguments(arguments)?;
        let timeout = self.call_timeout;
        let request = self.request(
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        );
        let result = with_timeout(timeout, request).await?;
        map_call_result(name, result)
    }

    /// Close the transport. Idempotent.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;
        self.transport.close().await
    }

    /// Send one JSON-RPC request and wait for its response, skipping
    /// notifications and stale responses (e.g. from a call that timed out).
    async fn request(&mut self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        self.next_id += 1;
        let id = self.next_id;
        self.transport
            .send(json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .await?;

        loop {
            let message = self.transport.receive().await?;
            let Some(message_id) = message.get("id").and_then(|v| v.as_u64()) else {
                debug!(server = %self.name, "skipping server notification");
                continue;
            };
            if message_id != id {
                warn!(
                    server = %self.name,
                    expected = id,
                    got = message_id,
                    "skipping stale response"
                );
                continue;
            }
            if let Some(error) = message.get("error") {
                let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
                let text = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown error");
                return Err(TychoError::ToolExecution {
                    tool_name: method.to_owned(),
                    message: format!("server '{}' error {code}: {text}", self.name),
                });
            }
            return Ok(message.get("result").cloned().unwrap_or(serde_json::Value::Null));
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Closed => Err(self.closed_error()),
            ConnectionState::Disconnected => Err(TychoError::InvalidState(format!(
                "connection '{}' has not completed its handshake",
                self.name
            ))),
        }
    }

    fn closed_error(&self) -> TychoError {
        TychoError::Connectivity {
            server: self.name.clone(),
            message: "connection closed".into(),
        }
    }
}

fn coerce_arguments(value: serde_json::Value) -> Result<serde_json::Value> {
    match value {
        serde_json::Value::Null => Ok(json!({})),
        serde_json::Value::Object(map) => Ok(serde_json::Value::Object(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(json!({}));
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|err| {
                TychoError::InvalidArgument(format!("tool arguments must be valid JSON: {err}"))
            })?;
            coerce_arguments(parsed)
        }
        other => Err(TychoError::InvalidArgument(format!(
            "tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn map_call_result(name: &str, result: serde_json::Value) -> Result<serde_json::Value> {
    let is_error = result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let content = result.get("content").cloned().unwrap_or(result.clone());

    if is_error {
        let message = match &content {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(TychoError::ToolExecution {
            tool_name: name.to_owned(),
            message,
        });
    }
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Scripted transport: records sends, replays canned receives.
    struct ScriptedTransport {
        sent: Vec<serde_json::Value>,
        replies: VecDeque<serde_json::Value>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<serde_json::Value>) -> Self {
            Self {
                sent: Vec::new(),
                replies: replies.into(),
            }
        }
    }

    #[async_trait]
    impl ToolTransport for ScriptedTransport {
        async fn send(&mut self, message: serde_json::Value) -> Result<()> {
            self.sent.push(message);
            Ok(())
        }

        async fn receive(&mut self) -> Result<serde_json::Value> {
            self.replies.pop_front().ok_or_else(|| TychoError::Connectivity {
                server: "scripted".into(),
                message: "no more replies".into(),
            })
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn initialize_reply(id: u64) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "serverInfo": { "name": "scripted", "version": "0.0.1" } }
        })
    }

    #[tokio::test]
    async fn handshake_transitions_to_ready() {
        let transport = ScriptedTransport::new(vec![initialize_reply(1)]);
        let mut connection =
            ToolServerConnection::new("calc", Box::new(transport), Duration::from_secs(5));
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        connection.handshake().await.expect("handshake");
        assert!(connection.is_ready());
    }

    #[tokio::test]
    async fn list_tools_requires_handshake() {
        let transport = ScriptedTransport::new(Vec::new());
        let mut connection =
            ToolServerConnection::new("calc", Box::new(transport), Duration::from_secs(5));
        let err = connection
            .list_tools()
            .await
            .expect_err("listing before handshake must fail");
        assert!(matches!(err, TychoError::InvalidState(_)));
    }

    #[tokio::test]
    async fn notifications_and_stale_responses_are_skipped() {
        let transport = ScriptedTransport::new(vec![
            initialize_reply(1),
            json!({ "jsonrpc": "2.0", "method": "notifications/progress", "params": {} }),
            json!({ "jsonrpc": "2.0", "id": 99, "result": { "stale": true } }),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": { "tools": [{ "name": "add", "inputSchema": { "type": "object" } }] }
            }),
        ]);
        let mut connection =
            ToolServerConnection::new("calc", Box::new(transport), Duration::from_secs(5));
        connection.handshake().await.expect("handshake");

        let tools = connection.list_tools().await.expect("list tools");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "add");
    }

    #[tokio::test]
    async fn error_result_maps_to_tool_execution_error() {
        let transport = ScriptedTransport::new(vec![
            initialize_reply(1),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": { "content": "division by zero", "isError": true }
            }),
        ]);
        let mut connection =
            ToolServerConnection::new("calc", Box::new(transport), Duration::from_secs(5));
        connection.handshake().await.expect("handshake");

        let err = connection
            .call_tool("div", json!({"a": 1, "b": 0}))
            .await
            .expect_err("isError result must map to an error");
        assert!(matches!(
            err,
            TychoError::ToolExecution { tool_name, message }
            if tool_name == "div" && message.contains("division by zero")
        ));
    }

    #[tokio::test]
    async fn jsonrpc_error_member_maps_to_typed_error() {
        let transport = ScriptedTransport::new(vec![
            initialize_reply(1),
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": { "code": -32601, "message": "method not found" }
            }),
        ]);
        let mut connection =
            ToolServerConnection::new("calc", Box::new(transport), Duration::from_secs(5));
        connection.handshake().await.expect("handshake");

        let err = connection
            .call_tool("nope", json!({}))
            .await
            .expect_err("error member must map");
        assert!(matches!(
            err,
            TychoError::ToolExecution { message, .. } if message.contains("method not found")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_with_typed_error() {
        /// Transport whose second receive never resolves.
        struct StallingTransport {
            handshake_done: bool,
        }

        #[async_trait]
        impl ToolTransport for StallingTransport {
            async fn send(&mut self, _message: serde_json::Value) -> Result<()> {
                Ok(())
            }

            async fn receive(&mut self) -> Result<serde_json::Value> {
                if !self.handshake_done {
                    self.handshake_done = true;
                    return Ok(initialize_reply(1));
                }
                futures::future::pending().await
            }

            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let mut connection = ToolServerConnection::new(
            "slow",
            Box::new(StallingTransport {
                handshake_done: false,
            }),
            Duration::from_millis(100),
        );
        connection.handshake().await.expect("handshake");

        let err = connection
            .call_tool("hang", json!({}))
            .await
            .expect_err("call must time out");
        assert!(matches!(err, TychoError::Timeout(100)));
    }

    #[test]
    fn coerce_arguments_accepts_object_null_and_stringified_object() {
        assert_eq!(
            coerce_arguments(json!({"a": 1})).expect("object"),
            json!({"a": 1})
        );
        assert_eq!(coerce_arguments(serde_json::Value::Null).expect("null"), json!({}));
        assert_eq!(
            coerce_arguments(json!(r#"{"a":1}"#)).expect("stringified"),
            json!({"a": 1})
        );
        assert!(coerce_arguments(json!([1, 2])).is_err());
    }
}
