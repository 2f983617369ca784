//! Tool-provider server connectivity: transports, connections, and the
//! multi-server connection manager.

pub mod connection;
pub mod manager;
pub mod schema;
pub mod transport;

pub use connection::{ConnectionState, ToolServerConnection};
pub use manager::{ConnectionManager, ToolCatalog};
pub use schema::ToolSchema;
pub use transport::{SocketTransport, StdioTransport, ToolTransport, TransportKind};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TychoError};

const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Declarative description of one tool-provider server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolServerSpec {
    pub transport: TransportKind,
    /// Command to spawn (subprocess transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Address to dial (socket transport).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

impl ToolServerSpec {
    /// Spec for a locally spawned subprocess server.
    pub fn subprocess(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: TransportKind::Subprocess,
            command: Some(command.into()),
            args,
            addr: None,
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    /// Spec for a remote socket server.
    pub fn socket(addr: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Socket,
            command: None,
            args: Vec::new(),
            addr: Some(addr.into()),
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Build the (not yet connected) transport this spec describes.
    pub fn build_transport(&self) -> Result<Box<dyn ToolTransport>> {
        match self.transport {
            TransportKind::Subprocess => {
                let command = self.command.clone().ok_or_else(|| {
                    TychoError::Configuration(
                        "subprocess tool server requires a command".into(),
                    )
                })?;
                Ok(Box::new(StdioTransport::new(command, self.args.clone())))
            }
            TransportKind::Socket => {
                let addr = self.addr.clone().ok_or_else(|| {
                    TychoError::Configuration("socket tool server requires an address".into())
                })?;
                Ok(Box::new(SocketTransport::new(addr)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subprocess_spec_requires_command() {
        let spec = ToolServerSpec {
            transport: TransportKind::Subprocess,
            command: None,
            args: Vec::new(),
            addr: None,
            timeout_ms: 1000,
        };
        assert!(matches!(
            spec.build_transport(),
            Err(TychoError::Configuration(_))
        ));
    }

    #[test]
    fn socket_spec_requires_addr() {
        let spec = ToolServerSpec {
            transport: TransportKind::Socket,
            command: None,
            args: Vec::new(),
            addr: None,
            timeout_ms: 1000,
        };
        assert!(matches!(
            spec.build_transport(),
            Err(TychoError::Configuration(_))
        ));
    }

    #[test]
    fn spec_deserializes_with_default_timeout() {
        let spec: ToolServerSpec = serde_json::from_value(serde_json::json!({
            "transport": "subprocess",
            "command": "python3",
            "args": ["server.py"],
        }))
        .expect("deserialize");
        assert_eq!(spec.timeout_ms, DEFAULT_CALL_TIMEOUT_MS);
        assert_eq!(spec.call_timeout(), Duration::from_secs(30));
    }
}
