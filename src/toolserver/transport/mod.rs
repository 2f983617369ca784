//! Tool-server transport layer.
//!
//! Transports move newline-delimited JSON messages between this process and
//! one tool-provider server. They connect lazily: the subprocess is spawned
//! (or the socket dialed) on first use, so connection errors surface from
//! the handshake that follows.

pub mod socket;
pub mod stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use socket::SocketTransport;
pub use stdio::StdioTransport;

/// Supported transport backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Locally spawned subprocess speaking over stdin/stdout.
    Subprocess,
    /// Remote server over a TCP socket.
    Socket,
}

/// Transport contract for tool-server communication.
#[async_trait]
pub trait ToolTransport: Send {
    /// Send one JSON message.
    async fn send(&mut self, message: serde_json::Value) -> Result<()>;

    /// Receive the next JSON message from the peer.
    async fn receive(&mut self) -> Result<serde_json::Value>;

    /// Close the transport. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
