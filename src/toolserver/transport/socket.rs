//! Socket transport: newline-delimited JSON over TCP.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, TychoError};

use super::ToolTransport;

/// TCP transport for remote tool servers.
pub struct SocketTransport {
    addr: String,
    writer: Option<OwnedWriteHalf>,
    lines: Option<Lines<BufReader<OwnedReadHalf>>>,
    closed: bool,
}

impl SocketTransport {
    /// Create a socket transport. The connection is dialed on first use.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            writer: None,
            lines: None,
            closed: false,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        if self.closed {
            return Err(self.closed_error());
        }
        if self.writer.is_some() {
            return Ok(());
        }

        debug!(addr = %self.addr, "dialing tool server");
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|err| TychoError::Connectivity {
                server: self.addr.clone(),
                message: format!("failed to connect: {err}"),
            })?;
        let (read_half, write_half) = stream.into_split();
        self.writer = Some(write_half);
        self.lines = Some(BufReader::new(read_half).lines());
        Ok(())
    }

    fn closed_error(&self) -> TychoError {
        TychoError::Connectivity {
            server: self.addr.clone(),
            message: "transport closed".into(),
        }
    }
}

#[async_trait]
impl ToolTransport for SocketTransport {
    async fn send(&mut self, message: serde_json::Value) -> Result<()> {
        self.ensure_connected().await?;
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        let Some(writer) = self.writer.as_mut() else {
            return Err(self.closed_error());
        };
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<serde_json::Value> {
        self.ensure_connected().await?;
        let server = self.addr.clone();
        let Some(lines) = self.lines.as_mut() else {
            return Err(self.closed_error());
        };
        loop {
            let Some(line) = lines.next_line().await? else {
                return Err(TychoError::Connectivity {
                    server: server.clone(),
                    message: "server closed the connection".into(),
                });
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return Ok(serde_json::from_str(trimmed)?);
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.lines = None;
        Ok(())
    }
}
