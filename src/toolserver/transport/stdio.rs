//! Subprocess transport: newline-delimited JSON over a child's stdio.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::error::{Result, TychoError};

use super::ToolTransport;

/// Stdio-based transport for locally spawned tool servers.
pub struct StdioTransport {
    command: String,
    args: Vec<String>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: Option<Lines<BufReader<ChildStdout>>>,
    closed: bool,
}

impl StdioTransport {
    /// Create a stdio transport from command and args. The child process is
    /// spawned on first use.
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            child: None,
            stdin: None,
            lines: None,
            closed: false,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn ensure_spawned(&mut self) -> Result<()> {
        if self.closed {
            return Err(self.closed_error());
        }
        if self.child.is_some() {
            return Ok(());
        }

        debug!(command = %self.command, "spawning tool server");
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| TychoError::Connectivity {
                server: self.command.clone(),
                message: format!("failed to spawn: {err}"),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| TychoError::Connectivity {
            server: self.command.clone(),
            message: "child stdin unavailable".into(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| TychoError::Connectivity {
            server: self.command.clone(),
            message: "child stdout unavailable".into(),
        })?;

        self.stdin = Some(stdin);
        self.lines = Some(BufReader::new(stdout).lines());
        self.child = Some(child);
        Ok(())
    }

    fn closed_error(&self) -> TychoError {
        TychoError::Connectivity {
            server: self.command.clone(),
            message: "transport closed".into(),
        }
    }
}

#[async_trait]
impl ToolTransport for StdioTransport {
    async fn send(&mut self, message: serde_json::Value) -> Result<()> {
        self.ensure_spawned()?;
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.closed_error());
        };
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<serde_json::Value> {
        self.ensure_spawned()?;
        let server = self.command.clone();
        let Some(lines) = self.lines.as_mut() else {
            return Err(self.closed_error());
        };
        loop {
            let Some(line) = lines.next_line().await? else {
                return Err(TychoError::Connectivity {
                    server: server.clone(),
                    message: "server closed its output stream".into(),
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
        self.stdin = None;
        self.lines = None;
        if let Some(mut child) = self.child.take() {
            // Closing stdin above asks the server to exit; kill covers the
            // ones that don't.
            let _ = child.kill().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_keeps_command_and_args() {
        let transport = StdioTransport::new("python3", vec!["server.py".into()]);
        assert_eq!(transport.command(), "python3");
        assert_eq!(transport.args(), &["server.py".to_string()]);
    }

    #[tokio::test]
    async fn close_is_idempotent_without_spawn() {
        let mut transport = StdioTransport::new("python3", Vec::new());
        assert!(transport.close().await.is_ok());
        assert!(transport.close().await.is_ok());
    }

    #[tokio::test]
    async fn send_after_close_fails_with_connectivity_error() {
        let mut transport = StdioTransport::new("python3", Vec::new());
        transport.close().await.expect("close");
        let err = transport
            .send(serde_json::json!({"jsonrpc": "2.0"}))
            .await
            .expect_err("send after close must fail");
        assert!(matches!(
            err,
            TychoError::Connectivity { message, .. } if message.contains("closed")
        ));
    }

    #[tokio::test]
    async fn round_trip_against_cat_subprocess() {
        // `cat` echoes each line back, which is enough to exercise framing.
        let mut transport = StdioTransport::new("cat", Vec::new());
        transport
            .send(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}))
            .await
            .expect("send");
        let echoed = transport.receive().await.expect("receive");
        assert_eq!(echoed["method"], "ping");
        transport.close().await.expect("close");
    }
}
