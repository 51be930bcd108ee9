//! MCP transport layer.
//!
//! Defines the `McpTransport` trait for sending/receiving JSON-RPC message
//! lines, a `ChildProcessTransport` that talks to a server subprocess over
//! its stdio, and an in-memory `ChannelTransport` for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;

use crate::error::McpError;

/// How long `close` waits for the child to exit after its stdin is closed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Trait for MCP message transport.
///
/// Implementations handle newline-delimited JSON framing over some byte
/// channel.
#[async_trait]
pub trait McpTransport: Send {
    /// Read the next non-empty message line.
    /// Returns `None` when the peer has closed its end.
    async fn receive(&mut self) -> Result<Option<String>, McpError>;

    /// Write one message line.
    async fn send(&mut self, message: &str) -> Result<(), McpError>;

    /// Release the underlying channel. Idempotent.
    async fn close(&mut self) -> Result<(), McpError> {
        Ok(())
    }
}

/// How to launch an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child
    #[serde(default)]
    pub env: Vec<(String, String)>,
}

impl ServerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

/// Stdio transport to a server subprocess.
///
/// The child's stderr is inherited so server logs reach the terminal. The
/// child is killed if the transport is dropped without `close`.
pub struct ChildProcessTransport {
    child: Option<Child>,
    reader: BufReader<ChildStdout>,
    writer: Option<BufWriter<ChildStdin>>,
}

impl ChildProcessTransport {
    pub fn spawn(command: &ServerCommand) -> Result<Self, McpError> {
        tracing::info!(program = %command.program, args = ?command.args, "Spawning MCP server process");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::Spawn(format!("{}: {}", command.program, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Spawn("failed to capture server stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Spawn("failed to capture server stdout".into()))?;

        Ok(Self {
            child: Some(child),
            reader: BufReader::new(stdout),
            writer: Some(BufWriter::new(stdin)),
        })
    }
}

#[async_trait]
impl McpTransport for ChildProcessTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await? == 0 {
                return Ok(None); // EOF
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(Some(trimmed.to_string()));
            }
        }
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        let writer = self.writer.as_mut().ok_or(McpError::Disconnected)?;
        writer.write_all(message.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        // Closing stdin signals EOF to the server
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }

        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "MCP server exited");
            }
            Ok(Err(e)) => return Err(McpError::Io(e)),
            Err(_) => {
                tracing::warn!(timeout = ?SHUTDOWN_TIMEOUT, "MCP server did not exit, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }
}

/// In-memory transport, backed by channel pairs.
pub struct ChannelTransport {
    rx: mpsc::Receiver<String>,
    tx: Option<mpsc::Sender<String>>,
}

impl ChannelTransport {
    /// Create a pair of connected transports.
    ///
    /// Messages sent on one transport are received by the other. Closing
    /// either side ends the peer's stream.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_b) = mpsc::channel(32);
        let (tx_b, rx_a) = mpsc::channel(32);
        (
            Self { rx: rx_a, tx: Some(tx_a) },
            Self { rx: rx_b, tx: Some(tx_b) },
        )
    }
}

#[async_trait]
impl McpTransport for ChannelTransport {
    async fn receive(&mut self) -> Result<Option<String>, McpError> {
        Ok(self.rx.recv().await)
    }

    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        let tx = self.tx.as_ref().ok_or(McpError::Disconnected)?;
        tx.send(message.to_string())
            .await
            .map_err(|_| McpError::Disconnected)
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}
