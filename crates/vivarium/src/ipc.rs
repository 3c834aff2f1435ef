//! IPC protocol for worker processes
//!
//! Frames on the worker's stdin/stdout pipes:
//! `[length: 4 bytes BE][msg_type: 1 byte][payload: length-1 bytes]`,
//! with JSON payloads. The host sends exactly one `Invoke` frame per
//! invocation; the worker streams zero or more `Log` frames followed
//! by exactly one `Result` frame. The log stream is terminated
//! implicitly by pipe closure when the worker exits.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{FailureKind, PluginError};
use crate::relay::LogRecord;
use crate::types::Params;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Message types on the wire
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    // Host → Worker
    Invoke = 1,

    // Worker → Host
    Log = 10,
    Result = 11,
}

impl TryFrom<u8> for MessageType {
    type Error = io::Error;

    fn try_from(value: u8) -> io::Result<Self> {
        match value {
            1 => Ok(MessageType::Invoke),
            10 => Ok(MessageType::Log),
            11 => Ok(MessageType::Result),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown message type: {value}"),
            )),
        }
    }
}

/// Everything a worker needs to reconstruct and run a plugin. Live
/// instances never cross the process boundary; the worker rebuilds the
/// plugin from plain data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub plugin_root: PathBuf,
    pub plugin_name: String,
    pub constructor_params: Params,
    pub call_params: Params,
}

/// The single tagged result of one worker invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvokeOutcome {
    Success {
        value: Value,
    },
    Failure {
        kind: FailureKind,
        plugin: String,
        message: String,
    },
}

impl InvokeOutcome {
    pub fn from_result(result: Result<Value, PluginError>) -> Self {
        match result {
            Ok(value) => InvokeOutcome::Success { value },
            Err(err) => {
                let (kind, plugin, message) = err.to_wire();
                InvokeOutcome::Failure {
                    kind,
                    plugin,
                    message,
                }
            }
        }
    }

    pub fn into_result(self) -> Result<Value, PluginError> {
        match self {
            InvokeOutcome::Success { value } => Ok(value),
            InvokeOutcome::Failure {
                kind,
                plugin,
                message,
            } => Err(PluginError::from_wire(kind, plugin, message)),
        }
    }
}

/// Worker → host messages multiplexed onto one pipe. Log records and
/// the final result share a single ordered stream so the result can
/// never overtake a record emitted before it.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    Log(LogRecord),
    Result(InvokeOutcome),
}

impl OutboundMessage {
    fn message_type(&self) -> MessageType {
        match self {
            OutboundMessage::Log(_) => MessageType::Log,
            OutboundMessage::Result(_) => MessageType::Result,
        }
    }

    fn payload(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            OutboundMessage::Log(record) => serde_json::to_vec(record),
            OutboundMessage::Result(outcome) => serde_json::to_vec(outcome),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Framing
// ─────────────────────────────────────────────────────────────────────────────

/// A raw frame: type byte plus payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_type: MessageType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: MessageType, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    /// Parse the payload as JSON.
    pub fn parse_json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, PluginError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| PluginError::Serialization(e.to_string()))
    }
}

/// Frame writer over any async byte sink.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame and flush.
    pub async fn send(&mut self, frame: &Frame) -> io::Result<()> {
        let len = (1 + frame.payload.len()) as u32;
        self.inner.write_all(&len.to_be_bytes()).await?;
        self.inner.write_all(&[frame.msg_type as u8]).await?;
        self.inner.write_all(&frame.payload).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Serialize `data` as JSON and write it as one frame.
    pub async fn send_json<T: Serialize>(
        &mut self,
        msg_type: MessageType,
        data: &T,
    ) -> Result<(), PluginError> {
        let payload =
            serde_json::to_vec(data).map_err(|e| PluginError::Serialization(e.to_string()))?;
        self.send(&Frame::new(msg_type, payload))
            .await
            .map_err(|e| PluginError::Serialization(e.to_string()))
    }

    /// Write one worker → host message.
    pub async fn send_outbound(&mut self, message: &OutboundMessage) -> Result<(), PluginError> {
        let payload = message
            .payload()
            .map_err(|e| PluginError::Serialization(e.to_string()))?;
        self.send(&Frame::new(message.message_type(), payload))
            .await
            .map_err(|e| PluginError::Serialization(e.to_string()))
    }
}

/// Frame reader over any async byte source. EOF between frames is
/// surfaced as `Ok(None)`.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read one frame, or `None` on a clean end of stream.
    pub async fn recv(&mut self) -> io::Result<Option<Frame>> {
        let mut len_buf = [0u8; 4];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let len = u32::from_be_bytes(len_buf) as usize;

        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty frame"));
        }

        let mut type_buf = [0u8; 1];
        self.inner.read_exact(&mut type_buf).await?;
        let msg_type = MessageType::try_from(type_buf[0])?;

        let payload_len = len - 1;
        let mut payload = vec![0u8; payload_len];
        if payload_len > 0 {
            self.inner.read_exact(&mut payload).await?;
        }

        Ok(Some(Frame::new(msg_type, payload)))
    }
}
