//! Process-isolated worker sessions
//!
//! A [`WorkerSession`] runs a plugin inside a freshly spawned
//! `vivarium-worker` process, one process per `run()` call. The
//! session sends the invocation as plain data, then demultiplexes the
//! worker's outbound stream: log frames go to the effective log sink,
//! the single result frame becomes the return value. A worker that
//! dies before sending a result surfaces as
//! [`PluginError::ChildProcessCrash`].
//!
//! There is no built-in timeout: a hung worker blocks its caller until
//! the caller imposes its own deadline and kills the process.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::error::{PluginError, PluginResult};
use crate::ipc::{FrameReader, FrameWriter, InvokeOutcome, InvokeRequest, MessageType};
use crate::plugin::Plugin;
use crate::relay::{LogRecord, LogSink, LogSinkConfigurator};
use crate::types::Params;

/// Name of the worker executable.
pub const WORKER_BINARY: &str = "vivarium-worker";

/// Lifecycle of a worker session across one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Spawning,
    AwaitingResult,
    Completed,
    Failed,
    Crashed,
}

/// Handle to a plugin executed in its own worker process.
///
/// Holds only the plugin's description (name, root, constructor
/// parameters) — never a live instance. The worker reconstructs the
/// plugin from scratch on every run, in its own process with its own
/// registry, so cross-process contamination is impossible.
pub struct WorkerSession {
    name: String,
    root: PathBuf,
    constructor_params: Params,
    log_configurator: Option<LogSinkConfigurator>,
    worker_binary: Option<PathBuf>,
    state: SessionState,
    log_tx: UnboundedSender<LogRecord>,
    log_rx: UnboundedReceiver<LogRecord>,
}

// The configurator is an opaque closure, so Debug is written by hand.
impl std::fmt::Debug for WorkerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerSession")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("worker_binary", &self.worker_binary)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl WorkerSession {
    pub(crate) fn new(
        name: String,
        root: PathBuf,
        constructor_params: Params,
        log_configurator: Option<LogSinkConfigurator>,
        worker_binary: Option<PathBuf>,
    ) -> Self {
        let (log_tx, log_rx) = mpsc::unbounded_channel();
        Self {
            name,
            root,
            constructor_params,
            log_configurator,
            worker_binary,
            state: SessionState::Idle,
            log_tx,
            log_rx,
        }
    }

    /// Current lifecycle state (the last terminal state after a run).
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pull one relayed log record from the session's default channel
    /// without blocking. `Err(Empty)` means no record is currently
    /// available; `Err(Disconnected)` means the channel is permanently
    /// closed. Hosts must drain this channel (or configure a sink);
    /// records accumulate without bound otherwise.
    pub fn try_pull_log(&mut self) -> Result<LogRecord, TryRecvError> {
        self.log_rx.try_recv()
    }

    /// Locate the worker executable: explicit override, then a sibling
    /// of the current executable, then PATH.
    fn worker_binary_path(&self) -> PathBuf {
        self.worker_binary.clone().unwrap_or_else(|| {
            if let Ok(exe) = std::env::current_exe() {
                if let Some(dir) = exe.parent() {
                    let sibling = dir.join(WORKER_BINARY);
                    if sibling.exists() {
                        return sibling;
                    }
                }
            }
            PathBuf::from(WORKER_BINARY)
        })
    }

    /// The sink receiving this invocation's relayed records: the
    /// configurator's choice, or the session's own channel.
    fn effective_sink(&self) -> Box<dyn LogSink> {
        match &self.log_configurator {
            Some(configurator) => configurator(),
            None => Box::new(self.log_tx.clone()),
        }
    }

    fn crash(&mut self, status: Option<i32>) -> PluginError {
        self.state = SessionState::Crashed;
        PluginError::ChildProcessCrash {
            plugin: self.name.clone(),
            status,
        }
    }
}

#[async_trait]
impl Plugin for WorkerSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, call_params: Params) -> PluginResult<Value> {
        self.state = SessionState::Spawning;
        let binary = self.worker_binary_path();
        debug!(plugin = %self.name, worker = %binary.display(), "spawning worker");

        let mut child = Command::new(&binary)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                self.state = SessionState::Failed;
                PluginError::WorkerSpawn(e)
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                self.state = SessionState::Failed;
                let _ = child.kill().await;
                let _ = child.wait().await;
                return Err(PluginError::WorkerSpawn(std::io::Error::other(
                    "worker stdio unavailable",
                )));
            }
        };

        let request = InvokeRequest {
            plugin_root: self.root.clone(),
            plugin_name: self.name.clone(),
            constructor_params: self.constructor_params.clone(),
            call_params,
        };
        let mut writer = FrameWriter::new(stdin);
        if writer.send_json(MessageType::Invoke, &request).await.is_err() {
            // Worker died before reading the request.
            let status = child.wait().await.ok().and_then(|s| s.code());
            return Err(self.crash(status));
        }
        drop(writer);

        self.state = SessionState::AwaitingResult;
        let mut sink = self.effective_sink();
        let mut reader = FrameReader::new(stdout);
        let mut outcome: Option<InvokeOutcome> = None;

        loop {
            match reader.recv().await {
                Ok(Some(frame)) => match frame.msg_type {
                    MessageType::Log => match frame.parse_json::<LogRecord>() {
                        Ok(record) => sink.deliver(record),
                        Err(e) => warn!(plugin = %self.name, "malformed log record: {e}"),
                    },
                    MessageType::Result => match frame.parse_json::<InvokeOutcome>() {
                        Ok(parsed) => {
                            outcome = Some(parsed);
                            break;
                        }
                        Err(e) => {
                            let _ = child.kill().await;
                            let _ = child.wait().await;
                            self.state = SessionState::Failed;
                            return Err(e);
                        }
                    },
                    MessageType::Invoke => {
                        warn!(plugin = %self.name, "unexpected invoke frame from worker");
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    warn!(plugin = %self.name, "worker stream error: {e}");
                    break;
                }
            }
        }

        let status = child.wait().await.ok().and_then(|s| s.code());
        match outcome {
            Some(outcome) => {
                let result = outcome.into_result();
                self.state = match result {
                    Ok(_) => SessionState::Completed,
                    Err(_) => SessionState::Failed,
                };
                result
            }
            None => Err(self.crash(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> WorkerSession {
        WorkerSession::new(
            "plugin1".into(),
            PathBuf::from("/plugins"),
            Params::new(),
            None,
            None,
        )
    }

    #[test]
    fn starts_idle_with_an_empty_log_channel() {
        let mut session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(matches!(session.try_pull_log(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn debug_output_names_the_plugin_and_state() {
        let rendered = format!("{:?}", session());
        assert!(rendered.contains("plugin1"));
        assert!(rendered.contains("Idle"));
    }

    #[tokio::test]
    async fn missing_worker_binary_is_a_spawn_error() {
        let mut session = WorkerSession::new(
            "plugin1".into(),
            PathBuf::from("/plugins"),
            Params::new(),
            None,
            Some(PathBuf::from("/nonexistent/worker-binary")),
        );
        let err = session.run(Params::new()).await.unwrap_err();
        assert!(matches!(err, PluginError::WorkerSpawn(_)));
        assert_eq!(session.state(), SessionState::Failed);
    }
}
