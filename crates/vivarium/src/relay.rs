//! Log record relay
//!
//! Diagnostic events emitted inside a worker process are captured at
//! the point of emission by [`RelayLayer`] (a `tracing` subscriber
//! layer) and forwarded onto the outbound IPC stream in emission
//! order. On the host side, a [`LogSinkConfigurator`] decides where
//! relayed records land; the default sink feeds the worker session's
//! own channel, drained with a non-blocking pull.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::ipc::OutboundMessage;

/// Tracing target used for plugin-emitted diagnostics. The worker
/// relays only events under this target; the host library's own
/// events stay on stderr.
pub const PLUGIN_LOG_TARGET: &str = "plugin";

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Severity of a relayed log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<Level> for LogLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::TRACE => LogLevel::Trace,
            Level::DEBUG => LogLevel::Debug,
            Level::INFO => LogLevel::Info,
            Level::WARN => LogLevel::Warn,
            Level::ERROR => LogLevel::Error,
        }
    }
}

/// A structured diagnostic event captured inside a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub target: String,
    pub message: String,
    /// Event fields other than the message.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Host-side sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Destination for log records relayed from one worker invocation.
pub trait LogSink: Send {
    fn deliver(&mut self, record: LogRecord);
}

impl LogSink for UnboundedSender<LogRecord> {
    fn deliver(&mut self, record: LogRecord) {
        // The receiving side may have been dropped; records are
        // diagnostics, so delivery is best-effort.
        let _ = self.send(record);
    }
}

/// Host-supplied hook wiring where a worker's relayed records land.
/// Invoked once per worker invocation; returns the sink that receives
/// every record from that invocation.
pub type LogSinkConfigurator = Arc<dyn Fn() -> Box<dyn LogSink> + Send + Sync>;

/// Build a configurator that routes all records into a fresh channel,
/// returning the receiver to drain them from.
pub fn channel_configurator() -> (LogSinkConfigurator, UnboundedReceiver<LogRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let configurator: LogSinkConfigurator = Arc::new(move || Box::new(tx.clone()));
    (configurator, rx)
}

// ─────────────────────────────────────────────────────────────────────────────
// Worker-side relay layer
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing layer forwarding every event onto the outbound IPC stream.
///
/// Events are captured synchronously on the emitting thread and queued
/// through an unbounded channel, so stream order matches emission
/// order within one invocation.
pub struct RelayLayer {
    outbound: UnboundedSender<OutboundMessage>,
}

impl RelayLayer {
    pub fn new(outbound: UnboundedSender<OutboundMessage>) -> Self {
        Self { outbound }
    }
}

impl<S: Subscriber> Layer<S> for RelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord {
            level: (*metadata.level()).into(),
            target: metadata.target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        };
        let _ = self.outbound.send(OutboundMessage::Log(record));
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl RecordVisitor {
    fn record(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record(field, value.to_string());
    }
}
