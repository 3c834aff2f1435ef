//! Worker-process main loop
//!
//! Invoked by the `vivarium-worker` binary. The worker reads one
//! invocation request from stdin, reconstructs the plugin with a
//! fresh loader (a fresh process means a fresh registry, so nothing
//! loaded here can contaminate the host or any other worker), runs
//! it, and writes the tagged result to stdout.
//!
//! stdout carries the IPC frames, so all ambient logging goes to
//! stderr; every tracing event is additionally relayed onto the
//! outbound stream as a log frame, through the same ordered writer as
//! the result.

use anyhow::{Context as _, Result, bail};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::PluginResult;
use crate::ipc::{FrameReader, FrameWriter, InvokeOutcome, InvokeRequest, MessageType, OutboundMessage};
use crate::loader::PluginLoader;
use crate::plugin::Plugin;
use crate::relay::{PLUGIN_LOG_TARGET, RelayLayer};

/// Run one invocation: the whole life of a worker process.
pub async fn run() -> Result<()> {
    let mut reader = FrameReader::new(tokio::io::stdin());
    let frame = reader
        .recv()
        .await?
        .context("host closed stdin before sending an invoke frame")?;
    if frame.msg_type != MessageType::Invoke {
        bail!("expected invoke frame, got {:?}", frame.msg_type);
    }
    let request: InvokeRequest = frame.parse_json()?;

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    // Stderr logging for the worker itself; the relay layer forwards
    // every plugin-emitted event onto the outbound IPC stream.
    tracing_subscriber::registry()
        .with(
            fmt::layer().with_writer(std::io::stderr).with_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
            ),
        )
        .with(
            RelayLayer::new(outbound_tx.clone())
                .with_filter(filter_fn(|meta| meta.target().starts_with(PLUGIN_LOG_TARGET))),
        )
        .init();

    // Single writer task: log frames and the final result share one
    // ordered stream, so the result can never overtake a log record.
    let writer_task = tokio::spawn(async move {
        let mut writer = FrameWriter::new(tokio::io::stdout());
        while let Some(message) = outbound_rx.recv().await {
            let is_result = matches!(message, OutboundMessage::Result(_));
            if writer.send_outbound(&message).await.is_err() {
                break;
            }
            if is_result {
                break;
            }
        }
    });

    let result = execute(&request).await;
    let _ = outbound_tx.send(OutboundMessage::Result(InvokeOutcome::from_result(result)));
    writer_task.await?;
    Ok(())
}

/// Load and run the requested plugin. Any failure here becomes a
/// `failure`-tagged result frame rather than a silent crash.
async fn execute(request: &InvokeRequest) -> PluginResult<Value> {
    let loader = PluginLoader::new(&request.plugin_root);
    let mut plugin = loader.load(&request.plugin_name, request.constructor_params.clone())?;
    plugin.run(request.call_params.clone()).await
}
