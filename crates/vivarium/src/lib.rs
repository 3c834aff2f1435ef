//! vivarium — isolated plugin host
//!
//! Loads independently-authored plugin packages and runs them with
//! strong isolation guarantees:
//!
//! - **Load isolation**: each plugin's internally-imported components
//!   live in a private load context, activated only for the duration
//!   of that plugin's invocations. Two plugins shipping same-named
//!   components never interfere, no matter how their runs interleave.
//! - **Process isolation**: a plugin can instead be executed inside a
//!   freshly spawned worker process, with its result and every log
//!   record it emits relayed back to the host over an IPC channel.
//!
//! ```no_run
//! use vivarium::{Params, Plugin, PluginLoader};
//!
//! # async fn demo() -> Result<(), vivarium::PluginError> {
//! let loader = PluginLoader::new("/opt/plugins");
//! let mut plugin = loader.load("plugin1", Params::new())?;
//! let value = plugin.run(Params::new()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Isolation here is a correctness guarantee, not a security boundary;
//! plugins are trusted code.

pub mod error;
pub mod ipc;
pub mod loader;
pub mod manifest;
pub mod plugin;
pub mod registry;
pub mod relay;
pub mod session;
pub mod types;
pub mod worker;

pub use error::{PluginError, PluginResult};
pub use loader::PluginLoader;
pub use manifest::{Component, EntrySpec, PluginManifest};
pub use plugin::{LocalPlugin, Plugin};
pub use registry::{LoadContext, LoadContextRegistry};
pub use relay::{
    LogLevel, LogRecord, LogSink, LogSinkConfigurator, PLUGIN_LOG_TARGET, channel_configurator,
};
pub use session::{SessionState, WorkerSession};
pub use types::Params;
