//! Error types for plugin loading and execution.

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading or running a plugin.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("plugin not found: {0}")]
    NotFound(String),

    #[error("plugin '{plugin}' construction failed: {message}")]
    Construction { plugin: String, message: String },

    #[error("plugin '{plugin}' failed: {message}")]
    Runtime { plugin: String, message: String },

    #[error("worker for plugin '{plugin}' exited before sending a result (exit status: {status:?})")]
    ChildProcessCrash {
        plugin: String,
        status: Option<i32>,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("failed to spawn worker process: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Failure category carried in a `failure`-tagged result frame so the
/// host can re-raise the worker-side error as the same category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Construction,
    Runtime,
    Serialization,
}

impl PluginError {
    /// Split an error into its wire representation. Host-only
    /// categories (crash, spawn) collapse to `Runtime` since the worker
    /// never produces them about itself.
    pub(crate) fn to_wire(&self) -> (FailureKind, String, String) {
        match self {
            PluginError::NotFound(name) => {
                (FailureKind::NotFound, name.clone(), self.to_string())
            }
            PluginError::Construction { plugin, message } => {
                (FailureKind::Construction, plugin.clone(), message.clone())
            }
            PluginError::Runtime { plugin, message } => {
                (FailureKind::Runtime, plugin.clone(), message.clone())
            }
            PluginError::Serialization(message) => {
                (FailureKind::Serialization, String::new(), message.clone())
            }
            other => (FailureKind::Runtime, String::new(), other.to_string()),
        }
    }

    /// Reconstruct an error from its wire representation.
    pub(crate) fn from_wire(kind: FailureKind, plugin: String, message: String) -> Self {
        match kind {
            FailureKind::NotFound => PluginError::NotFound(plugin),
            FailureKind::Construction => PluginError::Construction { plugin, message },
            FailureKind::Runtime => PluginError::Runtime { plugin, message },
            FailureKind::Serialization => PluginError::Serialization(message),
        }
    }
}
