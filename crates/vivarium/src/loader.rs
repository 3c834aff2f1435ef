//! Plugin loader
//!
//! Resolves plugin names to packages under a configured root, loads
//! them in isolation, and hands back either an in-process
//! [`LocalPlugin`] or a process-isolated [`WorkerSession`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::manifest::{self, MANIFEST_FILE};
use crate::plugin::{LocalPlugin, PluginInstance};
use crate::registry::{LoadContextRegistry, SharedRegistry};
use crate::relay::LogSinkConfigurator;
use crate::session::WorkerSession;
use crate::types::Params;

/// Loads plugins from packages under a root directory.
///
/// The loader owns the registry shared by every in-process handle it
/// produces; its baseline is captured before any plugin loading.
pub struct PluginLoader {
    root: PathBuf,
    registry: SharedRegistry,
    default_log_configurator: Option<LogSinkConfigurator>,
    worker_binary: Option<PathBuf>,
}

impl PluginLoader {
    /// Create a loader rooted at a plugin package directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let mut registry = LoadContextRegistry::new();
        registry.capture_baseline();
        Self {
            root: root.into(),
            registry: Arc::new(Mutex::new(registry)),
            default_log_configurator: None,
            worker_binary: None,
        }
    }

    /// Set the default log-sink configurator applied to every worker
    /// session this loader produces (unless overridden per load).
    pub fn with_log_configurator(mut self, configurator: LogSinkConfigurator) -> Self {
        self.default_log_configurator = Some(configurator);
        self
    }

    /// Set an explicit worker executable. Defaults to a
    /// `vivarium-worker` sibling of the current executable, then PATH.
    pub fn with_worker_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_binary = Some(path.into());
        self
    }

    /// The registry shared by this loader's in-process handles.
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Resolve a plugin name to its package directory.
    fn resolve(&self, name: &str) -> PluginResult<PathBuf> {
        let package_dir = self.root.join(name);
        if package_dir.join(MANIFEST_FILE).is_file() {
            Ok(package_dir)
        } else {
            Err(PluginError::NotFound(name.to_string()))
        }
    }

    /// Load a plugin for in-process execution.
    ///
    /// The package's components are imported inside an isolated-load
    /// bracket; the entries they introduce become the handle's private
    /// load context and the registry is left exactly as it was.
    pub fn load(&self, name: &str, constructor_params: Params) -> PluginResult<LocalPlugin> {
        let package_dir = self.resolve(name)?;
        let manifest = manifest::read_manifest(&package_dir, name)?;
        if let Some(declared) = manifest.name.as_deref() {
            if declared != name {
                return Err(PluginError::Construction {
                    plugin: name.to_string(),
                    message: format!("package declares name '{declared}'"),
                });
            }
        }
        let components = manifest::read_components(&package_dir, name)?;

        let context = {
            let mut registry = self.registry.lock();
            let token = registry.begin_isolated_load();
            for component in components {
                registry.import(component);
            }
            registry.end_isolated_load(token)
        };
        debug!(plugin = name, components = context.len(), "loaded plugin package");

        let instance = PluginInstance::construct(
            name.to_string(),
            manifest.entry,
            constructor_params,
            self.registry.clone(),
        )?;
        Ok(LocalPlugin::new(
            name.to_string(),
            instance,
            context,
            self.registry.clone(),
        ))
    }

    /// Load a plugin for process-isolated execution.
    ///
    /// Construction is deferred to the worker process; the session
    /// stores only plain data (name, root, constructor parameters) and
    /// the worker reconstructs the plugin from scratch on each run.
    pub fn load_process_isolated(
        &self,
        name: &str,
        constructor_params: Params,
        log_configurator: Option<LogSinkConfigurator>,
    ) -> PluginResult<WorkerSession> {
        self.resolve(name)?;
        Ok(WorkerSession::new(
            name.to_string(),
            self.root.clone(),
            constructor_params,
            log_configurator.or_else(|| self.default_log_configurator.clone()),
            self.worker_binary.clone(),
        ))
    }

    /// Root directory this loader resolves packages under.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
