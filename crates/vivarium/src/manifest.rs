//! Plugin package manifests
//!
//! A plugin package is a directory `<root>/<name>/` containing:
//!
//! - `plugin.toml` — the manifest, describing the package entry (what
//!   the plugin does when run);
//! - `components/*.toml` — component definitions imported into the
//!   dynamic load cache under their bare names when the package loads.
//!
//! Component names are deliberately unqualified: two packages may both
//! ship a `messages` component, which is exactly the collision the
//! load-isolation machinery exists to handle.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PluginError, PluginResult};

/// Manifest file name inside a plugin package directory.
pub const MANIFEST_FILE: &str = "plugin.toml";

/// Subdirectory holding component definition files.
pub const COMPONENTS_DIR: &str = "components";

// ─────────────────────────────────────────────────────────────────────────────
// Components
// ─────────────────────────────────────────────────────────────────────────────

/// A loaded component: a named table of exported values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    /// Exported values, addressed as `${name.export}` by entry
    /// templates.
    pub exports: BTreeMap<String, Value>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        exports: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        Self {
            name: name.into(),
            exports: exports.into_iter().collect(),
        }
    }
}

/// On-disk shape of a component definition file. The name defaults to
/// the file stem when omitted.
#[derive(Debug, Deserialize)]
struct ComponentFile {
    name: Option<String>,
    #[serde(default)]
    exports: BTreeMap<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Manifest
// ─────────────────────────────────────────────────────────────────────────────

/// Entry behavior of a plugin package: what `run()` evaluates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntrySpec {
    /// Render a template string, resolving `${component.export}`
    /// placeholders against the active working cache at run time.
    Render { template: String },

    /// Return the value of one named parameter from the merged
    /// constructor/call parameters.
    Echo { param: String },

    /// Emit each `(level, message)` pair from the `log_messages` call
    /// parameter as a tracing event.
    Log {
        #[serde(default = "default_log_param")]
        param: String,
    },
}

fn default_log_param() -> String {
    "log_messages".to_string()
}

/// Parsed `plugin.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginManifest {
    /// Package name; defaults to the directory name when omitted.
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub entry: EntrySpec,
}

// ─────────────────────────────────────────────────────────────────────────────
// Package reads
// ─────────────────────────────────────────────────────────────────────────────

fn construction_error(plugin: &str, message: impl ToString) -> PluginError {
    PluginError::Construction {
        plugin: plugin.to_string(),
        message: message.to_string(),
    }
}

/// Read and parse a package manifest.
pub fn read_manifest(package_dir: &Path, plugin: &str) -> PluginResult<PluginManifest> {
    let path = package_dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&path).map_err(|e| construction_error(plugin, e))?;
    toml::from_str(&raw).map_err(|e| construction_error(plugin, e))
}

/// Read every component definition shipped by a package, in file-name
/// order. A package without a `components/` directory ships none.
pub fn read_components(package_dir: &Path, plugin: &str) -> PluginResult<Vec<Component>> {
    let dir = package_dir.join(COMPONENTS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = fs::read_dir(&dir)
        .map_err(|e| construction_error(plugin, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut components = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = fs::read_to_string(&path).map_err(|e| construction_error(plugin, e))?;
        let file: ComponentFile =
            toml::from_str(&raw).map_err(|e| construction_error(plugin, e))?;
        let name = file.name.unwrap_or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        components.push(Component {
            name,
            exports: file.exports,
        });
    }
    Ok(components)
}
