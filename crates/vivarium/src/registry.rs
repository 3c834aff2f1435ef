//! Load-context registry
//!
//! The registry owns the process-wide dynamic load cache: a mapping
//! from component name to loaded component. Loading a plugin imports
//! its components into this cache under their bare names, so two
//! plugins that ship same-named components would overwrite each other
//! without isolation.
//!
//! Isolation works by snapshotting: a load is bracketed by
//! [`LoadContextRegistry::begin_isolated_load`] /
//! [`LoadContextRegistry::end_isolated_load`], which capture the
//! entries the load introduced as a private [`LoadContext`] and leave
//! the cache exactly as it was. Each invocation of a plugin then
//! activates its context (baseline + own entries) and restores the
//! prior cache afterwards via [`ActivationGuard`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::manifest::Component;

/// The working cache: component name → loaded component.
type Cache = HashMap<String, Arc<Component>>;

// ─────────────────────────────────────────────────────────────────────────────
// Tokens and contexts
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque snapshot of the working cache, returned by
/// `begin_isolated_load` and `activate` and consumed by their paired
/// restore operations.
#[derive(Debug)]
pub struct CacheToken {
    entries: Cache,
}

/// The cache entries one plugin's load introduced. Owned exclusively by
/// that plugin's handle and merged into the working cache only for the
/// duration of an invocation.
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    entries: Cache,
}

impl LoadContext {
    /// Number of components private to this context.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether this context owns a component with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Registry owning the dynamic load cache and its baseline snapshot.
///
/// Individual operations are atomic once the registry sits behind a
/// mutex, but an activate…deactivate pair spans a whole plugin
/// invocation. Callers sharing one registry across threads must
/// serialize those invocations externally.
#[derive(Debug, Default)]
pub struct LoadContextRegistry {
    working: Cache,
    baseline: Option<Cache>,
}

/// Registry shared between a loader and the handles it produces.
pub type SharedRegistry = Arc<Mutex<LoadContextRegistry>>;

impl LoadContextRegistry {
    /// Create a registry with an empty working cache and no baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current working cache as the immutable baseline.
    ///
    /// Must happen before any plugin loading. Calling it again is a
    /// no-op; the original baseline is kept.
    pub fn capture_baseline(&mut self) {
        if self.baseline.is_none() {
            self.baseline = Some(self.working.clone());
        }
    }

    fn baseline(&self) -> Cache {
        self.baseline.clone().unwrap_or_default()
    }

    /// Insert a component into the working cache, overwriting any
    /// existing entry with the same name.
    pub fn import(&mut self, component: Component) {
        self.working
            .insert(component.name.clone(), Arc::new(component));
    }

    /// Look up a component in the working cache.
    pub fn lookup(&self, name: &str) -> Option<Arc<Component>> {
        self.working.get(name).cloned()
    }

    /// Save the working cache and reset it to the baseline, so that a
    /// subsequent load starts from a clean slate.
    pub fn begin_isolated_load(&mut self) -> CacheToken {
        let baseline = self.baseline();
        let entries = std::mem::replace(&mut self.working, baseline);
        CacheToken { entries }
    }

    /// Collect the entries the load introduced (present now, absent
    /// from the baseline) as a new [`LoadContext`], then restore the
    /// working cache to the state saved by `begin_isolated_load`.
    pub fn end_isolated_load(&mut self, token: CacheToken) -> LoadContext {
        let loaded = std::mem::replace(&mut self.working, token.entries);
        let baseline = self.baseline();
        let entries = loaded
            .into_iter()
            .filter(|(name, _)| !baseline.contains_key(name))
            .collect();
        LoadContext { entries }
    }

    /// Make `context` the active context: save the working cache, reset
    /// to baseline, and merge the context's entries on top, overwriting
    /// any colliding names.
    pub fn activate(&mut self, context: &LoadContext) -> CacheToken {
        let mut merged = self.baseline();
        for (name, component) in &context.entries {
            merged.insert(name.clone(), component.clone());
        }
        let entries = std::mem::replace(&mut self.working, merged);
        CacheToken { entries }
    }

    /// Restore the working cache to exactly the state saved by the
    /// paired [`LoadContextRegistry::activate`] call.
    pub fn deactivate(&mut self, token: CacheToken) {
        self.working = token.entries;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Activation guard
// ─────────────────────────────────────────────────────────────────────────────

/// RAII pairing of activate/deactivate: deactivation runs when the
/// guard drops, on every exit path of an invocation.
pub struct ActivationGuard {
    registry: SharedRegistry,
    token: Option<CacheToken>,
}

impl ActivationGuard {
    /// Activate `context` on the shared registry.
    pub fn activate(registry: &SharedRegistry, context: &LoadContext) -> Self {
        let token = registry.lock().activate(context);
        Self {
            registry: registry.clone(),
            token: Some(token),
        }
    }
}

impl Drop for ActivationGuard {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.registry.lock().deactivate(token);
        }
    }
}
