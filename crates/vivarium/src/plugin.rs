//! Plugin capability contract and in-process handle
//!
//! Every loaded plugin is driven through the [`Plugin`] trait, whether
//! it runs in this process ([`LocalPlugin`]) or in a spawned worker
//! (`WorkerSession`). Callers cannot tell the execution strategies
//! apart through the interface.
//!
//! Construction is the loader's factory step: `construct(config) ->
//! instance` amounts to evaluating a package's entry description
//! against its constructor parameters.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PluginError, PluginResult};
use crate::manifest::EntrySpec;
use crate::registry::{ActivationGuard, LoadContext, SharedRegistry};
use crate::relay::LogLevel;
use crate::types::{merge_params, Params};

/// The two-method plugin capability: construct (performed by the
/// loader) and run.
#[async_trait]
pub trait Plugin: Send {
    /// Name the plugin was loaded under.
    fn name(&self) -> &str;

    /// Execute the plugin with the given call parameters.
    async fn run(&mut self, call_params: Params) -> PluginResult<Value>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Interpreted instance
// ─────────────────────────────────────────────────────────────────────────────

/// A constructed plugin: an entry behavior bound to its constructor
/// parameters and to the registry whose *working cache* it resolves
/// components from. Resolution goes through the live cache rather than
/// a private copy, which is what makes context activation observable.
#[derive(Debug)]
pub struct PluginInstance {
    name: String,
    entry: EntrySpec,
    constructor_params: Params,
    registry: SharedRegistry,
}

impl PluginInstance {
    pub(crate) fn construct(
        name: String,
        entry: EntrySpec,
        constructor_params: Params,
        registry: SharedRegistry,
    ) -> PluginResult<Self> {
        if let EntrySpec::Echo { param } | EntrySpec::Log { param } = &entry {
            if param.is_empty() {
                return Err(PluginError::Construction {
                    plugin: name,
                    message: "entry parameter name must not be empty".into(),
                });
            }
        }
        Ok(Self {
            name,
            entry,
            constructor_params,
            registry,
        })
    }

    fn runtime_error(&self, message: impl ToString) -> PluginError {
        PluginError::Runtime {
            plugin: self.name.clone(),
            message: message.to_string(),
        }
    }

    /// Evaluate the entry behavior against the active working cache.
    pub fn run(&self, call_params: &Params) -> PluginResult<Value> {
        let params = merge_params(&self.constructor_params, call_params);
        match &self.entry {
            EntrySpec::Render { template } => {
                self.render(template).map(Value::String)
            }
            EntrySpec::Echo { param } => params
                .get(param)
                .cloned()
                .ok_or_else(|| self.runtime_error(format!("missing parameter '{param}'"))),
            EntrySpec::Log { param } => {
                let messages = params
                    .get(param)
                    .cloned()
                    .ok_or_else(|| self.runtime_error(format!("missing parameter '{param}'")))?;
                let messages: Vec<(LogLevel, String)> = serde_json::from_value(messages)
                    .map_err(|e| self.runtime_error(format!("invalid log messages: {e}")))?;
                let count = messages.len();
                for (level, message) in messages {
                    emit(level, &message);
                }
                Ok(Value::from(count))
            }
        }
    }

    /// Resolve `${component.export}` placeholders against the working
    /// cache. Everything outside placeholders is copied through.
    fn render(&self, template: &str) -> PluginResult<String> {
        let mut output = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            output.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .ok_or_else(|| self.runtime_error("unterminated placeholder in template"))?;
            let reference = &after[..end];
            output.push_str(&self.resolve(reference)?);
            rest = &after[end + 1..];
        }
        output.push_str(rest);
        Ok(output)
    }

    fn resolve(&self, reference: &str) -> PluginResult<String> {
        let (component_name, export) = reference.split_once('.').ok_or_else(|| {
            self.runtime_error(format!(
                "placeholder '{reference}' must be 'component.export'"
            ))
        })?;
        let component = self
            .registry
            .lock()
            .lookup(component_name)
            .ok_or_else(|| {
                self.runtime_error(format!("component '{component_name}' is not loaded"))
            })?;
        let value = component.exports.get(export).ok_or_else(|| {
            self.runtime_error(format!(
                "component '{component_name}' has no export '{export}'"
            ))
        })?;
        Ok(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Emit one relayed diagnostic at the requested severity.
fn emit(level: LogLevel, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(target: "plugin", "{}", message),
        LogLevel::Debug => tracing::debug!(target: "plugin", "{}", message),
        LogLevel::Info => tracing::info!(target: "plugin", "{}", message),
        LogLevel::Warn => tracing::warn!(target: "plugin", "{}", message),
        LogLevel::Error => tracing::error!(target: "plugin", "{}", message),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process handle
// ─────────────────────────────────────────────────────────────────────────────

/// A plugin running in the host process, bundled with its private
/// load context.
///
/// Each `run()` activates the context (displacing whatever was active)
/// and unconditionally restores the prior cache afterwards, so one
/// plugin's failure never corrupts isolation for the next. Concurrent
/// `run()` calls on handles sharing one registry must be serialized by
/// the caller; the activation window is not internally synchronized.
#[derive(Debug)]
pub struct LocalPlugin {
    name: String,
    instance: PluginInstance,
    context: LoadContext,
    registry: SharedRegistry,
}

impl LocalPlugin {
    pub(crate) fn new(
        name: String,
        instance: PluginInstance,
        context: LoadContext,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            name,
            instance,
            context,
            registry,
        }
    }

    /// The components this plugin's load introduced.
    pub fn context(&self) -> &LoadContext {
        &self.context
    }
}

#[async_trait]
impl Plugin for LocalPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&mut self, call_params: Params) -> PluginResult<Value> {
        let _guard = ActivationGuard::activate(&self.registry, &self.context);
        self.instance.run(&call_params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LoadContextRegistry;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    fn registry() -> SharedRegistry {
        Arc::new(Mutex::new(LoadContextRegistry::new()))
    }

    #[test]
    fn echo_prefers_call_params_over_constructor_params() {
        let instance = PluginInstance::construct(
            "echo".into(),
            EntrySpec::Echo {
                param: "my_param".into(),
            },
            params(json!({"my_param": "from_ctor"})),
            registry(),
        )
        .unwrap();

        assert_eq!(
            instance.run(&Params::new()).unwrap(),
            json!("from_ctor")
        );
        assert_eq!(
            instance
                .run(&params(json!({"my_param": "from_call"})))
                .unwrap(),
            json!("from_call")
        );
    }

    #[test]
    fn echo_missing_param_is_a_runtime_error() {
        let instance = PluginInstance::construct(
            "echo".into(),
            EntrySpec::Echo {
                param: "my_param".into(),
            },
            Params::new(),
            registry(),
        )
        .unwrap();

        let err = instance.run(&Params::new()).unwrap_err();
        assert!(matches!(err, PluginError::Runtime { ref plugin, .. } if plugin == "echo"));
    }

    #[test]
    fn render_resolves_against_working_cache() {
        let registry = registry();
        registry.lock().import(crate::manifest::Component::new(
            "messages",
            [("greeting".to_string(), json!("Tweedledee says hello"))],
        ));

        let instance = PluginInstance::construct(
            "plugin1".into(),
            EntrySpec::Render {
                template: "greeting: ${messages.greeting}".into(),
            },
            Params::new(),
            registry,
        )
        .unwrap();

        assert_eq!(
            instance.run(&Params::new()).unwrap(),
            json!("greeting: Tweedledee says hello")
        );
    }

    #[test]
    fn render_missing_component_is_a_runtime_error() {
        let instance = PluginInstance::construct(
            "plugin1".into(),
            EntrySpec::Render {
                template: "${messages.greeting}".into(),
            },
            Params::new(),
            registry(),
        )
        .unwrap();

        let err = instance.run(&Params::new()).unwrap_err();
        assert!(matches!(err, PluginError::Runtime { ref message, .. }
            if message.contains("messages")));
    }

    #[test]
    fn empty_entry_param_fails_construction() {
        let err = PluginInstance::construct(
            "bad".into(),
            EntrySpec::Echo { param: String::new() },
            Params::new(),
            registry(),
        )
        .unwrap_err();
        assert!(matches!(err, PluginError::Construction { .. }));
    }
}
