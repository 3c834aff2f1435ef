//! Shared fixtures: on-disk plugin packages built into a temp dir.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use serde_json::Value;
use vivarium::Params;

pub const MY_PARAM: &str = "test_param";

pub fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

/// Path to the worker executable built alongside the tests.
pub fn worker_binary() -> &'static str {
    env!("CARGO_BIN_EXE_vivarium-worker")
}

fn write_package(root: &Path, name: &str, manifest: &str, components: &[(&str, &str)]) {
    let dir = root.join(name);
    fs::create_dir_all(dir.join("components")).unwrap();
    fs::write(dir.join("plugin.toml"), manifest).unwrap();
    for (file, contents) in components {
        fs::write(dir.join("components").join(file), contents).unwrap();
    }
}

/// A package whose run renders its own `messages` component. Both
/// twins ship a component with the same name; only the greeting text
/// differs, which is exactly the collision isolation must absorb.
pub fn write_render_package(root: &Path, name: &str, greeting: &str) {
    write_package(
        root,
        name,
        "[entry]\nkind = \"render\"\ntemplate = \"${messages.greeting}\"\n",
        &[(
            "messages.toml",
            &format!("[exports]\ngreeting = \"{greeting}\"\n"),
        )],
    );
}

/// A package whose run returns the `my_param` parameter (constructor
/// or call, call wins).
pub fn write_echo_package(root: &Path, name: &str) {
    write_package(
        root,
        name,
        "[entry]\nkind = \"echo\"\nparam = \"my_param\"\n",
        &[],
    );
}

/// A package whose run emits each `(level, message)` pair in its
/// `log_messages` call parameter as a diagnostic event.
pub fn write_log_package(root: &Path, name: &str) {
    write_package(root, name, "[entry]\nkind = \"log\"\n", &[]);
}
