//! In-process plugin loading and isolation.

mod common;

use common::{MY_PARAM, params, write_echo_package, write_render_package};
use serde_json::json;
use vivarium::{Params, Plugin, PluginError, PluginLoader};

#[tokio::test]
async fn plugin_isolation() {
    let root = tempfile::tempdir().unwrap();
    write_render_package(root.path(), "plugin1", "Tweedledee says hello");
    write_render_package(root.path(), "plugin2", "Tweedledum says hello");

    let loader = PluginLoader::new(root.path());
    let mut plugin1 = loader.load("plugin1", Params::new()).unwrap();
    let mut plugin2 = loader.load("plugin2", Params::new()).unwrap();

    let out1 = plugin1.run(Params::new()).await.unwrap();
    let out2 = plugin2.run(Params::new()).await.unwrap();
    assert!(out1.as_str().unwrap().contains("Tweedledee"));
    assert!(out2.as_str().unwrap().contains("Tweedledum"));

    // Run again to ensure plugin2 didn't overwrite plugin1's components.
    let out1 = plugin1.run(Params::new()).await.unwrap();
    let out2 = plugin2.run(Params::new()).await.unwrap();
    assert!(out1.as_str().unwrap().contains("Tweedledee"));
    assert!(out2.as_str().unwrap().contains("Tweedledum"));
}

#[test]
fn plugin_not_found_for_incorrect_name() {
    let root = tempfile::tempdir().unwrap();
    let loader = PluginLoader::new(root.path());

    let err = loader.load("NONEXISTENT", Params::new()).unwrap_err();
    assert!(matches!(err, PluginError::NotFound(name) if name == "NONEXISTENT"));
}

#[tokio::test]
async fn constructor_parameters_pass_through() {
    let root = tempfile::tempdir().unwrap();
    write_echo_package(root.path(), "constructor_parameters");

    let loader = PluginLoader::new(root.path());
    let mut plugin = loader
        .load("constructor_parameters", params(json!({"my_param": MY_PARAM})))
        .unwrap();

    let value = plugin.run(Params::new()).await.unwrap();
    assert_eq!(value, json!(MY_PARAM));
}

#[tokio::test]
async fn run_parameters_pass_through() {
    let root = tempfile::tempdir().unwrap();
    write_echo_package(root.path(), "run_parameters");

    let loader = PluginLoader::new(root.path());
    let mut plugin = loader.load("run_parameters", Params::new()).unwrap();

    let value = plugin
        .run(params(json!({"my_param": MY_PARAM})))
        .await
        .unwrap();
    assert_eq!(value, json!(MY_PARAM));
}

#[tokio::test]
async fn runtime_failure_does_not_corrupt_isolation() {
    let root = tempfile::tempdir().unwrap();
    write_render_package(root.path(), "plugin1", "Tweedledee says hello");
    write_echo_package(root.path(), "faulty");

    let loader = PluginLoader::new(root.path());
    let mut plugin1 = loader.load("plugin1", Params::new()).unwrap();
    let mut faulty = loader.load("faulty", Params::new()).unwrap();

    // Missing parameter: run fails, tagged with the plugin's name.
    let err = faulty.run(Params::new()).await.unwrap_err();
    assert!(matches!(err, PluginError::Runtime { ref plugin, .. } if plugin == "faulty"));

    // The failure deactivated its context; plugin1 is unaffected.
    let out = plugin1.run(Params::new()).await.unwrap();
    assert!(out.as_str().unwrap().contains("Tweedledee"));
}
