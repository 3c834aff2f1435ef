//! Process-isolated execution: worker spawning, result relay, and the
//! log-record relay channel.

mod common;

use common::{
    MY_PARAM, params, worker_binary, write_echo_package, write_log_package, write_render_package,
};
use serde_json::json;
use tokio::sync::mpsc::error::TryRecvError;
use vivarium::{Params, Plugin, PluginError, PluginLoader, SessionState, channel_configurator};

fn loader(root: &std::path::Path) -> PluginLoader {
    PluginLoader::new(root).with_worker_binary(worker_binary())
}

fn log_messages() -> Params {
    params(json!({
        "log_messages": [
            ["debug", "log1"],
            ["info", "log2"],
            ["warn", "log3"],
        ]
    }))
}

#[tokio::test]
async fn worker_plugin_isolation() {
    let root = tempfile::tempdir().unwrap();
    write_render_package(root.path(), "plugin1", "Tweedledee says hello");
    write_render_package(root.path(), "plugin2", "Tweedledum says hello");

    let loader = loader(root.path());
    let mut plugin1 = loader
        .load_process_isolated("plugin1", Params::new(), None)
        .unwrap();
    let mut plugin2 = loader
        .load_process_isolated("plugin2", Params::new(), None)
        .unwrap();

    let out1 = plugin1.run(Params::new()).await.unwrap();
    let out2 = plugin2.run(Params::new()).await.unwrap();
    assert!(out1.as_str().unwrap().contains("Tweedledee"));
    assert!(out2.as_str().unwrap().contains("Tweedledum"));
    assert_eq!(plugin1.state(), SessionState::Completed);
}

#[tokio::test]
async fn worker_constructor_parameters_pass_through() {
    let root = tempfile::tempdir().unwrap();
    write_echo_package(root.path(), "constructor_parameters");

    let loader = loader(root.path());
    let mut plugin = loader
        .load_process_isolated(
            "constructor_parameters",
            params(json!({"my_param": MY_PARAM})),
            None,
        )
        .unwrap();

    assert_eq!(plugin.run(Params::new()).await.unwrap(), json!(MY_PARAM));
}

#[tokio::test]
async fn worker_failure_re_raises_as_original_category() {
    let root = tempfile::tempdir().unwrap();
    write_echo_package(root.path(), "faulty");

    let loader = loader(root.path());
    let mut plugin = loader
        .load_process_isolated("faulty", Params::new(), None)
        .unwrap();

    // Missing parameter inside the worker comes back as a runtime
    // error tagged with the plugin's name, not as a crash.
    let err = plugin.run(Params::new()).await.unwrap_err();
    assert!(matches!(err, PluginError::Runtime { ref plugin, .. } if plugin == "faulty"));
    assert_eq!(plugin.state(), SessionState::Failed);
}

#[tokio::test]
async fn worker_death_without_result_is_a_crash() {
    let root = tempfile::tempdir().unwrap();
    write_render_package(root.path(), "plugin1", "Tweedledee says hello");

    // An executable that exits immediately without speaking the
    // protocol stands in for a crashing worker.
    let loader = PluginLoader::new(root.path()).with_worker_binary("false");
    let mut plugin = loader
        .load_process_isolated("plugin1", Params::new(), None)
        .unwrap();

    let err = plugin.run(Params::new()).await.unwrap_err();
    assert!(matches!(err, PluginError::ChildProcessCrash { ref plugin, .. } if plugin == "plugin1"));
    assert_eq!(plugin.state(), SessionState::Crashed);
}

#[tokio::test]
async fn log_records_arrive_in_emission_order() {
    let root = tempfile::tempdir().unwrap();
    write_log_package(root.path(), "logger");

    let loader = loader(root.path());
    let mut plugin = loader
        .load_process_isolated("logger", Params::new(), None)
        .unwrap();
    plugin.run(log_messages()).await.unwrap();

    // Default sink: the session's own channel.
    assert_eq!(plugin.try_pull_log().unwrap().message, "log1");
    assert_eq!(plugin.try_pull_log().unwrap().message, "log2");
    assert_eq!(plugin.try_pull_log().unwrap().message, "log3");
    assert!(matches!(plugin.try_pull_log(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn loader_configurator_routes_log_records() {
    let root = tempfile::tempdir().unwrap();
    write_log_package(root.path(), "logger");

    let (configurator, mut records) = channel_configurator();
    let loader = loader(root.path()).with_log_configurator(configurator);

    let mut plugin = loader
        .load_process_isolated("logger", Params::new(), None)
        .unwrap();
    plugin.run(log_messages()).await.unwrap();

    assert_eq!(records.try_recv().unwrap().message, "log1");
    assert_eq!(records.try_recv().unwrap().message, "log2");
    assert_eq!(records.try_recv().unwrap().message, "log3");
    assert!(records.try_recv().is_err());
    // Nothing leaked onto the session's own channel.
    assert!(matches!(plugin.try_pull_log(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn per_load_configurator_overrides_loader_default() {
    let root = tempfile::tempdir().unwrap();
    write_log_package(root.path(), "logger");

    let (default_configurator, mut default_records) = channel_configurator();
    let (override_configurator, mut override_records) = channel_configurator();
    let loader = loader(root.path()).with_log_configurator(default_configurator);

    let mut plugin = loader
        .load_process_isolated("logger", Params::new(), Some(override_configurator))
        .unwrap();
    plugin.run(log_messages()).await.unwrap();

    assert!(default_records.try_recv().is_err());
    assert_eq!(override_records.try_recv().unwrap().message, "log1");
    assert_eq!(override_records.try_recv().unwrap().message, "log2");
    assert_eq!(override_records.try_recv().unwrap().message, "log3");
    assert!(override_records.try_recv().is_err());
}

#[tokio::test]
async fn log_record_metadata_survives_the_relay() {
    let root = tempfile::tempdir().unwrap();
    write_log_package(root.path(), "logger");

    let loader = loader(root.path());
    let mut plugin = loader
        .load_process_isolated("logger", Params::new(), None)
        .unwrap();
    plugin
        .run(params(json!({"log_messages": [["error", "it broke"]]})))
        .await
        .unwrap();

    let record = plugin.try_pull_log().unwrap();
    assert_eq!(record.level, vivarium::LogLevel::Error);
    assert_eq!(record.target, vivarium::PLUGIN_LOG_TARGET);
    assert_eq!(record.message, "it broke");
}
