use sortbyschlong_core::config::{
    CONFIG_FILE_NAME, ENV_CONFIG_PATH, ENV_HELPER_PATH, ENV_LOG_LEVEL, ENV_MENU_STRATEGY,
};
use sortbyschlong_core::{ConfigError, InvocationSite, MenuStrategy, ShellConfig};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn missing_default_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = ShellConfig::resolve(Some(dir.path()), env(&[])).unwrap();
    assert_eq!(config, ShellConfig::default());
}

#[test]
fn file_next_to_module_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let body = serde_json::json!({
        "menu_strategy": { "kind": "flat" },
        "qualifying_sites": ["desktop_background", "folder_background"],
        "log_level": "debug"
    });
    fs::write(dir.path().join(CONFIG_FILE_NAME), body.to_string()).unwrap();

    let config = ShellConfig::resolve(Some(dir.path()), env(&[])).unwrap();
    assert_eq!(config.menu_strategy, MenuStrategy::Flat);
    assert_eq!(
        config.qualifying_sites,
        vec![InvocationSite::DesktopBackground, InvocationSite::FolderBackground]
    );
    assert_eq!(config.log_level, "debug");
}

#[test]
fn environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        r#"{"menu_strategy":{"kind":"flat"},"log_level":"debug"}"#,
    )
    .unwrap();

    let config = ShellConfig::resolve(
        Some(dir.path()),
        env(&[
            (ENV_MENU_STRATEGY, "inject:Sort by"),
            (ENV_LOG_LEVEL, "warn"),
            (ENV_HELPER_PATH, "/srv/harness"),
        ]),
    )
    .unwrap();
    assert_eq!(
        config.menu_strategy,
        MenuStrategy::InjectInto {
            label: "Sort by".to_string()
        }
    );
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.helper_path, Some(PathBuf::from("/srv/harness")));
}

#[test]
fn explicit_config_path_must_exist() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let err = ShellConfig::resolve(
        None,
        env(&[(ENV_CONFIG_PATH, missing.to_str().unwrap())]),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn explicit_config_path_beats_module_file() {
    let module_dir = tempfile::tempdir().unwrap();
    fs::write(
        module_dir.path().join(CONFIG_FILE_NAME),
        r#"{"menu_strategy":{"kind":"flat"}}"#,
    )
    .unwrap();
    let other = tempfile::NamedTempFile::new().unwrap();
    fs::write(other.path(), r#"{"log_level":"error"}"#).unwrap();

    let config = ShellConfig::resolve(
        Some(module_dir.path()),
        env(&[(ENV_CONFIG_PATH, other.path().to_str().unwrap())]),
    )
    .unwrap();
    assert_eq!(config.menu_strategy, MenuStrategy::Submenu);
    assert_eq!(config.log_level, "error");
}

#[test]
fn invalid_values_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"log_level":"loud"}"#).unwrap();
    let err = ShellConfig::resolve(Some(dir.path()), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "log_level", .. }));

    fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{"qualifying_sites":[]}"#).unwrap();
    let err = ShellConfig::resolve(Some(dir.path()), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { key: "qualifying_sites", .. }));

    fs::write(dir.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
    let err = ShellConfig::resolve(Some(dir.path()), env(&[])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { path: Some(_), .. }));
}
