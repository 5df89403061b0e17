//! Process-wide state of the loaded module.
//!
//! # Responsibility
//! - Own the module counters and the once-per-process config snapshot.
//! - Bootstrap file logging from config.
//! - Build class factories and answer unload / registration requests.
//!
//! # Invariants
//! - Config is resolved at most once per process; a bad config falls back to
//!   defaults and never fails a host call.
//! - Logging failures are swallowed; the host process is not ours.

use crate::status::{registry_error_status, Status, S_FALSE, S_OK};
use log::{info, warn};
use sortbyschlong_core::launcher::HELPER_EXECUTABLE_NAME;
use sortbyschlong_core::{
    init_logging, ClassFactory, CommandCatalog, ConfigError, ExtensionEnv, HelperProcessLauncher,
    MenuBackend, ModuleCounters, RegistrationPlan, RegistryStore, ShellConfig,
    EXTENSION_CLASS_ID,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Class id the host asks the module for.
pub const CLASS_ID: Uuid = EXTENSION_CLASS_ID;

/// Live instances and host locks of this module.
pub static MODULE_COUNTERS: ModuleCounters = ModuleCounters::new();

static MODULE_PATH: OnceLock<PathBuf> = OnceLock::new();
static SHELL_CONFIG: OnceLock<ShellConfig> = OnceLock::new();

/// Records the module file path; first call wins.
pub fn set_module_path(path: PathBuf) {
    let _ = MODULE_PATH.set(path);
}

pub fn module_path() -> Option<&'static Path> {
    MODULE_PATH.get().map(PathBuf::as_path)
}

/// Resolves config from the process environment and starts logging, once.
pub fn shell_config() -> &'static ShellConfig {
    SHELL_CONFIG.get_or_init(|| {
        let (config, problem) = load_config(module_path(), |key| std::env::var(key).ok());
        bootstrap_logging(&config);
        if let Some(err) = problem {
            warn!(
                "event=config_load module=shell status=error fallback=defaults error={}",
                err
            );
        }
        info!(
            "event=config_load module=shell status=ok strategy={} sites={}",
            config.menu_strategy.as_str(),
            config.qualifying_sites.len()
        );
        config
    })
}

/// Resolves config; on failure returns defaults plus the error to report.
pub fn load_config(
    module_path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> (ShellConfig, Option<ConfigError>) {
    let module_dir = module_path.and_then(Path::parent);
    match ShellConfig::resolve(module_dir, lookup) {
        Ok(config) => (config, None),
        Err(err) => (ShellConfig::default(), Some(err)),
    }
}

/// Starts file logging when a log directory is configured.
pub fn bootstrap_logging(config: &ShellConfig) -> bool {
    let Some(log_dir) = config.log_dir.as_deref() else {
        return false;
    };
    // Nowhere to report a failure before logging exists.
    init_logging(&config.log_level, log_dir).is_ok()
}

/// Environment shared by every instance of one factory.
pub fn extension_env(
    config: &ShellConfig,
    module_path: Option<&Path>,
    backend: Arc<dyn MenuBackend>,
) -> ExtensionEnv {
    let helper = config
        .helper_executable(module_path)
        .unwrap_or_else(|| PathBuf::from(HELPER_EXECUTABLE_NAME));
    ExtensionEnv::new(
        Arc::new(CommandCatalog::builtin().clone()),
        backend,
        Arc::new(HelperProcessLauncher::new(helper)),
    )
    .with_strategy(config.menu_strategy.clone())
    .with_qualifying_sites(config.qualifying_sites.clone())
}

/// Factory bound to explicit counters and config.
pub fn factory_with(
    counters: &'static ModuleCounters,
    config: &ShellConfig,
    module_path: Option<&Path>,
    backend: Arc<dyn MenuBackend>,
) -> ClassFactory {
    ClassFactory::new(
        counters,
        Arc::new(extension_env(config, module_path, backend)),
    )
}

/// Factory for the loaded module.
pub fn class_factory(backend: Arc<dyn MenuBackend>) -> ClassFactory {
    factory_with(&MODULE_COUNTERS, shell_config(), module_path(), backend)
}

/// `S_OK` when nothing keeps the module loaded, `S_FALSE` otherwise.
pub fn unload_status(counters: &ModuleCounters) -> Status {
    if counters.can_unload() {
        S_OK
    } else {
        S_FALSE
    }
}

pub fn can_unload_now() -> Status {
    unload_status(&MODULE_COUNTERS)
}

pub fn register_server(store: &dyn RegistryStore, module_path: &Path) -> Status {
    match RegistrationPlan::for_module(CLASS_ID, module_path).install(store) {
        Ok(()) => S_OK,
        Err(err) => registry_error_status(&err),
    }
}

pub fn unregister_server(store: &dyn RegistryStore) -> Status {
    // Uninstall only needs the key names; the module path is irrelevant.
    match RegistrationPlan::for_module(CLASS_ID, Path::new("")).uninstall(store) {
        Ok(()) => S_OK,
        Err(err) => registry_error_status(&err),
    }
}
