//! Core protocol logic for the SortBySchlong desktop context-menu extension.
//! This crate is platform neutral and the single source of truth for the
//! host contract invariants; native glue lives in `sortbyschlong_shell`.

pub mod boundary;
pub mod catalog;
pub mod config;
pub mod error;
pub mod extension;
pub mod launcher;
pub mod lifecycle;
pub mod logging;
pub mod menu;
pub mod registration;

pub use boundary::at_host_boundary;
pub use catalog::{CommandCatalog, CommandDescriptor, GROUP_LABEL};
pub use config::{ConfigError, ShellConfig};
pub use error::{HostError, HostResult};
pub use extension::{
    ActivationContext, Capability, CommandIdRange, CommandStringKind, ContributeRequest,
    ExtensionEnv, ExtensionInstance, ExtensionObject, Initializable, InstanceRef, InstanceState,
    InterfaceId, InvocationRequest, InvocationSite, MenuContributor, TextBuffer,
    CONTRIBUTE_DEFAULT_ONLY,
};
pub use launcher::{ActionLauncher, HelperProcessLauncher, LaunchError, RecordingLauncher};
pub use lifecycle::{ClassFactory, FactoryError, ModuleCounters};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use menu::{
    BuildError, BuiltMenu, MemoryMenuBackend, MenuBackend, MenuBuilder, MenuError, MenuHandle,
    MenuStrategy,
};
pub use registration::{
    MemoryRegistry, RegistrationPlan, RegistryError, RegistryKey, RegistryRoot, RegistryStore,
    EXTENSION_CLASS_ID,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
