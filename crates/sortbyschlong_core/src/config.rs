//! Runtime configuration for the loaded module.
//!
//! # Responsibility
//! - Merge defaults, an optional JSON file and environment overrides.
//! - Reject values the rest of the module cannot honor.
//!
//! # Invariants
//! - Precedence is defaults, then file, then environment.
//! - A missing default file is not an error; a missing explicit file is.
//! - Unknown JSON keys are rejected so typos do not silently fall back.

use crate::extension::context::{InvocationSite, DEFAULT_QUALIFYING_SITES};
use crate::launcher::helper_path_beside;
use crate::logging::{default_log_level, LogLevel};
use crate::menu::MenuStrategy;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// File looked up next to the module when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "sortbyschlong.json";

pub const ENV_CONFIG_PATH: &str = "SORTBYSCHLONG_CONFIG";
pub const ENV_MENU_STRATEGY: &str = "SORTBYSCHLONG_MENU_STRATEGY";
pub const ENV_HELPER_PATH: &str = "SORTBYSCHLONG_HELPER_PATH";
pub const ENV_LOG_LEVEL: &str = "SORTBYSCHLONG_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "SORTBYSCHLONG_LOG_DIR";

/// Effective module configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellConfig {
    pub menu_strategy: MenuStrategy,
    /// Invocation sites where the menu is offered.
    pub qualifying_sites: Vec<InvocationSite>,
    /// Helper executable; defaults to the one shipped beside the module.
    pub helper_path: Option<PathBuf>,
    pub log_level: String,
    /// File logging stays off unless a directory is configured.
    pub log_dir: Option<PathBuf>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            menu_strategy: MenuStrategy::default(),
            qualifying_sites: DEFAULT_QUALIFYING_SITES.to_vec(),
            helper_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl ShellConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|err| ConfigError::Parse {
            path: None,
            message: err.to_string(),
        })
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|err| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            message: err.to_string(),
        })
    }

    /// Applies `SORTBYSCHLONG_*` overrides read through `lookup`.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_MENU_STRATEGY) {
            self.menu_strategy = value.parse().map_err(|err| ConfigError::InvalidValue {
                key: ENV_MENU_STRATEGY,
                reason: format!("{err}"),
            })?;
        }
        if let Some(value) = non_empty(lookup(ENV_HELPER_PATH)) {
            self.helper_path = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(lookup(ENV_LOG_LEVEL)) {
            self.log_level = value;
        }
        if let Some(value) = non_empty(lookup(ENV_LOG_DIR)) {
            self.log_dir = Some(PathBuf::from(value));
        }
        Ok(())
    }

    /// Resolves the effective configuration for a module in `module_dir`.
    pub fn resolve(
        module_dir: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match non_empty(lookup(ENV_CONFIG_PATH)) {
            Some(explicit) => Self::load_file(Path::new(&explicit))?,
            None => match module_dir.map(|dir| dir.join(CONFIG_FILE_NAME)) {
                Some(path) if path.is_file() => Self::load_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_level
            .parse::<LogLevel>()
            .map_err(|err| ConfigError::InvalidValue {
                key: "log_level",
                reason: err.to_string(),
            })?;
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::InvalidValue {
                    key: "log_dir",
                    reason: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        if let Some(path) = &self.helper_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "helper_path",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        if let MenuStrategy::InjectInto { label } = &self.menu_strategy {
            if label.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "menu_strategy",
                    reason: "inject label must not be empty".to_string(),
                });
            }
        }
        if self.qualifying_sites.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "qualifying_sites",
                reason: "at least one site is required".to_string(),
            });
        }
        Ok(())
    }

    /// Helper executable to launch, given the loaded module's file path.
    pub fn helper_executable(&self, module_path: Option<&Path>) -> Option<PathBuf> {
        self.helper_path
            .clone()
            .or_else(|| module_path.and_then(helper_path_beside))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Configuration load or validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        message: String,
    },
    Parse {
        path: Option<PathBuf>,
        message: String,
    },
    InvalidValue {
        key: &'static str,
        reason: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => {
                write!(f, "failed to read config `{}`: {message}", path.display())
            }
            Self::Parse {
                path: Some(path),
                message,
            } => write!(f, "invalid config `{}`: {message}", path.display()),
            Self::Parse {
                path: None,
                message,
            } => write!(f, "invalid config: {message}"),
            Self::InvalidValue { key, reason } => write!(f, "invalid `{key}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}
