//! External action launcher.
//!
//! # Responsibility
//! - Start the icon-arranging helper for one command key.
//!
//! # Invariants
//! - Launching never blocks on the child and never shows a window.
//! - Child handles are released right after creation; the child is not tracked.
//! - Failures are reported as `false` and logged, never raised.

use crate::catalog::is_valid_verb_key;
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

/// File name of the helper shipped next to the extension module.
pub const HELPER_EXECUTABLE_NAME: &str = "SortBySchlong.ConsoleHarness.exe";

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Fire-and-forget launch of the action behind a command key.
pub trait ActionLauncher: Send + Sync {
    /// Returns whether the action was started.
    fn launch(&self, key: &str) -> bool;
}

/// Command-line arguments handed to the helper for `key`.
pub fn helper_args(key: &str) -> Vec<String> {
    vec![format!("--shape={key}")]
}

/// Default helper location: beside the loaded module file.
pub fn helper_path_beside(module_path: &Path) -> Option<PathBuf> {
    module_path
        .parent()
        .map(|dir| dir.join(HELPER_EXECUTABLE_NAME))
}

/// Launch failures, absorbed by [`HelperProcessLauncher::launch`].
#[derive(Debug)]
pub enum LaunchError {
    InvalidKey(String),
    MissingExecutable(PathBuf),
    Spawn(std::io::Error),
}

impl Display for LaunchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKey(key) => write!(f, "command key is not launchable: {key:?}"),
            Self::MissingExecutable(path) => {
                write!(f, "helper executable not found: {}", path.display())
            }
            Self::Spawn(err) => write!(f, "failed to spawn helper: {err}"),
        }
    }
}

impl Error for LaunchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// Starts the console harness as a detached, windowless process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperProcessLauncher {
    executable: PathBuf,
}

impl HelperProcessLauncher {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Spawns the helper and drops the child handle without waiting.
    pub fn spawn_detached(&self, key: &str) -> Result<(), LaunchError> {
        if !is_valid_verb_key(key) {
            return Err(LaunchError::InvalidKey(key.to_string()));
        }
        if !self.executable.is_file() {
            return Err(LaunchError::MissingExecutable(self.executable.clone()));
        }

        let mut command = Command::new(&self.executable);
        command
            .args(helper_args(key))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        // Dropping `Child` closes the process and thread handles; it never waits.
        // Windows is the supported target; elsewhere the exited helper stays a
        // zombie until the host process reaps it or exits.
        let child = command.spawn().map_err(LaunchError::Spawn)?;
        info!(
            "event=helper_launch module=launcher status=ok key={} pid={}",
            key,
            child.id()
        );
        Ok(())
    }
}

impl ActionLauncher for HelperProcessLauncher {
    fn launch(&self, key: &str) -> bool {
        match self.spawn_detached(key) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event=helper_launch module=launcher status=error key={:?} error={}",
                    key, err
                );
                false
            }
        }
    }
}

/// Records launch requests instead of starting processes.
///
/// Used by dry runs of the host protocol; `outcome` is what every launch
/// reports back.
#[derive(Debug)]
pub struct RecordingLauncher {
    outcome: bool,
    launched: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    pub fn new(outcome: bool) -> Self {
        Self {
            outcome,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Keys received so far, in call order.
    pub fn launched(&self) -> Vec<String> {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ActionLauncher for RecordingLauncher {
    fn launch(&self, key: &str) -> bool {
        self.launched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(key.to_string());
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::{
        helper_args, helper_path_beside, ActionLauncher, HelperProcessLauncher, LaunchError,
        RecordingLauncher, HELPER_EXECUTABLE_NAME,
    };
    use std::path::Path;

    #[test]
    fn helper_args_use_shape_flag() {
        assert_eq!(helper_args("penis"), vec!["--shape=penis".to_string()]);
    }

    #[test]
    fn helper_path_sits_next_to_module() {
        let module = Path::new("/opt/sortbyschlong/sortbyschlong_shell.dll");
        assert_eq!(
            helper_path_beside(module).expect("module has parent"),
            Path::new("/opt/sortbyschlong").join(HELPER_EXECUTABLE_NAME)
        );
    }

    #[test]
    fn refuses_keys_outside_verb_grammar() {
        let launcher = HelperProcessLauncher::new("/definitely/missing/helper");
        let err = launcher
            .spawn_detached("penis --evil")
            .expect_err("invalid key must be refused");
        assert!(matches!(err, LaunchError::InvalidKey(_)));
        assert!(!launcher.launch("penis --evil"));
    }

    #[test]
    fn missing_executable_reports_false() {
        let dir = tempfile::tempdir().expect("temp dir");
        let launcher = HelperProcessLauncher::new(dir.path().join(HELPER_EXECUTABLE_NAME));
        assert!(matches!(
            launcher.spawn_detached("penis"),
            Err(LaunchError::MissingExecutable(_))
        ));
        assert!(!launcher.launch("penis"));
    }

    #[cfg(unix)]
    #[test]
    fn spawns_existing_executable_without_waiting() {
        let launcher = HelperProcessLauncher::new("/bin/sh");
        assert!(launcher.launch("penis"));
    }

    #[test]
    fn recording_launcher_keeps_call_order() {
        let launcher = RecordingLauncher::new(false);
        assert!(!launcher.launch("penis"));
        assert!(!launcher.launch("stealth"));
        assert_eq!(launcher.launched(), vec!["penis", "stealth"]);
    }
}
