//! File logging for a module that lives inside someone else's process.
//!
//! # Responsibility
//! - Start one rolling log file set per host process.
//! - Record panic payloads before the host boundary turns them into neutral
//!   results.
//!
//! # Invariants
//! - Starting twice with the same level and directory is a no-op.
//! - Starting with a different level or directory is refused; the host may
//!   load the module more than once but it keeps a single log.
//! - Nothing here panics.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const LOG_BASENAME: &str = "sortbyschlong";
const ROTATE_AT_BYTES: u64 = 2 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 5;
const PANIC_SUMMARY_CHARS: usize = 160;

static ACTIVE_LOG: OnceCell<ActiveLog> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Accepted log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    /// Case-insensitive; `warning` is accepted for `warn`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(LoggingError::UnknownLevel(value.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoggingError {
    UnknownLevel(String),
    RelativeDirectory(PathBuf),
    CreateDirectory { dir: PathBuf, message: String },
    Backend(String),
    /// Already running with another level or directory.
    Conflict {
        active_level: LogLevel,
        active_dir: PathBuf,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(level) => write!(
                f,
                "unknown log level `{level}` (trace|debug|info|warn|error)"
            ),
            Self::RelativeDirectory(dir) => {
                write!(f, "log directory must be absolute: `{}`", dir.display())
            }
            Self::CreateDirectory { dir, message } => {
                write!(f, "cannot create log directory `{}`: {message}", dir.display())
            }
            Self::Backend(message) => write!(f, "log backend failed to start: {message}"),
            Self::Conflict {
                active_level,
                active_dir,
            } => write!(
                f,
                "logging already active at `{}` with level {}",
                active_dir.display(),
                active_level.as_str()
            ),
        }
    }
}

impl Error for LoggingError {}

struct ActiveLog {
    level: LogLevel,
    dir: PathBuf,
    _handle: LoggerHandle,
}

/// Starts rolling file logs at `level` under `log_dir`.
pub fn init_logging(level: &str, log_dir: &Path) -> Result<(), LoggingError> {
    let level: LogLevel = level.parse()?;
    if !log_dir.is_absolute() {
        return Err(LoggingError::RelativeDirectory(log_dir.to_path_buf()));
    }

    let active = ACTIVE_LOG.get_or_try_init(|| start_file_log(level, log_dir))?;
    if active.level != level || active.dir != log_dir {
        return Err(LoggingError::Conflict {
            active_level: active.level,
            active_dir: active.dir.clone(),
        });
    }
    Ok(())
}

fn start_file_log(level: LogLevel, log_dir: &Path) -> Result<ActiveLog, LoggingError> {
    std::fs::create_dir_all(log_dir).map_err(|err| LoggingError::CreateDirectory {
        dir: log_dir.to_path_buf(),
        message: err.to_string(),
    })?;

    let handle = Logger::try_with_str(level.as_str())
        .map_err(|err| LoggingError::Backend(err.to_string()))?
        .log_to_file(FileSpec::default().directory(log_dir).basename(LOG_BASENAME))
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        // The host can unload the module at any time.
        .write_mode(WriteMode::Direct)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| LoggingError::Backend(err.to_string()))?;

    record_panics();
    info!(
        "event=log_start module=logging status=ok level={} host_pid={} version={}",
        level.as_str(),
        std::process::id(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveLog {
        level,
        dir: log_dir.to_path_buf(),
        _handle: handle,
    })
}

/// `(level, directory)` of the running log, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE_LOG
        .get()
        .map(|active| (active.level.as_str(), active.dir.clone()))
}

pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        LogLevel::Debug.as_str()
    } else {
        LogLevel::Info.as_str()
    }
}

/// Single-line, length-capped text of a panic payload.
pub(crate) fn payload_summary(payload: &(dyn Any + Send)) -> String {
    let text = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>");
    one_line(text, PANIC_SUMMARY_CHARS)
}

fn record_panics() {
    PANIC_HOOK.get_or_init(|| {
        let chained = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let thread = std::thread::current();
            let location = info
                .location()
                .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
            error!(
                "event=panic module=logging status=error thread={} location={} payload={}",
                thread.name().unwrap_or("unnamed"),
                location,
                payload_summary(info.payload())
            );
            chained(info);
        }));
    });
}

fn one_line(text: &str, max_chars: usize) -> String {
    let mut line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .take(max_chars)
        .collect();
    if text.chars().count() > max_chars {
        line.push_str("...");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, one_line, payload_summary, LogLevel, LoggingError};
    use std::any::Any;
    use std::path::{Path, PathBuf};

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!("TRACE".parse::<LogLevel>().expect("trace"), LogLevel::Trace);
        assert_eq!(" Warning ".parse::<LogLevel>().expect("warning"), LogLevel::Warn);
        assert_eq!(
            "chatty".parse::<LogLevel>().expect_err("unknown level"),
            LoggingError::UnknownLevel("chatty".to_string())
        );
    }

    #[test]
    fn relative_directories_are_refused() {
        let err = init_logging("info", Path::new("relative/logs")).expect_err("relative dir");
        assert_eq!(err, LoggingError::RelativeDirectory(PathBuf::from("relative/logs")));
    }

    #[test]
    fn panic_payloads_collapse_to_one_capped_line() {
        let text: Box<dyn Any + Send> = Box::new("menu\r\nbroke");
        assert_eq!(payload_summary(text.as_ref()), "menu  broke");

        let owned: Box<dyn Any + Send> = Box::new(String::from("launcher failed"));
        assert_eq!(payload_summary(owned.as_ref()), "launcher failed");

        let opaque: Box<dyn Any + Send> = Box::new(7_i32);
        assert_eq!(payload_summary(opaque.as_ref()), "<non-string payload>");

        assert_eq!(one_line("abcdef", 3), "abc...");
        assert_eq!(one_line("abc", 3), "abc");
    }

    #[test]
    fn second_start_must_match_the_first() {
        let dir = tempfile::tempdir().expect("log dir");
        let other = tempfile::tempdir().expect("other log dir");

        init_logging("info", dir.path()).expect("first start");
        init_logging("INFO", dir.path()).expect("same settings again");

        match init_logging("debug", dir.path()).expect_err("level change") {
            LoggingError::Conflict { active_level, .. } => assert_eq!(active_level, LogLevel::Info),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            init_logging("info", other.path()),
            Err(LoggingError::Conflict { .. })
        ));

        let (level, active_dir) = logging_status().expect("log running");
        assert_eq!(level, "info");
        assert_eq!(active_dir, dir.path());
    }
}
