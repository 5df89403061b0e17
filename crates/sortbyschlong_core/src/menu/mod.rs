//! Native menu seam and contribution builder.
//!
//! The host hands the extension raw menu handles; every native menu
//! operation goes through [`MenuBackend`] so the builder and the extension
//! state machine stay platform neutral.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod builder;
pub mod memory;

pub use builder::{BuildError, BuiltMenu, MenuBuilder, MenuStrategy, StrategyParseError};
pub use memory::{MemoryMenuBackend, MemoryMenuItem};

/// Opaque native menu handle as passed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MenuHandle(usize);

impl MenuHandle {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Native menu operations needed to contribute entries.
///
/// Implementations must never panic; failures are reported as [`MenuError`].
pub trait MenuBackend: Send + Sync {
    /// Returns whether `menu` refers to a live menu.
    fn is_menu(&self, menu: MenuHandle) -> bool;

    /// Number of items currently in `menu`.
    fn item_count(&self, menu: MenuHandle) -> Result<usize, MenuError>;

    /// Creates a detached popup container owned by the caller.
    fn create_popup(&self) -> Result<MenuHandle, MenuError>;

    /// Appends a command item with identifier `id`.
    fn append_item(&self, menu: MenuHandle, id: u32, text: &str) -> Result<(), MenuError>;

    /// Attaches `popup` under `parent` with `text`. On success `parent` owns it.
    fn append_popup(
        &self,
        parent: MenuHandle,
        popup: MenuHandle,
        text: &str,
    ) -> Result<(), MenuError>;

    /// Finds a direct child popup of `parent` whose label matches `label`.
    fn find_popup(&self, parent: MenuHandle, label: &str) -> Option<MenuHandle>;

    /// Removes the command item with identifier `id` from `menu`.
    fn remove_item(&self, menu: MenuHandle, id: u32) -> Result<(), MenuError>;

    /// Destroys a caller-owned menu and everything attached to it.
    fn destroy_menu(&self, menu: MenuHandle);
}

/// Compares menu labels the way users perceive them: `&` accelerator
/// markers and tab-separated shortcut hints are ignored, case-insensitive.
pub fn labels_match(actual: &str, expected: &str) -> bool {
    normalize_label(actual) == normalize_label(expected)
}

fn normalize_label(label: &str) -> String {
    let visible = label.split('\t').next().unwrap_or_default();
    visible
        .chars()
        .filter(|c| *c != '&')
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Native menu operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuError {
    InvalidMenu(MenuHandle),
    OperationFailed {
        operation: &'static str,
        code: u32,
    },
}

impl Display for MenuError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMenu(menu) => write!(f, "menu handle {:#x} is not live", menu.as_raw()),
            Self::OperationFailed { operation, code } => {
                write!(f, "menu operation `{operation}` failed with code {code}")
            }
        }
    }
}

impl Error for MenuError {}

#[cfg(test)]
mod tests {
    use super::{labels_match, MenuHandle};

    #[test]
    fn labels_ignore_accelerators_case_and_shortcut_hints() {
        assert!(labels_match("S&ort by", "Sort by"));
        assert!(labels_match("SORT BY\tCtrl+S", "sort by"));
        assert!(!labels_match("Sort", "Sort by"));
    }

    #[test]
    fn null_handle_is_detected() {
        assert!(MenuHandle::from_raw(0).is_null());
        assert!(!MenuHandle::from_raw(0x10).is_null());
    }
}
