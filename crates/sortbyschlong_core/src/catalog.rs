//! Command catalog for the desktop context menu.
//!
//! # Responsibility
//! - Hold the ordered list of commands this extension can contribute.
//! - Decide which descriptors are eligible to become native menu items.
//!
//! # Invariants
//! - Catalog order is menu order; it never changes after construction.
//! - `logical_index` always equals the descriptor position in the catalog.
//! - Descriptors are immutable once the catalog is built.

use once_cell::sync::Lazy;
use regex::Regex;

/// Label of the group (submenu or flat-item prefix) holding all commands.
pub const GROUP_LABEL: &str = "SortBySchlong";
/// Longest display text accepted for a native menu item, in UTF-16 units.
pub const MAX_DISPLAY_TEXT_UNITS: usize = 256;

static VERB_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]{0,31}$").expect("valid verb key regex"));

static BUILTIN_CATALOG: Lazy<CommandCatalog> = Lazy::new(|| {
    CommandCatalog::new(GROUP_LABEL).with_command(
        "Penis",
        "penis",
        "Arrange desktop icons in a penis shape",
    )
});

/// Returns whether `key` is a well-formed verb key.
///
/// Verb keys travel to the helper process as `--shape=<key>`, so the grammar
/// is deliberately narrow: lowercase ASCII, digits, `_` and `-`.
pub fn is_valid_verb_key(key: &str) -> bool {
    VERB_KEY_RE.is_match(key)
}

/// Returns whether `text` fits a native menu item label.
pub fn is_valid_menu_text(text: &str) -> bool {
    let units = text.encode_utf16().count();
    units > 0 && units <= MAX_DISPLAY_TEXT_UNITS
}

/// One logical command offered by the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    display_text: String,
    verb_key: String,
    help_text: String,
    logical_index: usize,
}

impl CommandDescriptor {
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    pub fn verb_key(&self) -> &str {
        &self.verb_key
    }

    pub fn help_text(&self) -> &str {
        &self.help_text
    }

    /// Position of this descriptor in its catalog (0-based).
    pub fn logical_index(&self) -> usize {
        self.logical_index
    }

    /// Empty or oversized labels are skipped by the menu builder and never
    /// consume a command identifier.
    pub fn is_menu_eligible(&self) -> bool {
        is_valid_menu_text(&self.display_text)
    }
}

/// Ordered, read-only command list plus the group label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandCatalog {
    group_label: String,
    commands: Vec<CommandDescriptor>,
}

impl CommandCatalog {
    /// Creates an empty catalog under `group_label`.
    pub fn new(group_label: impl Into<String>) -> Self {
        Self {
            group_label: group_label.into(),
            commands: Vec::new(),
        }
    }

    /// Appends one command; its logical index is the current catalog length.
    pub fn with_command(
        mut self,
        display_text: impl Into<String>,
        verb_key: impl Into<String>,
        help_text: impl Into<String>,
    ) -> Self {
        let logical_index = self.commands.len();
        self.commands.push(CommandDescriptor {
            display_text: display_text.into(),
            verb_key: verb_key.into(),
            help_text: help_text.into(),
            logical_index,
        });
        self
    }

    /// Process-wide built-in catalog shipped with the extension.
    pub fn builtin() -> &'static CommandCatalog {
        &BUILTIN_CATALOG
    }

    pub fn group_label(&self) -> &str {
        &self.group_label
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn get(&self, logical_index: usize) -> Option<&CommandDescriptor> {
        self.commands.get(logical_index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter()
    }

    /// Descriptors eligible for a native menu, in catalog order.
    pub fn menu_eligible(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.commands.iter().filter(|command| command.is_menu_eligible())
    }
}

#[cfg(test)]
mod tests {
    use super::{is_valid_menu_text, is_valid_verb_key, CommandCatalog, GROUP_LABEL};

    #[test]
    fn builtin_catalog_holds_penis_layout() {
        let catalog = CommandCatalog::builtin();
        assert_eq!(catalog.group_label(), GROUP_LABEL);
        assert_eq!(catalog.len(), 1);

        let command = catalog.get(0).expect("builtin command");
        assert_eq!(command.display_text(), "Penis");
        assert_eq!(command.verb_key(), "penis");
        assert_eq!(command.help_text(), "Arrange desktop icons in a penis shape");
        assert_eq!(command.logical_index(), 0);
        assert!(command.is_menu_eligible());
    }

    #[test]
    fn logical_index_follows_insertion_order() {
        let catalog = CommandCatalog::new("Group")
            .with_command("A", "a", "first")
            .with_command("", "b", "skipped later")
            .with_command("C", "c", "third");

        let indices: Vec<usize> = catalog.iter().map(|c| c.logical_index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);

        let eligible: Vec<&str> = catalog.menu_eligible().map(|c| c.verb_key()).collect();
        assert_eq!(eligible, vec!["a", "c"]);
    }

    #[test]
    fn menu_text_length_is_counted_in_utf16_units() {
        assert!(!is_valid_menu_text(""));
        assert!(is_valid_menu_text(&"x".repeat(256)));
        assert!(!is_valid_menu_text(&"x".repeat(257)));
        // One astral character is two UTF-16 units.
        assert!(!is_valid_menu_text(&"\u{1F346}".repeat(129)));
    }

    #[test]
    fn verb_key_grammar_is_narrow() {
        assert!(is_valid_verb_key("penis"));
        assert!(is_valid_verb_key("stealth-mode_2"));
        assert!(!is_valid_verb_key(""));
        assert!(!is_valid_verb_key("Penis"));
        assert!(!is_valid_verb_key("-leading"));
        assert!(!is_valid_verb_key("a b"));
        assert!(!is_valid_verb_key("x\" --evil"));
        assert!(!is_valid_verb_key(&"k".repeat(33)));
    }
}
