//! Menu contribution builder.
//!
//! # Responsibility
//! - Turn the command catalog into native menu entries with contiguous ids.
//! - Apply the configured [`MenuStrategy`] (own submenu, flat items, or
//!   injection into an existing host submenu).
//!
//! # Invariants
//! - Only eligible descriptors consume identifiers; ids are `first..=last`
//!   with no gaps.
//! - No identifier above the host's `id_last` (or the 0x8000 ceiling) is used.
//! - Every failure path releases what this call created: a detached popup is
//!   destroyed, inserted items are removed. A popup attached to the host menu
//!   belongs to the host and is never destroyed here.

use crate::catalog::{is_valid_menu_text, CommandCatalog, CommandDescriptor};
use crate::menu::{MenuBackend, MenuError, MenuHandle};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Host-imposed identifier ceiling; ids at or above it belong to the host.
pub const COMMAND_ID_CEILING: u32 = 0x8000;

/// How contributed commands are placed into the host menu.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MenuStrategy {
    /// One popup named after the catalog group, holding every command.
    #[default]
    Submenu,
    /// Commands appended directly as `"<group> - <command>"` items.
    Flat,
    /// Commands appended into an existing host popup, e.g. "Sort by".
    InjectInto { label: String },
}

impl MenuStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submenu => "submenu",
            Self::Flat => "flat",
            Self::InjectInto { .. } => "inject",
        }
    }
}

impl FromStr for MenuStrategy {
    type Err = StrategyParseError;

    /// Parses `submenu`, `flat` or `inject:<label>`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "submenu" => return Ok(Self::Submenu),
            "flat" => return Ok(Self::Flat),
            _ => {}
        }
        let label = trimmed
            .strip_prefix("inject:")
            .map(str::trim)
            .ok_or_else(|| StrategyParseError(trimmed.to_string()))?;
        if label.is_empty() {
            return Err(StrategyParseError(trimmed.to_string()));
        }
        Ok(Self::InjectInto {
            label: label.to_string(),
        })
    }
}

/// Unrecognized strategy string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyParseError(pub String);

impl Display for StrategyParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unsupported menu strategy `{}`; expected submenu|flat|inject:<label>",
            self.0
        )
    }
}

impl Error for StrategyParseError {}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltMenu {
    pub first_id: u32,
    pub last_id: u32,
    /// Catalog logical index per allocated offset.
    pub commands: Vec<usize>,
}

impl BuiltMenu {
    /// Number of identifiers consumed.
    pub fn consumed(&self) -> u32 {
        // Bounded by the id ceiling, so the cast cannot truncate.
        self.commands.len() as u32
    }
}

/// Builder failures. None of them leaves anything attached to the host menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    IdOutOfRange { first: u32, last: u32 },
    InvalidGroupLabel,
    NoEligibleCommands,
    PopupCreation(MenuError),
    ItemAppend(MenuError),
    ItemCountMismatch { expected: usize, actual: usize },
    PopupAttach(MenuError),
    TargetPopupMissing(String),
}

impl Display for BuildError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdOutOfRange { first, last } => {
                write!(f, "command id range {first}..={last} is not usable")
            }
            Self::InvalidGroupLabel => write!(f, "group label is empty or too long"),
            Self::NoEligibleCommands => write!(f, "catalog has no menu-eligible commands"),
            Self::PopupCreation(err) => write!(f, "failed to create popup: {err}"),
            Self::ItemAppend(err) => write!(f, "failed to append command item: {err}"),
            Self::ItemCountMismatch { expected, actual } => write!(
                f,
                "popup holds {actual} item(s) after build, expected {expected}"
            ),
            Self::PopupAttach(err) => write!(f, "failed to attach popup: {err}"),
            Self::TargetPopupMissing(label) => {
                write!(f, "host menu has no popup labelled `{label}`")
            }
        }
    }
}

impl Error for BuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PopupCreation(err) | Self::ItemAppend(err) | Self::PopupAttach(err) => Some(err),
            _ => None,
        }
    }
}

/// Builds native menu entries for one contribution call.
pub struct MenuBuilder<'a> {
    backend: &'a dyn MenuBackend,
    strategy: &'a MenuStrategy,
}

impl<'a> MenuBuilder<'a> {
    pub fn new(backend: &'a dyn MenuBackend, strategy: &'a MenuStrategy) -> Self {
        Self { backend, strategy }
    }

    /// Contributes `catalog` into `menu` using ids from `id_first..=id_last`.
    pub fn build(
        &self,
        menu: MenuHandle,
        catalog: &CommandCatalog,
        id_first: u32,
        id_last: u32,
    ) -> Result<BuiltMenu, BuildError> {
        let group_label = catalog.group_label();
        if !matches!(self.strategy, MenuStrategy::InjectInto { .. })
            && !is_valid_menu_text(group_label)
        {
            return Err(BuildError::InvalidGroupLabel);
        }
        let plan = plan_ids(catalog, id_first, id_last, |command| {
            self.item_text(group_label, command)
        })?;
        debug!(
            "event=menu_build module=builder status=start strategy={} first_id={} planned={}",
            self.strategy.as_str(),
            id_first,
            plan.len()
        );

        match self.strategy {
            MenuStrategy::Submenu => self.build_submenu(menu, group_label, &plan)?,
            MenuStrategy::Flat => self.build_flat(menu, &plan)?,
            MenuStrategy::InjectInto { label } => self.build_injected(menu, label, &plan)?,
        }

        let commands: Vec<usize> = plan.iter().map(|item| item.logical_index).collect();
        let last_id = id_first + commands.len() as u32 - 1;
        Ok(BuiltMenu {
            first_id: id_first,
            last_id,
            commands,
        })
    }

    /// Label the item gets under this strategy.
    fn item_text(&self, group_label: &str, command: &CommandDescriptor) -> String {
        match self.strategy {
            MenuStrategy::Flat => format!("{group_label} - {}", command.display_text()),
            MenuStrategy::Submenu | MenuStrategy::InjectInto { .. } => {
                command.display_text().to_string()
            }
        }
    }

    fn build_submenu(
        &self,
        parent: MenuHandle,
        group_label: &str,
        plan: &[PlannedItem],
    ) -> Result<(), BuildError> {
        let popup = self
            .backend
            .create_popup()
            .map_err(BuildError::PopupCreation)?;
        let owned = OwnedPopup::new(self.backend, popup);

        for item in plan {
            self.backend
                .append_item(popup, item.id, &item.text)
                .map_err(BuildError::ItemAppend)?;
        }

        let actual = self
            .backend
            .item_count(popup)
            .map_err(BuildError::ItemAppend)?;
        if actual != plan.len() {
            return Err(BuildError::ItemCountMismatch {
                expected: plan.len(),
                actual,
            });
        }

        self.backend
            .append_popup(parent, popup, group_label)
            .map_err(BuildError::PopupAttach)?;
        owned.hand_over();
        Ok(())
    }

    fn build_flat(&self, parent: MenuHandle, plan: &[PlannedItem]) -> Result<(), BuildError> {
        let mut inserted = InsertedItems::new(self.backend, parent);
        for item in plan {
            self.backend
                .append_item(parent, item.id, &item.text)
                .map_err(BuildError::ItemAppend)?;
            inserted.push(item.id);
        }
        inserted.commit();
        Ok(())
    }

    fn build_injected(
        &self,
        parent: MenuHandle,
        label: &str,
        plan: &[PlannedItem],
    ) -> Result<(), BuildError> {
        let target = self
            .backend
            .find_popup(parent, label)
            .ok_or_else(|| BuildError::TargetPopupMissing(label.to_string()))?;

        let mut inserted = InsertedItems::new(self.backend, target);
        for item in plan {
            self.backend
                .append_item(target, item.id, &item.text)
                .map_err(BuildError::ItemAppend)?;
            inserted.push(item.id);
        }
        inserted.commit();
        Ok(())
    }
}

/// One entry about to be appended.
struct PlannedItem {
    id: u32,
    logical_index: usize,
    text: String,
}

/// Pairs every descriptor whose final label fits with its identifier,
/// stopping at the last usable id.
fn plan_ids(
    catalog: &CommandCatalog,
    id_first: u32,
    id_last: u32,
    item_text: impl Fn(&CommandDescriptor) -> String,
) -> Result<Vec<PlannedItem>, BuildError> {
    if id_first >= COMMAND_ID_CEILING || id_last < id_first {
        return Err(BuildError::IdOutOfRange {
            first: id_first,
            last: id_last,
        });
    }
    let usable_last = id_last.min(COMMAND_ID_CEILING - 1);

    let mut plan = Vec::new();
    let mut next_id = id_first;
    for command in catalog.iter() {
        if !command.is_menu_eligible() {
            debug!(
                "event=menu_build module=builder status=skip logical_index={} reason=invalid_text",
                command.logical_index()
            );
            continue;
        }
        let text = item_text(command);
        if !is_valid_menu_text(&text) {
            debug!(
                "event=menu_build module=builder status=skip logical_index={} reason=label_too_long",
                command.logical_index()
            );
            continue;
        }
        if next_id > usable_last {
            warn!(
                "event=menu_build module=builder status=skip logical_index={} reason=id_space_exhausted last_id={}",
                command.logical_index(),
                usable_last
            );
            break;
        }
        plan.push(PlannedItem {
            id: next_id,
            logical_index: command.logical_index(),
            text,
        });
        next_id += 1;
    }

    if plan.is_empty() {
        return Err(BuildError::NoEligibleCommands);
    }
    Ok(plan)
}

/// Popup created by this call; destroyed on drop unless handed to the host.
struct OwnedPopup<'a> {
    backend: &'a dyn MenuBackend,
    popup: Option<MenuHandle>,
}

impl<'a> OwnedPopup<'a> {
    fn new(backend: &'a dyn MenuBackend, popup: MenuHandle) -> Self {
        Self {
            backend,
            popup: Some(popup),
        }
    }

    fn hand_over(mut self) {
        self.popup = None;
    }
}

impl Drop for OwnedPopup<'_> {
    fn drop(&mut self) {
        if let Some(popup) = self.popup.take() {
            self.backend.destroy_menu(popup);
        }
    }
}

/// Items inserted into a host-owned menu; removed on drop unless committed.
struct InsertedItems<'a> {
    backend: &'a dyn MenuBackend,
    menu: MenuHandle,
    ids: Vec<u32>,
}

impl<'a> InsertedItems<'a> {
    fn new(backend: &'a dyn MenuBackend, menu: MenuHandle) -> Self {
        Self {
            backend,
            menu,
            ids: Vec::new(),
        }
    }

    fn push(&mut self, id: u32) {
        self.ids.push(id);
    }

    fn commit(mut self) {
        self.ids.clear();
    }
}

impl Drop for InsertedItems<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..).rev() {
            if let Err(err) = self.backend.remove_item(self.menu, id) {
                warn!(
                    "event=menu_rollback module=builder status=error id={} error={}",
                    id, err
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildError, MenuBuilder, MenuStrategy, StrategyParseError};
    use crate::catalog::CommandCatalog;
    use crate::menu::{MemoryMenuBackend, MemoryMenuItem, MenuBackend};

    fn three_commands() -> CommandCatalog {
        CommandCatalog::new("SortBySchlong")
            .with_command("Penis", "penis", "help a")
            .with_command("", "hidden", "never shown")
            .with_command("Stealth Mode", "stealth", "help c")
    }

    #[test]
    fn parses_strategy_strings() {
        assert_eq!("submenu".parse::<MenuStrategy>(), Ok(MenuStrategy::Submenu));
        assert_eq!(" FLAT ".parse::<MenuStrategy>(), Ok(MenuStrategy::Flat));
        assert_eq!(
            "inject: Sort by".parse::<MenuStrategy>(),
            Ok(MenuStrategy::InjectInto {
                label: "Sort by".to_string()
            })
        );
        assert_eq!(
            "inject:".parse::<MenuStrategy>(),
            Err(StrategyParseError("inject:".to_string()))
        );
        assert!("popup".parse::<MenuStrategy>().is_err());
    }

    #[test]
    fn submenu_skips_invalid_text_without_consuming_ids() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        let strategy = MenuStrategy::Submenu;

        let built = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 200, 300)
            .expect("build submenu");
        assert_eq!(built.consumed(), 2);
        assert_eq!(built.last_id, 201);
        assert_eq!(built.commands, vec![0, 2]);

        let items = backend.items(menu);
        assert_eq!(items.len(), 1);
        let MemoryMenuItem::Popup { text, menu: popup } = &items[0] else {
            panic!("expected popup, got {items:?}");
        };
        assert_eq!(text, "SortBySchlong");
        assert_eq!(
            backend.items(*popup),
            vec![
                MemoryMenuItem::Command {
                    id: 200,
                    text: "Penis".to_string()
                },
                MemoryMenuItem::Command {
                    id: 201,
                    text: "Stealth Mode".to_string()
                },
            ]
        );
    }

    #[test]
    fn submenu_destroys_popup_when_attach_fails() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.fail_append_popup(true);
        let strategy = MenuStrategy::Submenu;

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 10, 20)
            .expect_err("attach failure must fail the build");
        assert!(matches!(err, BuildError::PopupAttach(_)));
        assert!(backend.items(menu).is_empty());
        assert_eq!(backend.live_menu_count(), 1, "only the host menu survives");
    }

    #[test]
    fn submenu_destroys_popup_when_item_append_fails() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.fail_item_appends_after(Some(1));
        let strategy = MenuStrategy::Submenu;

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 10, 20)
            .expect_err("append failure must fail the build");
        assert!(matches!(err, BuildError::ItemAppend(_)));
        assert_eq!(backend.live_menu_count(), 1);
    }

    #[test]
    fn popup_creation_failure_leaves_menu_untouched() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.fail_create_popup(true);
        let strategy = MenuStrategy::Submenu;

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 10, 20)
            .expect_err("popup creation failure");
        assert!(matches!(err, BuildError::PopupCreation(_)));
        assert_eq!(backend.item_count(menu).expect("count"), 0);
    }

    #[test]
    fn flat_strategy_prefixes_group_and_rolls_back_partial_inserts() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.add_host_item(menu, 1, "Refresh").expect("host item");
        let strategy = MenuStrategy::Flat;

        backend.fail_item_appends_after(Some(1));
        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 50, 60)
            .expect_err("second append fails");
        assert!(matches!(err, BuildError::ItemAppend(_)));
        assert_eq!(backend.items(menu).len(), 1, "partial insert removed");

        backend.fail_item_appends_after(None);
        let built = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 50, 60)
            .expect("flat build");
        assert_eq!(built.consumed(), 2);
        let texts: Vec<String> = backend
            .items(menu)
            .iter()
            .map(|item| item.text().to_string())
            .collect();
        assert_eq!(
            texts,
            vec![
                "Refresh",
                "SortBySchlong - Penis",
                "SortBySchlong - Stealth Mode"
            ]
        );
    }

    #[test]
    fn flat_strategy_skips_entries_whose_prefixed_label_is_too_long() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        let long_text = "x".repeat(250);
        let catalog = CommandCatalog::new("SortBySchlong")
            .with_command(long_text.as_str(), "wide", "fits alone, not with the prefix")
            .with_command("Penis", "penis", "help a");
        let strategy = MenuStrategy::Flat;

        let built = MenuBuilder::new(&backend, &strategy)
            .build(menu, &catalog, 70, 80)
            .expect("flat build keeps the valid entry");
        assert_eq!(built.consumed(), 1);
        assert_eq!(built.last_id, 70);
        assert_eq!(built.commands, vec![1]);
        assert_eq!(
            backend.items(menu),
            vec![MemoryMenuItem::Command {
                id: 70,
                text: "SortBySchlong - Penis".to_string()
            }]
        );

        // Under a submenu the same entry fits and keeps its id.
        let other = backend.create_host_menu();
        let built = MenuBuilder::new(&backend, &MenuStrategy::Submenu)
            .build(other, &catalog, 70, 80)
            .expect("submenu build");
        assert_eq!(built.commands, vec![0, 1]);
    }

    #[test]
    fn invalid_group_label_fails_only_strategies_that_show_it() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        let catalog = CommandCatalog::new("").with_command("Penis", "penis", "help a");

        for strategy in [MenuStrategy::Flat, MenuStrategy::Submenu] {
            let err = MenuBuilder::new(&backend, &strategy)
                .build(menu, &catalog, 1, 5)
                .expect_err("empty group label");
            assert_eq!(err, BuildError::InvalidGroupLabel);
        }
        assert!(backend.items(menu).is_empty());
    }

    #[test]
    fn inject_strategy_requires_existing_host_popup() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        let strategy = MenuStrategy::InjectInto {
            label: "Sort by".to_string(),
        };

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 5, 9)
            .expect_err("no sort-by popup yet");
        assert_eq!(err, BuildError::TargetPopupMissing("Sort by".to_string()));

        let sort_by = backend.add_host_popup(menu, "S&ort by").expect("host popup");
        backend.add_host_item(sort_by, 1, "Name").expect("host sort item");
        let built = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 5, 9)
            .expect("inject build");
        assert_eq!((built.first_id, built.last_id), (5, 6));
        assert_eq!(backend.items(sort_by).len(), 3);
    }

    #[test]
    fn id_space_limits_allocation() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        let strategy = MenuStrategy::Submenu;

        let built = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 0x7FFF, 0x9000)
            .expect("one id left below ceiling");
        assert_eq!(built.commands, vec![0]);
        assert_eq!(built.last_id, 0x7FFF);

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 0x8000, 0x9000)
            .expect_err("first id at ceiling");
        assert!(matches!(err, BuildError::IdOutOfRange { .. }));

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &three_commands(), 30, 29)
            .expect_err("reversed range");
        assert!(matches!(err, BuildError::IdOutOfRange { .. }));
    }

    #[test]
    fn empty_text_catalog_builds_nothing() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        let catalog = CommandCatalog::new("SortBySchlong").with_command("", "penis", "help");
        let strategy = MenuStrategy::Submenu;

        let err = MenuBuilder::new(&backend, &strategy)
            .build(menu, &catalog, 1, 10)
            .expect_err("nothing eligible");
        assert_eq!(err, BuildError::NoEligibleCommands);
        assert_eq!(backend.live_menu_count(), 1);
    }
}
