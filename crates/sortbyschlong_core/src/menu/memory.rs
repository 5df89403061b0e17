//! In-process menu backend.
//!
//! Models native menus as plain data so the contribution protocol can run
//! without a desktop shell: the smoke CLI and the test suites drive it, and
//! fault switches let them exercise every cleanup path of the builder.

use crate::menu::{labels_match, MenuBackend, MenuError, MenuHandle};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

const FIRST_HANDLE: usize = 0x1000;
const HANDLE_STRIDE: usize = 0x10;

/// One item of an in-memory menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryMenuItem {
    Command { id: u32, text: String },
    Popup { text: String, menu: MenuHandle },
}

impl MemoryMenuItem {
    pub fn text(&self) -> &str {
        match self {
            Self::Command { text, .. } | Self::Popup { text, .. } => text,
        }
    }
}

#[derive(Debug, Default)]
struct MenuNode {
    items: Vec<MemoryMenuItem>,
}

#[derive(Debug, Default)]
struct Faults {
    create_popup: bool,
    append_popup: bool,
    item_append_budget: Option<usize>,
}

#[derive(Debug)]
struct MemoryState {
    next_raw: usize,
    menus: BTreeMap<MenuHandle, MenuNode>,
    faults: Faults,
}

impl MemoryState {
    fn allocate(&mut self) -> MenuHandle {
        let handle = MenuHandle::from_raw(self.next_raw);
        self.next_raw += HANDLE_STRIDE;
        self.menus.insert(handle, MenuNode::default());
        handle
    }

    fn node_mut(&mut self, menu: MenuHandle) -> Result<&mut MenuNode, MenuError> {
        self.menus
            .get_mut(&menu)
            .ok_or(MenuError::InvalidMenu(menu))
    }

    fn destroy(&mut self, menu: MenuHandle) {
        let Some(node) = self.menus.remove(&menu) else {
            return;
        };
        for item in node.items {
            if let MemoryMenuItem::Popup { menu: child, .. } = item {
                self.destroy(child);
            }
        }
    }
}

/// Thread-safe in-memory [`MenuBackend`].
#[derive(Debug)]
pub struct MemoryMenuBackend {
    state: Mutex<MemoryState>,
}

impl Default for MemoryMenuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMenuBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_raw: FIRST_HANDLE,
                menus: BTreeMap::new(),
                faults: Faults::default(),
            }),
        }
    }

    /// Creates a top-level menu standing in for the host's context menu.
    pub fn create_host_menu(&self) -> MenuHandle {
        self.lock().allocate()
    }

    /// Adds a host-owned command item, e.g. the stock "Refresh" entry.
    pub fn add_host_item(&self, menu: MenuHandle, id: u32, text: &str) -> Result<(), MenuError> {
        self.lock().node_mut(menu)?.items.push(MemoryMenuItem::Command {
            id,
            text: text.to_string(),
        });
        Ok(())
    }

    /// Adds a host-owned submenu (e.g. "Sort by") and returns its handle.
    pub fn add_host_popup(&self, menu: MenuHandle, text: &str) -> Result<MenuHandle, MenuError> {
        let mut state = self.lock();
        state.node_mut(menu)?;
        let child = state.allocate();
        state.node_mut(menu)?.items.push(MemoryMenuItem::Popup {
            text: text.to_string(),
            menu: child,
        });
        Ok(child)
    }

    /// Snapshot of the items in `menu`; empty when the menu is not live.
    pub fn items(&self, menu: MenuHandle) -> Vec<MemoryMenuItem> {
        self.lock()
            .menus
            .get(&menu)
            .map(|node| node.items.clone())
            .unwrap_or_default()
    }

    /// Number of menus currently alive, attached or not.
    pub fn live_menu_count(&self) -> usize {
        self.lock().menus.len()
    }

    /// Makes `create_popup` fail.
    pub fn fail_create_popup(&self, enabled: bool) {
        self.lock().faults.create_popup = enabled;
    }

    /// Makes `append_popup` fail.
    pub fn fail_append_popup(&self, enabled: bool) {
        self.lock().faults.append_popup = enabled;
    }

    /// Lets `budget` more item appends succeed, then fails every further one.
    /// `None` removes the limit.
    pub fn fail_item_appends_after(&self, budget: Option<usize>) {
        self.lock().faults.item_append_budget = budget;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MenuBackend for MemoryMenuBackend {
    fn is_menu(&self, menu: MenuHandle) -> bool {
        self.lock().menus.contains_key(&menu)
    }

    fn item_count(&self, menu: MenuHandle) -> Result<usize, MenuError> {
        self.lock()
            .menus
            .get(&menu)
            .map(|node| node.items.len())
            .ok_or(MenuError::InvalidMenu(menu))
    }

    fn create_popup(&self) -> Result<MenuHandle, MenuError> {
        let mut state = self.lock();
        if state.faults.create_popup {
            return Err(MenuError::OperationFailed {
                operation: "create_popup",
                code: 8,
            });
        }
        Ok(state.allocate())
    }

    fn append_item(&self, menu: MenuHandle, id: u32, text: &str) -> Result<(), MenuError> {
        let mut state = self.lock();
        state.node_mut(menu)?;
        if let Some(budget) = state.faults.item_append_budget.as_mut() {
            if *budget == 0 {
                return Err(MenuError::OperationFailed {
                    operation: "append_item",
                    code: 1400,
                });
            }
            *budget -= 1;
        }
        state.node_mut(menu)?.items.push(MemoryMenuItem::Command {
            id,
            text: text.to_string(),
        });
        Ok(())
    }

    fn append_popup(
        &self,
        parent: MenuHandle,
        popup: MenuHandle,
        text: &str,
    ) -> Result<(), MenuError> {
        let mut state = self.lock();
        if !state.menus.contains_key(&popup) {
            return Err(MenuError::InvalidMenu(popup));
        }
        state.node_mut(parent)?;
        if state.faults.append_popup {
            return Err(MenuError::OperationFailed {
                operation: "append_popup",
                code: 1400,
            });
        }
        state.node_mut(parent)?.items.push(MemoryMenuItem::Popup {
            text: text.to_string(),
            menu: popup,
        });
        Ok(())
    }

    fn find_popup(&self, parent: MenuHandle, label: &str) -> Option<MenuHandle> {
        let state = self.lock();
        state.menus.get(&parent)?.items.iter().find_map(|item| match item {
            MemoryMenuItem::Popup { text, menu } if labels_match(text, label) => Some(*menu),
            _ => None,
        })
    }

    fn remove_item(&self, menu: MenuHandle, id: u32) -> Result<(), MenuError> {
        let mut state = self.lock();
        let node = state.node_mut(menu)?;
        let position = node
            .items
            .iter()
            .position(|item| matches!(item, MemoryMenuItem::Command { id: item_id, .. } if *item_id == id))
            .ok_or(MenuError::OperationFailed {
                operation: "remove_item",
                code: 1456,
            })?;
        node.items.remove(position);
        Ok(())
    }

    fn destroy_menu(&self, menu: MenuHandle) {
        self.lock().destroy(menu);
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryMenuBackend, MemoryMenuItem};
    use crate::menu::MenuBackend;

    #[test]
    fn destroy_menu_releases_attached_children() {
        let backend = MemoryMenuBackend::new();
        let popup = backend.create_popup().expect("popup");
        let nested = backend.create_popup().expect("nested popup");
        backend
            .append_popup(popup, nested, "Nested")
            .expect("attach nested");
        assert_eq!(backend.live_menu_count(), 2);

        backend.destroy_menu(popup);
        assert_eq!(backend.live_menu_count(), 0);
        assert!(!backend.is_menu(nested));
    }

    #[test]
    fn append_budget_fails_after_limit() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.fail_item_appends_after(Some(1));

        backend.append_item(menu, 1, "one").expect("first append within budget");
        assert!(backend.append_item(menu, 2, "two").is_err());

        backend.fail_item_appends_after(None);
        backend.append_item(menu, 3, "three").expect("limit removed");
        assert_eq!(backend.item_count(menu).expect("count"), 2);
    }

    #[test]
    fn find_popup_matches_user_visible_label() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.add_host_item(menu, 1, "Refresh").expect("host item");
        let sort_by = backend.add_host_popup(menu, "S&ort by").expect("host popup");

        assert_eq!(backend.find_popup(menu, "sort by"), Some(sort_by));
        assert_eq!(backend.find_popup(menu, "Refresh"), None);
        assert_eq!(
            backend.items(menu)[0],
            MemoryMenuItem::Command {
                id: 1,
                text: "Refresh".to_string()
            }
        );
    }

    #[test]
    fn remove_item_only_touches_commands() {
        let backend = MemoryMenuBackend::new();
        let menu = backend.create_host_menu();
        backend.add_host_item(menu, 7, "Seven").expect("host item");

        backend.remove_item(menu, 7).expect("remove existing");
        assert!(backend.remove_item(menu, 7).is_err());
        assert!(backend.items(menu).is_empty());
    }
}
