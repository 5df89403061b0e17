//! [`MenuBackend`] over real Win32 menus.

use sortbyschlong_core::menu::labels_match;
use sortbyschlong_core::{MenuBackend, MenuError, MenuHandle};
use windows_sys::Win32::Foundation::GetLastError;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreatePopupMenu, DeleteMenu, DestroyMenu, GetMenuItemCount, GetMenuStringW,
    GetSubMenu, IsMenu, HMENU, MF_BYCOMMAND, MF_BYPOSITION, MF_POPUP, MF_STRING,
};

const MAX_LABEL_UNITS: usize = 260;

/// Stateless; every call goes straight to user32.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32MenuBackend;

fn hmenu(menu: MenuHandle) -> HMENU {
    menu.as_raw() as HMENU
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn last_error(operation: &'static str) -> MenuError {
    // SAFETY: reads thread-local error state only.
    let code = unsafe { GetLastError() };
    MenuError::OperationFailed { operation, code }
}

impl MenuBackend for Win32MenuBackend {
    fn is_menu(&self, menu: MenuHandle) -> bool {
        // SAFETY: IsMenu accepts arbitrary handle values.
        !menu.is_null() && unsafe { IsMenu(hmenu(menu)) } != 0
    }

    fn item_count(&self, menu: MenuHandle) -> Result<usize, MenuError> {
        // SAFETY: invalid handles are reported as -1.
        let count = unsafe { GetMenuItemCount(hmenu(menu)) };
        usize::try_from(count).map_err(|_| last_error("get_menu_item_count"))
    }

    fn create_popup(&self) -> Result<MenuHandle, MenuError> {
        // SAFETY: no arguments; null signals failure.
        let popup = unsafe { CreatePopupMenu() };
        if popup.is_null() {
            return Err(last_error("create_popup_menu"));
        }
        Ok(MenuHandle::from_raw(popup as usize))
    }

    fn append_item(&self, menu: MenuHandle, id: u32, text: &str) -> Result<(), MenuError> {
        let text = wide(text);
        // SAFETY: `text` is NUL-terminated and outlives the call.
        let ok = unsafe { AppendMenuW(hmenu(menu), MF_STRING, id as usize, text.as_ptr()) };
        if ok == 0 {
            return Err(last_error("append_menu_item"));
        }
        Ok(())
    }

    fn append_popup(
        &self,
        parent: MenuHandle,
        popup: MenuHandle,
        text: &str,
    ) -> Result<(), MenuError> {
        let text = wide(text);
        // SAFETY: `text` is NUL-terminated; the popup handle travels in the id slot.
        let ok = unsafe {
            AppendMenuW(
                hmenu(parent),
                MF_STRING | MF_POPUP,
                popup.as_raw(),
                text.as_ptr(),
            )
        };
        if ok == 0 {
            return Err(last_error("append_menu_popup"));
        }
        Ok(())
    }

    fn find_popup(&self, parent: MenuHandle, label: &str) -> Option<MenuHandle> {
        let count = self.item_count(parent).ok()?;
        let mut buffer = [0_u16; MAX_LABEL_UNITS];
        for position in 0..count {
            let position = i32::try_from(position).ok()?;
            // SAFETY: position is in range for a live menu.
            let child = unsafe { GetSubMenu(hmenu(parent), position) };
            if child.is_null() {
                continue;
            }
            // SAFETY: buffer length is passed alongside the pointer.
            let len = unsafe {
                GetMenuStringW(
                    hmenu(parent),
                    position as u32,
                    buffer.as_mut_ptr(),
                    buffer.len() as i32,
                    MF_BYPOSITION,
                )
            };
            let Ok(len) = usize::try_from(len) else {
                continue;
            };
            let actual = String::from_utf16_lossy(&buffer[..len.min(buffer.len())]);
            if labels_match(&actual, label) {
                return Some(MenuHandle::from_raw(child as usize));
            }
        }
        None
    }

    fn remove_item(&self, menu: MenuHandle, id: u32) -> Result<(), MenuError> {
        // SAFETY: plain handle + id call.
        let ok = unsafe { DeleteMenu(hmenu(menu), id, MF_BYCOMMAND) };
        if ok == 0 {
            return Err(last_error("delete_menu"));
        }
        Ok(())
    }

    fn destroy_menu(&self, menu: MenuHandle) {
        // SAFETY: only called on popups this module created and still owns.
        unsafe {
            DestroyMenu(hmenu(menu));
        }
    }
}
