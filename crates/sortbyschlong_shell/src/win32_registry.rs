//! [`RegistryStore`] over the Win32 registry.

use sortbyschlong_core::{RegistryError, RegistryKey, RegistryRoot, RegistryStore};
use std::ptr;
use windows_sys::Win32::Foundation::{ERROR_FILE_NOT_FOUND, ERROR_SUCCESS};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegDeleteTreeW, RegGetValueW, RegSetValueExW, HKEY,
    HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, KEY_WRITE, REG_OPTION_NON_VOLATILE, REG_SZ,
    RRF_RT_REG_SZ,
};

const MAX_VALUE_BYTES: usize = 4096;

#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Registry;

fn root_handle(root: RegistryRoot) -> HKEY {
    match root {
        RegistryRoot::ClassesRoot => HKEY_CLASSES_ROOT,
        RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
    }
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

fn failed(operation: &'static str, key: &RegistryKey, code: u32) -> RegistryError {
    if code == ERROR_FILE_NOT_FOUND {
        return RegistryError::NotFound(key.to_string());
    }
    RegistryError::Failed {
        operation,
        key: key.to_string(),
        code,
    }
}

impl RegistryStore for Win32Registry {
    fn set_string(
        &self,
        key: &RegistryKey,
        name: Option<&str>,
        data: &str,
    ) -> Result<(), RegistryError> {
        let path = wide(&key.path);
        let mut handle: HKEY = ptr::null_mut();
        // SAFETY: `path` is NUL-terminated; `handle` receives an owned key.
        let status = unsafe {
            RegCreateKeyExW(
                root_handle(key.root),
                path.as_ptr(),
                0,
                ptr::null(),
                REG_OPTION_NON_VOLATILE,
                KEY_WRITE,
                ptr::null(),
                &mut handle,
                ptr::null_mut(),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(failed("create_key", key, status));
        }

        let name = name.map(wide);
        let value = wide(data);
        let byte_len = (value.len() * std::mem::size_of::<u16>()) as u32;
        // SAFETY: `handle` is open; `value` holds `byte_len` bytes.
        let status = unsafe {
            RegSetValueExW(
                handle,
                name.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
                0,
                REG_SZ,
                value.as_ptr().cast::<u8>(),
                byte_len,
            )
        };
        // SAFETY: closes the key opened above.
        unsafe {
            RegCloseKey(handle);
        }
        if status != ERROR_SUCCESS {
            return Err(failed("set_value", key, status));
        }
        Ok(())
    }

    fn get_string(
        &self,
        key: &RegistryKey,
        name: Option<&str>,
    ) -> Result<Option<String>, RegistryError> {
        let path = wide(&key.path);
        let name = name.map(wide);
        let mut buffer = vec![0_u16; MAX_VALUE_BYTES / 2];
        let mut byte_len = MAX_VALUE_BYTES as u32;
        // SAFETY: buffer capacity in bytes is passed in `byte_len`.
        let status = unsafe {
            RegGetValueW(
                root_handle(key.root),
                path.as_ptr(),
                name.as_ref().map_or(ptr::null(), |name| name.as_ptr()),
                RRF_RT_REG_SZ,
                ptr::null_mut(),
                buffer.as_mut_ptr().cast(),
                &mut byte_len,
            )
        };
        if status == ERROR_FILE_NOT_FOUND {
            return Ok(None);
        }
        if status != ERROR_SUCCESS {
            return Err(failed("get_value", key, status));
        }
        let units = (byte_len as usize / 2).min(buffer.len());
        let text = &buffer[..units];
        let text = text.strip_suffix(&[0]).unwrap_or(text);
        Ok(Some(String::from_utf16_lossy(text)))
    }

    fn delete_tree(&self, key: &RegistryKey) -> Result<(), RegistryError> {
        let path = wide(&key.path);
        // SAFETY: `path` is NUL-terminated.
        let status = unsafe { RegDeleteTreeW(root_handle(key.root), path.as_ptr()) };
        if status != ERROR_SUCCESS {
            return Err(failed("delete_tree", key, status));
        }
        Ok(())
    }
}
