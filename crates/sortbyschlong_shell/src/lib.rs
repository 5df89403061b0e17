//! Native surface of the SortBySchlong shell extension.
//!
//! Platform-neutral glue (module state, status mapping) is always built so
//! it can be exercised on any host; the COM exports and Win32 backends only
//! exist on Windows.

pub mod module;
pub mod status;

#[cfg(windows)]
mod com;
#[cfg(windows)]
pub mod win32_menu;
#[cfg(windows)]
pub mod win32_registry;

pub use module::{
    can_unload_now, class_factory, factory_with, load_config, register_server, unload_status,
    unregister_server, CLASS_ID, MODULE_COUNTERS,
};
pub use status::Status;

#[cfg(windows)]
pub use com::ComHeader;
#[cfg(windows)]
pub use win32_menu::Win32MenuBackend;
#[cfg(windows)]
pub use win32_registry::Win32Registry;
