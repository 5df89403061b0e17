//! COM surface loaded by the Windows shell.
//!
//! # Responsibility
//! - Export `DllMain`, `DllGetClassObject`, `DllCanUnloadNow`,
//!   `DllRegisterServer` and `DllUnregisterServer`.
//! - Lay out `IShellExtInit` / `IContextMenu` / `IClassFactory` vtables over
//!   the core extension object and translate raw arguments.
//!
//! # Invariants
//! - No panic unwinds out of an exported function or vtable entry.
//! - Every interface pointer handed out carries one reference.
//! - The class factory object counts toward the module's live instances.

use crate::module;
use crate::status::{
    contribution_status, factory_error_status, result_status, CLASS_E_CLASSNOTAVAILABLE,
    E_FAIL, E_INVALIDARG, E_NOINTERFACE, E_OUTOFMEMORY, E_POINTER, S_OK,
};
use crate::win32_menu::Win32MenuBackend;
use crate::win32_registry::Win32Registry;
use log::debug;
use sortbyschlong_core::{
    at_host_boundary, ActivationContext, ClassFactory, CommandStringKind, ContributeRequest,
    ExtensionObject, Initializable, InterfaceId, InvocationRequest, InvocationSite,
    MenuContributor, MenuHandle, TextBuffer,
};
use std::alloc::{self, Layout};
use std::ffi::{c_void, CStr, OsString};
use std::mem::offset_of;
use std::os::windows::ffi::OsStringExt;
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;
use windows_sys::core::{GUID, HRESULT};
use windows_sys::Win32::Foundation::{BOOL, FALSE, HMODULE, TRUE};
use windows_sys::Win32::System::LibraryLoader::{DisableThreadLibraryCalls, GetModuleFileNameW};
use windows_sys::Win32::System::Registry::HKEY;
use windows_sys::Win32::System::SystemServices::DLL_PROCESS_ATTACH;
use windows_sys::Win32::UI::WindowsAndMessaging::HMENU;

const IID_IUNKNOWN: Uuid = Uuid::from_u128(0x00000000_0000_0000_C000_000000000046);
const IID_ICLASSFACTORY: Uuid = Uuid::from_u128(0x00000001_0000_0000_C000_000000000046);
const IID_ISHELLEXTINIT: Uuid = Uuid::from_u128(0x000214E8_0000_0000_C000_000000000046);
const IID_ICONTEXTMENU: Uuid = Uuid::from_u128(0x000214E4_0000_0000_C000_000000000046);

const MODULE_PATH_UNITS: usize = 32 * 1024;

fn guid_to_uuid(guid: &GUID) -> Uuid {
    Uuid::from_fields(guid.data1, guid.data2, guid.data3, &guid.data4)
}

/// # Safety
/// `guid` is null or points to a readable GUID.
unsafe fn read_guid(guid: *const GUID) -> Option<Uuid> {
    guid.as_ref().map(guid_to_uuid)
}

fn extension_interface(iid: Uuid) -> Option<InterfaceId> {
    match iid {
        IID_IUNKNOWN => Some(InterfaceId::Base),
        IID_ISHELLEXTINIT => Some(InterfaceId::Initializable),
        IID_ICONTEXTMENU => Some(InterfaceId::MenuContributor),
        _ => None,
    }
}

type QueryInterfaceFn =
    unsafe extern "system" fn(*mut c_void, *const GUID, *mut *mut c_void) -> HRESULT;
type RefCountFn = unsafe extern "system" fn(*mut c_void) -> u32;

#[repr(C)]
struct UnknownVtbl {
    query_interface: QueryInterfaceFn,
    add_ref: RefCountFn,
    release: RefCountFn,
}

#[repr(C)]
struct ShellExtInitVtbl {
    base: UnknownVtbl,
    initialize: unsafe extern "system" fn(*mut c_void, *const c_void, *mut c_void, HKEY) -> HRESULT,
}

#[repr(C)]
struct ContextMenuVtbl {
    base: UnknownVtbl,
    query_context_menu:
        unsafe extern "system" fn(*mut c_void, HMENU, u32, u32, u32, u32) -> HRESULT,
    invoke_command: unsafe extern "system" fn(*mut c_void, *const InvokeCommandInfo) -> HRESULT,
    get_command_string:
        unsafe extern "system" fn(*mut c_void, usize, u32, *mut u32, *mut u8, u32) -> HRESULT,
}

#[repr(C)]
struct ClassFactoryVtbl {
    base: UnknownVtbl,
    create_instance:
        unsafe extern "system" fn(*mut c_void, *mut c_void, *const GUID, *mut *mut c_void) -> HRESULT,
    lock_server: unsafe extern "system" fn(*mut c_void, BOOL) -> HRESULT,
}

/// Leading fields of `CMINVOKECOMMANDINFO`.
#[repr(C)]
struct InvokeCommandInfo {
    size: u32,
    mask: u32,
    hwnd: *mut c_void,
    verb: *const u8,
    parameters: *const u8,
    directory: *const u8,
    show: i32,
    hot_key: u32,
    icon: *mut c_void,
}

static SHELL_EXT_INIT_VTBL: ShellExtInitVtbl = ShellExtInitVtbl {
    base: UnknownVtbl {
        query_interface: init_query_interface,
        add_ref: init_add_ref,
        release: init_release,
    },
    initialize,
};

static CONTEXT_MENU_VTBL: ContextMenuVtbl = ContextMenuVtbl {
    base: UnknownVtbl {
        query_interface: menu_query_interface,
        add_ref: menu_add_ref,
        release: menu_release,
    },
    query_context_menu,
    invoke_command,
    get_command_string,
};

static CLASS_FACTORY_VTBL: ClassFactoryVtbl = ClassFactoryVtbl {
    base: UnknownVtbl {
        query_interface: factory_query_interface,
        add_ref: factory_add_ref,
        release: factory_release,
    },
    create_instance,
    lock_server,
};

/// Interface pointers of the extension object; sits at offset 0.
#[repr(C)]
pub struct ComHeader {
    init: *const ShellExtInitVtbl,
    menu: *const ContextMenuVtbl,
}

// SAFETY: both fields point at immutable statics.
unsafe impl Send for ComHeader {}
unsafe impl Sync for ComHeader {}

impl ComHeader {
    fn new() -> Self {
        Self {
            init: &SHELL_EXT_INIT_VTBL,
            menu: &CONTEXT_MENU_VTBL,
        }
    }
}

type ComObject = ExtensionObject<ComHeader>;

fn object_from_init(this: *mut c_void) -> *const ComObject {
    this.cast::<ComObject>()
}

fn object_from_menu(this: *mut c_void) -> *const ComObject {
    this.cast::<u8>()
        .wrapping_sub(offset_of!(ComHeader, menu))
        .cast::<ComObject>()
}

fn interface_pointer(object: *const ComObject, id: InterfaceId) -> *mut c_void {
    match id {
        InterfaceId::Base | InterfaceId::Initializable => object.cast_mut().cast(),
        InterfaceId::MenuContributor => object
            .cast::<u8>()
            .wrapping_add(offset_of!(ComHeader, menu))
            .cast_mut()
            .cast(),
    }
}

/// # Safety
/// `object` is live; `ppv` is null or writable.
unsafe fn query_extension(
    object: *const ComObject,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    if ppv.is_null() {
        return E_POINTER;
    }
    *ppv = ptr::null_mut();
    let Some(iid) = read_guid(riid) else {
        return E_INVALIDARG;
    };
    let Some(id) = extension_interface(iid) else {
        debug!(
            "event=query_interface module=com status=skip iid={}",
            iid.braced()
        );
        return E_NOINTERFACE;
    };
    if (*object).query_capability(id).is_none() {
        return E_NOINTERFACE;
    }
    ExtensionObject::retain_raw(object);
    *ppv = interface_pointer(object, id);
    S_OK
}

unsafe extern "system" fn init_query_interface(
    this: *mut c_void,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    query_extension(object_from_init(this), riid, ppv)
}

unsafe extern "system" fn init_add_ref(this: *mut c_void) -> u32 {
    ExtensionObject::retain_raw(object_from_init(this))
}

unsafe extern "system" fn init_release(this: *mut c_void) -> u32 {
    ExtensionObject::release_raw(object_from_init(this))
}

unsafe extern "system" fn menu_query_interface(
    this: *mut c_void,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    query_extension(object_from_menu(this), riid, ppv)
}

unsafe extern "system" fn menu_add_ref(this: *mut c_void) -> u32 {
    ExtensionObject::retain_raw(object_from_menu(this))
}

unsafe extern "system" fn menu_release(this: *mut c_void) -> u32 {
    ExtensionObject::release_raw(object_from_menu(this))
}

/// Background menus arrive with a folder id and no data object.
fn activation_context(
    folder: *const c_void,
    data_object: *mut c_void,
    class_key: HKEY,
) -> ActivationContext {
    let site = if !data_object.is_null() {
        InvocationSite::Selection
    } else if !folder.is_null() {
        InvocationSite::DesktopBackground
    } else {
        InvocationSite::Unknown
    };
    ActivationContext {
        site,
        has_data_object: !data_object.is_null(),
        has_class_key: !class_key.is_null(),
    }
}

unsafe extern "system" fn initialize(
    this: *mut c_void,
    folder: *const c_void,
    data_object: *mut c_void,
    class_key: HKEY,
) -> HRESULT {
    let object = &*object_from_init(this);
    result_status(object.activate(activation_context(folder, data_object, class_key)))
}

unsafe extern "system" fn query_context_menu(
    this: *mut c_void,
    menu: HMENU,
    insertion_hint: u32,
    id_first: u32,
    id_last: u32,
    flags: u32,
) -> HRESULT {
    let object = &*object_from_menu(this);
    let consumed = object.contribute_menu(ContributeRequest {
        menu: MenuHandle::from_raw(menu as usize),
        insertion_hint,
        id_first,
        id_last,
        flags,
    });
    contribution_status(consumed)
}

/// # Safety
/// `info` is null or points to a host-filled invoke structure.
unsafe fn invocation_request(info: *const InvokeCommandInfo) -> Option<InvocationRequest> {
    let verb = info.as_ref()?.verb;
    let raw = verb as usize;
    if raw >> 16 == 0 {
        return Some(InvocationRequest::Index((raw & 0xFFFF) as u32));
    }
    let text = CStr::from_ptr(verb.cast()).to_string_lossy().into_owned();
    Some(InvocationRequest::Verb(text))
}

unsafe extern "system" fn invoke_command(
    this: *mut c_void,
    info: *const InvokeCommandInfo,
) -> HRESULT {
    let object = &*object_from_menu(this);
    at_host_boundary("invoke_command", E_FAIL, || {
        let Some(request) = invocation_request(info) else {
            return E_INVALIDARG;
        };
        result_status(object.invoke(&request))
    })
}

unsafe extern "system" fn get_command_string(
    this: *mut c_void,
    id: usize,
    raw_kind: u32,
    _reserved: *mut u32,
    name: *mut u8,
    capacity: u32,
) -> HRESULT {
    let object = &*object_from_menu(this);
    let Ok(id) = u32::try_from(id) else {
        return E_INVALIDARG;
    };
    let kind = CommandStringKind::from_raw(raw_kind);
    let units = if name.is_null() { 0 } else { capacity as usize };

    let result = if kind.is_wide() == Some(true) {
        let slice: &mut [u16] = if units == 0 {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(name.cast::<u16>(), units)
        };
        object.describe_command(id, kind, &mut TextBuffer::Wide(slice))
    } else {
        let slice: &mut [u8] = if units == 0 {
            &mut []
        } else {
            std::slice::from_raw_parts_mut(name, units)
        };
        object.describe_command(id, kind, &mut TextBuffer::Narrow(slice))
    };
    result_status(result)
}

/// Host-visible class factory.
#[repr(C)]
struct FactoryObject {
    vtbl: *const ClassFactoryVtbl,
    ref_count: AtomicU32,
    factory: ClassFactory,
}

impl FactoryObject {
    fn allocate(factory: ClassFactory) -> Option<*mut Self> {
        let layout = Layout::new::<Self>();
        // SAFETY: non-zero-sized layout.
        let raw = unsafe { alloc::alloc(layout) }.cast::<Self>();
        if raw.is_null() {
            return None;
        }
        factory.counters().instance_created();
        // SAFETY: freshly allocated and uninitialized.
        unsafe {
            raw.write(Self {
                vtbl: &CLASS_FACTORY_VTBL,
                ref_count: AtomicU32::new(1),
                factory,
            });
        }
        Some(raw)
    }

    /// # Safety
    /// `this` is live and the caller owns one reference.
    unsafe fn release(this: *mut Self) -> u32 {
        let previous = (*this).ref_count.fetch_sub(1, Ordering::Release);
        if previous != 1 {
            return previous - 1;
        }
        fence(Ordering::Acquire);
        let counters = (*this).factory.counters();
        ptr::drop_in_place(this);
        alloc::dealloc(this.cast(), Layout::new::<Self>());
        counters.instance_destroyed();
        0
    }
}

unsafe extern "system" fn factory_query_interface(
    this: *mut c_void,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    if ppv.is_null() {
        return E_POINTER;
    }
    *ppv = ptr::null_mut();
    match read_guid(riid) {
        Some(IID_IUNKNOWN) | Some(IID_ICLASSFACTORY) => {
            factory_add_ref(this);
            *ppv = this;
            S_OK
        }
        Some(_) => E_NOINTERFACE,
        None => E_INVALIDARG,
    }
}

unsafe extern "system" fn factory_add_ref(this: *mut c_void) -> u32 {
    (*this.cast::<FactoryObject>())
        .ref_count
        .fetch_add(1, Ordering::Relaxed)
        + 1
}

unsafe extern "system" fn factory_release(this: *mut c_void) -> u32 {
    FactoryObject::release(this.cast())
}

unsafe extern "system" fn create_instance(
    this: *mut c_void,
    outer: *mut c_void,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    if ppv.is_null() {
        return E_POINTER;
    }
    *ppv = ptr::null_mut();
    let factory = &(*this.cast::<FactoryObject>()).factory;
    at_host_boundary("create_instance", E_FAIL, || {
        match factory.create_instance_with_header(ComHeader::new(), !outer.is_null()) {
            Ok(instance) => {
                let raw = instance.into_raw();
                let status = query_extension(raw, riid, ppv);
                ExtensionObject::release_raw(raw);
                status
            }
            Err(err) => factory_error_status(err),
        }
    })
}

unsafe extern "system" fn lock_server(this: *mut c_void, lock: BOOL) -> HRESULT {
    (*this.cast::<FactoryObject>())
        .factory
        .lock_server(lock != FALSE);
    S_OK
}

fn module_file_path(module: HMODULE) -> Option<PathBuf> {
    let mut buffer = vec![0_u16; MODULE_PATH_UNITS];
    // SAFETY: buffer length is passed alongside the pointer.
    let len = unsafe { GetModuleFileNameW(module, buffer.as_mut_ptr(), buffer.len() as u32) };
    let len = len as usize;
    if len == 0 || len >= buffer.len() {
        return None;
    }
    Some(PathBuf::from(OsString::from_wide(&buffer[..len])))
}

#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "system" fn DllMain(module: HMODULE, reason: u32, _reserved: *mut c_void) -> BOOL {
    if reason == DLL_PROCESS_ATTACH {
        DisableThreadLibraryCalls(module);
        if let Some(path) = module_file_path(module) {
            module::set_module_path(path);
        }
    }
    TRUE
}

#[allow(non_snake_case)]
#[no_mangle]
pub unsafe extern "system" fn DllGetClassObject(
    class_id: *const GUID,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    if ppv.is_null() {
        return E_POINTER;
    }
    *ppv = ptr::null_mut();
    if read_guid(class_id) != Some(module::CLASS_ID) {
        return CLASS_E_CLASSNOTAVAILABLE;
    }
    at_host_boundary("get_class_object", E_FAIL, || {
        let factory = module::class_factory(Arc::new(Win32MenuBackend));
        let Some(object) = FactoryObject::allocate(factory) else {
            return E_OUTOFMEMORY;
        };
        let status = factory_query_interface(object.cast(), riid, ppv);
        FactoryObject::release(object);
        status
    })
}

#[allow(non_snake_case)]
#[no_mangle]
pub extern "system" fn DllCanUnloadNow() -> HRESULT {
    module::can_unload_now()
}

#[allow(non_snake_case)]
#[no_mangle]
pub extern "system" fn DllRegisterServer() -> HRESULT {
    at_host_boundary("register_server", E_FAIL, || {
        let Some(path) = module::module_path() else {
            return E_FAIL;
        };
        module::register_server(&Win32Registry, path)
    })
}

#[allow(non_snake_case)]
#[no_mangle]
pub extern "system" fn DllUnregisterServer() -> HRESULT {
    at_host_boundary("unregister_server", E_FAIL, || {
        module::unregister_server(&Win32Registry)
    })
}
