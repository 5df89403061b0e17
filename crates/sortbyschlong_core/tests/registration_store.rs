use sortbyschlong_core::registration::{class_id_string, BACKGROUND_HANDLER_KEY, THREADING_MODEL};
use sortbyschlong_core::{
    MemoryRegistry, RegistrationPlan, RegistryError, RegistryKey, RegistryRoot, RegistryStore,
    EXTENSION_CLASS_ID,
};
use std::path::Path;

fn plan() -> RegistrationPlan {
    RegistrationPlan::for_module(
        EXTENSION_CLASS_ID,
        Path::new(r"C:\Program Files\SortBySchlong\sortbyschlong_shell.dll"),
    )
}

#[test]
fn install_writes_every_planned_value() {
    let registry = MemoryRegistry::new();
    let plan = plan();
    plan.install(&registry).unwrap();
    assert!(plan.is_installed(&registry).unwrap());

    let class_id = class_id_string(&EXTENSION_CLASS_ID);
    let server = RegistryKey::new(
        RegistryRoot::ClassesRoot,
        format!(r"CLSID\{class_id}\InprocServer32"),
    );
    assert_eq!(
        registry.get_string(&server, Some("ThreadingModel")).unwrap().as_deref(),
        Some(THREADING_MODEL)
    );
    let handler = RegistryKey::new(RegistryRoot::CurrentUser, BACKGROUND_HANDLER_KEY);
    assert_eq!(registry.get_string(&handler, None).unwrap(), Some(class_id));
}

#[test]
fn uninstall_removes_exactly_what_install_created() {
    let registry = MemoryRegistry::new();
    let neighbour = RegistryKey::new(
        RegistryRoot::CurrentUser,
        r"Software\Classes\Directory\Background\shellex\ContextMenuHandlers\Other",
    );
    registry.set_string(&neighbour, None, "{OTHER}").unwrap();
    let before = registry.key_count();

    let plan = plan();
    plan.install(&registry).unwrap();
    plan.uninstall(&registry).unwrap();

    assert!(!plan.is_installed(&registry).unwrap());
    assert!(registry.contains_key(&neighbour));
    for tree in plan.trees() {
        assert!(!registry.contains_key(tree), "{tree} should be gone");
    }
    // `CLSID` is a shared ancestor and stays behind.
    assert_eq!(registry.key_count(), before + 1);
}

#[test]
fn uninstall_tolerates_absent_keys() {
    let registry = MemoryRegistry::new();
    plan().uninstall(&registry).unwrap();
    plan().uninstall(&registry).unwrap();
}

#[test]
fn failed_install_rolls_back() {
    let registry = MemoryRegistry::new();
    let plan = plan();
    registry.fail_writes_after(Some(2));

    let err = plan.install(&registry).unwrap_err();
    assert!(matches!(err, RegistryError::Failed { operation: "set_string", .. }));
    for tree in plan.trees() {
        assert!(!registry.contains_key(tree));
    }

    registry.fail_writes_after(None);
    plan.install(&registry).unwrap();
    assert!(plan.is_installed(&registry).unwrap());
}

#[test]
fn reinstall_overwrites_module_path() {
    let registry = MemoryRegistry::new();
    plan().install(&registry).unwrap();

    let moved = RegistrationPlan::for_module(EXTENSION_CLASS_ID, Path::new(r"D:\new\shell.dll"));
    assert!(!moved.is_installed(&registry).unwrap());
    moved.install(&registry).unwrap();
    assert!(moved.is_installed(&registry).unwrap());
    assert!(!plan().is_installed(&registry).unwrap());
}
