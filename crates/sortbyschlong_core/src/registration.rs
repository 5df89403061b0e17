//! Registration plan for the extension's host entries.
//!
//! # Responsibility
//! - Describe every registry entry the host needs to find the module.
//! - Install and remove those entries through a [`RegistryStore`].
//!
//! # Invariants
//! - `uninstall` removes exactly the key trees `install` creates.
//! - Removing a tree that is already absent counts as success.
//! - A failed `install` removes whatever it wrote before returning.

use log::{info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Class id the module registers under.
pub const EXTENSION_CLASS_ID: Uuid = Uuid::from_u128(0x6D1C5A3E_9B47_4F2A_8E61_3C0F5B7D2A94);
pub const CLASS_DESCRIPTION: &str = "SortBySchlong Shell Extension";
pub const THREADING_MODEL: &str = "Apartment";
/// Per-user handler key for the desktop / folder background menu.
pub const BACKGROUND_HANDLER_KEY: &str =
    r"Software\Classes\Directory\Background\shellex\ContextMenuHandlers\SortBySchlong";

/// Registry hive a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegistryRoot {
    ClassesRoot,
    CurrentUser,
}

impl RegistryRoot {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClassesRoot => "HKCR",
            Self::CurrentUser => "HKCU",
        }
    }
}

/// Fully qualified registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    pub root: RegistryRoot,
    pub path: String,
}

impl RegistryKey {
    pub fn new(root: RegistryRoot, path: impl Into<String>) -> Self {
        Self {
            root,
            path: path.into(),
        }
    }
}

impl Display for RegistryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, r"{}\{}", self.root.as_str(), self.path)
    }
}

/// One string value to write. `name == None` is the key's default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryValue {
    pub key: RegistryKey,
    pub name: Option<String>,
    pub data: String,
}

/// Registry access failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    NotFound(String),
    Failed {
        operation: &'static str,
        key: String,
        code: u32,
    },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "registry key not found: {key}"),
            Self::Failed {
                operation,
                key,
                code,
            } => write!(f, "registry {operation} failed for {key} (code {code})"),
        }
    }
}

impl Error for RegistryError {}

/// Minimal registry surface the plan needs.
pub trait RegistryStore {
    /// Creates `key` as needed and writes one string value.
    fn set_string(&self, key: &RegistryKey, name: Option<&str>, data: &str)
        -> Result<(), RegistryError>;

    /// Reads one string value; `Ok(None)` when the key or value is absent.
    fn get_string(&self, key: &RegistryKey, name: Option<&str>)
        -> Result<Option<String>, RegistryError>;

    /// Deletes `key` with all subkeys; `NotFound` when it does not exist.
    fn delete_tree(&self, key: &RegistryKey) -> Result<(), RegistryError>;
}

/// Braced upper-case form used by the host, e.g. `{6D1C5A3E-...}`.
pub fn class_id_string(class_id: &Uuid) -> String {
    format!("{{{}}}", class_id.hyphenated()).to_ascii_uppercase()
}

/// Entries for one module file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationPlan {
    values: Vec<RegistryValue>,
    trees: Vec<RegistryKey>,
}

impl RegistrationPlan {
    pub fn for_module(class_id: Uuid, module_path: &Path) -> Self {
        let class_id = class_id_string(&class_id);
        let class_key = RegistryKey::new(RegistryRoot::ClassesRoot, format!(r"CLSID\{class_id}"));
        let server_key = RegistryKey::new(
            RegistryRoot::ClassesRoot,
            format!(r"CLSID\{class_id}\InprocServer32"),
        );
        let handler_key = RegistryKey::new(RegistryRoot::CurrentUser, BACKGROUND_HANDLER_KEY);

        let values = vec![
            RegistryValue {
                key: class_key.clone(),
                name: None,
                data: CLASS_DESCRIPTION.to_string(),
            },
            RegistryValue {
                key: server_key.clone(),
                name: None,
                data: module_path.display().to_string(),
            },
            RegistryValue {
                key: server_key,
                name: Some("ThreadingModel".to_string()),
                data: THREADING_MODEL.to_string(),
            },
            RegistryValue {
                key: handler_key.clone(),
                name: None,
                data: class_id,
            },
        ];
        Self {
            values,
            // Handler first so the host stops offering the menu before the
            // class disappears.
            trees: vec![handler_key, class_key],
        }
    }

    pub fn values(&self) -> &[RegistryValue] {
        &self.values
    }

    /// Key trees owned by this registration.
    pub fn trees(&self) -> &[RegistryKey] {
        &self.trees
    }

    /// Writes every value; on failure removes what was written.
    pub fn install(&self, store: &dyn RegistryStore) -> Result<(), RegistryError> {
        for value in &self.values {
            if let Err(err) = store.set_string(&value.key, value.name.as_deref(), &value.data) {
                warn!(
                    "event=register module=registration status=error key={} error={}",
                    value.key, err
                );
                if let Err(rollback) = self.uninstall(store) {
                    warn!(
                        "event=register_rollback module=registration status=error error={}",
                        rollback
                    );
                }
                return Err(err);
            }
        }
        info!(
            "event=register module=registration status=ok values={}",
            self.values.len()
        );
        Ok(())
    }

    /// Deletes every owned tree. Keeps going after a failure and returns the
    /// first one.
    pub fn uninstall(&self, store: &dyn RegistryStore) -> Result<(), RegistryError> {
        let mut first_error = None;
        for key in &self.trees {
            match store.delete_tree(key) {
                Ok(()) | Err(RegistryError::NotFound(_)) => {}
                Err(err) => {
                    warn!(
                        "event=unregister module=registration status=error key={} error={}",
                        key, err
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => {
                info!("event=unregister module=registration status=ok");
                Ok(())
            }
        }
    }

    /// Whether every value is present with the planned data.
    pub fn is_installed(&self, store: &dyn RegistryStore) -> Result<bool, RegistryError> {
        for value in &self.values {
            let current = store.get_string(&value.key, value.name.as_deref())?;
            if current.as_deref() != Some(value.data.as_str()) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

type KeyId = (RegistryRoot, String);

#[derive(Debug, Default)]
struct MemoryRegistryState {
    keys: BTreeMap<KeyId, BTreeMap<String, String>>,
    write_budget: Option<usize>,
}

/// In-memory store with case-insensitive key and value names.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    state: Mutex<MemoryRegistryState>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes writes fail once `budget` more have succeeded; `None` disables.
    pub fn fail_writes_after(&self, budget: Option<usize>) {
        self.lock().write_budget = budget;
    }

    pub fn contains_key(&self, key: &RegistryKey) -> bool {
        self.lock().keys.contains_key(&key_id(key))
    }

    pub fn key_count(&self) -> usize {
        self.lock().keys.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn key_id(key: &RegistryKey) -> KeyId {
    (key.root, key.path.trim_matches('\\').to_ascii_lowercase())
}

fn value_name(name: Option<&str>) -> String {
    name.unwrap_or_default().to_ascii_lowercase()
}

impl RegistryStore for MemoryRegistry {
    fn set_string(
        &self,
        key: &RegistryKey,
        name: Option<&str>,
        data: &str,
    ) -> Result<(), RegistryError> {
        let mut state = self.lock();
        if let Some(budget) = state.write_budget.as_mut() {
            if *budget == 0 {
                return Err(RegistryError::Failed {
                    operation: "set_string",
                    key: key.to_string(),
                    code: 5,
                });
            }
            *budget -= 1;
        }

        // Creating a key creates its missing ancestors.
        let (root, path) = key_id(key);
        let mut prefix = String::new();
        for segment in path.split('\\') {
            if !prefix.is_empty() {
                prefix.push('\\');
            }
            prefix.push_str(segment);
            state.keys.entry((root, prefix.clone())).or_default();
        }
        state
            .keys
            .entry((root, path))
            .or_default()
            .insert(value_name(name), data.to_string());
        Ok(())
    }

    fn get_string(
        &self,
        key: &RegistryKey,
        name: Option<&str>,
    ) -> Result<Option<String>, RegistryError> {
        Ok(self
            .lock()
            .keys
            .get(&key_id(key))
            .and_then(|values| values.get(&value_name(name)).cloned()))
    }

    fn delete_tree(&self, key: &RegistryKey) -> Result<(), RegistryError> {
        let (root, path) = key_id(key);
        let nested = format!("{path}\\");
        let mut state = self.lock();
        let before = state.keys.len();
        state
            .keys
            .retain(|(r, p), _| !(*r == root && (*p == path || p.starts_with(&nested))));
        if state.keys.len() == before {
            return Err(RegistryError::NotFound(key.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        class_id_string, MemoryRegistry, RegistrationPlan, RegistryKey, RegistryRoot,
        RegistryStore, EXTENSION_CLASS_ID,
    };
    use std::path::Path;
    use uuid::Uuid;

    #[test]
    fn class_id_is_braced_upper_case() {
        let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(class_id_string(&id), "{01234567-89AB-CDEF-0123-456789ABCDEF}");
        assert_eq!(class_id_string(&EXTENSION_CLASS_ID).len(), 38);
    }

    #[test]
    fn memory_registry_keys_are_case_insensitive() {
        let registry = MemoryRegistry::new();
        let key = RegistryKey::new(RegistryRoot::CurrentUser, r"Software\Classes\Foo");
        registry
            .set_string(&key, Some("ThreadingModel"), "Apartment")
            .expect("write");

        let lower = RegistryKey::new(RegistryRoot::CurrentUser, r"software\classes\foo");
        assert_eq!(
            registry
                .get_string(&lower, Some("threadingmodel"))
                .expect("read"),
            Some("Apartment".to_string())
        );
        assert!(registry.contains_key(&RegistryKey::new(RegistryRoot::CurrentUser, "Software")));
    }

    #[test]
    fn plan_lists_class_server_and_handler_entries() {
        let plan = RegistrationPlan::for_module(
            EXTENSION_CLASS_ID,
            Path::new(r"C:\Tools\sortbyschlong_shell.dll"),
        );
        let keys: Vec<String> = plan.values().iter().map(|v| v.key.to_string()).collect();
        let class_id = class_id_string(&EXTENSION_CLASS_ID);
        assert_eq!(
            keys,
            vec![
                format!(r"HKCR\CLSID\{class_id}"),
                format!(r"HKCR\CLSID\{class_id}\InprocServer32"),
                format!(r"HKCR\CLSID\{class_id}\InprocServer32"),
                r"HKCU\Software\Classes\Directory\Background\shellex\ContextMenuHandlers\SortBySchlong"
                    .to_string(),
            ]
        );
        assert_eq!(plan.values()[3].data, class_id);
        assert_eq!(plan.trees().len(), 2);
    }
}
