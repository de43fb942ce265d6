//! # Configuration Store
//!
//! A process-wide registry of named, typed configuration records backed
//! by YAML. Each record carries its current value, a YAML converter in
//! both directions and a set of change listeners fired synchronously on
//! every effective update.
//!
//! Record names are dotted lowercase paths (`[0-9a-z_.]+`); nested YAML
//! maps are flattened into such paths when a document is loaded, so a
//! record named `threadpool` picks up the whole `threadpool:` subtree
//! of a config file.

use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::ConfigError;
use crate::util;

/// Bounds for types that can live in the store.
///
/// Blanket-implemented; any serde-capable, comparable, thread-safe
/// value type qualifies.
pub trait ConfigValue:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> ConfigValue for T where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

type Listener<T> = Box<dyn Fn(&T, &T) + Send + Sync>;

/// Type-erased surface of a registered record, what the registry and
/// the YAML loader operate on.
trait ConfigVarBase: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn load_yaml(&self, node: &serde_yaml::Value) -> Result<(), ConfigError>;
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A named, typed configuration record.
pub struct ConfigVar<T: ConfigValue> {
    name: String,
    description: String,
    value: RwLock<T>,
    listeners: Mutex<HashMap<u64, Listener<T>>>,
    next_listener_id: AtomicU64,
}

impl<T: ConfigValue> ConfigVar<T> {
    fn new(name: &str, default_value: T, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value: RwLock::new(default_value),
            listeners: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current value (cloned out of the record).
    pub fn value(&self) -> T {
        self.value.read().clone()
    }

    /// Replaces the value, firing every listener with `(old, new)` when
    /// the new value actually differs. Listeners run synchronously on
    /// the calling thread and must not touch this record's listener set.
    pub fn set_value(&self, new_value: T) {
        let old_value = {
            let mut value = self.value.write();
            if *value == new_value {
                return;
            }
            std::mem::replace(&mut *value, new_value.clone())
        };

        let listeners = self.listeners.lock();
        for listener in listeners.values() {
            listener(&old_value, &new_value);
        }
    }

    /// Serializes the current value as a YAML string.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&*self.value.read()).map_err(|source| ConfigError::InvalidValue {
            name: self.name.clone(),
            source,
        })
    }

    /// Registers a change callback; the returned id removes it again.
    /// Ids increase monotonically per record.
    pub fn add_listener(&self, listener: impl Fn(&T, &T) + Send + Sync + 'static) -> u64 {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.listeners.lock().insert(id, Box::new(listener));
        id
    }

    pub fn remove_listener(&self, id: u64) {
        self.listeners.lock().remove(&id);
    }

    pub fn clear_listeners(&self) {
        self.listeners.lock().clear();
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<T: ConfigValue> ConfigVarBase for ConfigVar<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn load_yaml(&self, node: &serde_yaml::Value) -> Result<(), ConfigError> {
        let parsed: T =
            serde_yaml::from_value(node.clone()).map_err(|source| ConfigError::InvalidValue {
                name: self.name.clone(),
                source,
            })?;
        self.set_value(parsed);
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

type Registry = RwLock<HashMap<String, Arc<dyn ConfigVarBase>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn file_mtimes() -> &'static Mutex<HashMap<PathBuf, SystemTime>> {
    static MTIMES: OnceLock<Mutex<HashMap<PathBuf, SystemTime>>> = OnceLock::new();
    MTIMES.get_or_init(|| Mutex::new(HashMap::new()))
}

fn downcast<T: ConfigValue>(
    name: &str,
    var: Arc<dyn ConfigVarBase>,
) -> Result<Arc<ConfigVar<T>>, ConfigError> {
    let actual = var.type_name();
    var.as_any()
        .downcast::<ConfigVar<T>>()
        .map_err(|_| {
            let requested = std::any::type_name::<T>();
            error!(
                "config '{}' exists with type {}, requested {}",
                name, actual, requested
            );
            ConfigError::TypeMismatch {
                name: name.to_string(),
                actual,
                requested,
            }
        })
}

/// Returns the record registered under `name`, creating it with
/// `default_value` when absent.
///
/// Fails with [`ConfigError::InvalidName`] when `name` violates the
/// `[0-9a-z_.]+` rule and with [`ConfigError::TypeMismatch`] when the
/// name is taken by a record of another type.
pub fn get_or_create<T: ConfigValue>(
    name: &str,
    default_value: T,
    description: &str,
) -> Result<Arc<ConfigVar<T>>, ConfigError> {
    {
        let vars = registry().read();
        if let Some(existing) = vars.get(name) {
            return downcast::<T>(name, Arc::clone(existing));
        }
    }

    if !util::is_valid_name(name) {
        error!("config name invalid: {}", name);
        return Err(ConfigError::InvalidName(name.to_string()));
    }

    let mut vars = registry().write();
    // Racing registrations resolve to whichever inserted first.
    if let Some(existing) = vars.get(name) {
        return downcast::<T>(name, Arc::clone(existing));
    }

    let var = Arc::new(ConfigVar::<T>::new(name, default_value, description));
    vars.insert(name.to_string(), var.clone());
    Ok(var)
}

/// Returns the record registered under `name`, or `None` when absent or
/// of a different type.
pub fn lookup<T: ConfigValue>(name: &str) -> Option<Arc<ConfigVar<T>>> {
    let var = registry().read().get(name).cloned()?;
    var.as_any().downcast::<ConfigVar<T>>().ok()
}

/// Drops every registered record. Intended for tests.
pub fn clear() {
    registry().write().clear();
}

/// Applies a parsed YAML document to the registered records.
///
/// Nested maps are flattened into dotted keys; keys violating the name
/// rule are logged and skipped, unrecognized keys logged at warn, and a
/// value that fails its record's parser leaves the record untouched.
pub fn load_from_yaml(root: &serde_yaml::Value) {
    let mut nodes = Vec::new();
    flatten("", root, &mut nodes);

    for (key, node) in nodes {
        let var = registry().read().get(&key).cloned();
        match var {
            Some(var) => {
                if let Err(err) = var.load_yaml(node) {
                    error!("{}", err);
                }
            }
            None => warn!("unrecognized config key: {}", key),
        }
    }
}

fn flatten<'a>(
    prefix: &str,
    node: &'a serde_yaml::Value,
    out: &mut Vec<(String, &'a serde_yaml::Value)>,
) {
    if !prefix.is_empty() {
        if !util::is_valid_name(prefix) {
            error!("config invalid name: {}", prefix);
            return;
        }
        out.push((prefix.to_string(), node));
    }

    if let serde_yaml::Value::Mapping(map) = node {
        for (key, value) in map {
            let Some(key) = key.as_str() else { continue };
            let child = if prefix.is_empty() {
                key.to_string()
            } else {
                format!("{}.{}", prefix, key)
            };
            flatten(&child, value, out);
        }
    }
}

/// Loads every `*.yml` file under `dir` (recursively) into the store.
///
/// A per-file mtime cache skips files unchanged since their last load
/// unless `force` is set. Unreadable or unparsable files are logged and
/// skipped; the load never fails as a whole.
pub fn load_from_conf_dir(dir: impl AsRef<Path>, force: bool) {
    for file in util::list_files_by_ext(dir.as_ref(), "yml") {
        let Some(mtime) = util::file_mtime(&file) else {
            warn!("skip config file '{}': cannot read mtime", file.display());
            continue;
        };

        {
            let mut cache = file_mtimes().lock();
            let cached = cache.entry(file.clone()).or_insert(SystemTime::UNIX_EPOCH);
            if !force && *cached == mtime {
                info!(
                    "skip config file '{}': unchanged since last load",
                    file.display()
                );
                continue;
            }
            *cached = mtime;
        }

        match load_file(&file) {
            Ok(()) => info!("loaded config file '{}'", file.display()),
            Err(err) => error!("failed to load config file '{}': {}", file.display(), err),
        }
    }
}

fn load_file(file: &Path) -> Result<(), ConfigError> {
    let text = fs::read_to_string(file).map_err(|source| ConfigError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    let root: serde_yaml::Value =
        serde_yaml::from_str(&text).map_err(|source| ConfigError::InvalidValue {
            name: file.display().to_string(),
            source,
        })?;
    load_from_yaml(&root);
    Ok(())
}
