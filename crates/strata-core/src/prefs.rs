//! Persisted UI preferences.
//!
//! The selection store keeps expansion and selection state in a
//! [`KeyValueStore`]. Two implementations are provided:
//!
//! - [`MemoryStore`]: process-local, nothing is written anywhere.
//! - [`PreferenceStore`]: a hierarchical store that can be saved to and
//!   loaded from JSON or TOML, optionally saving after every change.
//!
//! # Path-Based Access
//!
//! Keys are paths; either `.` or `/` separates segments, and intermediate
//! objects are created on demand:
//!
//! ```
//! use strata_core::prefs::{KeyValueStore, PreferenceStore};
//! use serde_json::json;
//!
//! let prefs = PreferenceStore::new();
//! prefs.set_value("layerTree.expanded", json!(["basemaps"]));
//! assert_eq!(prefs.get_value("layerTree/expanded"), Some(json!(["basemaps"])));
//! ```
//!
//! # Auto-Save
//!
//! ```no_run
//! use strata_core::prefs::{PreferenceStore, PrefsFormat};
//!
//! let prefs = PreferenceStore::new();
//! prefs.set_auto_save(PreferenceStore::default_path()?, PrefsFormat::Json);
//! # Ok::<(), strata_core::PrefsError>(())
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{PrefsError, PrefsResult};
use crate::logging::targets;
use crate::signal::Signal;

/// Minimal key-value persistence used by the selection store.
pub trait KeyValueStore: Send + Sync {
    /// The value stored under `key`, if any.
    fn get_value(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_value(&self, key: &str, value: Value);

    /// Remove `key`. Returns the previous value.
    fn remove_value(&self, key: &str) -> Option<Value>;
}

/// A flat in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set_value(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove_value(&self, key: &str) -> Option<Value> {
        self.values.write().remove(key)
    }
}

/// File format for [`PreferenceStore`] persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefsFormat {
    Json,
    Toml,
}

impl PrefsFormat {
    /// Guess the format from a file extension; anything but `.toml` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Clone)]
struct AutoSaveConfig {
    path: PathBuf,
    format: PrefsFormat,
}

/// Hierarchical preference storage with change notification.
pub struct PreferenceStore {
    data: RwLock<Map<String, Value>>,
    /// Emitted with the key path after every change.
    changed: Signal<String>,
    auto_save: RwLock<Option<AutoSaveConfig>>,
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreferenceStore")
            .field("keys", &self.data.read().len())
            .field("auto_save", &*self.auto_save.read())
            .finish()
    }
}

impl PreferenceStore {
    pub fn new() -> Self {
        Self::from_data(Map::new())
    }

    fn from_data(data: Map<String, Value>) -> Self {
        Self {
            data: RwLock::new(data),
            changed: Signal::new(),
            auto_save: RwLock::new(None),
        }
    }

    /// Per-user preference file, e.g. `~/.config/strata/preferences.json`.
    pub fn default_path() -> PrefsResult<PathBuf> {
        let dirs = directories::ProjectDirs::from("io", "Horizon Analytic", "strata").ok_or(PrefsError::NoConfigDir)?;
        Ok(dirs.config_dir().join("preferences.json"))
    }

    /// Load from `path` if it exists, otherwise start empty. Either way,
    /// auto-save to `path` afterwards.
    pub fn open(path: impl AsRef<Path>) -> PrefsResult<Self> {
        let path = path.as_ref();
        let format = PrefsFormat::from_path(path);
        let store = if path.exists() {
            match format {
                PrefsFormat::Json => Self::load_json(path)?,
                PrefsFormat::Toml => Self::load_toml(path)?,
            }
        } else {
            Self::new()
        };
        store.set_auto_save(path, format);
        Ok(store)
    }

    pub fn changed(&self) -> &Signal<String> {
        &self.changed
    }

    /// Save to `path` after every change.
    pub fn set_auto_save(&self, path: impl AsRef<Path>, format: PrefsFormat) {
        *self.auto_save.write() = Some(AutoSaveConfig {
            path: path.as_ref().to_path_buf(),
            format,
        });
    }

    pub fn disable_auto_save(&self) {
        *self.auto_save.write() = None;
    }

    pub fn is_auto_save_enabled(&self) -> bool {
        self.auto_save.read().is_some()
    }

    pub fn contains(&self, path: &str) -> bool {
        let parts = parse_path(path);
        get_nested(&self.data.read(), &parts).is_some()
    }

    /// Top-level keys.
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
        self.changed.emit(String::new());
        self.try_auto_save();
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn load_json(path: impl AsRef<Path>) -> PrefsResult<Self> {
        let content = read_text(path.as_ref())?;
        let data: Map<String, Value> = serde_json::from_str(&content)?;
        Ok(Self::from_data(data))
    }

    pub fn load_toml(path: impl AsRef<Path>) -> PrefsResult<Self> {
        let content = read_text(path.as_ref())?;
        let data: Map<String, Value> = toml::from_str(&content)?;
        Ok(Self::from_data(data))
    }

    /// Write as pretty-printed JSON, atomically.
    pub fn save_json(&self, path: impl AsRef<Path>) -> PrefsResult<()> {
        let json = serde_json::to_string_pretty(&*self.data.read())?;
        atomic_write(path.as_ref(), json.as_bytes())
    }

    /// Write as TOML, atomically. Null values cannot be represented and are
    /// dropped.
    pub fn save_toml(&self, path: impl AsRef<Path>) -> PrefsResult<()> {
        let mut data = self.data.read().clone();
        strip_nulls(&mut data);
        let toml_str = toml::to_string_pretty(&data)?;
        atomic_write(path.as_ref(), toml_str.as_bytes())
    }

    /// Save now if auto-save is enabled.
    pub fn sync(&self) -> PrefsResult<()> {
        let config = self.auto_save.read().clone();
        match config {
            Some(config) => self.save(&config),
            None => Ok(()),
        }
    }

    fn save(&self, config: &AutoSaveConfig) -> PrefsResult<()> {
        match config.format {
            PrefsFormat::Json => self.save_json(&config.path),
            PrefsFormat::Toml => self.save_toml(&config.path),
        }
    }

    fn try_auto_save(&self) {
        let config = self.auto_save.read().clone();
        if let Some(config) = config {
            if let Err(e) = self.save(&config) {
                tracing::error!(target: targets::PREFS, path = %config.path.display(), "Failed to auto-save preferences: {}", e);
            }
        }
    }
}

impl KeyValueStore for PreferenceStore {
    fn get_value(&self, key: &str) -> Option<Value> {
        let parts = parse_path(key);
        get_nested(&self.data.read(), &parts).cloned()
    }

    fn set_value(&self, key: &str, value: Value) {
        let parts = parse_path(key);
        if parts.is_empty() {
            return;
        }
        set_nested(&mut self.data.write(), &parts, value);
        tracing::trace!(target: targets::PREFS, key, "preference set");
        self.changed.emit(key.to_string());
        self.try_auto_save();
    }

    fn remove_value(&self, key: &str) -> Option<Value> {
        let parts = parse_path(key);
        let removed = remove_nested(&mut self.data.write(), &parts);
        if removed.is_some() {
            self.changed.emit(key.to_string());
            self.try_auto_save();
        }
        removed
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

fn parse_path(path: &str) -> Vec<&str> {
    path.split(['.', '/']).filter(|s| !s.is_empty()).collect()
}

fn get_nested<'a>(data: &'a Map<String, Value>, parts: &[&str]) -> Option<&'a Value> {
    let (first, rest) = parts.split_first()?;
    let value = data.get(*first)?;
    if rest.is_empty() {
        Some(value)
    } else {
        value.as_object().and_then(|obj| get_nested(obj, rest))
    }
}

fn set_nested(data: &mut Map<String, Value>, parts: &[&str], value: Value) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        data.insert(first.to_string(), value);
        return;
    }
    let entry = data
        .entry(first.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(obj) = entry {
        set_nested(obj, rest, value);
    }
}

fn remove_nested(data: &mut Map<String, Value>, parts: &[&str]) -> Option<Value> {
    let (first, rest) = parts.split_first()?;
    if rest.is_empty() {
        return data.remove(*first);
    }
    match data.get_mut(*first)? {
        Value::Object(obj) => remove_nested(obj, rest),
        _ => None,
    }
}

fn strip_nulls(data: &mut Map<String, Value>) {
    data.retain(|_, value| !value.is_null());
    for value in data.values_mut() {
        if let Value::Object(obj) = value {
            strip_nulls(obj);
        }
    }
}

fn read_text(path: &Path) -> PrefsResult<String> {
    fs::read_to_string(path).map_err(|e| PrefsError::io(path, e))
}

/// Write to a temporary sibling file, sync it, then rename over `path`.
fn atomic_write(path: &Path, bytes: &[u8]) -> PrefsResult<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| PrefsError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "preferences".to_string());
    let temp_path = parent.join(format!(".{}.tmp.{}", file_name, std::process::id()));

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp_path, path)
    })();

    result.map_err(|e| {
        fs::remove_file(&temp_path).ok();
        PrefsError::io(path, e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get_value("a.b"), None);
        store.set_value("a.b", json!([1, 2]));
        assert_eq!(store.get_value("a.b"), Some(json!([1, 2])));
        assert_eq!(store.remove_value("a.b"), Some(json!([1, 2])));
        assert_eq!(store.get_value("a.b"), None);
    }

    #[test]
    fn test_nested_paths() {
        let prefs = PreferenceStore::new();
        prefs.set_value("layerTree.expanded", json!(["g1"]));
        prefs.set_value("layerTree/selected", json!(["x"]));
        assert_eq!(prefs.keys(), vec!["layerTree".to_string()]);
        assert!(prefs.contains("layerTree.selected"));

        prefs.set_value("layerTree.expanded.deeper", json!(true));
        assert_eq!(prefs.get_value("layerTree.expanded"), Some(json!({ "deeper": true })));

        assert_eq!(prefs.remove_value("layerTree.selected"), Some(json!(["x"])));
        assert_eq!(prefs.remove_value("layerTree.selected"), None);
    }

    #[test]
    fn test_change_signal() {
        let prefs = PreferenceStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        prefs.changed().connect(move |_key| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        prefs.set_value("a", json!(1));
        prefs.set_value("b", json!(2));
        prefs.remove_value("missing");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = PreferenceStore::new();
        prefs.set_value("layerTree.expanded", json!(["a", "b"]));
        prefs.save_json(&path).unwrap();

        let loaded = PreferenceStore::load_json(&path).unwrap();
        assert_eq!(loaded.get_value("layerTree.expanded"), Some(json!(["a", "b"])));
        assert!(!dir.path().join(format!(".prefs.json.tmp.{}", std::process::id())).exists());
    }

    #[test]
    fn test_toml_roundtrip_drops_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");

        let prefs = PreferenceStore::new();
        prefs.set_value("layerTree.selected", json!(["x"]));
        prefs.set_value("layerTree.cleared", Value::Null);
        prefs.save_toml(&path).unwrap();

        let loaded = PreferenceStore::load_toml(&path).unwrap();
        assert_eq!(loaded.get_value("layerTree.selected"), Some(json!(["x"])));
        assert!(!loaded.contains("layerTree.cleared"));
    }

    #[test]
    fn test_open_and_auto_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");

        let prefs = PreferenceStore::open(&path).unwrap();
        assert!(prefs.is_auto_save_enabled());
        prefs.set_value("layerTree.expanded", json!(["g"]));
        assert!(path.exists());

        let reopened = PreferenceStore::open(&path).unwrap();
        assert_eq!(reopened.get_value("layerTree.expanded"), Some(json!(["g"])));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = PreferenceStore::load_json(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, PrefsError::Io { .. }));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(PrefsFormat::from_path(Path::new("a.TOML")), PrefsFormat::Toml);
        assert_eq!(PrefsFormat::from_path(Path::new("a.json")), PrefsFormat::Json);
        assert_eq!(PrefsFormat::from_path(Path::new("prefs")), PrefsFormat::Json);
    }
}
