//! User settings persistence.
//!
//! Reads never fail: a missing or corrupt file reads as empty and is logged.
//! Writes report success as a boolean so the UI can show a notice.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::chat::TranslateMode;
use crate::config::app_config_dir;
use crate::files::write_atomic;
use crate::job::options::{default_extra, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_PROMPT};

pub type SettingsMap = Map<String, Value>;

pub const PDF_SECTION: &str = "pdfTranslate";
pub const TEXT_SECTION: &str = "textTranslate";
pub const SETTINGS_FILE: &str = "settings.json";
pub const BABELDOC_CONFIG_FILE: &str = "babeldoc.toml";

pub const TEXT_DEFAULT_MODEL: &str = "qwen3-max";
pub const TEXT_DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const TEXT_DEFAULT_PROMPT: &str = "You are a professional translator.";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0} does not contain a settings object")]
    NotAnObject(PathBuf),
    #[error("no configuration directory is available on this system")]
    NoConfigDir,
}

/// Flat key-value persistence the typed sections are stored in.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> bool;
    fn remove(&self, key: &str) -> bool;
}

/// In-process store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> bool {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value);
        true
    }

    fn remove(&self, key: &str) -> bool {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key)
            .is_some()
    }
}

/// A JSON object document on disk.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `settings.json` in the app config dir.
    pub fn default_settings() -> Result<Self, SettingsError> {
        let dir = app_config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(dir.join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> SettingsMap {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return SettingsMap::new(),
            Err(err) => {
                warn!("failed to read {}: {}", self.path.display(), err);
                return SettingsMap::new();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                warn!("{} is not a JSON object, ignoring it", self.path.display());
                SettingsMap::new()
            }
            Err(err) => {
                warn!("failed to parse {}: {}", self.path.display(), err);
                SettingsMap::new()
            }
        }
    }

    pub fn save(&self, map: &SettingsMap) -> bool {
        match self.write_document(map) {
            Ok(()) => true,
            Err(err) => {
                warn!("failed to write {}: {}", self.path.display(), err);
                false
            }
        }
    }

    /// Write the stored document to `target`, as YAML for `.yaml`/`.yml` and
    /// JSON otherwise.
    pub fn export_to(&self, target: &Path) -> Result<(), SettingsError> {
        let document = Value::Object(self.load());
        let contents = if is_yaml(target) {
            serde_yaml::to_string(&document)?
        } else {
            serde_json::to_string_pretty(&document)?
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(target, contents)?;
        Ok(())
    }

    /// Replace the stored document with the one in `source`. Returns the number
    /// of top-level keys imported.
    pub fn import_from(&self, source: &Path) -> Result<usize, SettingsError> {
        let raw = fs::read_to_string(source)?;
        let document: Value = if is_yaml(source) {
            serde_yaml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        let Value::Object(map) = document else {
            return Err(SettingsError::NotAnObject(source.to_path_buf()));
        };
        self.write_document(&map)?;
        Ok(map.len())
    }

    fn write_document(&self, map: &SettingsMap) -> Result<(), SettingsError> {
        let contents = serde_json::to_vec_pretty(map)?;
        write_atomic(&self.path, &contents)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: Value) -> bool {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = self.load();
        map.insert(key.to_string(), value);
        self.save(&map)
    }

    fn remove(&self, key: &str) -> bool {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = self.load();
        if map.remove(key).is_none() {
            return false;
        }
        self.save(&map)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// The babeldoc TOML config, stored and returned verbatim.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self, SettingsError> {
        let dir = app_config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(dir.join(BABELDOC_CONFIG_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty when the file does not exist or cannot be read.
    pub fn read(&self) -> String {
        match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) => {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!("failed to read {}: {}", self.path.display(), err);
                }
                String::new()
            }
        }
    }

    pub fn write(&self, content: &str) -> Result<PathBuf, SettingsError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, content)?;
        Ok(self.path.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfTranslateSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub prompt: String,
    /// Secondary babeldoc options, camelCase keys.
    pub advanced: SettingsMap,
}

impl Default for PdfTranslateSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.into(),
            base_url: DEFAULT_BASE_URL.into(),
            prompt: DEFAULT_PROMPT.into(),
            advanced: default_extra(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTranslateSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub prompt: String,
    pub mode: TranslateMode,
}

impl Default for TextTranslateSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: TEXT_DEFAULT_MODEL.into(),
            base_url: TEXT_DEFAULT_BASE_URL.into(),
            prompt: TEXT_DEFAULT_PROMPT.into(),
            mode: TranslateMode::Show,
        }
    }
}

/// Typed sections over a [`KeyValueStore`].
pub struct SettingsRepository<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SettingsRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pdf_settings(&self) -> PdfTranslateSettings {
        read_section(self.store.get(PDF_SECTION))
    }

    pub fn save_pdf_settings(&self, settings: &PdfTranslateSettings) -> bool {
        write_section(&self.store, PDF_SECTION, settings)
    }

    pub fn text_settings(&self) -> TextTranslateSettings {
        read_section(self.store.get(TEXT_SECTION))
    }

    pub fn save_text_settings(&self, settings: &TextTranslateSettings) -> bool {
        write_section(&self.store, TEXT_SECTION, settings)
    }
}

/// Overlay stored fields on the defaults one at a time, dropping unknown keys
/// and any field whose value does not fit its type.
fn read_section<T>(stored: Option<Value>) -> T
where
    T: Serialize + DeserializeOwned + Default,
{
    let Some(Value::Object(stored)) = stored else {
        return T::default();
    };
    let Ok(Value::Object(mut merged)) = serde_json::to_value(T::default()) else {
        return T::default();
    };

    for (key, value) in stored {
        if !merged.contains_key(&key) {
            continue;
        }
        let previous = merged.insert(key.clone(), value);
        if serde_json::from_value::<T>(Value::Object(merged.clone())).is_err() {
            warn!("ignoring invalid setting '{}'", key);
            if let Some(previous) = previous {
                merged.insert(key, previous);
            }
        }
    }
    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

fn write_section<S, T>(store: &S, key: &str, section: &T) -> bool
where
    S: KeyValueStore + ?Sized,
    T: Serialize,
{
    match serde_json::to_value(section) {
        Ok(value) => store.set(key, value),
        Err(err) => {
            warn!("failed to serialize settings section '{}': {}", key, err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_or_corrupt_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        assert!(store.load().is_empty());

        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_empty());

        fs::write(store.path(), "[1, 2]").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn set_and_get_persist_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let store = JsonFileStore::new(&path);
        assert!(store.set("theme", json!("dark")));
        assert!(store.set("count", json!(3)));

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("theme"), Some(json!("dark")));
        assert_eq!(reopened.get("count"), Some(json!(3)));
        assert!(reopened.remove("theme"));
        assert!(!reopened.remove("theme"));
        assert_eq!(store.get("theme"), None);
    }

    #[test]
    fn stored_values_reload_exactly() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut map = SettingsMap::new();
        map.insert("sum".into(), json!(0.1 + 0.2));
        map.insert("progress".into(), json!(13.159218108456686));
        map.insert("third".into(), json!(1.0 / 3.0));
        map.insert("precise".into(), json!(123.456789012345));
        map.insert("enabled".into(), json!(true));
        map.insert("model".into(), json!("deepseek-chat"));
        assert!(JsonFileStore::new(&path).save(&map));

        let reloaded = JsonFileStore::new(&path).load();
        assert_eq!(reloaded, map);
        assert_eq!(reloaded["sum"].as_f64(), Some(0.1 + 0.2));
        assert_eq!(reloaded["third"].as_f64(), Some(1.0 / 3.0));
    }

    #[test]
    fn save_fails_softly_when_path_is_a_directory() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(!store.save(&SettingsMap::new()));
    }

    #[test]
    fn export_and_import_yaml() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        store.set(TEXT_SECTION, json!({ "apiKey": "sk-1", "mode": "copy" }));

        let exported = dir.path().join("backup.yaml");
        store.export_to(&exported).unwrap();
        let yaml = fs::read_to_string(&exported).unwrap();
        assert!(yaml.contains("apiKey: sk-1"));

        let other = JsonFileStore::new(dir.path().join("other.json"));
        other.set("stale", json!(true));
        assert_eq!(other.import_from(&exported).unwrap(), 1);
        assert_eq!(other.get("stale"), None);
        assert_eq!(
            other.get(TEXT_SECTION),
            Some(json!({ "apiKey": "sk-1", "mode": "copy" }))
        );
    }

    #[test]
    fn import_rejects_non_objects() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("list.json");
        fs::write(&source, "[1]").unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        assert!(matches!(
            store.import_from(&source),
            Err(SettingsError::NotAnObject(_))
        ));
    }

    #[test]
    fn config_file_is_verbatim() {
        let dir = tempdir().unwrap();
        let config = ConfigFile::new(dir.path().join("app").join("babeldoc.toml"));
        assert_eq!(config.read(), "");

        let content = "[babeldoc]\nqps = 4\n# comment kept\n";
        let written = config.write(content).unwrap();
        assert_eq!(written, config.path());
        assert_eq!(config.read(), content);
    }

    #[test]
    fn sections_default_when_absent() {
        let repo = SettingsRepository::new(MemoryStore::default());
        assert_eq!(repo.pdf_settings(), PdfTranslateSettings::default());
        let text = repo.text_settings();
        assert_eq!(text.model, "qwen3-max");
        assert_eq!(text.mode, TranslateMode::Show);
    }

    #[test]
    fn sections_round_trip() {
        let repo = SettingsRepository::new(MemoryStore::default());
        let mut pdf = PdfTranslateSettings::default();
        pdf.api_key = "sk-pdf".into();
        pdf.advanced.insert("qps".into(), json!(3));
        assert!(repo.save_pdf_settings(&pdf));
        assert_eq!(repo.pdf_settings(), pdf);
    }

    #[test]
    fn mistyped_fields_fall_back_individually() {
        let store = MemoryStore::default();
        store.set(
            TEXT_SECTION,
            json!({ "apiKey": "sk-1", "model": 42, "mode": "clipboard", "extra": true }),
        );
        let repo = SettingsRepository::new(store);
        let text = repo.text_settings();
        assert_eq!(text.api_key, "sk-1");
        assert_eq!(text.model, TEXT_DEFAULT_MODEL);
        assert_eq!(text.mode, TranslateMode::Show);
    }
}
