//! Active provider selection.
//!
//! The selection is a single persisted string. It is read lazily on first
//! use and written through on every change; the service resolves it once per
//! generation call, so a change never affects a call already in flight.

use super::interface::ProviderId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;

pub const PROVIDER_STORAGE_KEY: &str = "@aiart/image_provider";

#[derive(Debug, Clone, Error)]
pub enum SelectorError {
    #[error("Unknown image provider: {0}")]
    UnknownProvider(String),
    #[error("Failed to persist provider selection: {0}")]
    Persist(String),
}

// ── Preference Storage ─────────────────────────────────

pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), String>;
}

/// Flat string map kept in a JSON file.
pub struct JsonFilePreferenceStore {
    path: PathBuf,
    // Serializes read-modify-write of the file.
    write_lock: Mutex<()>,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<data dir>/com.aiart.engine/preferences.json`
    pub fn default_location() -> Self {
        Self::new(crate::config::app_data_dir().join("preferences.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, String> {
        crate::config::load_json_config(&self.path, "Preferences")
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut all = self.read_all();
        all.insert(key.to_string(), value.to_string());
        crate::config::save_json_config(&self.path, &all, "Preferences")
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), String> {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

// ── ProviderSelector ───────────────────────────────────

pub struct ProviderSelector {
    store: Arc<dyn PreferenceStore>,
    fallback: ProviderId,
    active: RwLock<Option<ProviderId>>,
}

impl ProviderSelector {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self::with_fallback(store, ProviderId::default())
    }

    /// `fallback` is used when nothing (or garbage) is stored.
    pub fn with_fallback(store: Arc<dyn PreferenceStore>, fallback: ProviderId) -> Self {
        Self {
            store,
            fallback,
            active: RwLock::new(None),
        }
    }

    pub fn get_active_provider(&self) -> ProviderId {
        if let Some(id) = *self.active.read().unwrap_or_else(|e| e.into_inner()) {
            return id;
        }

        let loaded = match self.store.get(PROVIDER_STORAGE_KEY) {
            Some(raw) => raw.parse::<ProviderId>().unwrap_or_else(|e| {
                tracing::warn!(target: "imagegen", "{}, falling back to {}", e, self.fallback);
                self.fallback
            }),
            None => self.fallback,
        };

        let mut active = self.active.write().unwrap_or_else(|e| e.into_inner());
        *active.get_or_insert(loaded)
    }

    pub fn set_active_provider(&self, id: ProviderId) -> Result<(), SelectorError> {
        self.store
            .set(PROVIDER_STORAGE_KEY, id.as_str())
            .map_err(SelectorError::Persist)?;
        *self.active.write().unwrap_or_else(|e| e.into_inner()) = Some(id);
        tracing::info!(target: "imagegen", provider = %id, "Active image provider changed");
        Ok(())
    }

    /// Validating variant for identifiers coming straight from the UI.
    pub fn set_active_provider_str(&self, raw: &str) -> Result<ProviderId, SelectorError> {
        let id = raw
            .parse::<ProviderId>()
            .map_err(|_| SelectorError::UnknownProvider(raw.to_string()))?;
        self.set_active_provider(id)?;
        Ok(id)
    }
}
