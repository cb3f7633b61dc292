//! Store identifier to price-locator mapping, loaded once at startup.
//!
//! A missing or malformed source never stops the process: the registry comes
//! up empty and every lookup reports `NotFound` until the file is fixed and the
//! process restarted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{error, info, warn};

use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectorEntry {
    /// CSS selector of the element holding the price text.
    pub price: String,
}

#[derive(Debug, Default, Deserialize)]
struct SelectorFile {
    #[serde(default)]
    stores: BTreeMap<String, SelectorEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct SelectorRegistry {
    entries: BTreeMap<String, SelectorEntry>,
}

impl SelectorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, SelectorEntry)>,
        K: AsRef<str>,
    {
        let mut registry = Self::empty();
        for (store, entry) in entries {
            registry.insert(store.as_ref(), entry);
        }
        registry
    }

    /// Reads the registry from a TOML file, degrading to an empty registry on failure.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(registry) => {
                    info!("Loaded {} store selectors from {}", registry.len(), path.display());
                    registry
                }
                Err(e) => {
                    error!("Selector file {} is malformed, no stores available: {}", path.display(), e);
                    Self::empty()
                }
            },
            Err(e) => {
                error!("Could not read selector file {}, no stores available: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let file: SelectorFile = toml::from_str(contents)
            .map_err(|e| AppError::Config(format!("invalid selector file: {}", e)))?;

        let mut registry = Self::empty();
        for (store, entry) in file.stores {
            if entry.price.trim().is_empty() {
                warn!("Skipping store '{}' with an empty price selector", store);
                continue;
            }
            registry.insert(&store, entry);
        }
        Ok(registry)
    }

    pub fn lookup(&self, store_id: &str) -> Result<&SelectorEntry> {
        let key = normalize_store(store_id);
        self.entries
            .get(&key)
            .ok_or_else(|| AppError::not_found(format!("store '{}'", key)))
    }

    pub fn stores(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, store: &str, entry: SelectorEntry) {
        self.entries.insert(normalize_store(store), entry);
    }
}

pub fn normalize_store(store_id: &str) -> String {
    store_id.trim().to_lowercase()
}
