// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::collections::HashMap;
use tabgrid_app::PreferenceKey;

use crate::enrichment::DepthOptions;

/// Persistent key/value store for user preferences.
pub trait PreferenceStore {
    fn get(&self, key: PreferenceKey) -> Option<String>;
    fn set(&mut self, key: PreferenceKey, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    values: HashMap<PreferenceKey, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: PreferenceKey) -> Option<String> {
        self.values.get(&key).cloned()
    }

    fn set(&mut self, key: PreferenceKey, value: &str) -> Result<()> {
        self.values.insert(key, value.to_owned());
        Ok(())
    }
}

/// Preferences resolved from a store, with defaults for missing or
/// unparseable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub include_side_by_side: bool,
    pub auto_enrich: bool,
    pub hidden_tier: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            include_side_by_side: true,
            auto_enrich: true,
            hidden_tier: None,
        }
    }
}

impl Preferences {
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let defaults = Self::default();
        Self {
            include_side_by_side: flag(store, PreferenceKey::IncludeSideBySide)
                .unwrap_or(defaults.include_side_by_side),
            auto_enrich: flag(store, PreferenceKey::AutoEnrich).unwrap_or(defaults.auto_enrich),
            hidden_tier: store
                .get(PreferenceKey::HiddenTier)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn depth_options(&self) -> DepthOptions {
        DepthOptions {
            include_side_by_side: self.include_side_by_side,
        }
    }
}

fn flag(store: &dyn PreferenceStore, key: PreferenceKey) -> Option<bool> {
    let raw = store.get(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        other => {
            tracing::warn!(key = key.as_str(), value = other, "ignoring unparseable preference");
            None
        }
    }
}
