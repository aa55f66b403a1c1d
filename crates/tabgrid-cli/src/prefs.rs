// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tabgrid_app::PreferenceKey;
use tabgrid_engine::PreferenceStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    preferences: BTreeMap<String, String>,
}

/// Preferences persisted as a small TOML table. Every `set` rewrites the
/// file.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl FilePreferences {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut values = BTreeMap::new();
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("read preferences {}", path.display()))?;
            let file: PreferencesFile = toml::from_str(&raw)
                .with_context(|| format!("parse preferences {}", path.display()))?;
            for (name, value) in file.preferences {
                if PreferenceKey::parse(&name).is_some() {
                    values.insert(name, value);
                } else {
                    tracing::warn!(key = %name, "ignoring unknown preference");
                }
            }
        }
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create preferences directory {}", parent.display()))?;
        }
        let file = PreferencesFile {
            preferences: self.values.clone(),
        };
        let raw = toml::to_string(&file).context("serialize preferences")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("write preferences {}", self.path.display()))
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: PreferenceKey) -> Option<String> {
        self.values.get(key.as_str()).cloned()
    }

    fn set(&mut self, key: PreferenceKey, value: &str) -> Result<()> {
        self.values.insert(key.as_str().to_owned(), value.to_owned());
        self.save()
    }
}
