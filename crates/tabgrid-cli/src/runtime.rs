// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tabgrid_app::{ColumnSpec, ProfileKey, ProfilePayload, Row};
use tabgrid_testkit::OfferFaker;

pub const DEMO_PROFILES: [&str; 3] = ["harbor", "lighthouse", "compass"];
const DEMO_ROWS: usize = 400;

#[derive(Debug, Deserialize)]
struct DataFile {
    profiles: Vec<ProfileData>,
}

#[derive(Debug, Deserialize)]
struct ProfileData {
    name: String,
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
}

#[derive(Debug, Clone)]
enum Source {
    File(PathBuf),
    Demo,
}

/// Loads profile payloads for the grid. A data file is re-read on every
/// load so a reload (`r`) picks up edits made outside the app.
#[derive(Debug, Clone)]
pub struct DataRuntime {
    source: Source,
}

impl DataRuntime {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    pub fn demo() -> Self {
        Self {
            source: Source::Demo,
        }
    }

    fn read_file(path: &Path) -> Result<Vec<ProfileData>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read data file {}", path.display()))?;
        let file: DataFile = serde_json::from_str(&raw)
            .with_context(|| format!("parse data file {}", path.display()))?;

        let mut seen = BTreeSet::new();
        for profile in &file.profiles {
            let name = profile.name.trim();
            if name.is_empty() {
                bail!("data file {} has a profile with an empty name", path.display());
            }
            if !seen.insert(name.to_owned()) {
                bail!(
                    "data file {} lists profile {:?} more than once",
                    path.display(),
                    profile.name
                );
            }
        }
        Ok(file.profiles)
    }

    fn demo_payload(profile: &ProfileKey) -> Option<ProfilePayload> {
        let index = DEMO_PROFILES
            .iter()
            .position(|name| *name == profile.as_str())?;
        let seed = 17 + index as u64 * 31;
        Some(OfferFaker::new(seed).payload(DEMO_ROWS))
    }
}

impl tabgrid_tui::AppRuntime for DataRuntime {
    fn profile_keys(&mut self) -> Result<Vec<ProfileKey>> {
        match &self.source {
            Source::File(path) => Ok(Self::read_file(path)?
                .into_iter()
                .map(|profile| ProfileKey::new(profile.name))
                .collect()),
            Source::Demo => Ok(DEMO_PROFILES.into_iter().map(ProfileKey::from).collect()),
        }
    }

    fn load_profile(&mut self, profile: &ProfileKey) -> Result<ProfilePayload> {
        let payload = match &self.source {
            Source::File(path) => Self::read_file(path)?
                .into_iter()
                .find(|entry| entry.name == profile.as_str())
                .map(|entry| ProfilePayload {
                    columns: entry.columns,
                    rows: entry.rows,
                }),
            Source::Demo => Self::demo_payload(profile),
        };
        let payload = payload.ok_or_else(|| anyhow!("unknown profile {profile}"))?;
        tracing::debug!(
            profile = %profile,
            rows = payload.rows.len(),
            "loaded profile payload"
        );
        Ok(payload)
    }
}
