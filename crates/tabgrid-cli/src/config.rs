// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabgrid_engine::{DEFAULT_BATCH_SIZE, EngineConfig, RebuildPolicy};
use tracing_subscriber::EnvFilter;

pub const APP_NAME: &str = "tabgrid";

const CONFIG_VERSION: i64 = 1;
const DEFAULT_BUSY_TIMEOUT: &str = "1500ms";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub enrichment: Enrichment,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub storage: Storage,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            engine: EngineSection::default(),
            render: Render::default(),
            enrichment: Enrichment::default(),
            logging: Logging::default(),
            storage: Storage::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    pub busy_timeout: Option<String>,
    pub rebuild_policy: Option<String>,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            busy_timeout: Some(DEFAULT_BUSY_TIMEOUT.to_owned()),
            rebuild_policy: Some(RebuildPolicy::default().as_str().to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Render {
    pub batch_size: Option<i64>,
}

impl Default for Render {
    fn default() -> Self {
        Self {
            batch_size: Some(DEFAULT_BATCH_SIZE as i64),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Enrichment {
    pub enabled: Option<bool>,
}

impl Default for Enrichment {
    fn default() -> Self {
        Self {
            enabled: Some(true),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub preferences_path: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TABGRID_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TABGRID_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version. Add `version = 1` at the top",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(timeout) = &self.engine.busy_timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "engine.busy_timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(policy) = &self.engine.rebuild_policy
            && RebuildPolicy::parse(policy).is_none()
        {
            bail!(
                "engine.rebuild_policy in {} must be \"always\" or \"reuse_if_fresh\", got {:?}",
                path.display(),
                policy
            );
        }

        if let Some(batch_size) = self.render.batch_size
            && batch_size <= 0
        {
            bail!(
                "render.batch_size in {} must be positive, got {}",
                path.display(),
                batch_size
            );
        }

        if let Some(level) = &self.logging.level
            && EnvFilter::try_new(level).is_err()
        {
            bail!(
                "logging.level in {} is not a valid filter directive: {:?}",
                path.display(),
                level
            );
        }

        Ok(())
    }

    pub fn busy_timeout(&self) -> Result<Duration> {
        parse_duration(
            self.engine
                .busy_timeout
                .as_deref()
                .unwrap_or(DEFAULT_BUSY_TIMEOUT),
        )
    }

    pub fn rebuild_policy(&self) -> RebuildPolicy {
        self.engine
            .rebuild_policy
            .as_deref()
            .and_then(RebuildPolicy::parse)
            .unwrap_or_default()
    }

    pub fn batch_size(&self) -> usize {
        self.render
            .batch_size
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn enrichment_enabled(&self) -> bool {
        self.enrichment.enabled.unwrap_or(true)
    }

    pub fn log_level(&self) -> &str {
        self.logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.logging.file {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(data_dir()?.join(format!("{APP_NAME}.log"))),
        }
    }

    pub fn preferences_path(&self) -> Result<PathBuf> {
        match &self.storage.preferences_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => Ok(data_dir()?.join("preferences.toml")),
        }
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        Ok(EngineConfig {
            busy_timeout: self.busy_timeout()?,
            batch_size: self.batch_size(),
            rebuild_policy: self.rebuild_policy(),
            enrichment_enabled: self.enrichment_enabled(),
        })
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tabgrid config\n# Place this file at: {}\n\nversion = 1\n\n[engine]\n# How long the busy indicator may stay up before it is cleared anyway.\nbusy_timeout = \"{}\"\n# \"always\" rebuilds a tab on every switch; \"reuse_if_fresh\" remounts it.\nrebuild_policy = \"{}\"\n\n[render]\nbatch_size = {}\n\n[enrichment]\nenabled = true\n\n[logging]\nlevel = \"{}\"\n# Optional. Default is the platform data dir (for example ~/.local/share/tabgrid/tabgrid.log)\n# file = \"/absolute/path/to/tabgrid.log\"\n\n[storage]\n# Optional. Default is the platform data dir (for example ~/.local/share/tabgrid/preferences.toml)\n# preferences_path = \"/absolute/path/to/preferences.toml\"\n",
            path.display(),
            DEFAULT_BUSY_TIMEOUT,
            RebuildPolicy::default().as_str(),
            DEFAULT_BATCH_SIZE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn data_dir() -> Result<PathBuf> {
    let root = dirs::data_dir()
        .ok_or_else(|| anyhow!("cannot resolve data directory; set paths in [logging] and [storage]"))?;
    Ok(root.join(APP_NAME))
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }

    bail!("invalid duration {raw:?}; use <N>ms or <N>s (for example 1500ms or 2s)")
}
