// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Tracing setup. The terminal belongs to the grid, so events go to a log
//! file. Filter priority: `TABGRID_LOG`, then `RUST_LOG`, then
//! `[logging].level` from the config.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::config::DEFAULT_LOG_LEVEL;

const LOG_ENV: &str = "TABGRID_LOG";

pub fn init(level: &str, path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(build_env_filter(level))
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    tracing::info!(path = %path.display(), "tracing initialized");
    Ok(path.to_path_buf())
}

fn build_env_filter(configured: &str) -> EnvFilter {
    if let Ok(directives) = std::env::var(LOG_ENV)
        && let Ok(filter) = EnvFilter::try_new(&directives)
    {
        return filter;
    }

    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
}
