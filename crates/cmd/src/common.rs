// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use regionstats::{
    EngineConfig, Extractor, MemoryBackend, PeriodType, PeriodWindow, load_catalog, load_config,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Window options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct WindowArgs {
    /// First day, YYYY-MM-DD or YYYY-MM
    #[arg(long)]
    pub start: String,

    /// Last day (inclusive), YYYY-MM-DD or YYYY-MM for the whole month
    #[arg(long)]
    pub end: String,

    /// IANA time zone of the period boundaries
    #[arg(long, default_value = "UTC")]
    pub time_zone: String,

    /// Output period type: daily, weekly or monthly
    #[arg(long, default_value = "daily")]
    pub period_type: String,
}

impl WindowArgs {
    pub fn window(&self) -> Result<PeriodWindow> {
        let period_type: PeriodType = self
            .period_type
            .parse()
            .with_context(|| format!("Invalid --period-type {}", self.period_type))?;
        Ok(PeriodWindow::new(&self.start, &self.end)
            .with_time_zone(&self.time_zone)
            .with_period_type(period_type))
    }
}

/// Backend and engine options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Image catalog served by the in-memory backend (YAML or JSON)
    #[arg(long)]
    pub catalog: PathBuf,

    /// Engine configuration file (YAML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl BackendArgs {
    pub fn extractor(&self) -> Result<Extractor<MemoryBackend>> {
        let catalog = load_catalog(&self.catalog)
            .with_context(|| format!("Failed to load catalog {}", self.catalog.display()))?;
        let config = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?,
            None => EngineConfig::default(),
        };
        Ok(Extractor::with_config(MemoryBackend::new(catalog), config)?)
    }
}

/// Read a YAML or JSON document
pub fn load_document<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON {}", path.display()))?
    } else {
        serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse YAML {}", path.display()))?
    };
    Ok(value)
}

/// Write `value` as pretty JSON followed by a newline
pub fn write_json<T: Serialize, W: Write>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
