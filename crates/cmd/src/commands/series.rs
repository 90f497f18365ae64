// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use regionstats::{DatasetDescriptor, Geometry};

use crate::common::{BackendArgs, WindowArgs, load_document, write_json};

#[derive(Args, Debug, Clone)]
pub struct SeriesArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Dataset descriptor (YAML or JSON)
    #[arg(long)]
    pub dataset: PathBuf,

    /// GeoJSON geometry to reduce over
    #[arg(long)]
    pub geometry: PathBuf,

    #[command(flatten)]
    pub window: WindowArgs,
}

/// Reduce one geometry per image and write the rows as JSON
pub async fn series_command<W: Write>(args: &SeriesArgs, out: &mut W) -> Result<()> {
    let extractor = args.backend.extractor()?;
    let descriptor: DatasetDescriptor = load_document(&args.dataset)?;
    let geometry: Geometry = load_document(&args.geometry)?;
    let window = args.window.window()?;

    let rows = extractor
        .time_series(&descriptor, &window, &geometry)
        .await
        .with_context(|| format!("Time series from {} failed", descriptor.dataset_id))?;
    write_json(out, &rows)
}
