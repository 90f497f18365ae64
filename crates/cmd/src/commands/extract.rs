// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use diagnostics::*;
use regionstats::{DatasetDescriptor, FeatureCollection};

use crate::common::{BackendArgs, WindowArgs, load_document, write_json};

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub backend: BackendArgs,

    /// Dataset descriptor (YAML or JSON)
    #[arg(long)]
    pub dataset: PathBuf,

    /// GeoJSON FeatureCollection of the features to aggregate over
    #[arg(long)]
    pub features: PathBuf,

    #[command(flatten)]
    pub window: WindowArgs,
}

/// Extract one value per feature per period and write the records as JSON
pub async fn extract_command<W: Write>(args: &ExtractArgs, out: &mut W) -> Result<()> {
    let extractor = args.backend.extractor()?;
    let descriptor: DatasetDescriptor = load_document(&args.dataset)?;
    let features: FeatureCollection = load_document(&args.features)?;
    let window = args.window.window()?;

    let dataset_id = &descriptor.dataset_id;
    let feature_count = features.features.len();
    debug!(
        "Extracting {dataset_id} for {feature_count} features",
        dataset_id: dataset_id,
        feature_count: feature_count
    );

    let records = extractor
        .extract(&descriptor, &window, &features.features)
        .await
        .with_context(|| format!("Extraction from {dataset_id} failed"))?;
    write_json(out, &records)
}
