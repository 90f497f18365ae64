// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Region reductions over a feature set

use crate::backend::{CollectionQuery, RasterBackend, RegionReduction};
use crate::config::EngineConfig;
use crate::context::ExtractContext;
use crate::descriptor::ResolvedDataset;
use crate::error::{ExtractError, Result};
use crate::geometry::Feature;
use crate::period::TranslatedWindow;
use crate::scale::select_scale;
use crate::synthesize::plan_source;
use diagnostics::*;
use std::sync::Arc;

/// The dataset's bands filtered to the window's backend boundaries
#[must_use]
pub fn collection_query(dataset: &ResolvedDataset, window: &TranslatedWindow) -> CollectionQuery {
    CollectionQuery {
        dataset_id: dataset.dataset_id.clone(),
        bands: dataset.bands.clone(),
        start: window.start,
        end: window.end,
    }
}

/// Fail with the no-data error when the filtered collection is empty
pub async fn ensure_images<B: RasterBackend + ?Sized>(
    backend: &B,
    ctx: &ExtractContext,
    query: &CollectionQuery,
    window: &TranslatedWindow,
) -> Result<usize> {
    let count = ctx.remote(backend.image_count(query)).await?;
    if count == 0 {
        let dataset_id = &query.dataset_id;
        warn!("No images in {dataset_id} for the selected period", dataset_id: dataset_id);
        return Err(ExtractError::NoData {
            dataset_id: query.dataset_id.clone(),
            start: window.first_day.to_string(),
            end: window.last_day.to_string(),
        });
    }
    Ok(count)
}

/// Build the region reduction for one single-band pipeline run.
///
/// `min_area` is the smallest polygon area of `features`, computed up front
/// so that malformed geometry fails before any remote call.
pub async fn build_reduction<B: RasterBackend + ?Sized>(
    backend: &B,
    ctx: &ExtractContext,
    config: &EngineConfig,
    dataset: &ResolvedDataset,
    window: &TranslatedWindow,
    features: Arc<Vec<Feature>>,
    min_area: Option<f64>,
) -> Result<RegionReduction> {
    let query = collection_query(dataset, window);
    let images = ensure_images(backend, ctx, &query, window).await?;
    let dataset_id = &dataset.dataset_id;
    debug!(
        "{dataset_id} has {images} images in window",
        dataset_id: dataset_id,
        images: images
    );

    let scale = select_scale(backend, ctx, &dataset.reducer, &query, min_area).await?;
    let source = plan_source(config, dataset, window, query);

    Ok(RegionReduction {
        source,
        reducer: dataset.reducer.clone(),
        scale,
        features,
        time_zone: window.time_zone,
    })
}
