// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Per-bucket composites for collections finer than the requested output
//!
//! An hourly collection queried for daily output is reduced into one image
//! per zone-local day before any spatial reduction. Bucket boundaries come
//! from the window's sub-periods, so the composite's start time maps straight
//! back through the period lookup.

use crate::backend::{CollectionQuery, CompositeBucket, ImageSource};
use crate::config::EngineConfig;
use crate::descriptor::ResolvedDataset;
use crate::period::{TranslatedWindow, local_midnight};
use diagnostics::*;

/// Composite buckets for every sub-period of the window
#[must_use]
pub fn composite_buckets(window: &TranslatedWindow) -> Vec<CompositeBucket> {
    window
        .periods
        .periods()
        .iter()
        .map(|period| CompositeBucket {
            index: period.start.format("%Y%m%d").to_string(),
            start: local_midnight(&window.time_zone, period.start),
            end: local_midnight(&window.time_zone, period.end),
        })
        .collect()
}

/// The images the aggregator reduces: composites when the dataset's native
/// granularity is configured for synthesis into the window's, otherwise
/// the filtered collection itself.
#[must_use]
pub fn plan_source(
    config: &EngineConfig,
    dataset: &ResolvedDataset,
    window: &TranslatedWindow,
    query: CollectionQuery,
) -> ImageSource {
    let synthesize = dataset
        .period_type
        .is_some_and(|native| config.synthesizes(native, window.period_type));
    if !synthesize {
        return ImageSource::Collection(query);
    }

    let buckets = composite_buckets(window);
    let count = buckets.len();
    let dataset_id = &dataset.dataset_id;
    let reducer = dataset.period_reducer.name();
    debug!(
        "Compositing {dataset_id} into {count} buckets with {reducer}",
        dataset_id: dataset_id,
        count: count,
        reducer: reducer
    );
    ImageSource::Composites {
        collection: query,
        buckets,
        reducer: dataset.period_reducer,
        required_bands: dataset.bands.clone(),
    }
}
