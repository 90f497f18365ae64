// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Sampling scale selection
//!
//! Order-sensitive and unweighted reducers only see pixels whose centre lies
//! inside a polygon. A polygon smaller than one pixel may contain no centre
//! at the native scale, so such requests are sampled at `sqrt(min_area) / 2`.

use crate::backend::{CollectionQuery, RasterBackend, SamplingScale};
use crate::context::ExtractContext;
use crate::error::{ConfigError, Result};
use crate::geometry::Feature;
use crate::reducer::Reducer;
use diagnostics::*;

/// Smallest positive polygon area over `features`, in square meters.
///
/// Non-polygon features and zero-area polygons are ignored.
pub fn min_polygon_area(features: &[Feature]) -> std::result::Result<Option<f64>, ConfigError> {
    let mut min: Option<f64> = None;
    for feature in features {
        if let Some(area) = feature.polygon_area()?.filter(|a| *a > 0.0) {
            min = Some(min.map_or(area, |m| m.min(area)));
        }
    }
    Ok(min)
}

/// `sqrt(min_area) / 2` when the smallest polygon is under one pixel,
/// otherwise the nominal scale.
#[must_use]
pub fn corrected_scale(nominal: f64, min_area: f64) -> f64 {
    if min_area < nominal * nominal {
        min_area.sqrt() / 2.0
    } else {
        nominal
    }
}

/// Choose the sampling scale for a region reduction.
///
/// The nominal scale is fetched only when a correction could apply.
pub async fn select_scale<B: RasterBackend + ?Sized>(
    backend: &B,
    ctx: &ExtractContext,
    reducer: &Reducer,
    query: &CollectionQuery,
    min_area: Option<f64>,
) -> Result<SamplingScale> {
    if !reducer.needs_fine_sampling() {
        return Ok(SamplingScale::Native);
    }
    let Some(min_area) = min_area else {
        return Ok(SamplingScale::Native);
    };
    fetch_and_correct(backend, ctx, query, min_area).await
}

/// Scale for a single-geometry series: polygons are always checked.
pub async fn select_series_scale<B: RasterBackend + ?Sized>(
    backend: &B,
    ctx: &ExtractContext,
    query: &CollectionQuery,
    area: Option<f64>,
) -> Result<SamplingScale> {
    match area {
        Some(area) if area > 0.0 => fetch_and_correct(backend, ctx, query, area).await,
        _ => Ok(SamplingScale::Native),
    }
}

async fn fetch_and_correct<B: RasterBackend + ?Sized>(
    backend: &B,
    ctx: &ExtractContext,
    query: &CollectionQuery,
    min_area: f64,
) -> Result<SamplingScale> {
    let nominal = ctx.remote(backend.nominal_scale(query)).await?;
    let scale = corrected_scale(nominal, min_area);
    if scale < nominal {
        let dataset_id = &query.dataset_id;
        debug!(
            "Sampling {dataset_id} at {scale} m instead of nominal {nominal} m",
            dataset_id: dataset_id,
            scale: scale,
            nominal: nominal
        );
    }
    Ok(SamplingScale::Meters(scale))
}
