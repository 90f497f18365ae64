// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Top-level extraction entry points
//!
//! Every configuration problem is found before the first remote call: the
//! whole request (all band sub-requests, the window, the feature geometry)
//! is resolved up front and only then are pipelines run.

use crate::aggregate::{build_reduction, collection_query, ensure_images};
use crate::backend::{RasterBackend, SeriesReduction};
use crate::config::EngineConfig;
use crate::context::ExtractContext;
use crate::descriptor::{DatasetDescriptor, ResolvedDataset};
use crate::error::{ConfigError, Result};
use crate::geometry::{Feature, Geometry};
use crate::mapper::{Extraction, ResultRecord, SeriesRecord, map_records, map_series};
use crate::paginate::fetch_all;
use crate::period::{PeriodWindow, TranslatedWindow};
use crate::reducer::OutputNaming;
use crate::scale::{min_polygon_area, select_series_scale};
use diagnostics::*;
use futures::future::try_join_all;
use std::sync::Arc;

/// A fully validated extraction request
struct Prepared {
    runs: Vec<ResolvedDataset>,
    window: TranslatedWindow,
    min_area: Option<f64>,
}

/// Runs extraction requests against one backend
#[derive(Debug, Clone)]
pub struct Extractor<B> {
    backend: B,
    config: EngineConfig,
}

impl<B: RasterBackend> Extractor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(backend: B, config: EngineConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { backend, config })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Extract one value per feature per period.
    ///
    /// Multi-band descriptors run one pipeline per band concurrently; the
    /// bands parser then combines the per-band arrays. Without a bands parser
    /// the per-band arrays are returned as they are, in band order.
    pub async fn extract(
        &self,
        descriptor: &DatasetDescriptor,
        window: &PeriodWindow,
        features: &[Feature],
    ) -> Result<Extraction> {
        let ctx = ExtractContext::new();
        self.extract_with_context(&ctx, descriptor, window, features)
            .await
    }

    pub async fn extract_with_context(
        &self,
        ctx: &ExtractContext,
        descriptor: &DatasetDescriptor,
        window: &PeriodWindow,
        features: &[Feature],
    ) -> Result<Extraction> {
        let request_id = ctx.request_id();
        let dataset_id = &descriptor.dataset_id;
        info!(
            "Extracting {dataset_id} for request {request_id}",
            dataset_id: dataset_id,
            request_id: request_id
        );

        let prepared = self.prepare(descriptor, window, features)?;
        let days = prepared.window.days();
        let feature_count = features.len();
        let estimate = days.saturating_mul(feature_count as i64);
        info!(
            "Expecting up to {estimate} values ({days} days x {feature_count} features)",
            estimate: estimate,
            days: days,
            feature_count: feature_count
        );

        let features = Arc::new(features.to_vec());
        let runs = prepared
            .runs
            .iter()
            .map(|dataset| self.run(ctx, dataset, &prepared, features.clone()));
        let mut per_band = try_join_all(runs).await?;

        let records = match (&descriptor.bands_parser, descriptor.is_multi_band()) {
            (Some(parser), true) => Extraction::Records(parser.apply(per_band)),
            (None, true) => Extraction::Bands(per_band),
            (_, false) => Extraction::Records(per_band.pop().unwrap_or_default()),
        };

        let count = records.len();
        let remote_calls = ctx.stats().remote_calls;
        info!(
            "Extracted {count} records from {dataset_id} in {remote_calls} remote calls",
            count: count,
            dataset_id: dataset_id,
            remote_calls: remote_calls
        );
        Ok(records)
    }

    /// Reduce a single geometry per image over the window.
    ///
    /// Rows are keyed by the image index; output names follow the band names
    /// (or `<band>_<statistic>` for shared inputs over several bands).
    pub async fn time_series(
        &self,
        descriptor: &DatasetDescriptor,
        window: &PeriodWindow,
        geometry: &Geometry,
    ) -> Result<Vec<SeriesRecord>> {
        let ctx = ExtractContext::new();
        self.time_series_with_context(&ctx, descriptor, window, geometry)
            .await
    }

    pub async fn time_series_with_context(
        &self,
        ctx: &ExtractContext,
        descriptor: &DatasetDescriptor,
        window: &PeriodWindow,
        geometry: &Geometry,
    ) -> Result<Vec<SeriesRecord>> {
        let dataset = descriptor.resolve()?;
        let window = window.translate()?;
        let area = if geometry.is_polygonal() {
            Some(geometry.area().ok_or_else(|| {
                ConfigError::InvalidGeometry(geometry.type_name().to_string())
            })?)
        } else {
            None
        };

        let dataset_id = &dataset.dataset_id;
        let kind = geometry.type_name();
        info!(
            "Reducing {dataset_id} over one {kind} per image",
            dataset_id: dataset_id,
            kind: kind
        );

        let query = collection_query(&dataset, &window);
        let _ = ensure_images(&self.backend, ctx, &query, &window).await?;
        let scale = select_series_scale(&self.backend, ctx, &query, area).await?;

        let reduction = SeriesReduction {
            collection: query,
            reducer: dataset.reducer.clone(),
            geometry: geometry.clone(),
            scale,
        };
        let rows = ctx.remote(self.backend.reduce_series(&reduction)).await?;
        Ok(map_series(rows, dataset.value_parser.as_ref()))
    }

    fn prepare(
        &self,
        descriptor: &DatasetDescriptor,
        window: &PeriodWindow,
        features: &[Feature],
    ) -> std::result::Result<Prepared, ConfigError> {
        if features.is_empty() {
            return Err(ConfigError::NoFeatures);
        }
        let window = window.translate()?;
        let min_area = min_polygon_area(features)?;

        let runs = match &descriptor.bands {
            Some(requests) if descriptor.is_multi_band() => {
                let arity = descriptor.bands_parser.as_ref().and_then(|p| p.arity());
                if let Some(arity) = arity.filter(|a| *a != requests.len()) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "bands parser expects {arity} bands, descriptor has {}",
                        requests.len()
                    )));
                }
                requests
                    .iter()
                    .map(|request| descriptor.for_band(request).resolve())
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            _ => vec![descriptor.resolve()?],
        };

        Ok(Prepared {
            runs,
            window,
            min_area,
        })
    }

    async fn run(
        &self,
        ctx: &ExtractContext,
        dataset: &ResolvedDataset,
        prepared: &Prepared,
        features: Arc<Vec<Feature>>,
    ) -> Result<Vec<ResultRecord>> {
        let reduction = build_reduction(
            &self.backend,
            ctx,
            &self.config,
            dataset,
            &prepared.window,
            features,
            prepared.min_area,
        )
        .await?;
        let raw = fetch_all(&self.backend, ctx, &reduction, self.config.page_limit).await?;

        let primary = dataset
            .reducer
            .outputs(&dataset.bands, OutputNaming::PerFeature)
            .into_iter()
            .next()
            .map(|output| output.name)
            .unwrap_or_else(|| dataset.reducer.primary().name().to_string());
        Ok(map_records(
            raw,
            &prepared.window.periods,
            &primary,
            dataset.value_parser.as_ref(),
            ctx,
        ))
    }
}
