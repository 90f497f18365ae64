// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! In-memory raster backend
//!
//! Images carry per-band pixel samples: `pixels` for the image as a whole and
//! optional per-feature samples for the pixels falling inside a feature. A
//! polygon smaller than one pixel at the sampling scale contains no pixel
//! centre, so order-sensitive and unweighted reductions yield nothing for it,
//! while weighted reductions still see the partially covered pixels.
//!
//! ```yaml
//! collections:
//!   ECMWF/ERA5_LAND/DAILY_AGGR:
//!     - index: "20230101"
//!       start: 2023-01-01T00:00:00Z
//!       scale: 11132
//!       bands:
//!         temperature_2m:
//!           pixels: [271.0, 272.5]
//!           features:
//!             ou1: [272.0]
//! ```

use crate::backend::{
    CollectionQuery, CompositeBucket, ImageSource, Page, RasterBackend, RawRecord,
    RegionReduction, SamplingScale, SeriesReduction, SeriesRow,
};
use crate::error::{BackendError, ConfigError};
use crate::period::native_label;
use crate::reducer::{OutputNaming, Reducer, Statistic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

fn default_scale() -> f64 {
    1000.0
}

/// Pixel samples of one band
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BandPixels {
    /// Samples for any region without its own entry in `features`
    #[serde(default)]
    pub pixels: Vec<f64>,
    /// Samples inside specific features, by feature id
    #[serde(default)]
    pub features: BTreeMap<String, Vec<f64>>,
}

impl BandPixels {
    fn samples(&self, feature_id: Option<&str>) -> &[f64] {
        feature_id
            .and_then(|id| self.features.get(id))
            .unwrap_or(&self.pixels)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryImage {
    pub index: String,
    pub start: DateTime<Utc>,
    /// Nominal scale in meters
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub bands: BTreeMap<String, BandPixels>,
}

impl MemoryImage {
    pub fn new(index: impl Into<String>, start: DateTime<Utc>) -> Self {
        Self {
            index: index.into(),
            start,
            scale: default_scale(),
            bands: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_band(mut self, band: impl Into<String>, pixels: Vec<f64>) -> Self {
        self.bands.entry(band.into()).or_default().pixels = pixels;
        self
    }

    #[must_use]
    pub fn with_feature_pixels(
        mut self,
        band: impl Into<String>,
        feature_id: impl Into<String>,
        pixels: Vec<f64>,
    ) -> Self {
        let _ = self
            .bands
            .entry(band.into())
            .or_default()
            .features
            .insert(feature_id.into(), pixels);
        self
    }

    fn has_bands(&self, bands: &[String]) -> bool {
        bands.iter().all(|b| self.bands.contains_key(b))
    }
}

/// Image collections by dataset id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCatalog {
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<MemoryImage>>,
}

impl MemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_collection(
        mut self,
        dataset_id: impl Into<String>,
        images: Vec<MemoryImage>,
    ) -> Self {
        let _ = self.collections.insert(dataset_id.into(), images);
        self
    }

    /// Parse a catalog from YAML (or JSON)
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml_ng::from_str(content).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }
}

/// Load a catalog file
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<MemoryCatalog, ConfigError> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        ConfigError::InvalidConfig(format!(
            "failed to read catalog {}: {e}",
            path.as_ref().display()
        ))
    })?;
    MemoryCatalog::from_yaml(&content)
}

/// A recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    ImageCount { dataset_id: String },
    NominalScale { dataset_id: String },
    RecordCount { scale: SamplingScale },
    FetchRecords { page: Page },
    ReduceSeries { scale: SamplingScale },
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<BackendCall>,
    failing_offsets: BTreeSet<usize>,
    failure: Option<BackendError>,
}

impl State {
    fn record(&mut self, call: BackendCall) -> Result<(), BackendError> {
        self.calls.push(call);
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Backend over a [`MemoryCatalog`] that records every call it receives
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    catalog: Arc<MemoryCatalog>,
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Fail the page fetch starting at `offset`
    pub async fn fail_page_at(&self, offset: usize) {
        let _ = self.state.lock().await.failing_offsets.insert(offset);
    }

    /// Fail every subsequent call with `error`
    pub async fn fail_all(&self, error: BackendError) {
        self.state.lock().await.failure = Some(error);
    }

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    /// Offsets of the page fetches received, sorted
    pub async fn fetched_offsets(&self) -> Vec<usize> {
        let mut offsets: Vec<usize> = self
            .state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::FetchRecords { page } => Some(page.offset),
                _ => None,
            })
            .collect();
        offsets.sort_unstable();
        offsets
    }

    /// Scales requested by record counts and series reductions
    pub async fn sampling_scales(&self) -> Vec<SamplingScale> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::RecordCount { scale } | BackendCall::ReduceSeries { scale } => {
                    Some(*scale)
                }
                _ => None,
            })
            .collect()
    }

    fn filtered(&self, query: &CollectionQuery) -> Result<Vec<&MemoryImage>, BackendError> {
        let images = self
            .catalog
            .collections
            .get(&query.dataset_id)
            .ok_or_else(|| BackendError::CollectionNotFound(query.dataset_id.clone()))?;
        let mut selected: Vec<&MemoryImage> = images
            .iter()
            .filter(|image| image.start >= query.start && image.start < query.end)
            .collect();
        selected.sort_by_key(|image| image.start);
        Ok(selected)
    }

    fn source_images(&self, source: &ImageSource) -> Result<Vec<MemoryImage>, BackendError> {
        match source {
            ImageSource::Collection(query) => {
                Ok(self.filtered(query)?.into_iter().cloned().collect())
            }
            ImageSource::Composites {
                collection,
                buckets,
                reducer,
                required_bands,
            } => {
                let images = self.filtered(collection)?;
                Ok(buckets
                    .iter()
                    .filter_map(|bucket| {
                        composite(bucket, &images, &collection.bands, required_bands, *reducer)
                    })
                    .collect())
            }
        }
    }

    fn records(&self, reduction: &RegionReduction) -> Result<Vec<RawRecord>, BackendError> {
        let images = self.source_images(&reduction.source)?;
        let bands = &reduction.source.collection().bands;
        let mut records = Vec::new();
        for image in &images {
            let period = native_label(&reduction.time_zone, image.start);
            for feature in reduction.features.iter() {
                let values = reduce_image(
                    image,
                    &reduction.reducer,
                    bands,
                    OutputNaming::PerFeature,
                    Some(&feature.id),
                    feature.geometry.area(),
                    reduction.scale,
                );
                if !values.is_empty() {
                    records.push(RawRecord {
                        feature_id: feature.id.clone(),
                        period: period.clone(),
                        values,
                    });
                }
            }
        }
        Ok(records)
    }
}

/// Pixel-wise temporal reduction of the images starting inside `bucket`
fn composite(
    bucket: &CompositeBucket,
    images: &[&MemoryImage],
    bands: &[String],
    required_bands: &[String],
    reducer: Statistic,
) -> Option<MemoryImage> {
    let members: Vec<&MemoryImage> = images
        .iter()
        .copied()
        .filter(|image| image.start >= bucket.start && image.start < bucket.end)
        .filter(|image| image.has_bands(required_bands))
        .collect();
    let first = members.first()?;

    let mut composite = MemoryImage::new(bucket.index.clone(), bucket.start).with_scale(first.scale);
    for band in bands {
        let layers: Vec<&BandPixels> = members.iter().filter_map(|m| m.bands.get(band)).collect();
        let feature_ids: BTreeSet<&String> = layers.iter().flat_map(|l| l.features.keys()).collect();
        let mut pixels = BandPixels {
            pixels: pixelwise(layers.iter().map(|l| l.pixels.as_slice()), reducer),
            features: BTreeMap::new(),
        };
        for id in feature_ids {
            let _ = pixels.features.insert(
                id.clone(),
                pixelwise(layers.iter().map(|l| l.samples(Some(id.as_str()))), reducer),
            );
        }
        let _ = composite.bands.insert(band.clone(), pixels);
    }
    Some(composite)
}

fn pixelwise<'a>(layers: impl Iterator<Item = &'a [f64]>, reducer: Statistic) -> Vec<f64> {
    let layers: Vec<&[f64]> = layers.collect();
    let width = layers.iter().map(|l| l.len()).max().unwrap_or(0);
    (0..width)
        .filter_map(|i| {
            let stack: Vec<f64> = layers.iter().filter_map(|l| l.get(i).copied()).collect();
            reducer.apply(&stack)
        })
        .collect()
}

/// Reduce one image over one region. `area` is `None` for points and lines.
fn reduce_image(
    image: &MemoryImage,
    reducer: &Reducer,
    bands: &[String],
    naming: OutputNaming,
    feature_id: Option<&str>,
    area: Option<f64>,
    scale: SamplingScale,
) -> BTreeMap<String, f64> {
    let scale = match scale {
        SamplingScale::Native => image.scale,
        SamplingScale::Meters(meters) => meters,
    };
    let holds_pixel_centre = area.is_none_or(|a| a >= scale * scale);

    let mut values = BTreeMap::new();
    for output in reducer.outputs(bands, naming) {
        if !holds_pixel_centre && (reducer.is_unweighted() || output.statistic.is_order_sensitive())
        {
            continue;
        }
        let Some(layer) = image.bands.get(&output.band) else {
            continue;
        };
        if let Some(value) = output.statistic.apply(layer.samples(feature_id)) {
            let _ = values.insert(output.name, value);
        }
    }
    values
}

#[async_trait]
impl RasterBackend for MemoryBackend {
    async fn image_count(&self, query: &CollectionQuery) -> Result<usize, BackendError> {
        self.state.lock().await.record(BackendCall::ImageCount {
            dataset_id: query.dataset_id.clone(),
        })?;
        Ok(self.filtered(query)?.len())
    }

    async fn nominal_scale(&self, query: &CollectionQuery) -> Result<f64, BackendError> {
        self.state.lock().await.record(BackendCall::NominalScale {
            dataset_id: query.dataset_id.clone(),
        })?;
        self.filtered(query)?
            .first()
            .map(|image| image.scale)
            .ok_or_else(|| BackendError::Evaluation("image collection is empty".to_string()))
    }

    async fn record_count(&self, reduction: &RegionReduction) -> Result<usize, BackendError> {
        self.state.lock().await.record(BackendCall::RecordCount {
            scale: reduction.scale,
        })?;
        Ok(self.records(reduction)?.len())
    }

    async fn fetch_records(
        &self,
        reduction: &RegionReduction,
        page: Page,
    ) -> Result<Vec<RawRecord>, BackendError> {
        {
            let mut state = self.state.lock().await;
            state.record(BackendCall::FetchRecords { page })?;
            if state.failing_offsets.contains(&page.offset) {
                return Err(BackendError::Transport(format!(
                    "connection reset fetching offset {}",
                    page.offset
                )));
            }
        }
        // Let sibling page fetches interleave.
        tokio::task::yield_now().await;
        Ok(self
            .records(reduction)?
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn reduce_series(
        &self,
        reduction: &SeriesReduction,
    ) -> Result<Vec<SeriesRow>, BackendError> {
        self.state.lock().await.record(BackendCall::ReduceSeries {
            scale: reduction.scale,
        })?;
        let area = reduction.geometry.area();
        Ok(self
            .filtered(&reduction.collection)?
            .into_iter()
            .filter_map(|image| {
                let values = reduce_image(
                    image,
                    &reduction.reducer,
                    &reduction.collection.bands,
                    OutputNaming::PerRegion,
                    None,
                    area,
                    reduction.scale,
                );
                (!values.is_empty()).then(|| SeriesRow {
                    index: image.index.clone(),
                    values,
                })
            })
            .collect())
    }
}
