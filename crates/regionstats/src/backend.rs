// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Capability contract with the raster-analysis backend
//!
//! The engine never computes statistics itself. It builds declarative
//! requests (which collection, which composites, which reducer, at what
//! scale, over which features) and hands them to a [`RasterBackend`]. Every
//! method is one remote evaluation and one suspension point.

use crate::error::BackendError;
use crate::geometry::{Feature, Geometry};
use crate::reducer::{Reducer, Statistic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An image collection filtered by band selection and date interval.
///
/// Images whose start time falls in `[start, end)` are selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionQuery {
    pub dataset_id: String,
    pub bands: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Spatial sampling resolution for a reduction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SamplingScale {
    /// The collection's own nominal scale
    Native,
    Meters(f64),
}

/// One synthetic composite: the source images starting in `[start, end)`
/// reduced pixel-wise into a single image labelled `index`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeBucket {
    pub index: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The images a region reduction runs over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImageSource {
    /// The filtered collection as stored
    Collection(CollectionQuery),
    /// Per-bucket composites of the filtered collection. Buckets without an
    /// image carrying every band in `required_bands` are dropped.
    Composites {
        collection: CollectionQuery,
        buckets: Vec<CompositeBucket>,
        reducer: Statistic,
        required_bands: Vec<String>,
    },
}

impl ImageSource {
    #[must_use]
    pub fn collection(&self) -> &CollectionQuery {
        match self {
            ImageSource::Collection(query) => query,
            ImageSource::Composites { collection, .. } => collection,
        }
    }
}

/// Every feature crossed with every image of `source`, flattened.
///
/// Each resulting record carries the feature id, the zone-local date of the
/// image start (`YYYY-MM-DD` in `time_zone`) and the reducer outputs.
#[derive(Debug, Clone)]
pub struct RegionReduction {
    pub source: ImageSource,
    pub reducer: Reducer,
    pub scale: SamplingScale,
    pub features: Arc<Vec<Feature>>,
    pub time_zone: Tz,
}

/// Offset-bounded slice of a flattened result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// A record as the backend returns it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub feature_id: String,
    /// Native period label
    pub period: String,
    pub values: BTreeMap<String, f64>,
}

/// One reduction per image over a single geometry
#[derive(Debug, Clone)]
pub struct SeriesReduction {
    pub collection: CollectionQuery,
    pub reducer: Reducer,
    pub geometry: Geometry,
    pub scale: SamplingScale,
}

/// Reduced values of one image, keyed by the image's index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub index: String,
    pub values: BTreeMap<String, f64>,
}

#[async_trait]
pub trait RasterBackend: Send + Sync {
    /// Number of images in the filtered collection
    async fn image_count(&self, query: &CollectionQuery) -> Result<usize, BackendError>;

    /// Nominal scale in meters of the first band of the first image
    async fn nominal_scale(&self, query: &CollectionQuery) -> Result<f64, BackendError>;

    /// Total number of records a region reduction yields
    async fn record_count(&self, reduction: &RegionReduction) -> Result<usize, BackendError>;

    /// One page of a region reduction's records, in a stable order
    async fn fetch_records(
        &self,
        reduction: &RegionReduction,
        page: Page,
    ) -> Result<Vec<RawRecord>, BackendError>;

    /// Per-image reduction over one geometry
    async fn reduce_series(
        &self,
        reduction: &SeriesReduction,
    ) -> Result<Vec<SeriesRow>, BackendError>;
}

#[async_trait]
impl<B: RasterBackend + ?Sized> RasterBackend for Arc<B> {
    async fn image_count(&self, query: &CollectionQuery) -> Result<usize, BackendError> {
        (**self).image_count(query).await
    }

    async fn nominal_scale(&self, query: &CollectionQuery) -> Result<f64, BackendError> {
        (**self).nominal_scale(query).await
    }

    async fn record_count(&self, reduction: &RegionReduction) -> Result<usize, BackendError> {
        (**self).record_count(reduction).await
    }

    async fn fetch_records(
        &self,
        reduction: &RegionReduction,
        page: Page,
    ) -> Result<Vec<RawRecord>, BackendError> {
        (**self).fetch_records(reduction, page).await
    }

    async fn reduce_series(
        &self,
        reduction: &SeriesReduction,
    ) -> Result<Vec<SeriesRow>, BackendError> {
        (**self).reduce_series(reduction).await
    }
}
