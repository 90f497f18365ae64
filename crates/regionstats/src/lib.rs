// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Time-series statistics from raster collections over geographic features
//!
//! Given a dataset descriptor, a period window and a set of features, the
//! [`Extractor`] asks a [`RasterBackend`] for one reduced value per feature per
//! period and returns records keyed by the application's period ids.

pub mod aggregate;
pub mod backend;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod mapper;
pub mod memory;
pub mod paginate;
pub mod period;
pub mod reducer;
pub mod scale;
pub mod synthesize;

pub use crate::backend::{
    CollectionQuery, CompositeBucket, ImageSource, Page, RasterBackend, RawRecord,
    RegionReduction, SamplingScale, SeriesReduction, SeriesRow,
};
pub use crate::config::{EngineConfig, SynthesisPairing, VALUE_LIMIT, load_config};
pub use crate::context::{ContextStats, ExtractContext};
pub use crate::descriptor::{
    BandRequest, BandSelection, BandsParser, DatasetDescriptor, ResolvedDataset, ValueParser,
};
pub use crate::error::{BackendError, ConfigError, ExtractError, Result};
pub use crate::extract::Extractor;
pub use crate::geometry::{Feature, FeatureCollection, Geometry};
pub use crate::mapper::{Extraction, ResultRecord, SeriesRecord};
pub use crate::memory::{BackendCall, MemoryBackend, MemoryCatalog, MemoryImage, load_catalog};
pub use crate::period::{PeriodLookup, PeriodType, PeriodWindow, TranslatedWindow};
pub use crate::reducer::{Reducer, ReducerSpec, Statistic};
