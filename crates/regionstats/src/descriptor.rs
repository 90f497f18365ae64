// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Dataset descriptors
//!
//! A descriptor names a backend collection and says how to reduce it:
//!
//! ```yaml
//! dataset_id: ECMWF/ERA5_LAND/HOURLY
//! band: temperature_2m
//! reducer: mean
//! period_type: hourly
//! period_reducer: mean
//! value_parser: kelvin_to_celsius
//! ```
//!
//! Multi-band descriptors list band sub-requests; each one overrides the
//! descriptor's band, reducer, period reducer and value parser:
//!
//! ```yaml
//! dataset_id: ECMWF/ERA5_LAND/DAILY_AGGR
//! bands:
//!   - band: temperature_2m
//!   - band: dewpoint_temperature_2m
//! value_parser: kelvin_to_celsius
//! bands_parser: relative_humidity
//! ```

use crate::error::ConfigError;
use crate::mapper::ResultRecord;
use crate::period::PeriodType;
use crate::reducer::{Reducer, ReducerSpec, Statistic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One band or an ordered list of bands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BandSelection {
    One(String),
    Many(Vec<String>),
}

impl BandSelection {
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        match self {
            BandSelection::One(band) => vec![band.clone()],
            BandSelection::Many(bands) => bands.clone(),
        }
    }
}

impl From<&str> for BandSelection {
    fn from(band: &str) -> Self {
        BandSelection::One(band.to_string())
    }
}

impl From<Vec<&str>> for BandSelection {
    fn from(bands: Vec<&str>) -> Self {
        BandSelection::Many(bands.into_iter().map(String::from).collect())
    }
}

/// Per-value post-processing
#[derive(Clone)]
pub enum ValueParser {
    KelvinToCelsius,
    MetersToMillimeters,
    Scale(f64),
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl ValueParser {
    pub fn custom(f: impl Fn(f64) -> f64 + Send + Sync + 'static) -> Self {
        ValueParser::Custom(Arc::new(f))
    }

    #[must_use]
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            ValueParser::KelvinToCelsius => value - 273.15,
            ValueParser::MetersToMillimeters => value * 1000.0,
            ValueParser::Scale(factor) => value * factor,
            ValueParser::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for ValueParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

impl TryFrom<String> for ValueParser {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "kelvin_to_celsius" => Ok(ValueParser::KelvinToCelsius),
            "meters_to_millimeters" => Ok(ValueParser::MetersToMillimeters),
            other => other
                .strip_prefix("scale:")
                .and_then(|factor| factor.trim().parse::<f64>().ok())
                .map(ValueParser::Scale)
                .ok_or_else(|| ConfigError::InvalidConfig(format!("unknown value parser: {other}"))),
        }
    }
}

impl From<ValueParser> for String {
    fn from(parser: ValueParser) -> Self {
        match parser {
            ValueParser::KelvinToCelsius => "kelvin_to_celsius".to_string(),
            ValueParser::MetersToMillimeters => "meters_to_millimeters".to_string(),
            ValueParser::Scale(factor) => format!("scale:{factor}"),
            ValueParser::Custom(_) => "custom".to_string(),
        }
    }
}

impl Serialize for ValueParser {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from(self.clone()))
    }
}

impl<'de> Deserialize<'de> for ValueParser {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ValueParser::try_from(name).map_err(serde::de::Error::custom)
    }
}

/// Combines the per-band result arrays of a multi-band descriptor
#[derive(Clone)]
pub enum BandsParser {
    /// Relative humidity (%) from `[temperature, dewpoint]` in Celsius
    RelativeHumidity,
    Custom(Arc<dyn Fn(Vec<Vec<ResultRecord>>) -> Vec<ResultRecord> + Send + Sync>),
}

impl BandsParser {
    pub fn custom(
        f: impl Fn(Vec<Vec<ResultRecord>>) -> Vec<ResultRecord> + Send + Sync + 'static,
    ) -> Self {
        BandsParser::Custom(Arc::new(f))
    }

    /// Number of band arrays the parser needs, if fixed
    #[must_use]
    pub fn arity(&self) -> Option<usize> {
        match self {
            BandsParser::RelativeHumidity => Some(2),
            BandsParser::Custom(_) => None,
        }
    }

    #[must_use]
    pub fn apply(&self, per_band: Vec<Vec<ResultRecord>>) -> Vec<ResultRecord> {
        match self {
            BandsParser::RelativeHumidity => relative_humidity(per_band),
            BandsParser::Custom(f) => f(per_band),
        }
    }
}

/// Magnus approximation over Celsius temperatures
#[must_use]
pub fn relative_humidity_percent(temperature: f64, dewpoint: f64) -> f64 {
    let magnus = |t: f64| ((17.625 * t) / (243.04 + t)).exp();
    100.0 * magnus(dewpoint) / magnus(temperature)
}

fn relative_humidity(per_band: Vec<Vec<ResultRecord>>) -> Vec<ResultRecord> {
    let mut bands = per_band.into_iter();
    let (Some(temperature), Some(dewpoint)) = (bands.next(), bands.next()) else {
        return Vec::new();
    };
    let dewpoints: BTreeMap<(String, String), f64> = dewpoint
        .into_iter()
        .map(|r| ((r.feature_id, r.period), r.value))
        .collect();

    temperature
        .into_iter()
        .filter_map(|t| {
            let td = dewpoints.get(&(t.feature_id.clone(), t.period.clone()))?;
            Some(ResultRecord {
                value: relative_humidity_percent(t.value, *td),
                extra: BTreeMap::new(),
                ..t
            })
        })
        .collect()
}

impl fmt::Debug for BandsParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BandsParser::RelativeHumidity => f.write_str("relative_humidity"),
            BandsParser::Custom(_) => f.write_str("custom"),
        }
    }
}

impl Serialize for BandsParser {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{self:?}"))
    }
}

impl<'de> Deserialize<'de> for BandsParser {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "relative_humidity" => Ok(BandsParser::RelativeHumidity),
            other => Err(serde::de::Error::custom(format!(
                "unknown bands parser: {other}"
            ))),
        }
    }
}

/// A band-specific sub-request of a multi-band descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BandRequest {
    pub band: BandSelection,
    #[serde(default)]
    pub reducer: Option<ReducerSpec>,
    #[serde(default)]
    pub period_reducer: Option<String>,
    #[serde(default)]
    pub value_parser: Option<ValueParser>,
}

impl BandRequest {
    pub fn new(band: impl Into<BandSelection>) -> Self {
        Self {
            band: band.into(),
            reducer: None,
            period_reducer: None,
            value_parser: None,
        }
    }
}

/// Declarative description of what to extract from a backend collection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetDescriptor {
    pub dataset_id: String,
    #[serde(default)]
    pub band: Option<BandSelection>,
    /// Band sub-requests, each run as its own pipeline
    #[serde(default)]
    pub bands: Option<Vec<BandRequest>>,
    #[serde(default)]
    pub reducer: ReducerSpec,
    /// Native granularity of the collection, when it matters
    #[serde(default)]
    pub period_type: Option<PeriodType>,
    /// Temporal reducer for composites; defaults to the reducer
    #[serde(default)]
    pub period_reducer: Option<String>,
    #[serde(default)]
    pub value_parser: Option<ValueParser>,
    #[serde(default)]
    pub bands_parser: Option<BandsParser>,
    #[serde(default)]
    pub shared_inputs: bool,
}

impl DatasetDescriptor {
    pub fn new(dataset_id: impl Into<String>, band: impl Into<BandSelection>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            band: Some(band.into()),
            bands: None,
            reducer: ReducerSpec::default(),
            period_type: None,
            period_reducer: None,
            value_parser: None,
            bands_parser: None,
            shared_inputs: false,
        }
    }

    /// A descriptor fanned out over band sub-requests
    pub fn multi_band(dataset_id: impl Into<String>, bands: Vec<BandRequest>) -> Self {
        Self {
            band: None,
            bands: Some(bands),
            ..Self::new(dataset_id, BandSelection::Many(Vec::new()))
        }
    }

    #[must_use]
    pub fn with_reducer(mut self, reducer: impl Into<ReducerSpec>) -> Self {
        self.reducer = reducer.into();
        self
    }

    #[must_use]
    pub fn with_period_type(mut self, period_type: PeriodType) -> Self {
        self.period_type = Some(period_type);
        self
    }

    #[must_use]
    pub fn with_period_reducer(mut self, period_reducer: impl Into<String>) -> Self {
        self.period_reducer = Some(period_reducer.into());
        self
    }

    #[must_use]
    pub fn with_value_parser(mut self, parser: ValueParser) -> Self {
        self.value_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn with_bands_parser(mut self, parser: BandsParser) -> Self {
        self.bands_parser = Some(parser);
        self
    }

    #[must_use]
    pub fn with_shared_inputs(mut self, shared_inputs: bool) -> Self {
        self.shared_inputs = shared_inputs;
        self
    }

    #[must_use]
    pub fn is_multi_band(&self) -> bool {
        self.bands.as_ref().is_some_and(|b| !b.is_empty())
    }

    /// The single-band descriptor for one sub-request
    #[must_use]
    pub fn for_band(&self, request: &BandRequest) -> DatasetDescriptor {
        DatasetDescriptor {
            dataset_id: self.dataset_id.clone(),
            band: Some(request.band.clone()),
            bands: None,
            reducer: request.reducer.clone().unwrap_or_else(|| self.reducer.clone()),
            period_type: self.period_type,
            period_reducer: request
                .period_reducer
                .clone()
                .or_else(|| self.period_reducer.clone()),
            value_parser: request
                .value_parser
                .clone()
                .or_else(|| self.value_parser.clone()),
            bands_parser: None,
            shared_inputs: self.shared_inputs,
        }
    }

    /// Validate and compose everything a single pipeline run needs.
    pub fn resolve(&self) -> Result<ResolvedDataset, ConfigError> {
        let bands = self
            .band
            .as_ref()
            .map(BandSelection::names)
            .unwrap_or_default();
        if bands.is_empty() || bands.iter().any(String::is_empty) {
            return Err(ConfigError::EmptyBands(self.dataset_id.clone()));
        }
        let reducer = Reducer::compose(&self.reducer, &bands, self.shared_inputs)?;
        let period_reducer = match &self.period_reducer {
            Some(name) => name.parse()?,
            None => reducer.primary(),
        };
        Ok(ResolvedDataset {
            dataset_id: self.dataset_id.clone(),
            bands,
            reducer,
            period_type: self.period_type,
            period_reducer,
            value_parser: self.value_parser.clone(),
        })
    }
}

/// A validated single-pipeline request
#[derive(Debug, Clone)]
pub struct ResolvedDataset {
    pub dataset_id: String,
    pub bands: Vec<String>,
    pub reducer: Reducer,
    pub period_type: Option<PeriodType>,
    pub period_reducer: Statistic,
    pub value_parser: Option<ValueParser>,
}
