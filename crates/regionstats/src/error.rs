// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Error types for region statistics extraction

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

/// A request that cannot be executed as written.
///
/// Always raised before the first remote call of a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Unknown statistic: {0}")]
    UnknownStatistic(String),

    #[error("Reducer list is empty")]
    EmptyReducer,

    #[error("No band selected for dataset {0}")]
    EmptyBands(String),

    #[error("Reducer/band mismatch: {reducers} reducers for {bands} bands without shared inputs")]
    ReducerBandMismatch { reducers: usize, bands: usize },

    #[error("Unknown time zone: {0}")]
    UnknownTimeZone(String),

    #[error("Unknown calendar: {0}")]
    UnknownCalendar(String),

    #[error("Invalid date '{0}' (expected YYYY-MM-DD or YYYY-MM)")]
    InvalidDate(String),

    #[error("Unknown period type: {0}")]
    UnknownPeriodType(String),

    #[error("Period type {0} cannot label extracted values")]
    UnsupportedOutputPeriod(String),

    #[error("No features with geometry to aggregate")]
    NoFeatures,

    #[error("Invalid geometry for feature {0}")]
    InvalidGeometry(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// A failed remote evaluation, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend rejected evaluation: {0}")]
    Evaluation(String),

    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The filtered collection has no images. Users see this message as is.
    #[error("No data found for the selected period")]
    NoData {
        dataset_id: String,
        start: String,
        end: String,
    },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Page fetch at offset {offset} (limit {limit}) failed: {source}")]
    PartialPage {
        offset: usize,
        limit: usize,
        #[source]
        source: BackendError,
    },
}

impl ExtractError {
    /// True for the user-facing "no data for period" condition.
    #[must_use]
    pub fn is_no_data(&self) -> bool {
        matches!(self, ExtractError::NoData { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_message_is_user_facing() {
        let err = ExtractError::NoData {
            dataset_id: "ECMWF/ERA5_LAND/DAILY_AGGR".to_string(),
            start: "2023-01-01".to_string(),
            end: "2023-01-31".to_string(),
        };
        assert!(err.is_no_data());
        assert_eq!(err.to_string(), "No data found for the selected period");
    }

    #[test]
    fn test_config_error_converts() {
        let err: ExtractError = ConfigError::UnknownStatistic("avg".to_string()).into();
        assert!(matches!(err, ExtractError::Config(ConfigError::UnknownStatistic(_))));
        assert!(!err.is_no_data());
    }
}
