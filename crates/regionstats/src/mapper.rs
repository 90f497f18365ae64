// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Rewrites backend records into application records

use crate::backend::{RawRecord, SeriesRow};
use crate::context::ExtractContext;
use crate::descriptor::ValueParser;
use crate::period::PeriodLookup;
use diagnostics::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One reduced value for one feature and one canonical period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub feature_id: String,
    /// Canonical period id
    pub period: String,
    pub value: f64,
    /// Secondary outputs of a combined reducer, by output name
    #[serde(flatten)]
    pub extra: BTreeMap<String, f64>,
}

/// Result of an extraction.
///
/// Multi-band requests without a bands parser keep one array per band, in
/// band order; everything else is a single record array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Extraction {
    Records(Vec<ResultRecord>),
    Bands(Vec<Vec<ResultRecord>>),
}

impl Extraction {
    /// The single record array, or `None` for per-band output
    #[must_use]
    pub fn into_records(self) -> Option<Vec<ResultRecord>> {
        match self {
            Extraction::Records(records) => Some(records),
            Extraction::Bands(_) => None,
        }
    }

    /// Per-band arrays; a single record array is one band
    #[must_use]
    pub fn into_bands(self) -> Vec<Vec<ResultRecord>> {
        match self {
            Extraction::Records(records) => vec![records],
            Extraction::Bands(bands) => bands,
        }
    }

    /// Total number of records across all arrays
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Extraction::Records(records) => records.len(),
            Extraction::Bands(bands) => bands.iter().map(Vec::len).sum(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One row of a single-geometry time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRecord {
    /// Index of the image the row was reduced from
    pub id: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

fn parse(parser: Option<&ValueParser>, value: f64) -> f64 {
    parser.map_or(value, |p| p.apply(value))
}

/// Map native period labels to canonical ids and apply the value parser.
///
/// `primary` names the output reported as `value`; every other output goes
/// to `extra`. Records without the primary output or with a label outside
/// the lookup are dropped, the latter counted in `ctx`.
pub fn map_records(
    raw: Vec<RawRecord>,
    lookup: &PeriodLookup,
    primary: &str,
    parser: Option<&ValueParser>,
    ctx: &ExtractContext,
) -> Vec<ResultRecord> {
    let mut unmapped = 0usize;
    let records: Vec<ResultRecord> = raw
        .into_iter()
        .filter_map(|mut record| {
            let Some(period) = lookup.get(&record.period) else {
                unmapped += 1;
                return None;
            };
            let value = record.values.remove(primary)?;
            Some(ResultRecord {
                feature_id: record.feature_id,
                period: period.to_string(),
                value: parse(parser, value),
                extra: record
                    .values
                    .into_iter()
                    .map(|(name, v)| (name, parse(parser, v)))
                    .collect(),
            })
        })
        .collect();

    if unmapped > 0 {
        let request_id = ctx.request_id();
        debug!(
            "Dropped {unmapped} records with unmapped periods in request {request_id}",
            unmapped: unmapped,
            request_id: request_id
        );
        ctx.note_unmapped(unmapped);
    }
    records
}

/// Apply the value parser to series rows, keyed by image index
#[must_use]
pub fn map_series(rows: Vec<SeriesRow>, parser: Option<&ValueParser>) -> Vec<SeriesRecord> {
    rows.into_iter()
        .map(|row| SeriesRecord {
            id: row.index,
            values: row
                .values
                .into_iter()
                .map(|(name, v)| (name, parse(parser, v)))
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::period::PeriodWindow;

    fn record(feature: &str, value: f64) -> ResultRecord {
        ResultRecord {
            feature_id: feature.to_string(),
            period: "20230101".to_string(),
            value,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn test_per_band_extraction_keeps_arrays_apart() -> Result<(), serde_json::Error> {
        let bands = Extraction::Bands(vec![vec![record("ou1", 1.0)], vec![record("ou1", 2.0)]]);
        assert_eq!(bands.len(), 2);
        assert_eq!(
            serde_json::to_value(&bands)?,
            serde_json::json!([
                [{"featureId": "ou1", "period": "20230101", "value": 1.0}],
                [{"featureId": "ou1", "period": "20230101", "value": 2.0}]
            ])
        );
        assert_eq!(bands.clone().into_records(), None);
        assert_eq!(bands.into_bands()[1][0].value, 2.0);

        let single = Extraction::Records(vec![record("ou1", 1.0)]);
        assert_eq!(
            serde_json::to_value(&single)?,
            serde_json::json!([{"featureId": "ou1", "period": "20230101", "value": 1.0}])
        );
        assert_eq!(single.into_bands().len(), 1);
        Ok(())
    }

    fn raw(feature: &str, period: &str, values: &[(&str, f64)]) -> RawRecord {
        RawRecord {
            feature_id: feature.to_string(),
            period: period.to_string(),
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_maps_periods_and_parses_values() -> Result<(), ConfigError> {
        let window = PeriodWindow::new("2023-01-01", "2023-01-02").translate()?;
        let ctx = ExtractContext::new();
        let records = map_records(
            vec![
                raw("ou1", "2023-01-01", &[("mean", 274.15)]),
                raw("ou1", "2023-01-02", &[("mean", 273.15)]),
            ],
            &window.periods,
            "mean",
            Some(&ValueParser::KelvinToCelsius),
            &ctx,
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].period, "20230101");
        assert!((records[0].value - 1.0).abs() < 1e-9);
        assert_eq!(records[1].period, "20230102");
        assert_eq!(ctx.stats().unmapped_records, 0);
        Ok(())
    }

    #[test]
    fn test_unmapped_periods_dropped_and_counted() -> Result<(), ConfigError> {
        let window = PeriodWindow::new("2023-01-01", "2023-01-01").translate()?;
        let ctx = ExtractContext::new();
        let records = map_records(
            vec![
                raw("ou1", "2023-01-01", &[("mean", 1.0)]),
                raw("ou1", "2022-12-31", &[("mean", 2.0)]),
                raw("ou2", "2023-01-01", &[]),
            ],
            &window.periods,
            "mean",
            None,
            &ctx,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(ctx.stats().unmapped_records, 1);
        Ok(())
    }

    #[test]
    fn test_secondary_outputs_go_to_extra() -> Result<(), ConfigError> {
        let window = PeriodWindow::new("2023-01-01", "2023-01-01").translate()?;
        let records = map_records(
            vec![raw("ou1", "2023-01-01", &[("min", 1.0), ("max", 5.0)])],
            &window.periods,
            "min",
            Some(&ValueParser::Scale(2.0)),
            &ExtractContext::new(),
        );
        assert_eq!(records[0].value, 2.0);
        assert_eq!(records[0].extra.get("max"), Some(&10.0));

        let json = serde_json::to_value(&records[0]).unwrap_or_default();
        assert_eq!(
            json,
            serde_json::json!({"featureId": "ou1", "period": "20230101", "value": 2.0, "max": 10.0})
        );
        Ok(())
    }

    #[test]
    fn test_series_rows() {
        let rows = vec![SeriesRow {
            index: "20230101".to_string(),
            values: [("temperature_2m".to_string(), 300.0)].into_iter().collect(),
        }];
        let out = map_series(rows, Some(&ValueParser::KelvinToCelsius));
        assert_eq!(out[0].id, "20230101");
        assert!((out[0].values["temperature_2m"] - 26.85).abs() < 1e-9);
    }
}
