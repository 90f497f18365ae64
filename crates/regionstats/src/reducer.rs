// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Reducer composition
//!
//! Statistics are a closed registry: a name either resolves to a [`Statistic`]
//! or the request fails with a configuration error before anything is sent to
//! the backend. A [`Reducer`] is one statistic, or several folded into a single
//! combined operator so that all outputs come back from one backend pass.
//!
//! Output naming follows the backend's conventions:
//!
//! | reducer                    | per-feature outputs           | per-region outputs |
//! |----------------------------|-------------------------------|--------------------|
//! | single, one band           | `<statistic>`                 | `<band>`           |
//! | single, many bands         | `<band>`                      | `<band>`           |
//! | combined, separate inputs  | `<band>` (renamed positionally) | `<band>`         |
//! | combined, shared inputs    | `<band>_<statistic>`          | `<band>_<statistic>` |

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named statistical operators known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Statistic {
    Mean,
    Min,
    Max,
    Sum,
    Median,
    Count,
    StdDev,
    Variance,
    First,
    Last,
    Mode,
}

impl Statistic {
    pub const ALL: [Statistic; 11] = [
        Statistic::Mean,
        Statistic::Min,
        Statistic::Max,
        Statistic::Sum,
        Statistic::Median,
        Statistic::Count,
        Statistic::StdDev,
        Statistic::Variance,
        Statistic::First,
        Statistic::Last,
        Statistic::Mode,
    ];

    /// Registry name, also the default output name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Min => "min",
            Statistic::Max => "max",
            Statistic::Sum => "sum",
            Statistic::Median => "median",
            Statistic::Count => "count",
            Statistic::StdDev => "stdDev",
            Statistic::Variance => "variance",
            Statistic::First => "first",
            Statistic::Last => "last",
            Statistic::Mode => "mode",
        }
    }

    /// Extremes depend on which individual pixels are sampled, so they are
    /// the statistics that go wrong when a small polygon contains no pixel
    /// centre.
    #[must_use]
    pub fn is_order_sensitive(&self) -> bool {
        matches!(self, Statistic::Min | Statistic::Max)
    }

    /// Apply the statistic to a set of samples.
    ///
    /// Returns `None` when there is nothing to reduce, except for `count`.
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return match self {
                Statistic::Count => Some(0.0),
                _ => None,
            };
        }
        let n = values.len() as f64;
        match self {
            Statistic::Mean => Some(values.iter().sum::<f64>() / n),
            Statistic::Min => values.iter().copied().reduce(f64::min),
            Statistic::Max => values.iter().copied().reduce(f64::max),
            Statistic::Sum => Some(values.iter().sum()),
            Statistic::Count => Some(n),
            Statistic::Median => {
                let sorted = sorted(values);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
            Statistic::Variance => Some(variance(values)),
            Statistic::StdDev => Some(variance(values).sqrt()),
            Statistic::First => values.first().copied(),
            Statistic::Last => values.last().copied(),
            Statistic::Mode => {
                // Most frequent value; ties go to the smallest.
                let sorted = sorted(values);
                let mut best = sorted[0];
                let mut best_run = 0;
                let mut i = 0;
                while i < sorted.len() {
                    let mut j = i;
                    while j < sorted.len() && sorted[j] == sorted[i] {
                        j += 1;
                    }
                    if j - i > best_run {
                        best_run = j - i;
                        best = sorted[i];
                    }
                    i = j;
                }
                Some(best)
            }
        }
    }
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

fn variance(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Statistic {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Statistic::ALL
            .iter()
            .find(|stat| stat.name() == s)
            .copied()
            .ok_or_else(|| ConfigError::UnknownStatistic(s.to_string()))
    }
}

/// Reducer as written in a dataset descriptor: one name or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReducerSpec {
    One(String),
    Many(Vec<String>),
}

impl Default for ReducerSpec {
    fn default() -> Self {
        ReducerSpec::One(Statistic::Mean.name().to_string())
    }
}

impl From<&str> for ReducerSpec {
    fn from(name: &str) -> Self {
        ReducerSpec::One(name.to_string())
    }
}

impl From<Vec<&str>> for ReducerSpec {
    fn from(names: Vec<&str>) -> Self {
        ReducerSpec::Many(names.into_iter().map(String::from).collect())
    }
}

/// How reduced values are keyed in the backend's response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputNaming {
    /// Region reduction over a feature collection
    PerFeature,
    /// Reduction over a single geometry
    PerRegion,
}

/// One named value a reducer produces, and where it comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducerOutput {
    pub name: String,
    pub statistic: Statistic,
    pub band: String,
}

/// A composed reduction operator.
///
/// Only built through [`Reducer::single`] and [`Reducer::compose`], so it
/// always holds at least one statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct Reducer {
    statistics: Vec<Statistic>,
    shared_inputs: bool,
    unweighted: bool,
    renamed: Option<Vec<String>>,
}

impl Reducer {
    /// A single, weighted statistic
    #[must_use]
    pub fn single(statistic: Statistic) -> Self {
        Self {
            statistics: vec![statistic],
            shared_inputs: false,
            unweighted: false,
            renamed: None,
        }
    }

    /// Build a reducer from a descriptor's reducer spec.
    ///
    /// A list folds left: the first statistic is the base and each following
    /// one is attached as a combined output. Combined reducers are unweighted.
    /// Without shared inputs, statistic `i` reads band `i` and its output is
    /// renamed to that band.
    pub fn compose(
        spec: &ReducerSpec,
        bands: &[String],
        shared_inputs: bool,
    ) -> Result<Self, ConfigError> {
        match spec {
            ReducerSpec::One(name) => Ok(Self::single(name.parse()?)),
            ReducerSpec::Many(names) => {
                let statistics = names
                    .iter()
                    .map(|name| name.parse::<Statistic>())
                    .collect::<Result<Vec<_>, _>>()?;

                let mut reducer = statistics
                    .iter()
                    .copied()
                    .fold(None::<Reducer>, |acc, stat| {
                        Some(match acc {
                            None => Reducer::single(stat).unweighted(),
                            Some(base) => base.combine(stat, shared_inputs),
                        })
                    })
                    .ok_or(ConfigError::EmptyReducer)?;

                if !shared_inputs && reducer.is_combined() {
                    if reducer.statistics.len() != bands.len() {
                        return Err(ConfigError::ReducerBandMismatch {
                            reducers: reducer.statistics.len(),
                            bands: bands.len(),
                        });
                    }
                    reducer.renamed = Some(bands.to_vec());
                }
                Ok(reducer)
            }
        }
    }

    fn unweighted(mut self) -> Self {
        self.unweighted = true;
        self
    }

    fn combine(mut self, statistic: Statistic, shared_inputs: bool) -> Self {
        self.statistics.push(statistic);
        self.shared_inputs = shared_inputs;
        self.unweighted = true;
        self
    }

    #[must_use]
    pub fn statistics(&self) -> &[Statistic] {
        &self.statistics
    }

    /// First statistic, the one a single-valued record reports
    #[must_use]
    pub fn primary(&self) -> Statistic {
        self.statistics[0]
    }

    #[must_use]
    pub fn is_combined(&self) -> bool {
        self.statistics.len() > 1
    }

    #[must_use]
    pub fn is_unweighted(&self) -> bool {
        self.unweighted
    }

    #[must_use]
    pub fn shared_inputs(&self) -> bool {
        self.shared_inputs
    }

    #[must_use]
    pub fn is_order_sensitive(&self) -> bool {
        self.statistics.iter().any(Statistic::is_order_sensitive)
    }

    /// Whether native-resolution sampling can bias this reducer on features
    /// smaller than a pixel.
    #[must_use]
    pub fn needs_fine_sampling(&self) -> bool {
        self.is_order_sensitive() || (self.is_combined() && self.unweighted)
    }

    /// Output names declared by the reducer, before band assignment
    #[must_use]
    pub fn declared_outputs(&self) -> Vec<String> {
        match &self.renamed {
            Some(names) => names.clone(),
            None => self.statistics.iter().map(|s| s.name().to_string()).collect(),
        }
    }

    /// Every value the reducer produces when applied to `bands`
    #[must_use]
    pub fn outputs(&self, bands: &[String], naming: OutputNaming) -> Vec<ReducerOutput> {
        if !self.is_combined() {
            let statistic = self.primary();
            return bands
                .iter()
                .map(|band| ReducerOutput {
                    name: if naming == OutputNaming::PerFeature && bands.len() == 1 {
                        statistic.name().to_string()
                    } else {
                        band.clone()
                    },
                    statistic,
                    band: band.clone(),
                })
                .collect();
        }

        if !self.shared_inputs {
            let names = self.declared_outputs();
            return self
                .statistics
                .iter()
                .zip(bands.iter())
                .zip(names)
                .map(|((statistic, band), name)| ReducerOutput {
                    name,
                    statistic: *statistic,
                    band: band.clone(),
                })
                .collect();
        }

        bands
            .iter()
            .flat_map(|band| {
                self.statistics.iter().map(move |statistic| ReducerOutput {
                    name: if bands.len() == 1 {
                        statistic.name().to_string()
                    } else {
                        format!("{band}_{}", statistic.name())
                    },
                    statistic: *statistic,
                    band: band.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bands(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_lookup() {
        assert_eq!("mean".parse::<Statistic>(), Ok(Statistic::Mean));
        assert_eq!("stdDev".parse::<Statistic>(), Ok(Statistic::StdDev));
        assert_eq!(
            "average".parse::<Statistic>(),
            Err(ConfigError::UnknownStatistic("average".to_string()))
        );
        for stat in Statistic::ALL {
            assert_eq!(stat.name().parse::<Statistic>(), Ok(stat));
        }
    }

    #[test]
    fn test_statistics_apply() {
        let v = [4.0, 1.0, 3.0, 3.0];
        assert_eq!(Statistic::Mean.apply(&v), Some(2.75));
        assert_eq!(Statistic::Min.apply(&v), Some(1.0));
        assert_eq!(Statistic::Max.apply(&v), Some(4.0));
        assert_eq!(Statistic::Sum.apply(&v), Some(11.0));
        assert_eq!(Statistic::Median.apply(&v), Some(3.0));
        assert_eq!(Statistic::Count.apply(&v), Some(4.0));
        assert_eq!(Statistic::First.apply(&v), Some(4.0));
        assert_eq!(Statistic::Last.apply(&v), Some(3.0));
        assert_eq!(Statistic::Mode.apply(&v), Some(3.0));
        assert_eq!(Statistic::Variance.apply(&[1.0, 3.0]), Some(1.0));
        assert_eq!(Statistic::StdDev.apply(&[1.0, 3.0]), Some(1.0));
        assert_eq!(Statistic::Mean.apply(&[]), None);
        assert_eq!(Statistic::Count.apply(&[]), Some(0.0));
    }

    #[test]
    fn test_single_reducer_is_weighted() -> Result<(), ConfigError> {
        let reducer = Reducer::compose(&"max".into(), &bands(&["t"]), false)?;
        assert!(!reducer.is_combined());
        assert!(!reducer.is_unweighted());
        assert!(reducer.needs_fine_sampling());
        assert_eq!(reducer.declared_outputs(), vec!["max"]);

        let mean = Reducer::compose(&"mean".into(), &bands(&["t"]), false)?;
        assert!(!mean.needs_fine_sampling());
        Ok(())
    }

    #[test]
    fn test_unweighted_combination_needs_fine_sampling() -> Result<(), ConfigError> {
        let reducer = Reducer::compose(&vec!["mean", "sum"].into(), &bands(&["a", "b"]), false)?;
        assert!(reducer.is_combined());
        assert!(reducer.is_unweighted());
        assert!(!reducer.is_order_sensitive());
        assert!(reducer.needs_fine_sampling());

        let shared = Reducer::compose(&vec!["mean", "sum"].into(), &bands(&["a"]), true)?;
        assert!(shared.needs_fine_sampling());

        // A one-element list is unweighted but not combined
        let lone = Reducer::compose(&vec!["mean"].into(), &bands(&["a"]), false)?;
        assert!(!lone.needs_fine_sampling());
        Ok(())
    }

    #[test]
    fn test_unknown_name_in_sequence_fails_fast() {
        let err = Reducer::compose(&vec!["mean", "avg"].into(), &bands(&["a", "b"]), false);
        assert_eq!(err, Err(ConfigError::UnknownStatistic("avg".to_string())));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let err = Reducer::compose(&ReducerSpec::Many(vec![]), &bands(&["a"]), false);
        assert_eq!(err, Err(ConfigError::EmptyReducer));
    }

    #[test]
    fn test_every_composed_reducer_has_a_primary() -> Result<(), ConfigError> {
        let single = Reducer::compose(&"median".into(), &bands(&["a"]), false)?;
        assert_eq!(single.primary(), Statistic::Median);
        let one = Reducer::compose(&vec!["count"].into(), &bands(&["a"]), false)?;
        assert_eq!(one.primary(), Statistic::Count);
        let many = Reducer::compose(&vec!["max", "min"].into(), &bands(&["a", "b"]), false)?;
        assert_eq!(many.primary(), Statistic::Max);
        assert_eq!(many.statistics(), &[Statistic::Max, Statistic::Min]);
        Ok(())
    }

    #[test]
    fn test_separate_inputs_rename_to_bands() -> Result<(), ConfigError> {
        let b = bands(&[
            "temperature_2m",
            "temperature_2m_min",
            "temperature_2m_max",
            "dewpoint_temperature_2m",
            "total_precipitation_sum",
        ]);
        let reducer = Reducer::compose(&vec!["mean", "min", "max", "mean", "mean"].into(), &b, false)?;
        assert!(reducer.is_combined());
        assert!(reducer.is_unweighted());
        assert_eq!(reducer.declared_outputs(), b);

        let outputs = reducer.outputs(&b, OutputNaming::PerRegion);
        assert_eq!(outputs.len(), 5);
        assert_eq!(outputs[1].statistic, Statistic::Min);
        assert_eq!(outputs[1].band, "temperature_2m_min");
        assert_eq!(outputs[1].name, "temperature_2m_min");
        Ok(())
    }

    #[test]
    fn test_separate_inputs_length_mismatch() {
        let err = Reducer::compose(&vec!["mean", "min"].into(), &bands(&["a", "b", "c"]), false);
        assert_eq!(
            err,
            Err(ConfigError::ReducerBandMismatch { reducers: 2, bands: 3 })
        );
    }

    #[test]
    fn test_shared_inputs_cross_product() -> Result<(), ConfigError> {
        let b = bands(&["a", "b"]);
        let reducer = Reducer::compose(&vec!["min", "max"].into(), &b, true)?;
        let names: Vec<String> = reducer
            .outputs(&b, OutputNaming::PerFeature)
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["a_min", "a_max", "b_min", "b_max"]);

        let one = bands(&["a"]);
        let names: Vec<String> = reducer
            .outputs(&one, OutputNaming::PerFeature)
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["min", "max"]);
        Ok(())
    }

    #[test]
    fn test_single_reducer_naming() {
        let reducer = Reducer::single(Statistic::Mean);
        let one = bands(&["precip"]);
        assert_eq!(reducer.outputs(&one, OutputNaming::PerFeature)[0].name, "mean");
        assert_eq!(reducer.outputs(&one, OutputNaming::PerRegion)[0].name, "precip");

        let two = bands(&["a", "b"]);
        let names: Vec<String> = reducer
            .outputs(&two, OutputNaming::PerFeature)
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
