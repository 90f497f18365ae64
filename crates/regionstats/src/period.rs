// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Period windows and canonical period ids
//!
//! A [`PeriodWindow`] is what the application asks for: a start date, an
//! inclusive end date, a time zone and an output period type. Translating it
//! yields the backend filter boundaries (zone-local midnight of the start
//! date, zone-local midnight of the day after the end date) and a lookup
//! from the backend's native period labels to the application's period ids.
//!
//! Native labels are zone-local `YYYY-MM-DD` dates of an image's start.
//! Canonical ids are `YYYYMMDD` (daily), `YYYYWn` (ISO week) and `YYYYMM`
//! (monthly).

use crate::error::ConfigError;
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Temporal granularity, ordered from finest to coarsest
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    #[serde(alias = "HOURLY")]
    Hourly,
    #[default]
    #[serde(alias = "DAILY")]
    Daily,
    #[serde(alias = "WEEKLY")]
    Weekly,
    #[serde(alias = "MONTHLY")]
    Monthly,
}

impl PeriodType {
    pub const ALL: [PeriodType; 4] = [
        PeriodType::Hourly,
        PeriodType::Daily,
        PeriodType::Weekly,
        PeriodType::Monthly,
    ];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
            PeriodType::Weekly => "weekly",
            PeriodType::Monthly => "monthly",
        }
    }

    /// The next coarser granularity, if any
    #[must_use]
    pub fn coarser(&self) -> Option<PeriodType> {
        match self {
            PeriodType::Hourly => Some(PeriodType::Daily),
            PeriodType::Daily => Some(PeriodType::Weekly),
            PeriodType::Weekly => Some(PeriodType::Monthly),
            PeriodType::Monthly => None,
        }
    }

    /// True when `self` is exactly one level finer than `other`
    #[must_use]
    pub fn is_one_finer_than(&self, other: PeriodType) -> bool {
        self.coarser() == Some(other)
    }

    /// Every sub-period of this type that overlaps `[first, last]` (inclusive
    /// dates). Hourly periods have no date label and are rejected.
    pub fn sub_periods(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Vec<SubPeriod>, ConfigError> {
        let mut periods = Vec::new();
        match self {
            PeriodType::Hourly => {
                return Err(ConfigError::UnsupportedOutputPeriod(self.name().to_string()));
            }
            PeriodType::Daily => {
                for day in first.iter_days().take_while(|d| *d <= last) {
                    periods.push(SubPeriod {
                        native: native_date(day),
                        id: day.format("%Y%m%d").to_string(),
                        start: day,
                        end: day + Duration::days(1),
                    });
                }
            }
            PeriodType::Weekly => {
                let monday = first.week(chrono::Weekday::Mon).first_day();
                for start in monday.iter_weeks().take_while(|d| *d <= last) {
                    let iso = start.iso_week();
                    periods.push(SubPeriod {
                        native: native_date(start),
                        id: format!("{}W{}", iso.year(), iso.week()),
                        start,
                        end: start + Duration::days(7),
                    });
                }
            }
            PeriodType::Monthly => {
                let mut start = first.with_day(1).unwrap_or(first);
                while start <= last {
                    let end = start + Months::new(1);
                    periods.push(SubPeriod {
                        native: native_date(start),
                        id: start.format("%Y%m").to_string(),
                        start,
                        end,
                    });
                    start = end;
                }
            }
        }
        Ok(periods)
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PeriodType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        PeriodType::ALL
            .iter()
            .find(|p| p.name() == lower)
            .copied()
            .ok_or_else(|| ConfigError::UnknownPeriodType(s.to_string()))
    }
}

/// One calendar period covered by a window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubPeriod {
    /// Backend label: the first day, `YYYY-MM-DD`
    pub native: String,
    /// Application period id
    pub id: String,
    /// First day
    pub start: NaiveDate,
    /// Day after the last day
    pub end: NaiveDate,
}

fn native_date(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Zone-local native label of an instant
#[must_use]
pub fn native_label(time_zone: &Tz, instant: DateTime<Utc>) -> String {
    instant.with_timezone(time_zone).format("%Y-%m-%d").to_string()
}

/// The UTC instant of local midnight starting `day` in `time_zone`.
///
/// Where midnight falls in a daylight saving gap, the first local instant of
/// the day is used.
#[must_use]
pub fn local_midnight(time_zone: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::MIN);
    (0..24)
        .find_map(|h| {
            time_zone
                .from_local_datetime(&(midnight + Duration::hours(h)))
                .earliest()
        })
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

/// Calendars in which canonical ids can be expressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calendar {
    #[default]
    #[serde(alias = "gregorian", alias = "iso8601")]
    Gregory,
}

impl FromStr for Calendar {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gregory" | "gregorian" | "iso8601" => Ok(Calendar::Gregory),
            _ => Err(ConfigError::UnknownCalendar(s.to_string())),
        }
    }
}

fn default_time_zone() -> String {
    "UTC".to_string()
}

/// The logical time window of a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeriodWindow {
    /// `YYYY-MM-DD` or `YYYY-MM`
    pub start_time: String,
    /// Inclusive end, `YYYY-MM-DD` or `YYYY-MM` (through the month's last day)
    pub end_time: String,
    /// IANA zone name
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default)]
    pub calendar: Option<String>,
    /// Granularity of the returned period ids
    #[serde(default)]
    pub period_type: PeriodType,
}

impl PeriodWindow {
    /// A daily UTC window
    pub fn new(start_time: impl Into<String>, end_time: impl Into<String>) -> Self {
        Self {
            start_time: start_time.into(),
            end_time: end_time.into(),
            time_zone: default_time_zone(),
            calendar: None,
            period_type: PeriodType::Daily,
        }
    }

    #[must_use]
    pub fn with_time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.time_zone = time_zone.into();
        self
    }

    #[must_use]
    pub fn with_period_type(mut self, period_type: PeriodType) -> Self {
        self.period_type = period_type;
        self
    }

    /// Resolve the window into backend boundaries and the period lookup.
    ///
    /// `end_time >= start_time` is assumed, not checked.
    pub fn translate(&self) -> Result<TranslatedWindow, ConfigError> {
        let time_zone: Tz = self
            .time_zone
            .parse()
            .map_err(|_| ConfigError::UnknownTimeZone(self.time_zone.clone()))?;
        if let Some(calendar) = &self.calendar {
            calendar.parse::<Calendar>()?;
        }
        let first_day = parse_day(&self.start_time)?;
        let last_day = parse_last_day(&self.end_time)?;
        let periods = PeriodLookup::new(self.period_type.sub_periods(first_day, last_day)?);

        Ok(TranslatedWindow {
            time_zone,
            period_type: self.period_type,
            first_day,
            last_day,
            start: local_midnight(&time_zone, first_day),
            end: local_midnight(&time_zone, last_day + Duration::days(1)),
            periods,
        })
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM` (first of month) or an RFC 3339 timestamp's
/// date part.
pub fn parse_day(s: &str) -> Result<NaiveDate, ConfigError> {
    parse_day_or_month(s).map(|(day, _)| day)
}

/// Parse an inclusive end day; `YYYY-MM` means the last day of that month
pub fn parse_last_day(s: &str) -> Result<NaiveDate, ConfigError> {
    let (day, whole_month) = parse_day_or_month(s)?;
    if !whole_month {
        return Ok(day);
    }
    day.checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| ConfigError::InvalidDate(s.to_string()))
}

fn parse_day_or_month(s: &str) -> Result<(NaiveDate, bool), ConfigError> {
    let trimmed = s.trim();
    let date_part = match trimmed.find('T') {
        Some(pos) => &trimmed[..pos],
        None => trimmed,
    };
    if let Ok(day) = NaiveDate::parse_from_str(date_part, "%Y-%m-%d") {
        return Ok((day, false));
    }
    NaiveDate::parse_from_str(&format!("{date_part}-01"), "%Y-%m-%d")
        .map(|first| (first, true))
        .map_err(|_| ConfigError::InvalidDate(s.to_string()))
}

/// Native label to canonical period id, built per request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodLookup {
    by_native: BTreeMap<String, String>,
    periods: Vec<SubPeriod>,
}

impl PeriodLookup {
    fn new(periods: Vec<SubPeriod>) -> Self {
        let by_native = periods
            .iter()
            .map(|p| (p.native.clone(), p.id.clone()))
            .collect();
        Self { by_native, periods }
    }

    #[must_use]
    pub fn get(&self, native: &str) -> Option<&str> {
        self.by_native.get(native).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_native.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_native.is_empty()
    }

    /// Sub-periods in chronological order
    #[must_use]
    pub fn periods(&self) -> &[SubPeriod] {
        &self.periods
    }
}

/// A window resolved against its time zone
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedWindow {
    pub time_zone: Tz,
    pub period_type: PeriodType,
    pub first_day: NaiveDate,
    /// Inclusive logical end
    pub last_day: NaiveDate,
    /// Local midnight of `first_day`
    pub start: DateTime<Utc>,
    /// Local midnight of the day after `last_day`
    pub end: DateTime<Utc>,
    pub periods: PeriodLookup,
}

impl TranslatedWindow {
    /// Whole days covered, end day included
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.last_day - self.first_day).num_days() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        parse_day(s).unwrap_or_default()
    }

    #[test]
    fn test_utc_boundaries_include_end_day() -> Result<(), ConfigError> {
        let w = PeriodWindow::new("2023-01-01", "2023-01-31").translate()?;
        assert_eq!(w.start.to_rfc3339(), "2023-01-01T00:00:00+00:00");
        assert_eq!(w.end.to_rfc3339(), "2023-02-01T00:00:00+00:00");
        assert_eq!(w.days(), 31);
        Ok(())
    }

    #[test]
    fn test_zone_local_boundaries() -> Result<(), ConfigError> {
        let w = PeriodWindow::new("2023-01-01", "2023-01-01")
            .with_time_zone("Africa/Nairobi")
            .translate()?;
        // UTC+3
        assert_eq!(w.start.to_rfc3339(), "2022-12-31T21:00:00+00:00");
        assert_eq!(w.end.to_rfc3339(), "2023-01-01T21:00:00+00:00");
        Ok(())
    }

    #[test]
    fn test_daily_lookup_has_one_entry_per_day() -> Result<(), ConfigError> {
        let w = PeriodWindow::new("2023-01-01", "2023-01-31").translate()?;
        assert_eq!(w.periods.len(), 31);
        assert_eq!(w.periods.get("2023-01-01"), Some("20230101"));
        assert_eq!(w.periods.get("2023-01-31"), Some("20230131"));
        assert_eq!(w.periods.get("2023-02-01"), None);
        let ids: Vec<&str> = w.periods.periods().iter().map(|p| p.id.as_str()).collect();
        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
        Ok(())
    }

    #[test]
    fn test_lookup_has_no_gaps_across_leap_day() -> Result<(), ConfigError> {
        let w = PeriodWindow::new("2024-02-27", "2024-03-02").translate()?;
        let days: Vec<NaiveDate> = w.periods.periods().iter().map(|p| p.start).collect();
        assert_eq!(days.len(), 5);
        for pair in days.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
        assert_eq!(w.periods.get("2024-02-29"), Some("20240229"));
        Ok(())
    }

    #[test]
    fn test_monthly_lookup() -> Result<(), ConfigError> {
        let w = PeriodWindow::new("2022-11", "2023-02")
            .with_period_type(PeriodType::Monthly)
            .translate()?;
        let ids: Vec<&str> = w.periods.periods().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["202211", "202212", "202301", "202302"]);
        assert_eq!(w.periods.get("2022-12-01"), Some("202212"));
        // A month-only end runs through the month's last day
        assert_eq!(w.last_day, date("2023-02-28"));
        assert_eq!(w.end.to_rfc3339(), "2023-03-01T00:00:00+00:00");
        assert_eq!(w.periods.len(), 4);
        Ok(())
    }

    #[test]
    fn test_weekly_lookup_uses_iso_weeks() -> Result<(), ConfigError> {
        // 2023-01-01 is a Sunday in ISO week 2022W52
        let w = PeriodWindow::new("2023-01-01", "2023-01-15")
            .with_period_type(PeriodType::Weekly)
            .translate()?;
        let ids: Vec<&str> = w.periods.periods().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2022W52", "2023W1", "2023W2"]);
        assert_eq!(w.periods.get("2023-01-02"), Some("2023W1"));
        Ok(())
    }

    #[test]
    fn test_hourly_output_rejected() {
        let err = PeriodWindow::new("2023-01-01", "2023-01-02")
            .with_period_type(PeriodType::Hourly)
            .translate();
        assert_eq!(
            err,
            Err(ConfigError::UnsupportedOutputPeriod("hourly".to_string()))
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let bad_zone = PeriodWindow::new("2023-01-01", "2023-01-02")
            .with_time_zone("Mars/Olympus")
            .translate();
        assert_eq!(
            bad_zone,
            Err(ConfigError::UnknownTimeZone("Mars/Olympus".to_string()))
        );
        let bad_date = PeriodWindow::new("01/01/2023", "2023-01-02").translate();
        assert_eq!(bad_date, Err(ConfigError::InvalidDate("01/01/2023".to_string())));

        let mut w = PeriodWindow::new("2023-01-01", "2023-01-02");
        w.calendar = Some("ethiopian".to_string());
        assert_eq!(
            w.translate(),
            Err(ConfigError::UnknownCalendar("ethiopian".to_string()))
        );
    }

    #[test]
    fn test_month_end_is_last_day() -> Result<(), ConfigError> {
        assert_eq!(parse_last_day("2024-02")?, date("2024-02-29"));
        assert_eq!(parse_last_day("2023-12")?, date("2023-12-31"));
        assert_eq!(parse_last_day("2023-02-02")?, date("2023-02-02"));
        assert_eq!(parse_last_day("2023-13"), Err(ConfigError::InvalidDate("2023-13".to_string())));

        let w = PeriodWindow::new("2023-02", "2023-02").translate()?;
        assert_eq!(w.days(), 28);
        Ok(())
    }

    #[test]
    fn test_parse_day_forms() {
        assert_eq!(date("2023-05"), NaiveDate::from_ymd_opt(2023, 5, 1).unwrap_or_default());
        assert_eq!(
            date("2023-05-07T12:00:00Z"),
            NaiveDate::from_ymd_opt(2023, 5, 7).unwrap_or_default()
        );
    }

    #[test]
    fn test_native_label_is_zone_local() {
        let instant = local_midnight(&chrono_tz::Asia::Kolkata, date("2023-03-10"));
        assert_eq!(native_label(&chrono_tz::Asia::Kolkata, instant), "2023-03-10");
        assert_eq!(native_label(&chrono_tz::UTC, instant), "2023-03-09");
    }

    #[test]
    fn test_period_type_ordering() {
        assert!(PeriodType::Hourly.is_one_finer_than(PeriodType::Daily));
        assert!(!PeriodType::Hourly.is_one_finer_than(PeriodType::Monthly));
        assert!(PeriodType::Daily < PeriodType::Monthly);
        assert_eq!("MONTHLY".parse::<PeriodType>(), Ok(PeriodType::Monthly));
    }
}
