//! Coverage analysis
//!
//! Enumerates the time slots a date range should contain, at whole-day or
//! half-hour resolution, and reports which are missing along with the
//! contiguous gap structure.

use crate::models::timestamp::{day_key, day_prefix, parse_timestamp};
use crate::models::{DateRange, Observation};
use chrono::{Days, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::str::FromStr;

const SLOT_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageResolution {
    Day,
    HalfHour,
}

impl FromStr for CoverageResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "daily" => Ok(CoverageResolution::Day),
            "half-hour" | "halfhour" | "30min" => Ok(CoverageResolution::HalfHour),
            other => Err(format!("unknown coverage resolution '{other}'")),
        }
    }
}

/// A maximal run of consecutive missing slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingInterval {
    pub start: String,
    pub end: String,
    pub missing_count: usize,
}

/// Expected versus available slots of a range.
///
/// `expected_count == available_count + missing_count` always holds, since
/// available slots are restricted to expected ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageReport {
    pub resolution: CoverageResolution,
    pub expected: Vec<String>,
    pub available: Vec<String>,
    pub missing: Vec<String>,
    pub expected_count: usize,
    pub available_count: usize,
    pub missing_count: usize,
    pub missing_intervals: Vec<MissingInterval>,
    pub largest_gap: Option<MissingInterval>,
}

pub type DailyCoverage = CoverageReport;
pub type SubdailyCoverage = CoverageReport;

/// `YYYY-MM-DD HH:MM` key of a half-hour slot
#[must_use]
pub fn half_hour_key(slot: NaiveDateTime) -> String {
    slot.format("%Y-%m-%d %H:%M").to_string()
}

/// Start of the half-hour slot containing `dt`
#[must_use]
pub fn floor_to_half_hour(dt: NaiveDateTime) -> NaiveDateTime {
    let minute = if dt.minute() < 30 { 0 } else { 30 };
    dt.date()
        .and_hms_opt(dt.hour(), minute, 0)
        .unwrap_or(dt)
}

fn day_keys_between(from: NaiveDate, to: NaiveDate) -> Vec<String> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .map(day_key)
        .collect()
}

fn half_hour_keys_between(from: NaiveDateTime, to: NaiveDateTime) -> Vec<String> {
    let from = floor_to_half_hour(from);
    let to = floor_to_half_hour(to);
    let mut slots = Vec::new();
    let mut current = from;
    while current <= to {
        slots.push(half_hour_key(current));
        current += chrono::Duration::minutes(SLOT_MINUTES);
    }
    slots
}

/// Every calendar day touched by the range, inclusive
#[must_use]
pub fn build_expected_day_keys(range: &DateRange) -> Vec<String> {
    day_keys_between(range.from().date(), range.to().date())
}

/// Every half-hour slot from the floored start to the floored end, inclusive
#[must_use]
pub fn build_expected_half_hour_keys(range: &DateRange) -> Vec<String> {
    half_hour_keys_between(range.from(), range.to())
}

/// Distinct, sorted calendar days present in the observations
#[must_use]
pub fn observed_day_keys(observations: &[Observation]) -> Vec<String> {
    observations
        .iter()
        .filter_map(|o| day_prefix(&o.timestamp))
        .filter(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").is_ok())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Distinct, sorted half-hour slots present in the observations
#[must_use]
pub fn observed_half_hour_keys(observations: &[Observation]) -> Vec<String> {
    observations
        .iter()
        .filter_map(|o| parse_timestamp(&o.timestamp))
        .map(|dt| half_hour_key(floor_to_half_hour(dt)))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Consolidate consecutive missing slots of `expected` into intervals
#[must_use]
pub fn missing_intervals(expected: &[String], missing: &HashSet<&str>) -> Vec<MissingInterval> {
    let mut intervals: Vec<MissingInterval> = Vec::new();
    let mut open: Option<MissingInterval> = None;

    for slot in expected {
        if missing.contains(slot.as_str()) {
            match open.as_mut() {
                Some(run) => {
                    run.end = slot.clone();
                    run.missing_count += 1;
                }
                None => {
                    open = Some(MissingInterval {
                        start: slot.clone(),
                        end: slot.clone(),
                        missing_count: 1,
                    });
                }
            }
        } else if let Some(run) = open.take() {
            intervals.push(run);
        }
    }
    intervals.extend(open);
    intervals
}

/// Longest interval, the first one on ties
#[must_use]
pub fn largest_gap(intervals: &[MissingInterval]) -> Option<MissingInterval> {
    intervals
        .iter()
        .fold(None::<&MissingInterval>, |best, candidate| match best {
            Some(b) if b.missing_count >= candidate.missing_count => Some(b),
            _ => Some(candidate),
        })
        .cloned()
}

fn build_report(
    resolution: CoverageResolution,
    expected: Vec<String>,
    observed: Vec<String>,
) -> CoverageReport {
    let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
    let available: Vec<String> = observed
        .into_iter()
        .filter(|slot| expected_set.contains(slot.as_str()))
        .collect();
    let available_set: HashSet<&str> = available.iter().map(String::as_str).collect();
    let missing: Vec<String> = expected
        .iter()
        .filter(|slot| !available_set.contains(slot.as_str()))
        .cloned()
        .collect();

    let missing_set: HashSet<&str> = missing.iter().map(String::as_str).collect();
    let intervals = missing_intervals(&expected, &missing_set);
    let largest = largest_gap(&intervals);

    CoverageReport {
        resolution,
        expected_count: expected.len(),
        available_count: available.len(),
        missing_count: missing.len(),
        expected,
        available,
        missing,
        missing_intervals: intervals,
        largest_gap: largest,
    }
}

/// Day-level coverage of `observations` over `range`
#[must_use]
pub fn compute_daily_coverage(range: &DateRange, observations: &[Observation]) -> DailyCoverage {
    build_report(
        CoverageResolution::Day,
        build_expected_day_keys(range),
        observed_day_keys(observations),
    )
}

/// Half-hour coverage of `observations` over `range`
#[must_use]
pub fn compute_subdaily_coverage(
    range: &DateRange,
    observations: &[Observation],
) -> SubdailyCoverage {
    build_report(
        CoverageResolution::HalfHour,
        build_expected_half_hour_keys(range),
        observed_half_hour_keys(observations),
    )
}

/// Number of days in a range, counting both ends
#[must_use]
pub fn day_span(range: &DateRange) -> u64 {
    let days = (range.to().date() - range.from().date()).num_days();
    u64::try_from(days).map_or(0, |d| d + 1)
}

/// Calendar days of a range, for per-day upstream calls
#[must_use]
pub fn days_in_range(range: &DateRange) -> Vec<NaiveDate> {
    let first = range.from().date();
    (0..day_span(range))
        .filter_map(|offset| first.checked_add_days(Days::new(offset)))
        .collect()
}
