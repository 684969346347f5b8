//! Observation record, request ranges and summary statistics

use super::timestamp::{end_of_day, start_of_day};
use crate::error::ApiError;
use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dense per-timestamp weather record.
///
/// Every measured quantity is optional: a variable missing upstream is `None`,
/// never zero. `wind_speed` (mean) and `wind_speed_max` (gust) are kept apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Local-time key, `YYYY-MM-DDTHH:MM` (sub-daily) or `YYYY-MM-DD` (daily)
    pub timestamp: String,
    /// Temperature in Celsius
    pub temperature: Option<f64>,
    /// Relative humidity in %
    pub humidity: Option<f64>,
    /// Mean wind speed in m/s
    pub wind_speed: Option<f64>,
    /// Gust in m/s
    pub wind_speed_max: Option<f64>,
    /// Direction the wind blows from, degrees clockwise from north
    pub wind_direction: Option<f64>,
    /// Precipitation in mm accumulated over the record's period
    pub precipitation: Option<f64>,
    /// Local `HH:MM` of the day's maximum gust (daily records only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_gust_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source_label: Option<String>,
}

impl Observation {
    /// An observation with every measurement absent
    #[must_use]
    pub fn empty(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.data_source_label = Some(label.into());
        self
    }

    #[must_use]
    pub fn get(&self, field: ObservationField) -> Option<f64> {
        field.get(self)
    }
}

/// Numeric fields of an [`Observation`] addressable by code tables and scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObservationField {
    Temperature,
    Humidity,
    WindSpeed,
    WindSpeedMax,
    WindDirection,
    Precipitation,
}

impl ObservationField {
    #[must_use]
    pub fn get(self, obs: &Observation) -> Option<f64> {
        match self {
            ObservationField::Temperature => obs.temperature,
            ObservationField::Humidity => obs.humidity,
            ObservationField::WindSpeed => obs.wind_speed,
            ObservationField::WindSpeedMax => obs.wind_speed_max,
            ObservationField::WindDirection => obs.wind_direction,
            ObservationField::Precipitation => obs.precipitation,
        }
    }

    pub fn set(self, obs: &mut Observation, value: Option<f64>) {
        let slot = match self {
            ObservationField::Temperature => &mut obs.temperature,
            ObservationField::Humidity => &mut obs.humidity,
            ObservationField::WindSpeed => &mut obs.wind_speed,
            ObservationField::WindSpeedMax => &mut obs.wind_speed_max,
            ObservationField::WindDirection => &mut obs.wind_direction,
            ObservationField::Precipitation => &mut obs.precipitation,
        };
        *slot = value;
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ObservationField::Temperature => "temperature",
            ObservationField::Humidity => "humidity",
            ObservationField::WindSpeed => "windSpeed",
            ObservationField::WindSpeedMax => "windSpeedMax",
            ObservationField::WindDirection => "windDirection",
            ObservationField::Precipitation => "precipitation",
        }
    }
}

impl fmt::Display for ObservationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObservationField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "temperature" => Ok(ObservationField::Temperature),
            "humidity" => Ok(ObservationField::Humidity),
            "windspeed" => Ok(ObservationField::WindSpeed),
            "windspeedmax" | "gust" => Ok(ObservationField::WindSpeedMax),
            "winddirection" => Ok(ObservationField::WindDirection),
            "precipitation" => Ok(ObservationField::Precipitation),
            other => Err(format!("unknown observation field '{other}'")),
        }
    }
}

/// Inclusive local-time range, `from <= to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    from: NaiveDateTime,
    to: NaiveDateTime,
}

impl DateRange {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Result<Self, ApiError> {
        if from > to {
            return Err(ApiError::invalid_params(format!(
                "range start {from} is after range end {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// Whole calendar days from `from` 00:00 to `to` 23:59:59.999
    pub fn from_dates(from: NaiveDate, to: NaiveDate) -> Result<Self, ApiError> {
        Self::new(start_of_day(from), end_of_day(to))
    }

    #[must_use]
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            from: start_of_day(date),
            to: end_of_day(date),
        }
    }

    /// The `days` complete days before `today`, excluding today
    pub fn last_days(today: NaiveDate, days: u64) -> Result<Self, ApiError> {
        let invalid = || ApiError::invalid_params(format!("cannot go back {days} days"));
        if days == 0 {
            return Err(ApiError::invalid_params("quick range needs at least one day"));
        }
        let first = today.checked_sub_days(Days::new(days)).ok_or_else(invalid)?;
        let last = today.checked_sub_days(Days::new(1)).ok_or_else(invalid)?;
        Self::from_dates(first, last)
    }

    #[must_use]
    pub fn from(&self) -> NaiveDateTime {
        self.from
    }

    #[must_use]
    pub fn to(&self) -> NaiveDateTime {
        self.to
    }

    #[must_use]
    pub fn contains(&self, dt: NaiveDateTime) -> bool {
        self.from <= dt && dt <= self.to
    }
}

/// Resolution of an observation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Native half-hourly readings
    Subdaily,
    /// Sub-daily readings aggregated per hour
    Hourly,
    /// One record per calendar day
    Daily,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "subdaily" | "30min" => Ok(Granularity::Subdaily),
            "hourly" | "hour" => Ok(Granularity::Hourly),
            "daily" | "day" => Ok(Granularity::Daily),
            other => Err(format!("unknown granularity '{other}'")),
        }
    }
}

/// Simple averages over the non-null values of a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherStats {
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
    pub avg_wind_speed: Option<f64>,
    pub data_points: usize,
}
