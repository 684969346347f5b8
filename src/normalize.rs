//! Row normalization
//!
//! Upstream tabular sources deliver long-format rows: one row per station,
//! instant and variable code. [`normalize`] folds them into dense
//! per-timestamp [`Observation`]s through a fixed code table.

use crate::models::timestamp::{clock_of, day_key, day_prefix, minute_key, parse_timestamp};
use crate::models::{AggregationType, Observation, ObservationField, TimeseriesResponse};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Sub-daily XEMA variable codes
pub mod subdaily_codes {
    pub const TEMPERATURE: &str = "32";
    pub const HUMIDITY: &str = "33";
    pub const PRECIPITATION: &str = "35";
    pub const WIND_SPEED_10M: &str = "30";
    pub const WIND_DIRECTION_10M: &str = "31";
    pub const WIND_GUST_10M: &str = "50";
    pub const GUST_DIRECTION_10M: &str = "51";
}

/// Daily XEMA statistic codes
pub mod daily_codes {
    pub const MEAN_TEMPERATURE: &str = "1000";
    pub const MEAN_HUMIDITY: &str = "1100";
    pub const PRECIPITATION: &str = "1300";
    pub const VECTOR_MEAN_WIND_SPEED: &str = "1500";
    pub const MEAN_WIND_SPEED: &str = "1503";
    pub const MAX_GUST: &str = "1512";
}

/// How row timestamps are turned into grouping keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResolution {
    /// `YYYY-MM-DDTHH:MM`
    Minute,
    /// `YYYY-MM-DD`
    Day,
}

impl KeyResolution {
    /// Grouping key of a raw timestamp, `None` when it cannot be read
    #[must_use]
    pub fn key_of(self, raw: &str) -> Option<String> {
        match self {
            KeyResolution::Minute => parse_timestamp(raw).map(minute_key),
            KeyResolution::Day => match day_prefix(raw) {
                Some(prefix) if parse_timestamp(prefix).is_some() => Some(prefix.to_string()),
                _ => parse_timestamp(raw).map(|dt| day_key(dt.date())),
            },
        }
    }
}

/// Fixed variable code to observation field lookup
#[derive(Debug, Clone, Copy)]
pub struct VariableCodeMap {
    entries: &'static [(&'static str, ObservationField)],
    resolution: KeyResolution,
}

impl VariableCodeMap {
    #[must_use]
    pub fn field_for(&self, code: &str) -> Option<ObservationField> {
        let code = code.trim();
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, field)| *field)
    }

    /// Codes to request upstream, in table order
    pub fn codes(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(code, _)| *code)
    }

    #[must_use]
    pub fn resolution(&self) -> KeyResolution {
        self.resolution
    }
}

pub const SUBDAILY_CODE_MAP: VariableCodeMap = VariableCodeMap {
    entries: &[
        (subdaily_codes::TEMPERATURE, ObservationField::Temperature),
        (subdaily_codes::HUMIDITY, ObservationField::Humidity),
        (subdaily_codes::PRECIPITATION, ObservationField::Precipitation),
        (subdaily_codes::WIND_SPEED_10M, ObservationField::WindSpeed),
        (subdaily_codes::WIND_DIRECTION_10M, ObservationField::WindDirection),
        (subdaily_codes::WIND_GUST_10M, ObservationField::WindSpeedMax),
    ],
    resolution: KeyResolution::Minute,
};

pub const DAILY_CODE_MAP: VariableCodeMap = VariableCodeMap {
    entries: &[
        (daily_codes::MEAN_TEMPERATURE, ObservationField::Temperature),
        (daily_codes::MEAN_HUMIDITY, ObservationField::Humidity),
        (daily_codes::PRECIPITATION, ObservationField::Precipitation),
        (daily_codes::MEAN_WIND_SPEED, ObservationField::WindSpeed),
        (daily_codes::MAX_GUST, ObservationField::WindSpeedMax),
    ],
    resolution: KeyResolution::Day,
};

/// One long-format row as served by the Socrata measurement resources
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub codi_estacio: Option<String>,
    pub data_lectura: String,
    #[serde(default)]
    pub codi_variable: Option<String>,
    #[serde(default)]
    pub valor: Option<Value>,
    #[serde(default)]
    pub valor_lectura: Option<Value>,
    #[serde(default)]
    pub codi_estat: Option<String>,
}

impl RawRow {
    /// `valor` when present, otherwise `valor_lectura`, as a finite number
    #[must_use]
    pub fn numeric_value(&self) -> Option<f64> {
        self.valor
            .as_ref()
            .filter(|v| !v.is_null())
            .or(self.valor_lectura.as_ref())
            .and_then(parse_numeric)
    }

    /// Validated (`V`) or unflagged readings; any other state is discarded
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.codi_estat
            .as_deref()
            .map(str::trim)
            .is_none_or(|state| state.is_empty() || state.eq_ignore_ascii_case("V"))
    }
}

/// Read a JSON number or numeric string; anything else is `None`
#[must_use]
pub fn parse_numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Fold long-format rows into observations sorted by timestamp key.
///
/// Rows with an unreadable timestamp or a non-validated state are skipped.
/// An unreadable value leaves its field `None` without affecting the rest of
/// the record.
#[must_use]
pub fn normalize(rows: &[RawRow], map: &VariableCodeMap) -> Vec<Observation> {
    let mut by_key: BTreeMap<String, Observation> = BTreeMap::new();
    let mut skipped = 0usize;
    let mut invalid = 0usize;

    for row in rows {
        if !row.is_valid() {
            invalid += 1;
            continue;
        }
        let Some(key) = map.resolution().key_of(&row.data_lectura) else {
            skipped += 1;
            continue;
        };
        let observation = by_key
            .entry(key)
            .or_insert_with_key(|key| Observation::empty(key.clone()));

        let Some(field) = row.codi_variable.as_deref().and_then(|c| map.field_for(c)) else {
            continue;
        };
        field.set(observation, row.numeric_value());
        if field == ObservationField::WindSpeedMax {
            observation.wind_gust_time = None;
        }
    }

    if skipped > 0 {
        debug!("Skipped {} rows with unreadable timestamps", skipped);
    }
    if invalid > 0 {
        debug!("Dropped {} rows not in validated state", invalid);
    }
    by_key.into_values().collect()
}

/// Annotate daily records with the local `HH:MM` of the day's maximum gust.
///
/// Gust rows are sub-daily readings of the gust variable. Per day the
/// strictly greatest value wins, so on ties the earliest reading is kept.
#[must_use]
pub fn attach_daily_gust_times(daily: Vec<Observation>, gust_rows: &[RawRow]) -> Vec<Observation> {
    let mut ordered: Vec<&RawRow> = gust_rows.iter().filter(|r| r.is_valid()).collect();
    ordered.sort_by(|a, b| a.data_lectura.cmp(&b.data_lectura));

    let mut best_by_day: BTreeMap<&str, (f64, Option<String>)> = BTreeMap::new();
    for row in ordered {
        let (Some(speed), Some(day)) = (row.numeric_value(), day_prefix(&row.data_lectura)) else {
            continue;
        };
        let replace = best_by_day
            .get(day)
            .is_none_or(|(best, _)| speed > *best);
        if replace {
            best_by_day.insert(day, (speed, clock_of(&row.data_lectura)));
        }
    }

    daily
        .into_iter()
        .map(|mut obs| {
            if let Some((_, Some(time))) = best_by_day.get(obs.timestamp.as_str()) {
                obs.wind_gust_time = Some(time.clone());
            }
            obs
        })
        .collect()
}

/// Merge single-variable series into observations keyed by timestamp.
///
/// Variables without an observation field are ignored; a variable with no
/// point at some timestamp leaves that field `None`.
#[must_use]
pub fn merge_timeseries(series: &[TimeseriesResponse]) -> Vec<Observation> {
    let mut by_key: BTreeMap<String, Observation> = BTreeMap::new();
    for response in series {
        let Some(field) = response.variable.field() else {
            debug!("No observation field for {}, skipping", response.variable);
            continue;
        };
        let resolution = match response.aggregation {
            AggregationType::Hourly => KeyResolution::Minute,
            AggregationType::Daily => KeyResolution::Day,
        };
        for point in &response.points {
            let key = resolution
                .key_of(&point.timestamp)
                .unwrap_or_else(|| point.timestamp.clone());
            let observation = by_key
                .entry(key)
                .or_insert_with_key(|key| Observation::empty(key.clone()));
            field.set(observation, point.value.filter(|v| v.is_finite()));
        }
    }
    by_key.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProviderId, TimeseriesPoint, WeatherVariable};
    use rstest::rstest;
    use serde_json::json;

    fn row(ts: &str, code: &str, valor: Value) -> RawRow {
        RawRow {
            codi_estacio: Some("X4".to_string()),
            data_lectura: ts.to_string(),
            codi_variable: Some(code.to_string()),
            valor: Some(valor),
            ..RawRow::default()
        }
    }

    #[rstest]
    #[case(json!("12.5"), Some(12.5))]
    #[case(json!(" 3 "), Some(3.0))]
    #[case(json!(7), Some(7.0))]
    #[case(json!(""), None)]
    #[case(json!("n/d"), None)]
    #[case(json!("NaN"), None)]
    #[case(json!("inf"), None)]
    #[case(json!(null), None)]
    fn test_parse_numeric(#[case] value: Value, #[case] expected: Option<f64>) {
        assert_eq!(parse_numeric(&value), expected);
    }

    #[test]
    fn test_valor_lectura_fallback() {
        let mut r = row("2024-01-01T00:00:00.000", "32", Value::Null);
        r.valor_lectura = Some(json!("4.2"));
        assert_eq!(r.numeric_value(), Some(4.2));
        r.valor = Some(json!("5.0"));
        assert_eq!(r.numeric_value(), Some(5.0));
    }

    #[test]
    fn test_normalize_drops_unvalidated_rows() {
        let mut suspect = row("2024-01-01T00:00:00.000", "32", json!("48.0"));
        suspect.codi_estat = Some("T".to_string());
        let mut rejected = row("2024-01-01T00:30:00.000", "32", json!("-20.0"));
        rejected.codi_estat = Some("N".to_string());
        let mut valid = row("2024-01-01T00:00:00.000", "33", json!("71"));
        valid.codi_estat = Some("V".to_string());
        let unflagged = row("2024-01-01T00:00:00.000", "30", json!("2.1"));

        let obs = normalize(&[suspect, rejected, valid, unflagged], &SUBDAILY_CODE_MAP);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].timestamp, "2024-01-01T00:00");
        assert_eq!(obs[0].temperature, None);
        assert_eq!(obs[0].humidity, Some(71.0));
        assert_eq!(obs[0].wind_speed, Some(2.1));
    }

    #[test]
    fn test_normalize_subdaily_groups_by_timestamp() {
        let rows = vec![
            row("2024-01-01T00:30:00.000", "32", json!("10.1")),
            row("2024-01-01T00:00:00.000", "32", json!("10.0")),
            row("2024-01-01T00:00:00.000", "30", json!("3.2")),
            row("2024-01-01T00:00:00.000", "50", json!("7.9")),
            row("2024-01-01T00:00:00.000", "31", json!("270")),
            row("2024-01-01T00:00:00.000", "33", json!("bad")),
        ];
        let obs = normalize(&rows, &SUBDAILY_CODE_MAP);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].timestamp, "2024-01-01T00:00");
        assert_eq!(obs[0].temperature, Some(10.0));
        assert_eq!(obs[0].wind_speed, Some(3.2));
        assert_eq!(obs[0].wind_speed_max, Some(7.9));
        assert_eq!(obs[0].wind_direction, Some(270.0));
        assert_eq!(obs[0].humidity, None);
        assert_eq!(obs[0].precipitation, None);
        assert_eq!(obs[1].timestamp, "2024-01-01T00:30");
        assert_eq!(obs[1].wind_speed, None);
    }

    #[test]
    fn test_normalize_daily_keeps_mean_and_gust_apart() {
        let rows = vec![
            row("2024-01-02T00:00:00.000", daily_codes::MEAN_WIND_SPEED, json!("2.5")),
            row("2024-01-02T00:00:00.000", daily_codes::MAX_GUST, json!("11.3")),
            row("2024-01-01T00:00:00.000", daily_codes::PRECIPITATION, json!("0.0")),
            row("2024-01-01T00:00:00.000", daily_codes::VECTOR_MEAN_WIND_SPEED, json!("9.9")),
        ];
        let obs = normalize(&rows, &DAILY_CODE_MAP);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].timestamp, "2024-01-01");
        assert_eq!(obs[0].precipitation, Some(0.0));
        assert_eq!(obs[0].wind_speed, None);
        assert_eq!(obs[1].wind_speed, Some(2.5));
        assert_eq!(obs[1].wind_speed_max, Some(11.3));
    }

    #[test]
    fn test_normalize_skips_unreadable_timestamps() {
        let rows = vec![row("not a date", "32", json!("1"))];
        assert!(normalize(&rows, &SUBDAILY_CODE_MAP).is_empty());
    }

    #[test]
    fn test_gust_time_takes_first_of_equal_maxima() {
        let daily = vec![
            Observation::empty("2024-01-01"),
            Observation::empty("2024-01-02"),
        ];
        let gusts = vec![
            row("2024-01-01T15:00:00.000", "50", json!("9.0")),
            row("2024-01-01T09:30:00.000", "50", json!("9.0")),
            row("2024-01-01T12:00:00.000", "50", json!("4.0")),
            row("2024-01-01T18:00:00.000", "50", json!("")),
        ];
        let out = attach_daily_gust_times(daily, &gusts);
        assert_eq!(out[0].wind_gust_time.as_deref(), Some("09:30"));
        assert_eq!(out[1].wind_gust_time, None);
    }

    #[test]
    fn test_merge_timeseries_fills_missing_with_none() {
        let series = vec![
            TimeseriesResponse {
                station_id: "X4".into(),
                provider: ProviderId::Meteocat,
                variable: WeatherVariable::Temperature,
                unit: "°C".into(),
                aggregation: AggregationType::Hourly,
                points: vec![
                    TimeseriesPoint { timestamp: "2024-01-01T00:00Z".into(), value: Some(8.0) },
                    TimeseriesPoint { timestamp: "2024-01-01T01:00Z".into(), value: Some(7.5) },
                ],
            },
            TimeseriesResponse {
                station_id: "X4".into(),
                provider: ProviderId::Meteocat,
                variable: WeatherVariable::WindSpeed,
                unit: "m/s".into(),
                aggregation: AggregationType::Hourly,
                points: vec![TimeseriesPoint {
                    timestamp: "2024-01-01T01:00Z".into(),
                    value: Some(3.0),
                }],
            },
        ];
        let merged = merge_timeseries(&series);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].timestamp, "2024-01-01T00:00");
        assert_eq!(merged[0].wind_speed, None);
        assert_eq!(merged[1].temperature, Some(7.5));
        assert_eq!(merged[1].wind_speed, Some(3.0));
    }
}
