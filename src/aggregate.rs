//! Bucket aggregation of observation series
//!
//! All functions here are pure and recompute everything from the finest-grain
//! values they are given.

use crate::models::timestamp::{day_key, day_prefix, hour_key, parse_timestamp};
use crate::models::{Observation, WeatherStats};
use crate::wind::{WindSample, vectorial_mean};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Wind limit (m/s) above which acoustic measurements are not valid
pub const WIND_LIMIT_ACOUSTIC: f64 = 5.0;

/// Mean and maximum wind of one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindBucketAggregate {
    /// Bucket key
    pub time: String,
    /// Mean of the bucket's wind speeds, `None` if only gusts were present
    pub wind_avg: Option<f64>,
    /// Highest gust, or highest wind speed when the bucket has no gusts
    pub wind_max: f64,
}

/// One row of the per-day summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummaryRow {
    pub date: String,
    pub temp_avg: Option<f64>,
    pub humidity_avg: Option<f64>,
    pub wind_min: Option<f64>,
    pub wind_avg: Option<f64>,
    pub wind_max: Option<f64>,
    pub precip_sum: Option<f64>,
}

#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn max_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::min)
}

/// Groups in first-seen order, remembering the earliest parsed timestamp
struct Buckets<'a> {
    order: Vec<String>,
    members: HashMap<String, Vec<&'a Observation>>,
    earliest: HashMap<String, Option<NaiveDateTime>>,
}

impl<'a> Buckets<'a> {
    fn group<F: Fn(&str) -> String>(observations: &'a [Observation], bucket_key: F) -> Self {
        let mut buckets = Buckets {
            order: Vec::new(),
            members: HashMap::new(),
            earliest: HashMap::new(),
        };
        for obs in observations {
            let key = bucket_key(&obs.timestamp);
            let parsed = parse_timestamp(&obs.timestamp);
            if !buckets.members.contains_key(&key) {
                buckets.order.push(key.clone());
                buckets.earliest.insert(key.clone(), parsed);
            } else if let Some(slot) = buckets.earliest.get_mut(&key) {
                *slot = match (*slot, parsed) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    _ => None,
                };
            }
            buckets.members.entry(key).or_default().push(obs);
        }
        buckets
    }

    /// Keys ascending by earliest timestamp, or by key when any bucket has an
    /// unreadable timestamp
    fn sorted_keys(&self) -> Vec<String> {
        let mut keys = self.order.clone();
        let all_parsed = keys
            .iter()
            .all(|k| self.earliest.get(k).is_some_and(Option::is_some));
        if all_parsed {
            keys.sort_by(|a, b| {
                let ta = self.earliest.get(a).copied().flatten();
                let tb = self.earliest.get(b).copied().flatten();
                ta.cmp(&tb).then_with(|| a.cmp(b))
            });
        } else {
            keys.sort();
        }
        keys
    }

    fn members(&self, key: &str) -> &[&'a Observation] {
        self.members.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn wind_aggregate(key: &str, members: &[&Observation]) -> Option<WindBucketAggregate> {
    let speeds: Vec<f64> = members.iter().filter_map(|o| finite(o.wind_speed)).collect();
    let gusts: Vec<f64> = members
        .iter()
        .filter_map(|o| finite(o.wind_speed_max))
        .collect();

    let wind_max = max_of(&gusts).or_else(|| max_of(&speeds))?;
    Some(WindBucketAggregate {
        time: key.to_string(),
        wind_avg: mean(&speeds),
        wind_max,
    })
}

/// Per-bucket wind mean and maximum.
///
/// `wind_avg` is the arithmetic mean of every valid `wind_speed` in the
/// bucket. `wind_max` is the largest gust, falling back to the largest
/// `wind_speed` when the bucket has no gusts. Buckets without any valid wind
/// value are dropped.
#[must_use]
pub fn aggregate_by_bucket<F>(observations: &[Observation], bucket_key: F) -> Vec<WindBucketAggregate>
where
    F: Fn(&str) -> String,
{
    let buckets = Buckets::group(observations, bucket_key);
    buckets
        .sorted_keys()
        .iter()
        .filter_map(|key| wind_aggregate(key, buckets.members(key)))
        .collect()
}

/// Calendar-day bucket key of a timestamp
#[must_use]
pub fn day_bucket(timestamp: &str) -> String {
    match day_prefix(timestamp) {
        Some(prefix) if parse_timestamp(prefix).is_some() => prefix.to_string(),
        _ => parse_timestamp(timestamp)
            .map(|dt| day_key(dt.date()))
            .unwrap_or_else(|| timestamp.to_string()),
    }
}

/// Hour bucket key of a timestamp, `YYYY-MM-DDTHH:00`
#[must_use]
pub fn hour_bucket(timestamp: &str) -> String {
    parse_timestamp(timestamp)
        .map(hour_key)
        .unwrap_or_else(|| timestamp.to_string())
}

/// One summary row per calendar day
#[must_use]
pub fn build_daily_summary(observations: &[Observation]) -> Vec<DailySummaryRow> {
    let buckets = Buckets::group(observations, day_bucket);
    let wind: HashMap<String, WindBucketAggregate> = aggregate_by_bucket(observations, day_bucket)
        .into_iter()
        .map(|agg| (agg.time.clone(), agg))
        .collect();

    buckets
        .sorted_keys()
        .into_iter()
        .map(|date| {
            let members = buckets.members(&date);
            let collect = |f: fn(&Observation) -> Option<f64>| -> Vec<f64> {
                members.iter().filter_map(|o| finite(f(o))).collect()
            };
            let temps = collect(|o| o.temperature);
            let humidity = collect(|o| o.humidity);
            let speeds = collect(|o| o.wind_speed);
            let precip = collect(|o| o.precipitation);
            let day_wind = wind.get(&date);

            DailySummaryRow {
                temp_avg: mean(&temps).map(|v| round_to(v, 1)),
                humidity_avg: mean(&humidity).map(f64::round),
                wind_min: min_of(&speeds).map(|v| round_to(v, 1)),
                wind_avg: day_wind.and_then(|w| w.wind_avg).map(|v| round_to(v, 1)),
                wind_max: day_wind.map(|w| round_to(w.wind_max, 1)),
                precip_sum: (!precip.is_empty())
                    .then(|| round_to(precip.iter().sum(), 1)),
                date,
            }
        })
        .collect()
}

/// Averages of temperature, humidity and wind speed over non-null values
#[must_use]
pub fn calculate_stats(observations: &[Observation]) -> WeatherStats {
    let values = |f: fn(&Observation) -> Option<f64>| -> Vec<f64> {
        observations.iter().filter_map(|o| finite(f(o))).collect()
    };
    WeatherStats {
        avg_temperature: mean(&values(|o| o.temperature)).map(|v| round_to(v, 1)),
        avg_humidity: mean(&values(|o| o.humidity)).map(f64::round),
        avg_wind_speed: mean(&values(|o| o.wind_speed)).map(|v| round_to(v, 1)),
        data_points: observations.len(),
    }
}

/// Collapse sub-daily observations into one record per hour.
///
/// Temperature and humidity are averaged, wind is vector-averaged (a reading
/// without direction counts as north), gusts take the maximum and
/// precipitation is summed. The hour's direction stays `None` when no reading
/// in it carried one. Observations with unreadable timestamps are dropped.
#[must_use]
pub fn aggregate_hourly(observations: &[Observation]) -> Vec<Observation> {
    let readable: Vec<Observation> = observations
        .iter()
        .filter(|o| parse_timestamp(&o.timestamp).is_some())
        .cloned()
        .collect();
    let buckets = Buckets::group(&readable, hour_bucket);

    buckets
        .sorted_keys()
        .into_iter()
        .map(|hour| {
            let members = buckets.members(&hour);
            let collect = |f: fn(&Observation) -> Option<f64>| -> Vec<f64> {
                members.iter().filter_map(|o| finite(f(o))).collect()
            };
            let samples: Vec<WindSample> = members
                .iter()
                .map(|o| WindSample {
                    speed: o.wind_speed,
                    direction: o.wind_direction,
                })
                .collect();
            let has_direction = members.iter().any(|o| finite(o.wind_direction).is_some());
            let wind = vectorial_mean(&samples);
            let precip = collect(|o| o.precipitation);

            Observation {
                temperature: mean(&collect(|o| o.temperature)).map(|v| round_to(v, 1)),
                humidity: mean(&collect(|o| o.humidity)).map(f64::round),
                wind_speed: wind.map(|w| round_to(w.speed, 1)),
                wind_speed_max: max_of(&collect(|o| o.wind_speed_max)),
                wind_direction: wind
                    .filter(|_| has_direction)
                    .map(|w| w.direction.round() % 360.0),
                precipitation: (!precip.is_empty()).then(|| round_to(precip.iter().sum(), 1)),
                wind_gust_time: None,
                data_source_label: members.iter().find_map(|o| o.data_source_label.clone()),
                timestamp: hour,
            }
        })
        .collect()
}

/// Whether a wind reading exceeds the acoustic measurement limit
#[must_use]
pub fn exceeds_acoustic_limit(wind_speed: f64) -> bool {
    wind_speed > WIND_LIMIT_ACOUSTIC
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wind(ts: &str, speed: Option<f64>) -> Observation {
        Observation {
            wind_speed: speed,
            ..Observation::empty(ts)
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_by_bucket(&[], day_bucket).is_empty());
    }

    #[test]
    fn test_buckets_without_valid_wind_are_dropped() {
        let obs = vec![
            wind("2024-01-01T00:00", None),
            wind("2024-01-01T01:00", Some(f64::NAN)),
            wind("2024-01-02T00:00", Some(3.0)),
        ];
        let out = aggregate_by_bucket(&obs, day_bucket);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, "2024-01-02");
    }

    #[test]
    fn test_single_value_bucket() {
        let out = aggregate_by_bucket(&[wind("2024-01-01T10:00", Some(5.0))], |ts| ts.to_string());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].wind_avg, Some(5.0));
        assert_eq!(out[0].wind_max, 5.0);
    }

    #[test]
    fn test_buckets_sorted_by_timestamp() {
        let obs = vec![
            wind("2024-01-02T00:00", Some(8.0)),
            wind("2024-01-01T00:00", Some(4.0)),
            wind("2024-01-01T00:30", Some(6.0)),
        ];
        let out = aggregate_by_bucket(&obs, day_bucket);
        assert_eq!(
            out,
            vec![
                WindBucketAggregate { time: "2024-01-01".into(), wind_avg: Some(5.0), wind_max: 6.0 },
                WindBucketAggregate { time: "2024-01-02".into(), wind_avg: Some(8.0), wind_max: 8.0 },
            ]
        );
    }

    #[test]
    fn test_unparseable_timestamps_sort_by_key() {
        let obs = vec![wind("b-slot", Some(1.0)), wind("a-slot", Some(2.0))];
        let out = aggregate_by_bucket(&obs, |ts| ts.to_string());
        assert_eq!(out[0].time, "a-slot");
        assert_eq!(out[1].time, "b-slot");
    }

    #[test]
    fn test_gusts_preferred_for_max() {
        let obs = vec![
            Observation {
                wind_speed: Some(4.0),
                wind_speed_max: Some(9.5),
                ..Observation::empty("2024-01-01T00:00")
            },
            wind("2024-01-01T00:30", Some(6.0)),
        ];
        let out = aggregate_by_bucket(&obs, day_bucket);
        assert_eq!(out[0].wind_avg, Some(5.0));
        assert_eq!(out[0].wind_max, 9.5);
    }

    #[test]
    fn test_gust_only_bucket_has_no_mean() {
        let obs = vec![Observation {
            wind_speed_max: Some(12.0),
            ..Observation::empty("2024-01-01")
        }];
        let out = aggregate_by_bucket(&obs, day_bucket);
        assert_eq!(out[0].wind_avg, None);
        assert_eq!(out[0].wind_max, 12.0);
    }

    #[test]
    fn test_hourly_mean_is_arithmetic() {
        let obs: Vec<Observation> = [2.0, 4.0, 6.0, 8.0]
            .iter()
            .enumerate()
            .map(|(i, v)| wind(&format!("2024-01-01T10:{:02}", i * 15), Some(*v)))
            .collect();
        let out = aggregate_by_bucket(&obs, hour_bucket);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, "2024-01-01T10:00");
        assert_eq!(out[0].wind_avg, Some(5.0));
        assert_eq!(out[0].wind_max, 8.0);
    }

    #[test]
    fn test_daily_summary_over_one_day() {
        let obs: Vec<Observation> = (0..24)
            .map(|h| Observation {
                temperature: Some(if h % 2 == 0 { 10.0 } else { 11.0 }),
                humidity: Some(70.0),
                wind_speed: Some(if h == 12 { 7.0 } else { 2.0 }),
                precipitation: Some(if h < 10 { 0.1 } else { 0.0 }),
                ..Observation::empty(format!("2024-01-01T{h:02}:00"))
            })
            .collect();
        let rows = build_daily_summary(&obs);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.date, "2024-01-01");
        assert_eq!(row.temp_avg, Some(10.5));
        assert_eq!(row.humidity_avg, Some(70.0));
        assert_eq!(row.wind_min, Some(2.0));
        assert_eq!(row.wind_avg, Some(2.2));
        assert_eq!(row.wind_max, Some(7.0));
        assert_eq!(row.precip_sum, Some(1.0));
    }

    #[test]
    fn test_daily_summary_keeps_missing_as_none() {
        let rows = build_daily_summary(&[Observation {
            temperature: Some(12.0),
            ..Observation::empty("2024-01-01T00:00")
        }]);
        assert_eq!(rows[0].wind_avg, None);
        assert_eq!(rows[0].wind_max, None);
        assert_eq!(rows[0].precip_sum, None);
    }

    #[test]
    fn test_calculate_stats() {
        let obs = vec![
            Observation {
                temperature: Some(10.04),
                humidity: Some(60.0),
                wind_speed: Some(0.0),
                ..Observation::empty("2024-01-01T00:00")
            },
            Observation {
                temperature: Some(11.0),
                humidity: None,
                wind_speed: Some(0.0),
                ..Observation::empty("2024-01-01T00:30")
            },
            Observation::empty("2024-01-01T01:00"),
        ];
        let stats = calculate_stats(&obs);
        assert_eq!(stats.avg_temperature, Some(10.5));
        assert_eq!(stats.avg_humidity, Some(60.0));
        assert_eq!(stats.avg_wind_speed, Some(0.0));
        assert_eq!(stats.data_points, 3);
    }

    #[test]
    fn test_aggregate_hourly_vector_mean() {
        let obs = vec![
            Observation {
                temperature: Some(10.0),
                wind_speed: Some(3.0),
                wind_direction: Some(90.0),
                wind_speed_max: Some(6.0),
                precipitation: Some(0.2),
                ..Observation::empty("2024-01-01T10:00")
            },
            Observation {
                temperature: Some(11.0),
                wind_speed: Some(5.0),
                wind_direction: Some(90.0),
                wind_speed_max: Some(8.0),
                precipitation: Some(0.1),
                ..Observation::empty("2024-01-01T10:30")
            },
            Observation {
                temperature: Some(12.0),
                ..Observation::empty("2024-01-01T11:00")
            },
        ];
        let hourly = aggregate_hourly(&obs);
        assert_eq!(hourly.len(), 2);
        assert_eq!(hourly[0].timestamp, "2024-01-01T10:00");
        assert_eq!(hourly[0].temperature, Some(10.5));
        assert_eq!(hourly[0].wind_speed, Some(4.0));
        assert_eq!(hourly[0].wind_direction, Some(90.0));
        assert_eq!(hourly[0].wind_speed_max, Some(8.0));
        assert_eq!(hourly[0].precipitation, Some(0.3));
        assert_eq!(hourly[1].wind_speed, None);
        assert_eq!(hourly[1].wind_direction, None);
        assert_eq!(hourly[1].precipitation, None);
    }

    #[test]
    fn test_acoustic_limit_is_strict() {
        assert!(!exceeds_acoustic_limit(5.0));
        assert!(exceeds_acoustic_limit(5.1));
    }
}
