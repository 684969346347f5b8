//! Dataset sanity statistics used when inspecting fetched series

use crate::models::timestamp::parse_timestamp;
use crate::models::{Observation, ObservationField};
use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

/// Steps longer than this many seconds are reported as gaps
pub const GAP_THRESHOLD_SECONDS: i64 = 30 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gap {
    pub after: String,
    pub before: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStats {
    pub points: usize,
    pub first: Option<String>,
    pub middle: Option<String>,
    pub last: Option<String>,
    /// Mean step between consecutive readable timestamps, in seconds
    pub mean_step_seconds: Option<f64>,
    pub duplicate_timestamps: usize,
    /// Steps deviating from the mean by more than half of it
    pub irregular_steps: usize,
    pub temperature: Option<Range>,
    pub humidity: Option<Range>,
    pub wind_speed: Option<Range>,
    pub gaps: Vec<Gap>,
}

fn value_range(observations: &[Observation], field: ObservationField) -> Option<Range> {
    observations
        .iter()
        .filter_map(|obs| field.get(obs))
        .fold(None, |acc: Option<Range>, v| {
            Some(match acc {
                None => Range { min: v, max: v },
                Some(r) => Range {
                    min: r.min.min(v),
                    max: r.max.max(v),
                },
            })
        })
}

/// Summarize a series in the order given
#[must_use]
pub fn dataset_stats(observations: &[Observation]) -> DatasetStats {
    let points = observations.len();
    let timestamp_at = |i: usize| observations.get(i).map(|o| o.timestamp.clone());

    let parsed: Vec<(&str, NaiveDateTime)> = observations
        .iter()
        .filter_map(|o| parse_timestamp(&o.timestamp).map(|ts| (o.timestamp.as_str(), ts)))
        .collect();

    let steps: Vec<(usize, TimeDelta)> = parsed
        .windows(2)
        .enumerate()
        .map(|(i, w)| (i, w[1].1 - w[0].1))
        .collect();

    let mean_step_seconds = if steps.is_empty() {
        None
    } else {
        let total: f64 = steps.iter().map(|(_, s)| s.num_seconds() as f64).sum();
        Some(total / steps.len() as f64)
    };

    let duplicate_timestamps = steps.iter().filter(|(_, s)| s.is_zero()).count();
    let irregular_steps = mean_step_seconds.map_or(0, |mean| {
        steps
            .iter()
            .filter(|(_, s)| (s.num_seconds() as f64 - mean).abs() > 0.5 * mean)
            .count()
    });

    let gaps = steps
        .iter()
        .filter(|(_, s)| s.num_seconds() > GAP_THRESHOLD_SECONDS)
        .map(|(i, s)| Gap {
            after: parsed[*i].0.to_string(),
            before: parsed[*i + 1].0.to_string(),
            minutes: s.num_minutes(),
        })
        .collect();

    DatasetStats {
        points,
        first: timestamp_at(0),
        middle: if points == 0 { None } else { timestamp_at(points / 2) },
        last: points.checked_sub(1).and_then(timestamp_at),
        mean_step_seconds,
        duplicate_timestamps,
        irregular_steps,
        temperature: value_range(observations, ObservationField::Temperature),
        humidity: value_range(observations, ObservationField::Humidity),
        wind_speed: value_range(observations, ObservationField::WindSpeed),
        gaps,
    }
}
