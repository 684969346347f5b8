//! Threshold exceedance intervals

use crate::models::timestamp::parse_timestamp;
use crate::models::{Observation, ObservationField};
use serde::{Deserialize, Serialize};

/// Inclusive run of exceeding readings, bounded by their own timestamps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceedanceInterval {
    pub start: String,
    pub end: String,
}

/// Consolidate readings strictly above `threshold` into intervals.
///
/// Input is re-sorted by timestamp first (unreadable timestamps sort before
/// readable ones, then by raw text). Exceeding readings adjacent in that order
/// merge into one interval whatever the time between them; an isolated one
/// yields `start == end`. Missing and NaN values never exceed.
#[must_use]
pub fn exceedance_intervals_by<'a, I>(readings: I, threshold: f64) -> Vec<ExceedanceInterval>
where
    I: IntoIterator<Item = (&'a str, Option<f64>)>,
{
    let mut sorted: Vec<(&str, Option<f64>)> = readings.into_iter().collect();
    sorted.sort_by_cached_key(|(ts, _)| (parse_timestamp(ts), ts.to_string()));

    let mut intervals = Vec::new();
    let mut current: Option<ExceedanceInterval> = None;
    for (timestamp, value) in sorted {
        let exceeds = value.is_some_and(|v| !v.is_nan() && v > threshold);
        if exceeds {
            match current.as_mut() {
                Some(run) => run.end = timestamp.to_string(),
                None => {
                    current = Some(ExceedanceInterval {
                        start: timestamp.to_string(),
                        end: timestamp.to_string(),
                    });
                }
            }
        } else if let Some(run) = current.take() {
            intervals.push(run);
        }
    }
    intervals.extend(current);
    intervals
}

/// Exceedance intervals of one observation field
#[must_use]
pub fn exceedance_intervals(
    observations: &[Observation],
    threshold: f64,
    field: ObservationField,
) -> Vec<ExceedanceInterval> {
    exceedance_intervals_by(
        observations
            .iter()
            .map(|o| (o.timestamp.as_str(), field.get(o))),
        threshold,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gusts(values: &[(&str, Option<f64>)]) -> Vec<Observation> {
        values
            .iter()
            .map(|(ts, v)| Observation {
                wind_speed_max: *v,
                ..Observation::empty(*ts)
            })
            .collect()
    }

    #[test]
    fn test_single_run() {
        let obs = gusts(&[
            ("2024-01-01T00:00", Some(2.0)),
            ("2024-01-01T01:00", Some(6.0)),
            ("2024-01-01T02:00", Some(7.0)),
            ("2024-01-01T03:00", Some(6.0)),
            ("2024-01-01T04:00", Some(2.0)),
        ]);
        let intervals = exceedance_intervals(&obs, 5.0, ObservationField::WindSpeedMax);
        assert_eq!(
            intervals,
            vec![ExceedanceInterval {
                start: "2024-01-01T01:00".into(),
                end: "2024-01-01T03:00".into(),
            }]
        );
    }

    #[test]
    fn test_unsorted_input_matches_sorted() {
        let sorted = gusts(&[
            ("2024-01-01T00:00", Some(2.0)),
            ("2024-01-01T01:00", Some(6.0)),
            ("2024-01-01T02:00", Some(7.0)),
            ("2024-01-01T03:00", Some(6.0)),
            ("2024-01-01T04:00", Some(2.0)),
        ]);
        let mut shuffled = sorted.clone();
        shuffled.swap(0, 3);
        shuffled.swap(1, 4);
        assert_eq!(
            exceedance_intervals(&shuffled, 5.0, ObservationField::WindSpeedMax),
            exceedance_intervals(&sorted, 5.0, ObservationField::WindSpeedMax)
        );
    }

    #[test]
    fn test_isolated_and_threshold_equal() {
        let obs = gusts(&[
            ("2024-01-01T00:00", Some(5.0)),
            ("2024-01-01T01:00", Some(5.1)),
            ("2024-01-01T02:00", None),
            ("2024-01-01T03:00", Some(f64::NAN)),
            ("2024-01-01T04:00", Some(9.0)),
        ]);
        let intervals = exceedance_intervals(&obs, 5.0, ObservationField::WindSpeedMax);
        assert_eq!(intervals.len(), 2);
        assert_eq!(intervals[0].start, intervals[0].end);
        assert_eq!(intervals[1].start, "2024-01-01T04:00");
    }

    #[test]
    fn test_gap_in_time_does_not_split_run() {
        let obs = gusts(&[
            ("2024-01-01T01:00", Some(8.0)),
            ("2024-01-03T01:00", Some(8.0)),
        ]);
        let intervals = exceedance_intervals(&obs, 5.0, ObservationField::WindSpeedMax);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].end, "2024-01-03T01:00");
    }

    #[test]
    fn test_no_exceedance() {
        let obs = gusts(&[("2024-01-01T00:00", Some(1.0))]);
        assert!(exceedance_intervals(&obs, 5.0, ObservationField::WindSpeedMax).is_empty());
        assert!(exceedance_intervals(&[], 5.0, ObservationField::WindSpeedMax).is_empty());
    }

    #[test]
    fn test_other_fields() {
        let obs = vec![Observation {
            temperature: Some(35.0),
            ..Observation::empty("2024-07-01T15:00")
        }];
        assert_eq!(exceedance_intervals(&obs, 30.0, ObservationField::Temperature).len(), 1);
        assert!(exceedance_intervals(&obs, 30.0, ObservationField::WindSpeed).is_empty());
    }
}
