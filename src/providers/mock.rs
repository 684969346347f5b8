//! Synthetic data source for offline runs

use super::{WeatherProvider, builtin_station, builtin_stations};
use crate::coverage::{days_in_range, floor_to_half_hour};
use crate::error::ApiError;
use crate::models::timestamp::{day_key, local_now, minute_key};
use crate::models::{
    AggregationType, Granularity, Observation, ObservationLatest, ProviderId, Station,
    TimeseriesPoint, TimeseriesRequest, TimeseriesResponse, WeatherVariable, data_source_label,
};
use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use rand::RngExt;
use std::f64::consts::PI;

/// Diurnal phase in `[-1, 1]`, peaking mid-afternoon
fn diurnal(ts: NaiveDateTime) -> f64 {
    let hours = f64::from(ts.hour()) + f64::from(ts.minute()) / 60.0;
    (2.0 * PI * (hours - 9.0) / 24.0).sin()
}

/// Noise-free value of a variable at a given instant
#[must_use]
pub fn base_value(variable: WeatherVariable, ts: NaiveDateTime) -> f64 {
    let phase = diurnal(ts);
    let wind = 3.0 + 2.0 * phase;
    match variable {
        WeatherVariable::Temperature => 15.0 + 5.0 * phase,
        WeatherVariable::Humidity => 65.0 - 15.0 * phase,
        WeatherVariable::WindSpeed => wind,
        WeatherVariable::WindSpeedMin => wind * 0.5,
        WeatherVariable::WindSpeedMax => wind * 1.6,
        WeatherVariable::WindDirection => 200.0 + 40.0 * phase,
        WeatherVariable::Precipitation => 0.0,
        WeatherVariable::Pressure => 1013.0 - 2.0 * phase,
    }
}

fn jittered(variable: WeatherVariable, ts: NaiveDateTime) -> f64 {
    let base = base_value(variable, ts);
    let value = match variable {
        WeatherVariable::Precipitation => base,
        _ => base + rand::rng().random_range(-0.3..0.3),
    };
    let value = match variable {
        WeatherVariable::Humidity => value.clamp(0.0, 100.0),
        WeatherVariable::WindDirection => value.rem_euclid(360.0),
        WeatherVariable::Temperature | WeatherVariable::Pressure => value,
        _ => value.max(0.0),
    };
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Default)]
pub struct MockProvider;

impl MockProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn station(&self, station_id: &str) -> Result<Station, ApiError> {
        builtin_station(self.id(), station_id)
    }
}

#[async_trait]
impl WeatherProvider for MockProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Mock
    }

    async fn list_stations(&self) -> Result<Vec<Station>, ApiError> {
        Ok(builtin_stations(self.id()))
    }

    async fn get_latest(&self, station_id: &str) -> Result<ObservationLatest, ApiError> {
        let station = self.station(station_id)?;
        let slot = floor_to_half_hour(local_now());
        let mut observation = Observation::empty(minute_key(slot))
            .with_label(data_source_label(self.id(), &station.name));
        for variable in self.observation_variables(Granularity::Subdaily) {
            if let Some(field) = variable.field() {
                field.set(&mut observation, Some(jittered(variable, slot)));
            }
        }
        Ok(ObservationLatest {
            station_id: station.id,
            provider: self.id(),
            observation,
        })
    }

    async fn get_timeseries(
        &self,
        request: &TimeseriesRequest,
    ) -> Result<TimeseriesResponse, ApiError> {
        let station = self.station(&request.station_id)?;
        let points = match request.aggregation {
            AggregationType::Hourly => {
                let mut points = Vec::new();
                let mut slot = floor_to_half_hour(request.range.from());
                while slot <= request.range.to() {
                    if slot >= request.range.from() {
                        points.push(TimeseriesPoint {
                            timestamp: minute_key(slot),
                            value: Some(jittered(request.variable, slot)),
                        });
                    }
                    slot += TimeDelta::minutes(30);
                }
                points
            }
            // One point per calendar day, sampled at noon
            AggregationType::Daily => days_in_range(&request.range)
                .into_iter()
                .map(|day| TimeseriesPoint {
                    timestamp: day_key(day),
                    value: Some(jittered(
                        request.variable,
                        day.and_time(NaiveTime::MIN) + TimeDelta::hours(12),
                    )),
                })
                .collect(),
        };

        Ok(TimeseriesResponse {
            station_id: station.id,
            provider: self.id(),
            variable: request.variable,
            unit: request.variable.unit().to_string(),
            aggregation: request.aggregation,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_base_values_are_plausible() {
        let afternoon = day(1).and_hms_opt(15, 0, 0).unwrap();
        let night = day(1).and_hms_opt(3, 0, 0).unwrap();
        assert!(
            base_value(WeatherVariable::Temperature, afternoon)
                > base_value(WeatherVariable::Temperature, night)
        );
        assert!(
            base_value(WeatherVariable::WindSpeedMax, afternoon)
                > base_value(WeatherVariable::WindSpeed, afternoon)
        );
    }

    #[tokio::test]
    async fn test_half_hourly_series_covers_range() {
        let range = DateRange::single_day(day(1));
        let request =
            TimeseriesRequest::new("X4", range, WeatherVariable::Humidity, AggregationType::Hourly);
        let response = MockProvider::new().get_timeseries(&request).await.unwrap();
        assert_eq!(response.points.len(), 48);
        assert_eq!(response.points[0].timestamp, "2024-03-01T00:00");
        assert_eq!(response.points[47].timestamp, "2024-03-01T23:30");
        assert!(
            response
                .points
                .iter()
                .all(|p| p.value.is_some_and(|v| (0.0..=100.0).contains(&v)))
        );
    }

    #[tokio::test]
    async fn test_daily_series_one_point_per_day() {
        let range = DateRange::from_dates(day(1), day(7)).unwrap();
        let request =
            TimeseriesRequest::new("D5", range, WeatherVariable::WindSpeed, AggregationType::Daily);
        let response = MockProvider::new().get_timeseries(&request).await.unwrap();
        assert_eq!(response.points.len(), 7);
        assert_eq!(response.points[6].timestamp, "2024-03-07");
    }

    #[tokio::test]
    async fn test_daily_series_keeps_last_day_ending_before_noon() {
        let range = DateRange::new(
            day(1).and_hms_opt(0, 0, 0).unwrap(),
            day(3).and_hms_opt(6, 0, 0).unwrap(),
        )
        .unwrap();
        let request =
            TimeseriesRequest::new("X4", range, WeatherVariable::Temperature, AggregationType::Daily);
        let response = MockProvider::new().get_timeseries(&request).await.unwrap();
        let days: Vec<&str> = response.points.iter().map(|p| p.timestamp.as_str()).collect();
        assert_eq!(days, vec!["2024-03-01", "2024-03-02", "2024-03-03"]);
    }

    #[tokio::test]
    async fn test_unknown_station_is_not_found() {
        let request = TimeseriesRequest::new(
            "nope",
            DateRange::single_day(day(1)),
            WeatherVariable::Temperature,
            AggregationType::Hourly,
        );
        assert!(MockProvider::new().get_timeseries(&request).await.is_err());
        assert!(MockProvider::new().get_latest("nope").await.is_err());
    }
}
