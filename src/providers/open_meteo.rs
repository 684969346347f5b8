//! Open-Meteo historical archive, used as a fallback reanalysis source

use super::{WeatherProvider, builtin_station, builtin_stations};
use crate::error::ApiError;
use crate::http::FetchClient;
use crate::models::timestamp::{local_now, parse_timestamp};
use crate::models::{
    AggregationType, DateRange, Granularity, Observation, ObservationLatest, ProviderId, Station,
    TimeseriesPoint, TimeseriesRequest, TimeseriesResponse, data_source_label,
};
use async_trait::async_trait;
use chrono::Days;
use serde::Deserialize;
use tracing::{debug, instrument};

const HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,wind_direction_10m,wind_gusts_10m,precipitation";
const DAILY_VARIABLES: &str = "temperature_2m_mean,relative_humidity_2m_mean,wind_speed_10m_mean,wind_gusts_10m_max,precipitation_sum";
const LATEST_LOOKBACK_DAYS: u64 = 2;

/// Archive response from `OpenMeteo`
#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    hourly: Option<HourlyData>,
    daily: Option<DailyData>,
}

/// Hourly archive data
#[derive(Debug, Deserialize)]
struct HourlyData {
    time: Vec<String>,
    #[serde(rename = "temperature_2m")]
    temperature: Option<Vec<Option<f64>>>,
    #[serde(rename = "relative_humidity_2m")]
    humidity: Option<Vec<Option<f64>>>,
    #[serde(rename = "wind_speed_10m")]
    wind_speed: Option<Vec<Option<f64>>>,
    #[serde(rename = "wind_direction_10m")]
    wind_direction: Option<Vec<Option<f64>>>,
    #[serde(rename = "wind_gusts_10m")]
    wind_gusts: Option<Vec<Option<f64>>>,
    precipitation: Option<Vec<Option<f64>>>,
}

/// Daily archive data
#[derive(Debug, Deserialize)]
struct DailyData {
    time: Vec<String>,
    #[serde(rename = "temperature_2m_mean")]
    temperature: Option<Vec<Option<f64>>>,
    #[serde(rename = "relative_humidity_2m_mean")]
    humidity: Option<Vec<Option<f64>>>,
    #[serde(rename = "wind_speed_10m_mean")]
    wind_speed: Option<Vec<Option<f64>>>,
    #[serde(rename = "wind_gusts_10m_max")]
    wind_gusts_max: Option<Vec<Option<f64>>>,
    #[serde(rename = "precipitation_sum")]
    precipitation: Option<Vec<Option<f64>>>,
}

fn at(values: Option<&Vec<Option<f64>>>, i: usize) -> Option<f64> {
    values
        .and_then(|v| v.get(i).copied().flatten())
        .filter(|v| v.is_finite())
}

impl ArchiveResponse {
    /// Daily records carry no wind direction
    fn into_observations(self, label: &str) -> Vec<Observation> {
        let mut observations = Vec::new();

        if let Some(hourly) = self.hourly {
            for (i, time) in hourly.time.iter().enumerate() {
                let mut obs = Observation::empty(time.clone()).with_label(label);
                obs.temperature = at(hourly.temperature.as_ref(), i);
                obs.humidity = at(hourly.humidity.as_ref(), i);
                obs.wind_speed = at(hourly.wind_speed.as_ref(), i);
                obs.wind_direction = at(hourly.wind_direction.as_ref(), i);
                obs.wind_speed_max = at(hourly.wind_gusts.as_ref(), i);
                obs.precipitation = at(hourly.precipitation.as_ref(), i);
                observations.push(obs);
            }
        }

        if let Some(daily) = self.daily {
            for (i, time) in daily.time.iter().enumerate() {
                let mut obs = Observation::empty(time.clone()).with_label(label);
                obs.temperature = at(daily.temperature.as_ref(), i);
                obs.humidity = at(daily.humidity.as_ref(), i);
                obs.wind_speed = at(daily.wind_speed.as_ref(), i);
                obs.wind_speed_max = at(daily.wind_gusts_max.as_ref(), i);
                obs.precipitation = at(daily.precipitation.as_ref(), i);
                observations.push(obs);
            }
        }

        observations
    }
}

fn has_any_value(obs: &Observation) -> bool {
    [
        obs.temperature,
        obs.humidity,
        obs.wind_speed,
        obs.wind_speed_max,
        obs.wind_direction,
        obs.precipitation,
    ]
    .iter()
    .any(Option::is_some)
}

pub struct OpenMeteoProvider {
    fetch: FetchClient,
    archive_url: String,
}

impl OpenMeteoProvider {
    #[must_use]
    pub fn new(fetch: FetchClient, archive_url: impl Into<String>) -> Self {
        Self {
            fetch,
            archive_url: archive_url.into(),
        }
    }

    /// Archive request URL; sub-daily requests are served at hourly resolution
    #[must_use]
    pub fn archive_request_url(
        &self,
        station: &Station,
        range: &DateRange,
        granularity: Granularity,
    ) -> String {
        let variables = match granularity {
            Granularity::Daily => format!("daily={DAILY_VARIABLES}"),
            Granularity::Subdaily | Granularity::Hourly => format!("hourly={HOURLY_VARIABLES}"),
        };
        format!(
            "{}?latitude={}&longitude={}&start_date={}&end_date={}&{variables}&wind_speed_unit=ms&timezone={}",
            self.archive_url,
            station.latitude,
            station.longitude,
            range.from().format("%Y-%m-%d"),
            range.to().format("%Y-%m-%d"),
            urlencoding::encode("Europe/Madrid"),
        )
    }

    async fn fetch_archive(
        &self,
        station: &Station,
        range: &DateRange,
        granularity: Granularity,
    ) -> Result<Vec<Observation>, ApiError> {
        let url = self.archive_request_url(station, range, granularity);
        let response = self
            .fetch
            .fetch_json::<ArchiveResponse>(&url, &[], self.id())
            .await?;
        let label = data_source_label(self.id(), &station.name);
        let observations: Vec<Observation> = response
            .data
            .into_observations(&label)
            .into_iter()
            .filter(|obs| match granularity {
                Granularity::Daily => true,
                _ => parse_timestamp(&obs.timestamp).is_some_and(|dt| range.contains(dt)),
            })
            .collect();
        debug!("Archive returned {} records", observations.len());
        Ok(observations)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn list_stations(&self) -> Result<Vec<Station>, ApiError> {
        Ok(builtin_stations(self.id()))
    }

    #[instrument(skip(self))]
    async fn get_latest(&self, station_id: &str) -> Result<ObservationLatest, ApiError> {
        let station = builtin_station(self.id(), station_id)?;
        let today = local_now().date();
        let start = today
            .checked_sub_days(Days::new(LATEST_LOOKBACK_DAYS))
            .unwrap_or(today);
        let range = DateRange::from_dates(start, today)?;

        let observation = self
            .fetch_archive(&station, &range, Granularity::Hourly)
            .await?
            .into_iter()
            .rev()
            .find(has_any_value)
            .ok_or_else(|| {
                ApiError::not_found(format!("no recent archive data for {station_id}"))
                    .with_provider(self.id())
            })?;
        Ok(ObservationLatest {
            station_id: station.id,
            provider: self.id(),
            observation,
        })
    }

    #[instrument(skip(self), fields(station = %request.station_id, variable = %request.variable))]
    async fn get_timeseries(
        &self,
        request: &TimeseriesRequest,
    ) -> Result<TimeseriesResponse, ApiError> {
        let field = request.variable.field().ok_or_else(|| {
            ApiError::invalid_params(format!(
                "variable {} is not available from the archive",
                request.variable
            ))
            .with_provider(self.id())
        })?;
        let station = builtin_station(self.id(), &request.station_id)?;
        let granularity = match request.aggregation {
            AggregationType::Hourly => Granularity::Hourly,
            AggregationType::Daily => Granularity::Daily,
        };

        let points = self
            .fetch_archive(&station, &request.range, granularity)
            .await?
            .into_iter()
            .map(|obs| TimeseriesPoint {
                value: field.get(&obs),
                timestamp: obs.timestamp,
            })
            .collect();

        Ok(TimeseriesResponse {
            station_id: request.station_id.clone(),
            provider: self.id(),
            variable: request.variable,
            unit: request.variable.unit().to_string(),
            aggregation: request.aggregation,
            points,
        })
    }

    fn supports_observations(&self) -> bool {
        true
    }

    #[instrument(skip(self, station), fields(station = %station.id))]
    async fn get_observations(
        &self,
        station: &Station,
        range: &DateRange,
        granularity: Granularity,
    ) -> Result<Vec<Observation>, ApiError> {
        self.fetch_archive(station, range, granularity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn provider() -> OpenMeteoProvider {
        let fetch = FetchClient::new(Default::default()).unwrap();
        OpenMeteoProvider::new(fetch, "https://archive-api.open-meteo.com/v1/archive")
    }

    #[test]
    fn test_archive_url() {
        let station = builtin_station(ProviderId::OpenMeteo, "D5").unwrap();
        let range = DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
        )
        .unwrap();
        let url = provider().archive_request_url(&station, &range, Granularity::Daily);
        assert!(url.starts_with(
            "https://archive-api.open-meteo.com/v1/archive?latitude=41.3797&longitude=2.1682"
        ));
        assert!(url.contains("start_date=2024-03-01&end_date=2024-03-07"));
        assert!(url.contains("daily=temperature_2m_mean,"));
        assert!(!url.contains("wind_direction"));
        assert!(url.contains("wind_speed_unit=ms"));
        assert!(url.ends_with("timezone=Europe%2FMadrid"));
    }

    #[test]
    fn test_hourly_response_mapping() {
        let response: ArchiveResponse = serde_json::from_value(json!({
            "hourly": {
                "time": ["2024-03-01T00:00", "2024-03-01T01:00"],
                "temperature_2m": [10.5, null],
                "relative_humidity_2m": [80, 82],
                "wind_speed_10m": [3.1, 2.9],
                "wind_direction_10m": [270, 260],
                "wind_gusts_10m": [7.4, 6.0],
                "precipitation": [0.0, 0.2]
            }
        }))
        .unwrap();
        let observations = response.into_observations("label");
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].temperature, Some(10.5));
        assert_eq!(observations[0].wind_speed_max, Some(7.4));
        assert_eq!(observations[1].temperature, None);
        assert_eq!(observations[1].humidity, Some(82.0));
        assert_eq!(observations[1].data_source_label.as_deref(), Some("label"));
    }

    #[test]
    fn test_daily_response_keeps_gust_apart_from_mean_wind() {
        let response: ArchiveResponse = serde_json::from_value(json!({
            "daily": {
                "time": ["2024-03-01"],
                "wind_speed_10m_mean": [4.2],
                "wind_gusts_10m_max": [12.8],
                "wind_direction_10m_dominant": [250]
            }
        }))
        .unwrap();
        let observations = response.into_observations("label");
        assert_eq!(observations[0].timestamp, "2024-03-01");
        assert_eq!(observations[0].wind_speed, Some(4.2));
        assert_eq!(observations[0].wind_speed_max, Some(12.8));
        assert_eq!(observations[0].wind_direction, None);
        assert_eq!(observations[0].precipitation, None);
    }
}
