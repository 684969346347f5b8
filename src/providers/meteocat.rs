//! Meteocat XEMA REST API (requires an API key)

use super::WeatherProvider;
use crate::coverage::days_in_range;
use crate::error::{ApiError, ApiErrorCode};
use crate::http::FetchClient;
use crate::models::timestamp::{day_key, local_now, minute_key, parse_timestamp};
use crate::models::{
    AggregationType, DateRange, Granularity, Observation, ObservationField, ObservationLatest,
    ProviderId, Station, TimeseriesPoint, TimeseriesRequest, TimeseriesResponse, WeatherVariable,
};
use crate::normalize::parse_numeric;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// Barcelona province code in Meteocat metadata
const BARCELONA_PROVINCE: f64 = 8.0;
/// Reading state of validated values
const VALID_STATE: &str = "V";

#[derive(Debug, Deserialize)]
struct Coordinates {
    latitud: f64,
    longitud: f64,
}

#[derive(Debug, Deserialize)]
struct Named {
    nom: String,
}

#[derive(Debug, Deserialize)]
struct Coded {
    codi: Value,
}

#[derive(Debug, Deserialize)]
struct MeteocatStation {
    codi: String,
    nom: String,
    coordenades: Coordinates,
    #[serde(default)]
    altitud: Option<f64>,
    #[serde(default)]
    municipi: Option<Named>,
    #[serde(default)]
    provincia: Option<Coded>,
}

impl MeteocatStation {
    fn in_barcelona_province(&self) -> bool {
        self.provincia
            .as_ref()
            .and_then(|p| parse_numeric(&p.codi))
            .is_some_and(|code| code == BARCELONA_PROVINCE)
    }

    fn into_station(self) -> Station {
        let mut station = Station::new(
            self.codi,
            self.nom,
            self.coordenades.latitud,
            self.coordenades.longitud,
            ProviderId::Meteocat,
        );
        station.elevation = self.altitud;
        station.municipality = self.municipi.map(|m| m.nom);
        station
    }
}

/// A single reading, used by both measured and daily statistic endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct MeteocatReading {
    pub data: String,
    #[serde(default)]
    pub valor: Option<f64>,
    #[serde(default)]
    pub estat: Option<String>,
}

impl MeteocatReading {
    fn is_valid(&self) -> bool {
        self.estat.as_deref() == Some(VALID_STATE)
    }
}

/// Readings of one day keyed by variable code
pub type MeasuredDay = HashMap<String, Vec<MeteocatReading>>;

/// Meteocat code of a variable at the given aggregation, if it has one
#[must_use]
pub fn variable_code(variable: WeatherVariable, aggregation: AggregationType) -> Option<&'static str> {
    match (aggregation, variable) {
        (AggregationType::Hourly, WeatherVariable::Temperature) => Some("32"),
        (AggregationType::Hourly, WeatherVariable::Humidity) => Some("33"),
        (AggregationType::Hourly, WeatherVariable::WindSpeed) => Some("30"),
        (AggregationType::Hourly, WeatherVariable::Precipitation) => Some("35"),
        (AggregationType::Daily, WeatherVariable::Temperature) => Some("1000"),
        (AggregationType::Daily, WeatherVariable::Humidity) => Some("1100"),
        (AggregationType::Daily, WeatherVariable::WindSpeed) => Some("1300"),
        (AggregationType::Daily, WeatherVariable::WindSpeedMax) => Some("1301"),
        (AggregationType::Daily, WeatherVariable::Precipitation) => Some("1400"),
        _ => None,
    }
}

const LATEST_FIELDS: [(&str, ObservationField); 4] = [
    ("32", ObservationField::Temperature),
    ("33", ObservationField::Humidity),
    ("30", ObservationField::WindSpeed),
    ("35", ObservationField::Precipitation),
];

/// Latest valid value per variable; the timestamp is the newest one used
#[must_use]
pub fn latest_observation(day: &MeasuredDay, fallback_timestamp: &str) -> Observation {
    let mut observation = Observation::empty(fallback_timestamp);
    let mut newest: Option<String> = None;

    for (code, field) in LATEST_FIELDS {
        let Some(readings) = day.get(code) else {
            continue;
        };
        let latest = readings
            .iter()
            .filter(|r| r.is_valid() && r.valor.is_some())
            .filter_map(|r| parse_timestamp(&r.data).map(|ts| (ts, r)))
            .max_by_key(|(ts, _)| *ts);
        if let Some((ts, reading)) = latest {
            field.set(&mut observation, reading.valor.filter(|v| v.is_finite()));
            let key = minute_key(ts);
            if newest.as_ref().is_none_or(|n| key > *n) {
                newest = Some(key);
            }
        }
    }

    if let Some(ts) = newest {
        observation.timestamp = ts;
    }
    observation
}

/// Valid readings inside `range` as series points keyed at `aggregation`
#[must_use]
pub fn valid_points(
    readings: &[MeteocatReading],
    range: &DateRange,
    aggregation: AggregationType,
) -> Vec<TimeseriesPoint> {
    readings
        .iter()
        .filter(|r| r.is_valid())
        .filter_map(|r| {
            let ts = parse_timestamp(&r.data)?;
            let in_range = match aggregation {
                AggregationType::Hourly => range.contains(ts),
                AggregationType::Daily => {
                    range.from().date() <= ts.date() && ts.date() <= range.to().date()
                }
            };
            in_range.then(|| TimeseriesPoint {
                timestamp: match aggregation {
                    AggregationType::Hourly => minute_key(ts),
                    AggregationType::Daily => day_key(ts.date()),
                },
                value: r.valor.filter(|v| v.is_finite()),
            })
        })
        .collect()
}

/// Every `(year, month)` touched by `range`
fn months_of(range: &DateRange) -> Vec<(i32, u32)> {
    let mut months: Vec<(i32, u32)> = days_in_range(range)
        .into_iter()
        .map(|d| (d.year(), d.month()))
        .collect();
    months.dedup();
    months
}

pub struct MeteocatProvider {
    fetch: FetchClient,
    base_url: String,
    api_key: Option<String>,
}

impl MeteocatProvider {
    #[must_use]
    pub fn new(fetch: FetchClient, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            fetch,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn headers(&self) -> Result<Vec<(&'static str, String)>, ApiError> {
        let key = self.api_key.as_ref().ok_or_else(|| {
            ApiError::missing_api_key("Meteocat API key is not configured").with_provider(self.id())
        })?;
        Ok(vec![("X-Api-Key", key.clone())])
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let headers = self.headers()?;
        let response = self.fetch.fetch_json::<T>(url, &headers, self.id()).await?;
        Ok(response.data)
    }

    async fn measured_day(&self, station_id: &str, date: NaiveDate) -> Result<MeasuredDay, ApiError> {
        let url = format!(
            "{}/estacions/mesurades/{}/{}/{:02}/{:02}",
            self.base_url,
            urlencoding::encode(station_id),
            date.year(),
            date.month(),
            date.day()
        );
        self.get(&url).await
    }

    async fn daily_statistics(
        &self,
        code: &str,
        station_id: &str,
        (year, month): (i32, u32),
    ) -> Result<Vec<MeteocatReading>, ApiError> {
        let url = format!(
            "{}/variables/estadistics/diaris/{code}?codiEstacio={}&any={year}&mes={month:02}",
            self.base_url,
            urlencoding::encode(station_id),
        );
        self.get(&url).await
    }
}

/// Keep a chunk's readings, or skip the chunk when upstream has nothing for it
fn chunk_or_skip<T: Default>(result: Result<T, ApiError>, chunk: &str) -> Result<T, ApiError> {
    match result {
        Err(e) if e.code == ApiErrorCode::NotFound => {
            warn!("No Meteocat data for {}, skipping", chunk);
            Ok(T::default())
        }
        other => other,
    }
}

#[async_trait]
impl WeatherProvider for MeteocatProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Meteocat
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    #[instrument(skip(self))]
    async fn list_stations(&self) -> Result<Vec<Station>, ApiError> {
        let url = format!("{}/estacions/metadades?estat=ope", self.base_url);
        let stations: Vec<MeteocatStation> = self.get(&url).await?;
        let stations: Vec<Station> = stations
            .into_iter()
            .filter(MeteocatStation::in_barcelona_province)
            .map(MeteocatStation::into_station)
            .collect();
        info!("Loaded {} Meteocat stations", stations.len());
        Ok(stations)
    }

    #[instrument(skip(self))]
    async fn get_latest(&self, station_id: &str) -> Result<ObservationLatest, ApiError> {
        let now = local_now();
        let day = match self.measured_day(station_id, now.date()).await {
            Ok(day) => day,
            Err(e) if e.code == ApiErrorCode::NotFound => {
                debug!("No readings today for {}", station_id);
                MeasuredDay::new()
            }
            Err(e) => return Err(e),
        };
        Ok(ObservationLatest {
            station_id: station_id.to_string(),
            provider: self.id(),
            observation: latest_observation(&day, &minute_key(now)),
        })
    }

    #[instrument(skip(self), fields(station = %request.station_id, variable = %request.variable))]
    async fn get_timeseries(
        &self,
        request: &TimeseriesRequest,
    ) -> Result<TimeseriesResponse, ApiError> {
        let code = variable_code(request.variable, request.aggregation).ok_or_else(|| {
            ApiError::invalid_params(format!(
                "variable {} is not supported by Meteocat at {:?} aggregation",
                request.variable, request.aggregation
            ))
            .with_provider(self.id())
        })?;

        let mut points = Vec::new();
        match request.aggregation {
            AggregationType::Hourly => {
                for date in days_in_range(&request.range) {
                    let day = chunk_or_skip(
                        self.measured_day(&request.station_id, date).await,
                        &day_key(date),
                    )?;
                    if let Some(readings) = day.get(code) {
                        points.extend(valid_points(readings, &request.range, request.aggregation));
                    }
                }
            }
            AggregationType::Daily => {
                for month in months_of(&request.range) {
                    let readings = chunk_or_skip(
                        self.daily_statistics(code, &request.station_id, month).await,
                        &format!("{}-{:02}", month.0, month.1),
                    )?;
                    points.extend(valid_points(&readings, &request.range, request.aggregation));
                }
            }
        }
        points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        Ok(TimeseriesResponse {
            station_id: request.station_id.clone(),
            provider: self.id(),
            variable: request.variable,
            unit: request.variable.unit().to_string(),
            aggregation: request.aggregation,
            points,
        })
    }

    fn observation_variables(&self, granularity: Granularity) -> Vec<WeatherVariable> {
        let mut variables = vec![
            WeatherVariable::Temperature,
            WeatherVariable::Humidity,
            WeatherVariable::WindSpeed,
            WeatherVariable::Precipitation,
        ];
        if granularity == Granularity::Daily {
            variables.push(WeatherVariable::WindSpeedMax);
        }
        variables
    }
}
