//! XEMA automatic station network via the Transparència Catalunya portal

use super::{WeatherProvider, builtin_stations};
use crate::aggregate::aggregate_hourly;
use crate::error::ApiError;
use crate::http::socrata::{
    DAILY_RESOURCE, STATIONS_RESOURCE, SUBDAILY_RESOURCE, SocrataClient, SocrataQuery,
    escape_literal,
};
use crate::models::timestamp::{local_now, parse_timestamp};
use crate::models::{
    AggregationType, DateRange, Granularity, Observation, ObservationLatest, ProviderId, Station,
    TimeseriesPoint, TimeseriesRequest, TimeseriesResponse, WeatherVariable, data_source_label,
};
use crate::normalize::{
    DAILY_CODE_MAP, KeyResolution, RawRow, SUBDAILY_CODE_MAP, VariableCodeMap,
    attach_daily_gust_times, daily_codes, normalize, parse_numeric, subdaily_codes,
};
use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeDelta};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

const STATION_LIMIT: usize = 2000;
const LATEST_WINDOW_HOURS: i64 = 2;

/// Sub-daily codes fetched for observation requests
const OBSERVATION_CODES: [&str; 6] = [
    subdaily_codes::TEMPERATURE,
    subdaily_codes::HUMIDITY,
    subdaily_codes::PRECIPITATION,
    subdaily_codes::WIND_SPEED_10M,
    subdaily_codes::WIND_DIRECTION_10M,
    subdaily_codes::WIND_GUST_10M,
];

const DAILY_OBSERVATION_CODES: [&str; 5] = [
    daily_codes::MEAN_TEMPERATURE,
    daily_codes::MEAN_HUMIDITY,
    daily_codes::PRECIPITATION,
    daily_codes::MEAN_WIND_SPEED,
    daily_codes::MAX_GUST,
];

#[derive(Debug, Deserialize)]
struct StationRow {
    codi_estacio: Option<String>,
    nom_estacio: Option<String>,
    #[serde(default)]
    latitud: Option<Value>,
    #[serde(default)]
    longitud: Option<Value>,
    #[serde(default)]
    altitud: Option<Value>,
    #[serde(default)]
    nom_municipi: Option<String>,
}

fn station_from_row(row: StationRow) -> Option<Station> {
    let id = row.codi_estacio.filter(|id| !id.trim().is_empty())?;
    let latitude = row.latitud.as_ref().and_then(parse_numeric)?;
    let longitude = row.longitud.as_ref().and_then(parse_numeric)?;
    let name = row.nom_estacio.unwrap_or_else(|| id.clone());

    let mut station = Station::new(id, name, latitude, longitude, ProviderId::XemaTransparencia);
    station.elevation = row.altitud.as_ref().and_then(parse_numeric);
    station.municipality = row.nom_municipi;
    Some(station)
}

/// XEMA code of a variable at the given aggregation, if it has one
#[must_use]
pub fn variable_code(variable: WeatherVariable, aggregation: AggregationType) -> Option<&'static str> {
    match (aggregation, variable) {
        (AggregationType::Hourly, WeatherVariable::Temperature) => Some(subdaily_codes::TEMPERATURE),
        (AggregationType::Hourly, WeatherVariable::Humidity) => Some(subdaily_codes::HUMIDITY),
        (AggregationType::Hourly, WeatherVariable::WindSpeed) => Some(subdaily_codes::WIND_SPEED_10M),
        (AggregationType::Hourly, WeatherVariable::WindSpeedMax) => Some(subdaily_codes::WIND_GUST_10M),
        (AggregationType::Hourly, WeatherVariable::WindDirection) => {
            Some(subdaily_codes::WIND_DIRECTION_10M)
        }
        (AggregationType::Hourly, WeatherVariable::Precipitation) => {
            Some(subdaily_codes::PRECIPITATION)
        }
        (AggregationType::Daily, WeatherVariable::Temperature) => Some(daily_codes::MEAN_TEMPERATURE),
        (AggregationType::Daily, WeatherVariable::Humidity) => Some(daily_codes::MEAN_HUMIDITY),
        (AggregationType::Daily, WeatherVariable::WindSpeed) => Some(daily_codes::MEAN_WIND_SPEED),
        (AggregationType::Daily, WeatherVariable::WindSpeedMax) => Some(daily_codes::MAX_GUST),
        (AggregationType::Daily, WeatherVariable::Precipitation) => Some(daily_codes::PRECIPITATION),
        _ => None,
    }
}

/// `$where` clause selecting whole local days of some variable codes
#[must_use]
pub fn measurement_clause(station_id: &str, range: &DateRange, codes: &[&str]) -> String {
    let codes = codes
        .iter()
        .map(|code| format!("'{}'", escape_literal(code)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "codi_estacio = '{}' AND data_lectura >= '{}T00:00:00' AND data_lectura <= '{}T23:59:59' AND codi_variable in ({codes})",
        escape_literal(station_id),
        range.from().format("%Y-%m-%d"),
        range.to().format("%Y-%m-%d"),
    )
}

/// `$where` clause selecting recent readings of some variable codes
#[must_use]
pub fn recent_clause(station_id: &str, since: NaiveDateTime, codes: &[&str]) -> String {
    let codes = codes
        .iter()
        .map(|code| format!("'{}'", escape_literal(code)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "codi_estacio = '{}' AND data_lectura >= '{}' AND codi_variable in ({codes})",
        escape_literal(station_id),
        since.format("%Y-%m-%dT%H:%M:%S"),
    )
}

fn rows_to_points(rows: &[RawRow], resolution: KeyResolution) -> Vec<TimeseriesPoint> {
    let mut points: Vec<TimeseriesPoint> = rows
        .iter()
        .filter_map(|row| {
            let timestamp = resolution.key_of(&row.data_lectura)?;
            Some(TimeseriesPoint {
                timestamp,
                value: row.numeric_value(),
            })
        })
        .collect();
    points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    points
}

fn label_all(observations: Vec<Observation>, station: &Station) -> Vec<Observation> {
    let label = data_source_label(ProviderId::XemaTransparencia, &station.name);
    observations
        .into_iter()
        .map(|obs| obs.with_label(label.clone()))
        .collect()
}

pub struct XemaProvider {
    client: SocrataClient,
    page_size: usize,
}

impl XemaProvider {
    #[must_use]
    pub fn new(client: SocrataClient, page_size: usize) -> Self {
        Self { client, page_size }
    }

    async fn fetch_rows(&self, resource_id: &str, clause: String) -> Result<Vec<RawRow>, ApiError> {
        let query = SocrataQuery::new(self.page_size)
            .filter(clause)
            .order("data_lectura ASC");
        self.client.fetch_all::<RawRow>(resource_id, &query).await
    }

    async fn fetch_station_rows(&self) -> Result<Vec<Station>, ApiError> {
        let query = SocrataQuery::new(STATION_LIMIT)
            .select("codi_estacio,nom_estacio,latitud,longitud,altitud,nom_municipi,codi_estat_ema,nom_xarxa")
            .filter("nom_xarxa = 'XEMA' AND codi_estat_ema = '2'")
            .order("nom_estacio ASC");
        let rows = self
            .client
            .fetch_one::<StationRow>(STATIONS_RESOURCE, &query)
            .await?;
        Ok(rows.into_iter().filter_map(station_from_row).collect())
    }

    fn normalized(
        rows: &[RawRow],
        map: &VariableCodeMap,
        range: &DateRange,
        station: &Station,
    ) -> Vec<Observation> {
        let observations = trim_to_range(normalize(rows, map), range, map.resolution());
        label_all(observations, station)
    }
}

/// Keep observations inside `range`: instants for minute keys, calendar days
/// (both ends included) for day keys. Unreadable keys are dropped.
#[must_use]
pub fn trim_to_range(
    observations: Vec<Observation>,
    range: &DateRange,
    resolution: KeyResolution,
) -> Vec<Observation> {
    let (first_day, last_day) = (range.from().date(), range.to().date());
    observations
        .into_iter()
        .filter(|obs| {
            let Some(dt) = parse_timestamp(&obs.timestamp) else {
                return false;
            };
            match resolution {
                KeyResolution::Minute => range.contains(dt),
                KeyResolution::Day => (first_day..=last_day).contains(&dt.date()),
            }
        })
        .collect()
}

#[async_trait]
impl WeatherProvider for XemaProvider {
    fn id(&self) -> ProviderId {
        ProviderId::XemaTransparencia
    }

    #[instrument(skip(self))]
    async fn list_stations(&self) -> Result<Vec<Station>, ApiError> {
        match self.fetch_station_rows().await {
            Ok(stations) if !stations.is_empty() => {
                info!("Loaded {} XEMA stations", stations.len());
                Ok(stations)
            }
            Ok(_) => {
                warn!("XEMA station list is empty, using built-in stations");
                Ok(builtin_stations(self.id()))
            }
            Err(e) => {
                warn!("XEMA station list failed ({}), using built-in stations", e);
                Ok(builtin_stations(self.id()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_latest(&self, station_id: &str) -> Result<ObservationLatest, ApiError> {
        let since = local_now() - TimeDelta::hours(LATEST_WINDOW_HOURS);
        let rows = self
            .fetch_rows(SUBDAILY_RESOURCE, recent_clause(station_id, since, &OBSERVATION_CODES))
            .await?;
        let observation = normalize(&rows, &SUBDAILY_CODE_MAP)
            .pop()
            .ok_or_else(|| {
                ApiError::not_found(format!(
                    "no readings for station {station_id} in the last {LATEST_WINDOW_HOURS} hours"
                ))
                .with_provider(self.id())
            })?;
        Ok(ObservationLatest {
            station_id: station_id.to_string(),
            provider: self.id(),
            observation,
        })
    }

    #[instrument(skip(self), fields(station = %request.station_id, variable = %request.variable))]
    async fn get_timeseries(
        &self,
        request: &TimeseriesRequest,
    ) -> Result<TimeseriesResponse, ApiError> {
        let code = variable_code(request.variable, request.aggregation).ok_or_else(|| {
            ApiError::invalid_params(format!(
                "variable {} is not available at {:?} aggregation",
                request.variable, request.aggregation
            ))
            .with_provider(self.id())
        })?;
        let (resource, resolution) = match request.aggregation {
            AggregationType::Hourly => (SUBDAILY_RESOURCE, KeyResolution::Minute),
            AggregationType::Daily => (DAILY_RESOURCE, KeyResolution::Day),
        };
        let rows = self
            .fetch_rows(resource, measurement_clause(&request.station_id, &request.range, &[code]))
            .await?;
        debug!("Fetched {} rows for {}", rows.len(), request.variable);

        Ok(TimeseriesResponse {
            station_id: request.station_id.clone(),
            provider: self.id(),
            variable: request.variable,
            unit: request.variable.unit().to_string(),
            aggregation: request.aggregation,
            points: rows_to_points(&rows, resolution),
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
        match granularity {
            Granularity::Daily => {
                let (daily_rows, gust_rows) = futures::try_join!(
                    self.fetch_rows(
                        DAILY_RESOURCE,
                        measurement_clause(&station.id, range, &DAILY_OBSERVATION_CODES),
                    ),
                    self.fetch_rows(
                        SUBDAILY_RESOURCE,
                        measurement_clause(&station.id, range, &[subdaily_codes::WIND_GUST_10M]),
                    ),
                )?;
                info!(
                    "Fetched {} daily rows and {} gust rows",
                    daily_rows.len(),
                    gust_rows.len()
                );
                let daily = Self::normalized(&daily_rows, &DAILY_CODE_MAP, range, station);
                Ok(attach_daily_gust_times(daily, &gust_rows))
            }
            Granularity::Subdaily | Granularity::Hourly => {
                let rows = self
                    .fetch_rows(
                        SUBDAILY_RESOURCE,
                        measurement_clause(&station.id, range, &OBSERVATION_CODES),
                    )
                    .await?;
                info!("Fetched {} sub-daily rows", rows.len());
                let observations = Self::normalized(&rows, &SUBDAILY_CODE_MAP, range, station);
                if granularity == Granularity::Hourly {
                    Ok(label_all(aggregate_hourly(&observations), station))
                } else {
                    Ok(observations)
                }
            }
        }
    }
}
