//! Upstream weather data providers
//!
//! Every source implements [`WeatherProvider`]. The orchestrator in
//! [`crate::service`] only talks to this trait, so fake providers can stand
//! in for the real ones in tests.

use crate::error::ApiError;
use crate::models::{
    DateRange, Granularity, Observation, ObservationLatest, ProviderId, Station,
    TimeseriesRequest, TimeseriesResponse, WeatherVariable,
};
use async_trait::async_trait;

pub mod meteocat;
pub mod mock;
pub mod open_meteo;
pub mod xema;

pub use meteocat::MeteocatProvider;
pub use mock::MockProvider;
pub use open_meteo::OpenMeteoProvider;
pub use xema::XemaProvider;

/// Capabilities shared by every data source
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    /// Whether the credentials this provider needs are present
    fn is_configured(&self) -> bool {
        true
    }

    async fn list_stations(&self) -> Result<Vec<Station>, ApiError>;

    async fn get_latest(&self, station_id: &str) -> Result<ObservationLatest, ApiError>;

    async fn get_timeseries(
        &self,
        request: &TimeseriesRequest,
    ) -> Result<TimeseriesResponse, ApiError>;

    /// True when [`WeatherProvider::get_observations`] is implemented natively
    fn supports_observations(&self) -> bool {
        false
    }

    /// Variables requested one by one when observations are assembled from
    /// single-variable series
    fn observation_variables(&self, granularity: Granularity) -> Vec<WeatherVariable> {
        let mut variables = vec![
            WeatherVariable::Temperature,
            WeatherVariable::Humidity,
            WeatherVariable::WindSpeed,
            WeatherVariable::WindSpeedMax,
        ];
        if granularity != Granularity::Daily {
            variables.push(WeatherVariable::WindDirection);
        }
        variables.push(WeatherVariable::Precipitation);
        variables
    }

    /// Dense observations for a station in one pass
    async fn get_observations(
        &self,
        station: &Station,
        _range: &DateRange,
        _granularity: Granularity,
    ) -> Result<Vec<Observation>, ApiError> {
        Err(ApiError::invalid_params(format!(
            "{} cannot return observations for {} directly",
            self.id(),
            station.id
        ))
        .with_provider(self.id()))
    }
}

/// Barcelona stations used when a provider has no usable station list
#[must_use]
pub fn builtin_stations(provider: ProviderId) -> Vec<Station> {
    [
        ("D5", "Barcelona - el Raval", 41.3797, 2.1682, 33.0),
        ("X2", "Observatori Fabra", 41.4184, 2.1239, 411.0),
        ("X4", "Barcelona - Zona Universitària", 41.3870, 2.1130, 81.0),
        ("X8", "Barcelona - Barceloneta", 41.3850, 2.2010, 2.0),
        ("XL", "El Prat de Llobregat", 41.2974, 2.0833, 6.0),
    ]
    .into_iter()
    .map(|(id, name, lat, lon, elevation)| {
        Station::new(id, name, lat, lon, provider).with_elevation(elevation)
    })
    .collect()
}

/// Look a station up in the built-in list
pub fn builtin_station(provider: ProviderId, station_id: &str) -> Result<Station, ApiError> {
    builtin_stations(provider)
        .into_iter()
        .find(|s| s.id.eq_ignore_ascii_case(station_id))
        .ok_or_else(|| {
            ApiError::not_found(format!("unknown station '{station_id}'")).with_provider(provider)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiErrorCode;

    #[test]
    fn test_builtin_stations() {
        let stations = builtin_stations(ProviderId::OpenMeteo);
        assert_eq!(stations.len(), 5);
        assert!(stations.iter().all(|s| s.provider == ProviderId::OpenMeteo));
        let fabra = builtin_station(ProviderId::OpenMeteo, "x2").unwrap();
        assert_eq!(fabra.name, "Observatori Fabra");
        assert_eq!(fabra.elevation, Some(411.0));
    }

    #[test]
    fn test_unknown_builtin_station() {
        let err = builtin_station(ProviderId::Mock, "ZZ").unwrap_err();
        assert_eq!(err.code, ApiErrorCode::NotFound);
        assert_eq!(err.provider, Some(ProviderId::Mock));
    }
}
