//! Provider fallback orchestration
//!
//! Providers are tried strictly one after another in priority order. The
//! first success wins and later providers are never consulted; when every
//! candidate fails the per-provider errors are folded into one.

use crate::aggregate::aggregate_hourly;
use crate::cache::Cached;
use crate::config::{DataMode, MeteoConfig};
use crate::error::{ApiError, ApiErrorCode};
use crate::http::{FetchClient, FetchOptions, SocrataClient};
use crate::models::{
    AggregationType, DateRange, Granularity, Observation, ObservationLatest, ProviderId,
    ProviderResult, Station, TimeseriesRequest, TimeseriesResponse, data_source_label,
};
use crate::normalize::merge_timeseries;
use crate::providers::{
    MeteocatProvider, MockProvider, OpenMeteoProvider, WeatherProvider, XemaProvider,
};
use chrono::{DateTime, TimeDelta, Utc};
use futures::future::try_join_all;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Which providers an operation may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderSelection {
    /// Configured priority order with fallback
    #[default]
    Auto,
    /// A single provider, no fallback
    Only(ProviderId),
}

impl fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSelection::Auto => f.write_str("auto"),
            ProviderSelection::Only(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for ProviderSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(ProviderSelection::Auto)
        } else {
            s.parse::<ProviderId>().map(ProviderSelection::Only)
        }
    }
}

/// Fold the failures of every tried provider into one `PROVIDER_ERROR`.
///
/// Each provider's own code is kept in `details` under its id, and its
/// message under `{id}.message`.
#[must_use]
pub fn combine_errors(failures: Vec<(ProviderId, ApiError)>) -> ApiError {
    let message = failures
        .iter()
        .map(|(id, e)| format!("{id}: {}", e.message))
        .collect::<Vec<_>>()
        .join("; ");
    let mut combined = ApiError::provider_error(message);
    for (id, error) in &failures {
        combined = combined
            .with_detail(id.as_str(), error.code)
            .with_detail(format!("{id}.message"), &error.message);
    }
    if let Some((last, _)) = failures.last() {
        combined = combined.with_provider(*last);
    }
    combined
}

pub struct WeatherService {
    providers: Vec<Arc<dyn WeatherProvider>>,
    stations_ttl: TimeDelta,
}

impl WeatherService {
    /// `providers` in priority order
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn WeatherProvider>>, stations_ttl: TimeDelta) -> Self {
        Self {
            providers,
            stations_ttl,
        }
    }

    /// Build the provider chain described by the configuration
    pub fn from_config(config: &MeteoConfig) -> Result<Self, ApiError> {
        let ttl = config.cache.stations_ttl();
        if config.data_mode == DataMode::Mock {
            info!("Mock data mode, upstream providers disabled");
            return Ok(Self::new(vec![Arc::new(MockProvider::new())], ttl));
        }

        let fetch = FetchClient::new(FetchOptions::from(&config.http))?;
        let settings = &config.providers;
        let providers = settings
            .priority
            .iter()
            .map(|id| -> Arc<dyn WeatherProvider> {
                match id {
                    ProviderId::XemaTransparencia => Arc::new(XemaProvider::new(
                        SocrataClient::new(
                            fetch.clone(),
                            settings.socrata_base_url.clone(),
                            settings.socrata_app_token.clone(),
                        ),
                        settings.page_size,
                    )),
                    ProviderId::Meteocat => Arc::new(MeteocatProvider::new(
                        fetch.clone(),
                        settings.meteocat_base_url.clone(),
                        settings.meteocat_api_key.clone(),
                    )),
                    ProviderId::OpenMeteo => Arc::new(OpenMeteoProvider::new(
                        fetch.clone(),
                        settings.open_meteo_archive_url.clone(),
                    )),
                    ProviderId::Mock => Arc::new(MockProvider::new()),
                }
            })
            .collect();
        Ok(Self::new(providers, ttl))
    }

    #[must_use]
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id()).collect()
    }

    fn candidates(&self, selection: ProviderSelection) -> Vec<&dyn WeatherProvider> {
        self.providers
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| match selection {
                ProviderSelection::Auto => true,
                ProviderSelection::Only(id) => p.id() == id,
            })
            .collect()
    }

    /// Run `op` against the candidates of `selection` until one succeeds
    async fn run<'a, T, F, Fut>(
        &'a self,
        selection: ProviderSelection,
        operation: &str,
        op: F,
    ) -> ProviderResult<T>
    where
        F: Fn(&'a dyn WeatherProvider) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let candidates = self.candidates(selection);
        let Some(last) = candidates.last().map(|p| p.id()) else {
            let provider = match selection {
                ProviderSelection::Only(id) => id,
                ProviderSelection::Auto => ProviderId::Mock,
            };
            return ProviderResult::failure(
                ApiError::invalid_params(format!("provider {selection} is not enabled"))
                    .with_provider(provider),
                provider,
            );
        };
        let fallback = selection == ProviderSelection::Auto;

        let mut failures = Vec::new();
        for provider in candidates {
            let id = provider.id();
            if !provider.is_configured() {
                warn!("Skipping {} for {}: not configured", id, operation);
                failures.push((
                    id,
                    ApiError::missing_api_key(format!("{id} credentials are not configured"))
                        .with_provider(id),
                ));
            } else {
                match op(provider).await {
                    Ok(data) => {
                        info!("{} served by {}", operation, id);
                        return ProviderResult::success(data, id, false);
                    }
                    Err(error) => {
                        warn!("{} failed on {}: {}", operation, id, error);
                        let error = if error.provider.is_some() {
                            error
                        } else {
                            error.with_provider(id)
                        };
                        failures.push((id, error));
                    }
                }
            }
            if !fallback {
                break;
            }
        }

        let tried = failures.last().map_or(last, |(id, _)| *id);
        ProviderResult::failure(combine_errors(failures), tried)
    }

    #[instrument(skip(self))]
    pub async fn list_stations(&self, selection: ProviderSelection) -> ProviderResult<Vec<Station>> {
        self.run(selection, "list_stations", |p| p.list_stations())
            .await
    }

    /// Station list, reusing `cached` while it is fresh at `now`.
    ///
    /// The returned value is what the caller should keep for the next call.
    pub async fn list_stations_cached(
        &self,
        cached: Option<&Cached<Vec<Station>>>,
        selection: ProviderSelection,
        now: DateTime<Utc>,
    ) -> ProviderResult<Cached<Vec<Station>>> {
        if let Some(entry) = cached {
            let matches = match selection {
                ProviderSelection::Auto => true,
                ProviderSelection::Only(id) => entry.provider == id,
            };
            if matches && entry.is_fresh(self.stations_ttl, now) {
                debug!("Station list cache hit ({} stations)", entry.data.len());
                return ProviderResult::success(entry.clone(), entry.provider, true);
            }
            debug!("Station list cache stale or for another provider");
        }

        let result = self.list_stations(selection).await;
        let provider = result.provider();
        result.map(|stations| Cached::new(stations, provider, now))
    }

    #[instrument(skip(self))]
    pub async fn get_latest(
        &self,
        selection: ProviderSelection,
        station_id: &str,
    ) -> ProviderResult<ObservationLatest> {
        self.run(selection, "get_latest", |p| p.get_latest(station_id))
            .await
    }

    #[instrument(skip(self, request), fields(station = %request.station_id, variable = %request.variable))]
    pub async fn get_timeseries(
        &self,
        selection: ProviderSelection,
        request: &TimeseriesRequest,
    ) -> ProviderResult<TimeseriesResponse> {
        self.run(selection, "get_timeseries", |p| p.get_timeseries(request))
            .await
    }

    /// Dense observations for `station` over `range`
    #[instrument(skip(self, station), fields(station = %station.id))]
    pub async fn get_observations(
        &self,
        selection: ProviderSelection,
        station: &Station,
        range: &DateRange,
        granularity: Granularity,
    ) -> ProviderResult<Vec<Observation>> {
        self.run(selection, "get_observations", |p| {
            observations_from(p, station, range, granularity)
        })
        .await
    }
}

/// Observations from one provider, natively or by per-variable fan-out.
///
/// The fan-out is all-or-nothing: the first failing variable fails the call.
pub async fn observations_from(
    provider: &dyn WeatherProvider,
    station: &Station,
    range: &DateRange,
    granularity: Granularity,
) -> Result<Vec<Observation>, ApiError> {
    if provider.supports_observations() {
        return provider.get_observations(station, range, granularity).await;
    }

    let aggregation = match granularity {
        Granularity::Daily => AggregationType::Daily,
        Granularity::Subdaily | Granularity::Hourly => AggregationType::Hourly,
    };
    let variables = provider.observation_variables(granularity);
    if variables.is_empty() {
        return Err(ApiError::new(
            ApiErrorCode::InvalidParams,
            format!("{} offers no variables at {granularity:?} granularity", provider.id()),
        )
        .with_provider(provider.id()));
    }

    let requests: Vec<TimeseriesRequest> = variables
        .into_iter()
        .map(|variable| TimeseriesRequest::new(station.id.clone(), *range, variable, aggregation))
        .collect();
    debug!("Fanning out {} series requests", requests.len());
    let series = try_join_all(requests.iter().map(|r| provider.get_timeseries(r))).await?;

    let merged = merge_timeseries(&series);
    let observations = if granularity == Granularity::Hourly {
        aggregate_hourly(&merged)
    } else {
        merged
    };
    let label = data_source_label(provider.id(), &station.name);
    Ok(observations
        .into_iter()
        .map(|obs| obs.with_label(label.clone()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_from_str() {
        assert_eq!("auto".parse(), Ok(ProviderSelection::Auto));
        assert_eq!(
            "meteocat".parse(),
            Ok(ProviderSelection::Only(ProviderId::Meteocat))
        );
        assert!("nope".parse::<ProviderSelection>().is_err());
    }

    #[test]
    fn test_combine_errors() {
        let combined = combine_errors(vec![
            (ProviderId::Meteocat, ApiError::missing_api_key("no key")),
            (ProviderId::OpenMeteo, ApiError::timeout("too slow")),
        ]);
        assert_eq!(combined.code, ApiErrorCode::ProviderError);
        assert_eq!(combined.message, "meteocat: no key; open-meteo: too slow");
        assert_eq!(combined.provider, Some(ProviderId::OpenMeteo));
        assert_eq!(
            combined.details.get("meteocat").map(String::as_str),
            Some("MISSING_API_KEY")
        );
        assert_eq!(
            combined.details.get("open-meteo").map(String::as_str),
            Some("TIMEOUT")
        );
    }

    #[test]
    fn test_single_failure_is_wrapped() {
        let error = ApiError::not_found("unknown station").with_provider(ProviderId::Mock);
        let combined = combine_errors(vec![(ProviderId::Mock, error)]);
        assert_eq!(combined.code, ApiErrorCode::ProviderError);
        assert_eq!(combined.message, "mock: unknown station");
        assert_eq!(combined.provider, Some(ProviderId::Mock));
        assert_eq!(
            combined.details.get("mock").map(String::as_str),
            Some("NOT_FOUND")
        );
        assert_eq!(
            combined.details.get("mock.message").map(String::as_str),
            Some("unknown station")
        );
    }

    #[test]
    fn test_mock_mode_uses_only_mock() {
        let mut config = MeteoConfig::default();
        config.data_mode = DataMode::Mock;
        let service = WeatherService::from_config(&config).unwrap();
        assert_eq!(service.provider_ids(), vec![ProviderId::Mock]);
    }

    #[test]
    fn test_live_mode_follows_priority() {
        let config = MeteoConfig::default();
        let service = WeatherService::from_config(&config).unwrap();
        assert_eq!(
            service.provider_ids(),
            vec![
                ProviderId::XemaTransparencia,
                ProviderId::Meteocat,
                ProviderId::OpenMeteo
            ]
        );
    }
}
