//! `MeteoBCN` - Weather station data acquisition for Barcelona
//!
//! This library fetches observations from the Catalan open-data portals and
//! fallback sources, normalizes them into a single record shape and derives
//! hourly/daily summaries, coverage reports and exceedance intervals.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod coverage;
pub mod diagnostics;
pub mod error;
pub mod exceedance;
pub mod http;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod providers;
pub mod service;
pub mod stations;
pub mod wind;

// Re-export core types for public API
pub use cache::Cached;
pub use config::MeteoConfig;
pub use error::{ApiError, ApiErrorCode, MeteoError};
pub use models::{
    DateRange, Granularity, Observation, ObservationField, ProviderId, ProviderResult, Station,
};
pub use providers::WeatherProvider;
pub use service::{ProviderSelection, WeatherService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, MeteoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
