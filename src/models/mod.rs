//! Data models for MeteoBCN
//!
//! This module contains the domain models organized by concern:
//! - Station: provider identity and station metadata
//! - Observation: the dense per-timestamp record and request ranges
//! - Timeseries: single-variable series returned by providers
//! - Result: the provider result envelope
//! - Timestamp: local-time key formatting and parsing

pub mod observation;
pub mod result;
pub mod station;
pub mod timeseries;
pub mod timestamp;

// Re-export all public types for convenient access
pub use observation::{DateRange, Granularity, Observation, ObservationField, WeatherStats};
pub use result::ProviderResult;
pub use station::{ProviderId, Station, data_source_label};
pub use timeseries::{
    AggregationType, ObservationLatest, TimeseriesPoint, TimeseriesRequest, TimeseriesResponse,
    WeatherVariable,
};
