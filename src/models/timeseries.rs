//! Single-variable time series exchanged with providers

use super::observation::{DateRange, Observation, ObservationField};
use super::station::ProviderId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Variables a provider can be asked for one at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WeatherVariable {
    Temperature,
    Humidity,
    WindSpeed,
    WindSpeedMin,
    WindSpeedMax,
    WindDirection,
    Precipitation,
    Pressure,
}

impl WeatherVariable {
    #[must_use]
    pub fn unit(self) -> &'static str {
        match self {
            WeatherVariable::Temperature => "°C",
            WeatherVariable::Humidity => "%",
            WeatherVariable::WindSpeed
            | WeatherVariable::WindSpeedMin
            | WeatherVariable::WindSpeedMax => "m/s",
            WeatherVariable::WindDirection => "°",
            WeatherVariable::Precipitation => "mm",
            WeatherVariable::Pressure => "hPa",
        }
    }

    /// Observation field a series of this variable lands in, if any
    #[must_use]
    pub fn field(self) -> Option<ObservationField> {
        match self {
            WeatherVariable::Temperature => Some(ObservationField::Temperature),
            WeatherVariable::Humidity => Some(ObservationField::Humidity),
            WeatherVariable::WindSpeed => Some(ObservationField::WindSpeed),
            WeatherVariable::WindSpeedMax => Some(ObservationField::WindSpeedMax),
            WeatherVariable::WindDirection => Some(ObservationField::WindDirection),
            WeatherVariable::Precipitation => Some(ObservationField::Precipitation),
            WeatherVariable::WindSpeedMin | WeatherVariable::Pressure => None,
        }
    }
}

impl fmt::Display for WeatherVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeatherVariable::Temperature => "temperature",
            WeatherVariable::Humidity => "humidity",
            WeatherVariable::WindSpeed => "windSpeed",
            WeatherVariable::WindSpeedMin => "windSpeedMin",
            WeatherVariable::WindSpeedMax => "windSpeedMax",
            WeatherVariable::WindDirection => "windDirection",
            WeatherVariable::Precipitation => "precipitation",
            WeatherVariable::Pressure => "pressure",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    Hourly,
    Daily,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesPoint {
    pub timestamp: String,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeseriesResponse {
    pub station_id: String,
    pub provider: ProviderId,
    pub variable: WeatherVariable,
    pub unit: String,
    pub aggregation: AggregationType,
    pub points: Vec<TimeseriesPoint>,
}

/// Parameters of a single-variable series request
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesRequest {
    pub station_id: String,
    pub range: DateRange,
    pub variable: WeatherVariable,
    pub aggregation: AggregationType,
}

impl TimeseriesRequest {
    #[must_use]
    pub fn new(
        station_id: impl Into<String>,
        range: DateRange,
        variable: WeatherVariable,
        aggregation: AggregationType,
    ) -> Self {
        Self {
            station_id: station_id.into(),
            range,
            variable,
            aggregation,
        }
    }

    /// Same request for another variable
    #[must_use]
    pub fn for_variable(&self, variable: WeatherVariable) -> Self {
        Self {
            variable,
            ..self.clone()
        }
    }
}

/// Most recent reading of a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationLatest {
    pub station_id: String,
    pub provider: ProviderId,
    pub observation: Observation,
}
