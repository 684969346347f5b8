//! Station model and provider identity

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upstream data providers known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    /// XEMA network through the Transparència Catalunya Socrata portal
    XemaTransparencia,
    /// Servei Meteorològic de Catalunya REST API
    Meteocat,
    /// Open-Meteo historical archive (reanalysis fallback)
    OpenMeteo,
    /// Simulated data
    Mock,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::XemaTransparencia,
        ProviderId::Meteocat,
        ProviderId::OpenMeteo,
        ProviderId::Mock,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::XemaTransparencia => "xema-transparencia",
            ProviderId::Meteocat => "meteocat",
            ProviderId::OpenMeteo => "open-meteo",
            ProviderId::Mock => "mock",
        }
    }

    /// Human-readable provenance label shown next to exported data
    #[must_use]
    pub fn source_label(self) -> &'static str {
        match self {
            ProviderId::XemaTransparencia => "XEMA (Transparència Catalunya)",
            ProviderId::Meteocat => "Meteocat",
            ProviderId::OpenMeteo => "Datos de respaldo (Open-Meteo)",
            ProviderId::Mock => "Datos simulados",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown provider '{s}', expected one of: {}",
                    ProviderId::ALL.map(ProviderId::as_str).join(", ")
                )
            })
    }
}

/// Provenance string attached to observations and exports
#[must_use]
pub fn data_source_label(provider: ProviderId, station_name: &str) -> String {
    format!(
        "Fuente: {} - Estación: {station_name}",
        provider.source_label()
    )
}

/// A weather station as reported by one provider
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    /// Identifier, unique within the provider's station list
    pub id: String,
    pub name: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: Option<f64>,
    pub municipality: Option<String>,
    pub provider: ProviderId,
}

impl Station {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        provider: ProviderId,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            elevation: None,
            municipality: None,
            provider,
        }
    }

    #[must_use]
    pub fn with_elevation(mut self, elevation: f64) -> Self {
        self.elevation = Some(elevation);
        self
    }

    /// Format location as coordinates string
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_round_trips_through_str() {
        for provider in ProviderId::ALL {
            assert_eq!(provider.as_str().parse::<ProviderId>(), Ok(provider));
        }
        assert!("opendata".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_provider_serde_matches_display() {
        let json = serde_json::to_string(&ProviderId::XemaTransparencia).unwrap();
        assert_eq!(json, "\"xema-transparencia\"");
    }

    #[test]
    fn test_data_source_label() {
        assert_eq!(
            data_source_label(ProviderId::OpenMeteo, "Observatori Fabra"),
            "Fuente: Datos de respaldo (Open-Meteo) - Estación: Observatori Fabra"
        );
    }

    #[test]
    fn test_station_coordinates() {
        let station = Station::new("X2", "Observatori Fabra", 41.4184, 2.1239, ProviderId::Meteocat)
            .with_elevation(411.0);
        assert_eq!(station.format_coordinates(), "41.4184, 2.1239");
        assert_eq!(station.elevation, Some(411.0));
    }
}
