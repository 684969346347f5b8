//! Station lookup by distance

use crate::aggregate::round_to;
use crate::models::Station;

/// Barcelona city centre (Plaça de Catalunya)
pub const BARCELONA_CENTER: (f64, f64) = (41.3851, 2.1734);
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

/// Great-circle distance in kilometers
#[must_use]
pub fn distance_km(from: (f64, f64), to: (f64, f64)) -> f64 {
    haversine::distance(
        haversine::Location {
            latitude: from.0,
            longitude: from.1,
        },
        haversine::Location {
            latitude: to.0,
            longitude: to.1,
        },
        haversine::Units::Kilometers,
    )
}

/// Stations within `radius_km` of `center`, nearest first.
///
/// Distances are rounded to 0.1 km before filtering and sorting.
#[must_use]
pub fn within_radius(
    center: (f64, f64),
    radius_km: f64,
    stations: Vec<Station>,
) -> Vec<(Station, f64)> {
    let mut nearby: Vec<(Station, f64)> = stations
        .into_iter()
        .map(|station| {
            let distance = distance_km(center, (station.latitude, station.longitude));
            (station, round_to(distance, 1))
        })
        .filter(|(_, distance)| *distance <= radius_km)
        .collect();

    nearby.sort_by(|(a, da), (b, db)| da.total_cmp(db).then_with(|| a.name.cmp(&b.name)));
    nearby
}
