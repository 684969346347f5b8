//! Wind vector math
//!
//! Directions follow the meteorological convention: degrees clockwise from
//! north, giving the direction the wind blows *from* (0 = N, 90 = E).

use serde::{Deserialize, Serialize};

/// A speed/direction pair, the direction optional
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub speed: Option<f64>,
    pub direction: Option<f64>,
}

impl WindSample {
    #[must_use]
    pub fn new(speed: f64, direction: f64) -> Self {
        Self {
            speed: Some(speed),
            direction: Some(direction),
        }
    }
}

/// Resultant wind of a vector mean
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindVector {
    pub speed: f64,
    pub direction: f64,
}

/// `(u, v)` components of a wind blowing from `dir_deg` at `speed`
#[must_use]
pub fn speed_dir_to_uv(speed: f64, dir_deg: f64) -> (f64, f64) {
    let rad = dir_deg.to_radians();
    (-speed * rad.sin(), -speed * rad.cos())
}

/// Speed and from-direction in `[0, 360)` of an `(u, v)` vector
#[must_use]
pub fn uv_to_speed_dir(u: f64, v: f64) -> (f64, f64) {
    let speed = u.hypot(v);
    let direction = ((-u).atan2(-v).to_degrees() + 360.0) % 360.0;
    (speed, direction)
}

/// Vector mean of the valid samples, `None` when there are none.
///
/// A sample needs a finite speed to count. A missing direction is taken as
/// 0° (north): the speed still contributes to the resultant magnitude, but
/// the averaged direction is biased toward north. This is an approximation.
#[must_use]
pub fn vectorial_mean(samples: &[WindSample]) -> Option<WindVector> {
    let (sum_u, sum_v, count) = samples
        .iter()
        .filter_map(|s| {
            let speed = s.speed.filter(|v| v.is_finite())?;
            let direction = s.direction.filter(|d| d.is_finite()).unwrap_or(0.0);
            Some(speed_dir_to_uv(speed, direction))
        })
        .fold((0.0, 0.0, 0usize), |(su, sv, n), (u, v)| (su + u, sv + v, n + 1));

    if count == 0 {
        return None;
    }
    let n = count as f64;
    let (speed, direction) = uv_to_speed_dir(sum_u / n, sum_v / n);
    Some(WindVector { speed, direction })
}

/// Convert wind direction from degrees to a 16-point cardinal direction
#[must_use]
pub fn direction_to_cardinal(degrees: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    if !degrees.is_finite() {
        return "Unknown";
    }
    let normalized = degrees.rem_euclid(360.0);
    let index = ((normalized / 22.5).round() as usize) % POINTS.len();
    POINTS[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_north_wind_points_south() {
        let (u, v) = speed_dir_to_uv(10.0, 0.0);
        assert!(u.abs() < EPS);
        assert!((v + 10.0).abs() < EPS);

        let (u, v) = speed_dir_to_uv(10.0, 90.0);
        assert!((u + 10.0).abs() < EPS);
        assert!(v.abs() < EPS);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(5.0, 0.0)]
    #[case(5.0, 45.0)]
    #[case(12.3, 180.0)]
    #[case(3.7, 271.5)]
    #[case(8.0, 359.9)]
    fn test_round_trip(#[case] speed: f64, #[case] dir: f64) {
        let (u, v) = speed_dir_to_uv(speed, dir);
        let (s, d) = uv_to_speed_dir(u, v);
        assert!((s - speed).abs() < 1e-9);
        if speed > 0.0 {
            let diff = (d - dir).abs();
            assert!(diff < 1e-6 || (360.0 - diff) < 1e-6, "{d} vs {dir}");
        }
    }

    #[test]
    fn test_opposite_winds_cancel() {
        let mean = vectorial_mean(&[WindSample::new(5.0, 0.0), WindSample::new(5.0, 180.0)]).unwrap();
        assert!(mean.speed < 1.0);
    }

    #[test]
    fn test_same_direction_averages_speed() {
        let mean = vectorial_mean(&[WindSample::new(3.0, 90.0), WindSample::new(5.0, 90.0)]).unwrap();
        assert!((mean.speed - 4.0).abs() < 1e-9);
        assert!((mean.direction - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_invalid_input() {
        assert!(vectorial_mean(&[]).is_none());
        let invalid = [
            WindSample { speed: None, direction: Some(10.0) },
            WindSample { speed: Some(f64::NAN), direction: Some(10.0) },
        ];
        assert!(vectorial_mean(&invalid).is_none());
    }

    #[test]
    fn test_missing_direction_counts_as_north() {
        let mean = vectorial_mean(&[WindSample { speed: Some(4.0), direction: None }]).unwrap();
        assert!((mean.speed - 4.0).abs() < 1e-9);
        assert!(mean.direction.abs() < 1e-9 || (360.0 - mean.direction).abs() < 1e-9);
    }

    #[test]
    fn test_wraparound_mean_stays_north() {
        let mean = vectorial_mean(&[WindSample::new(5.0, 350.0), WindSample::new(5.0, 10.0)]).unwrap();
        let off_north = mean.direction.min(360.0 - mean.direction);
        assert!(off_north < 1e-6);
    }

    #[rstest]
    #[case(0.0, "N")]
    #[case(359.0, "N")]
    #[case(45.0, "NE")]
    #[case(200.0, "SSW")]
    #[case(270.0, "W")]
    #[case(-90.0, "W")]
    fn test_cardinal(#[case] degrees: f64, #[case] expected: &str) {
        assert_eq!(direction_to_cardinal(degrees), expected);
    }
}
