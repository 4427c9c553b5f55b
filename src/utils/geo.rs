use crate::tracking::Coordinate;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates using the Haversine formula.
/// Returns distance in meters
pub fn haversine_distance(from: &Coordinate, to: &Coordinate) -> f64 {
    let lat1_rad = from.latitude.to_radians();
    let lat2_rad = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lng = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Equirectangular approximation of the distance in meters.
/// Good enough at city scale, error is negligible under ~1 km.
pub fn equirectangular_distance(from: &Coordinate, to: &Coordinate) -> f64 {
    let mean_lat = ((from.latitude + to.latitude) / 2.0).to_radians();
    let x = (to.longitude - from.longitude).to_radians() * mean_lat.cos();
    let y = (to.latitude - from.latitude).to_radians();

    EARTH_RADIUS_M * (x * x + y * y).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(latitude: f64, longitude: f64) -> Coordinate {
        Coordinate {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_haversine_jakarta_bandung() {
        let jakarta = c(-6.2088, 106.8456);
        let bandung = c(-6.9175, 107.6191);

        let distance = haversine_distance(&jakarta, &bandung);
        // Should be approximately 120-130 km
        assert!(distance > 100_000.0 && distance < 150_000.0);
    }

    #[test]
    fn test_equirectangular_matches_haversine_at_city_scale() {
        let pickup = c(23.26, 75.78);
        let driver = c(23.2550, 75.7750);

        let exact = haversine_distance(&pickup, &driver);
        let approx = equirectangular_distance(&pickup, &driver);
        assert!(exact > 700.0 && exact < 800.0);
        assert!((exact - approx).abs() < 0.5);
    }

    #[test]
    fn test_zero_distance() {
        let p = c(23.26, 75.78);
        assert_eq!(haversine_distance(&p, &p), 0.0);
        assert_eq!(equirectangular_distance(&p, &p), 0.0);
    }
}
