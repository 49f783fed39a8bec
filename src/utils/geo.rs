/// Average assumed speed for ETA display. This is a straight-line
/// heuristic, not a routed estimate: no road network is consulted.
pub const AVERAGE_SPEED_KMH: f64 = 40.0;

/// Calculate distance between two coordinates using Haversine formula
/// Returns distance in kilometers
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Check if a point is within `max_radius_km` of a center point
pub fn is_within_radius(
    lat: f64,
    lng: f64,
    center_lat: f64,
    center_lng: f64,
    max_radius_km: f64,
) -> bool {
    haversine_distance(lat, lng, center_lat, center_lng) <= max_radius_km
}

/// Estimated travel time in whole minutes at the assumed average speed,
/// rounded up so short hops never show "0 min away".
pub fn eta_minutes(distance_km: f64) -> i64 {
    (distance_km / AVERAGE_SPEED_KMH * 60.0).ceil() as i64
}

/// Reject non-finite or out-of-range coordinate pairs before any write.
pub fn validate_coords(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_port_of_spain_chaguaramas() {
        // Port of Spain area
        let a = (10.6918, -61.2225);
        // Towards Chaguaramas
        let b = (10.65, -61.30);

        let distance = haversine_distance(a.0, a.1, b.0, b.1);
        // Should be roughly 9-10 km
        assert!(distance > 8.5 && distance < 10.5);
    }

    #[test]
    fn test_haversine_symmetry() {
        let a = (10.6918, -61.2225);
        let b = (10.2796, -61.4589);

        let ab = haversine_distance(a.0, a.1, b.0, b.1);
        let ba = haversine_distance(b.0, b.1, a.0, a.1);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let distance = haversine_distance(10.6918, -61.2225, 10.6918, -61.2225);
        assert_eq!(distance, 0.0);
    }

    #[test]
    fn test_within_radius() {
        let center = (10.6918, -61.2225);
        let nearby = (10.69, -61.22);

        assert!(is_within_radius(nearby.0, nearby.1, center.0, center.1, 5.0));

        let far = (10.2796, -61.4589); // San Fernando
        assert!(!is_within_radius(far.0, far.1, center.0, center.1, 5.0));
    }

    #[test]
    fn test_eta_rounds_up() {
        // 10 km at 40 km/h is exactly 15 minutes
        assert_eq!(eta_minutes(10.0), 15);
        // A short hop still shows at least a minute
        assert_eq!(eta_minutes(0.1), 1);
    }

    #[test]
    fn test_validate_coords() {
        assert!(validate_coords(10.6918, -61.2225));
        assert!(!validate_coords(f64::NAN, -61.2225));
        assert!(!validate_coords(91.0, 0.0));
        assert!(!validate_coords(0.0, 181.0));
    }
}
