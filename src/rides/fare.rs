use serde::Serialize;

use crate::entities::ride::VehicleTier;
use crate::utils::geo;

/// Flag fall in TTD.
pub const BASE_FARE: f64 = 5.00;

/// Per-minute rate, identical across tiers.
pub const PER_MIN_RATE: f64 = 2.00;

/// Per-kilometer rate for a vehicle tier.
pub fn per_km_rate(tier: VehicleTier) -> f64 {
    match tier {
        VehicleTier::Standard => 8.00,
        VehicleTier::Premium => 12.00,
        VehicleTier::Xl => 15.00,
    }
}

/// `fare = base + distance_km * per_km_rate(tier) + duration_min * per_min_rate`,
/// rounded to 2 decimal places. Pure; no lookups.
pub fn estimate_fare(distance_km: f64, duration_min: f64, tier: VehicleTier) -> f64 {
    let fare = BASE_FARE + distance_km * per_km_rate(tier) + duration_min * PER_MIN_RATE;
    (fare * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct FareQuote {
    pub distance_km: f64,
    pub duration_min: i64,
    pub vehicle_tier: VehicleTier,
    pub fare: f64,
}

/// Quote a trip from raw coordinates: straight-line distance, ETA at the
/// assumed average speed, fare from the tier rates.
pub fn quote(
    pickup_lat: f64,
    pickup_lng: f64,
    dropoff_lat: f64,
    dropoff_lng: f64,
    tier: VehicleTier,
) -> FareQuote {
    let distance_km = geo::haversine_distance(pickup_lat, pickup_lng, dropoff_lat, dropoff_lng);
    let duration_min = geo::eta_minutes(distance_km);

    FareQuote {
        distance_km: (distance_km * 100.0).round() / 100.0,
        duration_min,
        vehicle_tier: tier,
        fare: estimate_fare(distance_km, duration_min as f64, tier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_fare_is_base() {
        assert_eq!(estimate_fare(0.0, 0.0, VehicleTier::Standard), 5.00);
    }

    #[test]
    fn test_standard_fare_fixture() {
        // 5 + 10*8 + 15*2 = 115.00
        assert_eq!(estimate_fare(10.0, 15.0, VehicleTier::Standard), 115.00);
    }

    #[test]
    fn test_tier_rates() {
        // 5 + 10*12 + 15*2 = 155.00
        assert_eq!(estimate_fare(10.0, 15.0, VehicleTier::Premium), 155.00);
        // 5 + 10*15 + 15*2 = 185.00
        assert_eq!(estimate_fare(10.0, 15.0, VehicleTier::Xl), 185.00);
    }

    #[test]
    fn test_rounded_to_two_decimals() {
        let fare = estimate_fare(1.234, 2.345, VehicleTier::Standard);
        assert_eq!((fare * 100.0).round() / 100.0, fare);
    }

    #[test]
    fn test_monotonic_in_distance_and_duration() {
        for tier in [VehicleTier::Standard, VehicleTier::Premium, VehicleTier::Xl] {
            let mut prev = 0.0;
            for km in 0..50 {
                let fare = estimate_fare(km as f64, 10.0, tier);
                assert!(fare >= prev, "fare decreased with distance");
                prev = fare;
            }

            let mut prev = 0.0;
            for min in 0..50 {
                let fare = estimate_fare(10.0, min as f64, tier);
                assert!(fare >= prev, "fare decreased with duration");
                prev = fare;
            }
        }
    }

    #[test]
    fn test_quote_uses_straight_line_distance() {
        let q = quote(10.6918, -61.2225, 10.65, -61.30, VehicleTier::Standard);
        assert!(q.distance_km > 8.5 && q.distance_km < 10.5);
        assert!(q.duration_min >= 13 && q.duration_min <= 16);
        assert!(q.fare > BASE_FARE);
    }
}
