use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::entities::ride::{self, RideStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::driver_location;
use crate::error::{AppError, AppResult};
use crate::realtime::{Event, EventHub};
use crate::rides::store;
use crate::utils::geo;

/// A driver eligible for assignment, with their straight-line distance
/// from the pickup point.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub driver: user::Model,
    pub latitude: f64,
    pub longitude: f64,
    pub distance_km: f64,
}

/// Filter locations to the radius and order nearest-first. Pure; the
/// async candidate query feeds it and tests exercise it directly.
pub fn rank_by_distance(
    pickup_lat: f64,
    pickup_lng: f64,
    radius_km: f64,
    drivers: Vec<(user::Model, driver_location::Model)>,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = drivers
        .into_iter()
        .filter_map(|(driver, loc)| {
            let distance_km =
                geo::haversine_distance(pickup_lat, pickup_lng, loc.latitude, loc.longitude);
            (distance_km <= radius_km).then_some(Candidate {
                driver,
                latitude: loc.latitude,
                longitude: loc.longitude,
                distance_km,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    candidates
}

/// Drivers with a fresh location within the radius who are not already
/// on an active ride, nearest first.
pub async fn nearby_candidates(
    db: &DatabaseConnection,
    config: &Config,
    pickup_lat: f64,
    pickup_lng: f64,
) -> AppResult<Vec<Candidate>> {
    let freshness_cutoff = Utc::now() - chrono::Duration::seconds(config.location_staleness_secs);

    let located: Vec<(driver_location::Model, Option<user::Model>)> =
        db::read_with_retry(|| {
            driver_location::Entity::find()
                .filter(driver_location::Column::UpdatedAt.gte(freshness_cutoff))
                .find_also_related(user::Entity)
                .all(db)
        })
        .await?;

    let busy: Vec<Uuid> = db::read_with_retry(|| {
        ride::Entity::find()
            .filter(ride::Column::Status.is_in(store::ACTIVE_STATUSES))
            .all(db)
    })
    .await?
    .into_iter()
    .filter_map(|r| r.driver_id)
    .collect();

    let free_drivers: Vec<(user::Model, driver_location::Model)> = located
        .into_iter()
        .filter_map(|(loc, driver)| driver.map(|d| (d, loc)))
        .filter(|(d, _)| d.role == UserRole::Driver && !busy.contains(&d.id))
        .collect();

    Ok(rank_by_distance(
        pickup_lat,
        pickup_lng,
        config.match_radius_km,
        free_drivers,
    ))
}

/// Push-model matching: pick the nearest free driver and claim the ride
/// for them, working down the candidate list on conflicts.
///
/// The claim itself is the race-safe primitive; this loop only bounds
/// how many candidates one pass will try before giving up with
/// `NoDriversAvailable`.
pub async fn match_ride(
    db: &DatabaseConnection,
    events: &EventHub,
    config: &Config,
    ride_id: Uuid,
) -> AppResult<ride::Model> {
    let ride = store::get(db, ride_id).await?;
    if ride.status != RideStatus::Searching {
        return Err(AppError::Conflict(format!(
            "Ride is already {}",
            ride.status.as_str()
        )));
    }

    let candidates = nearby_candidates(db, config, ride.pickup_lat, ride.pickup_lng).await?;
    if candidates.is_empty() {
        return Err(AppError::NoDriversAvailable);
    }

    for candidate in candidates.into_iter().take(config.match_max_attempts) {
        // The candidate list may be seconds old; re-check before claiming
        if store::driver_has_active_ride(db, candidate.driver.id).await? {
            continue;
        }

        match store::claim(db, ride_id, &candidate.driver).await {
            Ok(updated) => {
                tracing::info!(
                    ride_id = %ride_id,
                    driver_id = %candidate.driver.id,
                    distance_km = candidate.distance_km,
                    "matched ride to driver"
                );
                events.publish(Event::RideUpdated { ride: updated.clone() });
                return Ok(updated);
            }
            Err(AppError::Conflict(_)) => {
                // Someone else claimed it first; if the ride is taken we
                // are done, otherwise try the next candidate
                let current = store::get(db, ride_id).await?;
                if current.driver_id.is_some() {
                    return Ok(current);
                }
                if current.status != RideStatus::Searching {
                    return Err(AppError::Conflict(format!(
                        "Ride is already {}",
                        current.status.as_str()
                    )));
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(AppError::NoDriversAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn driver(name: &str) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            email: format!("{}@example.com", name),
            password_hash: "hash".to_string(),
            name: name.to_string(),
            role: UserRole::Driver,
            vehicle_model: Some("Nissan Tiida".to_string()),
            vehicle_plate: Some("PCX 1234".to_string()),
            rating: Some(4.8),
            created_at: Utc::now().into(),
        }
    }

    fn at(lat: f64, lng: f64, d: &user::Model) -> (user::Model, driver_location::Model) {
        (
            d.clone(),
            driver_location::Model {
                driver_id: d.id,
                latitude: lat,
                longitude: lng,
                heading: None,
                speed: None,
                accuracy: None,
                updated_at: Utc::now().into(),
            },
        )
    }

    #[test]
    fn test_nearest_driver_ranks_first() {
        let pickup = (10.6918, -61.2225);
        let near = driver("near");
        let far = driver("far");

        let ranked = rank_by_distance(
            pickup.0,
            pickup.1,
            5.0,
            vec![
                at(10.72, -61.25, &far),  // ~4.3 km out
                at(10.70, -61.23, &near), // ~1.2 km out
            ],
        );

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].driver.id, near.id);
        assert!(ranked[0].distance_km < ranked[1].distance_km);
    }

    #[test]
    fn test_out_of_radius_drivers_are_dropped() {
        let pickup = (10.6918, -61.2225);
        let close = driver("close");
        let distant = driver("distant");

        let ranked = rank_by_distance(
            pickup.0,
            pickup.1,
            5.0,
            vec![
                at(10.70, -61.23, &close),
                at(10.2796, -61.4589, &distant), // San Fernando, ~50 km away
            ],
        );

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].driver.id, close.id);
    }

    #[test]
    fn test_empty_input_yields_no_candidates() {
        let ranked = rank_by_distance(10.6918, -61.2225, 5.0, vec![]);
        assert!(ranked.is_empty());
    }
}
