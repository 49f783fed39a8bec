use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::db;
use crate::entities::ride::{self, RideStatus, VehicleTier};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::rides::lifecycle::{self, Actor};

/// Statuses during which a driver is considered occupied.
pub const ACTIVE_STATUSES: [RideStatus; 3] = [
    RideStatus::Accepted,
    RideStatus::Arrived,
    RideStatus::InProgress,
];

pub struct NewRide {
    pub passenger_id: Uuid,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub vehicle_tier: VehicleTier,
    pub price: f64,
}

pub async fn create(db: &DatabaseConnection, new: NewRide) -> AppResult<ride::Model> {
    let now = Utc::now();
    let ride = ride::ActiveModel {
        id: Set(Uuid::new_v4()),
        passenger_id: Set(new.passenger_id),
        driver_id: Set(None),
        pickup_lat: Set(new.pickup_lat),
        pickup_lng: Set(new.pickup_lng),
        dropoff_lat: Set(new.dropoff_lat),
        dropoff_lng: Set(new.dropoff_lng),
        pickup_location: Set(new.pickup_location),
        dropoff_location: Set(new.dropoff_location),
        vehicle_tier: Set(new.vehicle_tier),
        price: Set(new.price),
        status: Set(RideStatus::Searching),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    Ok(ride.insert(db).await?)
}

pub async fn get(db: &DatabaseConnection, ride_id: Uuid) -> AppResult<ride::Model> {
    db::read_with_retry(|| ride::Entity::find_by_id(ride_id).one(db))
        .await?
        .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))
}

/// A passenger's rides, newest first.
pub async fn list_by_passenger(
    db: &DatabaseConnection,
    passenger_id: Uuid,
) -> AppResult<Vec<ride::Model>> {
    let rides = db::read_with_retry(|| {
        ride::Entity::find()
            .filter(ride::Column::PassengerId.eq(passenger_id))
            .order_by_desc(ride::Column::CreatedAt)
            .all(db)
    })
    .await?;

    Ok(rides)
}

/// A driver's rides in the given statuses, newest first.
pub async fn list_by_driver(
    db: &DatabaseConnection,
    driver_id: Uuid,
    statuses: &[RideStatus],
) -> AppResult<Vec<ride::Model>> {
    let rides = db::read_with_retry(|| {
        ride::Entity::find()
            .filter(ride::Column::DriverId.eq(driver_id))
            .filter(ride::Column::Status.is_in(statuses.iter().copied()))
            .order_by_desc(ride::Column::CreatedAt)
            .all(db)
    })
    .await?;

    Ok(rides)
}

/// Unclaimed ride requests drivers can browse, newest first.
pub async fn list_open_requests(db: &DatabaseConnection) -> AppResult<Vec<ride::Model>> {
    let rides = db::read_with_retry(|| {
        ride::Entity::find()
            .filter(ride::Column::Status.eq(RideStatus::Searching))
            .order_by_desc(ride::Column::CreatedAt)
            .all(db)
    })
    .await?;

    Ok(rides)
}

pub async fn driver_has_active_ride(
    db: &DatabaseConnection,
    driver_id: Uuid,
) -> AppResult<bool> {
    let count = ride::Entity::find()
        .filter(ride::Column::DriverId.eq(driver_id))
        .filter(ride::Column::Status.is_in(ACTIVE_STATUSES))
        .count(db)
        .await?;

    Ok(count > 0)
}

/// Atomically assign a driver to an unclaimed ride.
///
/// The write only lands if the ride is still `searching` with no driver,
/// so under concurrent accept attempts exactly one driver wins; the rest
/// get `Conflict`. The driver's profile is snapshotted onto the ride row
/// here so later reads never need a join.
pub async fn claim(
    db: &DatabaseConnection,
    ride_id: Uuid,
    driver: &user::Model,
) -> AppResult<ride::Model> {
    let now = Utc::now();
    let update = ride::ActiveModel {
        status: Set(RideStatus::Accepted),
        driver_id: Set(Some(driver.id)),
        driver_name: Set(Some(driver.name.clone())),
        driver_car: Set(driver.vehicle_model.clone()),
        driver_plate: Set(driver.vehicle_plate.clone()),
        driver_rating: Set(driver.rating),
        accepted_at: Set(Some(now.into())),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let result = ride::Entity::update_many()
        .set(update)
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::Status.eq(RideStatus::Searching))
        .filter(ride::Column::DriverId.is_null())
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return match ride::Entity::find_by_id(ride_id).one(db).await? {
            None => Err(AppError::NotFound("Ride not found".to_string())),
            // A duplicate accept from the winning driver is not a conflict
            Some(current) if current.driver_id == Some(driver.id) => Ok(current),
            Some(current) if current.status == RideStatus::Searching => Err(AppError::Conflict(
                "Ride is being claimed, try again".to_string(),
            )),
            Some(current) => Err(AppError::Conflict(format!(
                "Ride is already {}",
                current.status.as_str()
            ))),
        };
    }

    get(db, ride_id).await
}

/// Advance a ride one step along the lifecycle, on behalf of its driver.
///
/// Compare-and-swap: the update filters on the expected prior status and
/// the caller being the assigned driver. Zero rows affected is diagnosed
/// into NotFound / Forbidden / Conflict rather than silently succeeding.
pub async fn transition(
    db: &DatabaseConnection,
    ride_id: Uuid,
    driver_id: Uuid,
    to: RideStatus,
) -> AppResult<ride::Model> {
    let expected = lifecycle::expected_prior(to).ok_or_else(|| {
        AppError::BadRequest(format!("{} is not a valid status update", to.as_str()))
    })?;
    if to == RideStatus::Accepted {
        return Err(AppError::BadRequest(
            "Accepting a ride goes through the claim endpoint".to_string(),
        ));
    }

    let now = Utc::now();
    let mut update = ride::ActiveModel {
        status: Set(to),
        updated_at: Set(now.into()),
        ..Default::default()
    };
    match to {
        RideStatus::InProgress => update.started_at = Set(Some(now.into())),
        RideStatus::Completed => update.completed_at = Set(Some(now.into())),
        _ => {}
    }

    let result = ride::Entity::update_many()
        .set(update)
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::Status.eq(expected))
        .filter(ride::Column::DriverId.eq(driver_id))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let current = ride::Entity::find_by_id(ride_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

        // Surface the precise reason the swap did not land
        return Err(match lifecycle::check_transition(&current, to, &Actor::Driver(driver_id)) {
            Err(err) => err,
            Ok(()) => AppError::Conflict("Ride changed concurrently, try again".to_string()),
        });
    }

    get(db, ride_id).await
}

/// Cancel a ride on behalf of its passenger or assigned driver.
pub async fn cancel(
    db: &DatabaseConnection,
    ride_id: Uuid,
    actor: &Actor,
) -> AppResult<ride::Model> {
    let allowed_from = lifecycle::cancellable_from(actor);

    let now = Utc::now();
    let update = ride::ActiveModel {
        status: Set(RideStatus::Cancelled),
        updated_at: Set(now.into()),
        ..Default::default()
    };

    let mut query = ride::Entity::update_many()
        .set(update)
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::Status.is_in(allowed_from.iter().copied()));

    query = match actor {
        Actor::Passenger(id) => query.filter(ride::Column::PassengerId.eq(*id)),
        Actor::Driver(id) => query.filter(ride::Column::DriverId.eq(*id)),
        Actor::System => {
            return Err(AppError::BadRequest(
                "System does not cancel rides".to_string(),
            ))
        }
    };

    let result = query.exec(db).await?;

    if result.rows_affected == 0 {
        let current = ride::Entity::find_by_id(ride_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("Ride not found".to_string()))?;

        let owns = match actor {
            Actor::Passenger(id) => current.passenger_id == *id,
            Actor::Driver(id) => current.driver_id == Some(*id),
            Actor::System => false,
        };
        return Err(if !owns {
            AppError::Forbidden("You may only cancel your own rides".to_string())
        } else {
            AppError::Conflict(format!(
                "Ride can no longer be cancelled ({})",
                current.status.as_str()
            ))
        });
    }

    get(db, ride_id).await
}

/// Expire a stale search. Returns the updated ride, or None if it was
/// matched or cancelled in the meantime.
pub async fn expire(db: &DatabaseConnection, ride_id: Uuid) -> AppResult<Option<ride::Model>> {
    let update = ride::ActiveModel {
        status: Set(RideStatus::Expired),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
    };

    let result = ride::Entity::update_many()
        .set(update)
        .filter(ride::Column::Id.eq(ride_id))
        .filter(ride::Column::Status.eq(RideStatus::Searching))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }

    Ok(Some(get(db, ride_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use crate::entities::user::UserRole;

    fn sample_driver(id: Uuid) -> user::Model {
        user::Model {
            id,
            email: "driver@example.com".to_string(),
            password_hash: "hash".to_string(),
            name: "Anil".to_string(),
            role: UserRole::Driver,
            vehicle_model: Some("Nissan Tiida".to_string()),
            vehicle_plate: Some("PCX 1234".to_string()),
            rating: Some(4.8),
            created_at: Utc::now().into(),
        }
    }

    fn sample_ride(status: RideStatus, driver_id: Option<Uuid>) -> ride::Model {
        let now = Utc::now();
        ride::Model {
            id: Uuid::new_v4(),
            passenger_id: Uuid::new_v4(),
            driver_id,
            pickup_lat: 10.6918,
            pickup_lng: -61.2225,
            dropoff_lat: 10.65,
            dropoff_lng: -61.30,
            pickup_location: "Port of Spain".to_string(),
            dropoff_location: "Chaguaramas".to_string(),
            vehicle_tier: VehicleTier::Standard,
            price: 45.0,
            status,
            driver_name: None,
            driver_car: None,
            driver_plate: None,
            driver_rating: None,
            created_at: now.into(),
            updated_at: now.into(),
            accepted_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn test_claim_assigns_when_swap_lands() {
        let driver = sample_driver(Uuid::new_v4());
        let mut accepted = sample_ride(RideStatus::Accepted, Some(driver.id));
        accepted.driver_name = Some(driver.name.clone());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .append_query_results([vec![accepted.clone()]])
            .into_connection();

        let result = claim(&db, accepted.id, &driver).await.unwrap();
        assert_eq!(result.status, RideStatus::Accepted);
        assert_eq!(result.driver_id, Some(driver.id));
    }

    #[tokio::test]
    async fn test_claim_conflict_when_already_taken() {
        let loser = sample_driver(Uuid::new_v4());
        let taken = sample_ride(RideStatus::Accepted, Some(Uuid::new_v4()));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![taken.clone()]])
            .into_connection();

        let result = claim(&db, taken.id, &loser).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_claim_is_idempotent_for_the_winner() {
        let driver = sample_driver(Uuid::new_v4());
        let mine = sample_ride(RideStatus::Accepted, Some(driver.id));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![mine.clone()]])
            .into_connection();

        let result = claim(&db, mine.id, &driver).await.unwrap();
        assert_eq!(result.driver_id, Some(driver.id));
    }

    #[tokio::test]
    async fn test_claim_not_found() {
        let driver = sample_driver(Uuid::new_v4());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([Vec::<ride::Model>::new()])
            .into_connection();

        let result = claim(&db, Uuid::new_v4(), &driver).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_transition_walks_the_forward_chain() {
        let driver = Uuid::new_v4();
        let base = sample_ride(RideStatus::Accepted, Some(driver));

        let mut arrived = base.clone();
        arrived.status = RideStatus::Arrived;
        let mut in_progress = base.clone();
        in_progress.status = RideStatus::InProgress;
        in_progress.started_at = Some(Utc::now().into());
        let mut completed = base.clone();
        completed.status = RideStatus::Completed;
        completed.completed_at = Some(Utc::now().into());

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
                MockExecResult { last_insert_id: 0, rows_affected: 1 },
            ])
            .append_query_results([
                vec![arrived.clone()],
                vec![in_progress.clone()],
                vec![completed.clone()],
            ])
            .into_connection();

        let step = transition(&db, base.id, driver, RideStatus::Arrived).await.unwrap();
        assert_eq!(step.status, RideStatus::Arrived);

        let step = transition(&db, base.id, driver, RideStatus::InProgress).await.unwrap();
        assert_eq!(step.status, RideStatus::InProgress);
        assert!(step.started_at.is_some());

        let step = transition(&db, base.id, driver, RideStatus::Completed).await.unwrap();
        assert_eq!(step.status, RideStatus::Completed);
        assert!(step.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_transition_rejected_for_other_driver() {
        let assigned = Uuid::new_v4();
        let imposter = Uuid::new_v4();
        let ride = sample_ride(RideStatus::Accepted, Some(assigned));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![ride.clone()]])
            .into_connection();

        let result = transition(&db, ride.id, imposter, RideStatus::Arrived).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_completed_ride_is_immutable() {
        let driver = Uuid::new_v4();
        let done = sample_ride(RideStatus::Completed, Some(driver));

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![done.clone()]])
            .into_connection();

        let result = transition(&db, done.id, driver, RideStatus::Arrived).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_transition_rejects_backward_target() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let result = transition(&db, Uuid::new_v4(), Uuid::new_v4(), RideStatus::Searching).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_cancel_completed_ride_conflicts() {
        let passenger = Uuid::new_v4();
        let mut done = sample_ride(RideStatus::Completed, Some(Uuid::new_v4()));
        done.passenger_id = passenger;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![done.clone()]])
            .into_connection();

        let result = cancel(&db, done.id, &Actor::Passenger(passenger)).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_cancel_foreign_ride_forbidden() {
        let ride = sample_ride(RideStatus::Searching, None);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![ride.clone()]])
            .into_connection();

        let result = cancel(&db, ride.id, &Actor::Passenger(Uuid::new_v4())).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_expire_skips_rides_no_longer_searching() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let result = expire(&db, Uuid::new_v4()).await.unwrap();
        assert!(result.is_none());
    }
}
