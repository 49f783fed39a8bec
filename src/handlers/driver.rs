use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Extension, Json,
};
use chrono::Utc;
use sea_orm::{sea_query::OnConflict, EntityTrait, Set};
use serde::Deserialize;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use uuid::Uuid;

use crate::entities::ride::{self, RideStatus};
use crate::entities::{driver_location, user};
use crate::error::{AppError, AppResult};
use crate::realtime::{self, Event};
use crate::rides::lifecycle::Actor;
use crate::rides::store;
use crate::utils::geo;
use crate::utils::jwt::Claims;
use crate::AppState;

// ============ Location Publishing ============

#[derive(Debug, Deserialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: Option<f64>,
    pub speed: Option<f64>,
    pub accuracy: Option<f64>,
}

/// Publish the caller's current position. Upsert keyed by driver id:
/// the previous value is replaced, subscribers are notified.
pub async fn update_location(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<LocationUpdate>,
) -> AppResult<Json<driver_location::Model>> {
    if !geo::validate_coords(payload.latitude, payload.longitude) {
        return Err(AppError::BadRequest("Invalid coordinates".to_string()));
    }

    let location = driver_location::ActiveModel {
        driver_id: Set(claims.sub),
        latitude: Set(payload.latitude),
        longitude: Set(payload.longitude),
        heading: Set(payload.heading),
        speed: Set(payload.speed),
        accuracy: Set(payload.accuracy),
        updated_at: Set(Utc::now().into()),
    };

    let saved = driver_location::Entity::insert(location)
        .on_conflict(
            OnConflict::column(driver_location::Column::DriverId)
                .update_columns([
                    driver_location::Column::Latitude,
                    driver_location::Column::Longitude,
                    driver_location::Column::Heading,
                    driver_location::Column::Speed,
                    driver_location::Column::Accuracy,
                    driver_location::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_with_returning(&*state.db)
        .await?;

    state
        .events
        .publish(Event::DriverLocation { location: saved.clone() });

    Ok(Json(saved))
}

// ============ Ride Requests (pull model) ============

/// Open ride requests the caller can accept, newest first
pub async fn open_requests(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ride::Model>>> {
    Ok(Json(store::list_open_requests(&*state.db).await?))
}

/// Live feed of new ride requests
pub async fn request_events(
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|event| match event {
        Ok(Event::RideRequested { ride }) => realtime::sse_event("ride_requested", &ride),
        _ => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Accept an open ride request
///
/// Both the pull model (this endpoint) and push matching go through the
/// same atomic claim, so two drivers can never hold the same ride.
pub async fn accept_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<ride::Model>> {
    let driver = user::Entity::find_by_id(claims.sub)
        .one(&*state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Driver account not found".to_string()))?;

    if store::driver_has_active_ride(&*state.db, driver.id).await? {
        return Err(AppError::Conflict(
            "Finish your current ride before accepting another".to_string(),
        ));
    }

    let accepted = store::claim(&*state.db, ride_id, &driver).await?;
    state
        .events
        .publish(Event::RideUpdated { ride: accepted.clone() });

    Ok(Json(accepted))
}

// ============ Lifecycle Updates ============

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: RideStatus,
}

/// Advance an assigned ride: arrived, in_progress, then completed
pub async fn update_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
    Json(payload): Json<StatusUpdate>,
) -> AppResult<Json<ride::Model>> {
    if !matches!(
        payload.status,
        RideStatus::Arrived | RideStatus::InProgress | RideStatus::Completed
    ) {
        return Err(AppError::BadRequest(format!(
            "Drivers cannot set a ride to {}",
            payload.status.as_str()
        )));
    }

    let updated = store::transition(&*state.db, ride_id, claims.sub, payload.status).await?;
    state
        .events
        .publish(Event::RideUpdated { ride: updated.clone() });

    Ok(Json(updated))
}

/// Back out of an accepted ride that has not started
pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<ride::Model>> {
    let cancelled = store::cancel(&*state.db, ride_id, &Actor::Driver(claims.sub)).await?;
    state
        .events
        .publish(Event::RideUpdated { ride: cancelled.clone() });

    Ok(Json(cancelled))
}

/// The caller's current rides (accepted, arrived, or in progress)
pub async fn my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<ride::Model>>> {
    Ok(Json(
        store::list_by_driver(&*state.db, claims.sub, &store::ACTIVE_STATUSES).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase};

    use crate::config::Config;
    use crate::entities::user::UserRole;

    fn test_state(db: DatabaseConnection) -> AppState {
        AppState {
            db: Arc::new(db),
            config: Config {
                database_url: "postgres://localhost/test".to_string(),
                jwt_secret: "test-secret".to_string(),
                jwt_expiration_hours: 24,
                server_host: "127.0.0.1".to_string(),
                server_port: 3000,
                match_radius_km: 5.0,
                match_max_attempts: 3,
                search_timeout_secs: 300,
                sweep_interval_secs: 30,
                location_staleness_secs: 60,
            },
            events: crate::EventHub::new(8),
        }
    }

    fn driver_claims(driver_id: Uuid) -> Claims {
        Claims {
            sub: driver_id,
            email: "driver@example.com".to_string(),
            role: UserRole::Driver,
            exp: i64::MAX,
            iat: 0,
        }
    }

    #[tokio::test]
    async fn test_update_location_upserts_and_notifies() {
        let driver_id = Uuid::new_v4();
        let saved = driver_location::Model {
            driver_id,
            latitude: 10.70,
            longitude: -61.25,
            heading: Some(90.0),
            speed: None,
            accuracy: None,
            updated_at: Utc::now().into(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![saved.clone()]])
            .into_connection();
        let state = test_state(db);
        let mut rx = state.events.subscribe();

        let result = update_location(
            State(state),
            Extension(driver_claims(driver_id)),
            Json(LocationUpdate {
                latitude: 10.70,
                longitude: -61.25,
                heading: Some(90.0),
                speed: None,
                accuracy: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(result.0.driver_id, driver_id);
        assert_eq!(result.0.latitude, 10.70);

        // Subscribers see the fresh position
        match rx.recv().await.unwrap() {
            Event::DriverLocation { location } => {
                assert_eq!(location.driver_id, driver_id);
                assert_eq!(location.latitude, 10.70);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_update_location_rejects_bad_coordinates() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let state = test_state(db);
        let mut rx = state.events.subscribe();

        let result = update_location(
            State(state.clone()),
            Extension(driver_claims(Uuid::new_v4())),
            Json(LocationUpdate {
                latitude: 95.0,
                longitude: -61.25,
                heading: None,
                speed: None,
                accuracy: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
        // Nothing was written or broadcast
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }
}
