use std::convert::Infallible;

use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use uuid::Uuid;

use crate::entities::ride::{self, RideStatus};
use crate::entities::user::{self, UserRole};
use crate::entities::driver_location;
use crate::error::AppResult;
use crate::realtime::{self, Event};
use crate::AppState;

// ============ Ride Oversight ============

#[derive(Debug, Deserialize)]
pub struct RideFilter {
    pub status: Option<RideStatus>,
}

/// List all rides, optionally filtered by status (admin)
pub async fn list_rides(
    State(state): State<AppState>,
    Query(filter): Query<RideFilter>,
) -> AppResult<Json<Vec<ride::Model>>> {
    let mut query = ride::Entity::find().order_by_desc(ride::Column::CreatedAt);
    if let Some(status) = filter.status {
        query = query.filter(ride::Column::Status.eq(status));
    }

    Ok(Json(query.all(&*state.db).await?))
}

// ============ User Management ============

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// List all users (admin)
pub async fn list_all_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = user::Entity::find().all(&*state.db).await?;

    let responses: Vec<UserResponse> = users
        .into_iter()
        .map(|u| UserResponse {
            id: u.id,
            email: u.email,
            name: u.name,
            role: u.role,
            created_at: u.created_at.with_timezone(&Utc),
        })
        .collect();

    Ok(Json(responses))
}

// ============ Fleet View ============

#[derive(Debug, Serialize)]
pub struct FleetDriverResponse {
    pub id: Uuid,
    pub name: String,
    pub vehicle_model: Option<String>,
    pub vehicle_plate: Option<String>,
    pub rating: Option<f64>,
    pub last_location: Option<driver_location::Model>,
}

/// All drivers with their last known position (admin map view)
pub async fn fleet(State(state): State<AppState>) -> AppResult<Json<Vec<FleetDriverResponse>>> {
    let drivers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Driver))
        .all(&*state.db)
        .await?;
    let locations = driver_location::Entity::find().all(&*state.db).await?;

    let responses: Vec<FleetDriverResponse> = drivers
        .into_iter()
        .map(|d| {
            let last_location = locations.iter().find(|l| l.driver_id == d.id).cloned();
            FleetDriverResponse {
                id: d.id,
                name: d.name,
                vehicle_model: d.vehicle_model,
                vehicle_plate: d.vehicle_plate,
                rating: d.rating,
                last_location,
            }
        })
        .collect();

    Ok(Json(responses))
}

/// Unscoped live feed of every driver position (admin map view)
pub async fn fleet_events(
    State(state): State<AppState>,
) -> AppResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let rx = state.events.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|event| match event {
        Ok(Event::DriverLocation { location }) => {
            realtime::sse_event("driver_location", &location)
        }
        _ => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
