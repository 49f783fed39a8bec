use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Extension, Json,
};
use serde::Deserialize;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use uuid::Uuid;

use crate::entities::ride::{self, VehicleTier};
use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::realtime::{self, Event};
use crate::rides::lifecycle::Actor;
use crate::rides::{fare, matching, store};
use crate::utils::geo;
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub vehicle_tier: Option<VehicleTier>,
}

/// Fare and time estimate for a prospective trip
pub async fn quote(Json(payload): Json<QuoteRequest>) -> AppResult<Json<fare::FareQuote>> {
    validate_trip_coords(
        payload.pickup_lat,
        payload.pickup_lng,
        payload.dropoff_lat,
        payload.dropoff_lng,
    )?;

    Ok(Json(fare::quote(
        payload.pickup_lat,
        payload.pickup_lng,
        payload.dropoff_lat,
        payload.dropoff_lng,
        payload.vehicle_tier.unwrap_or_default(),
    )))
}

// ============ Ride Requests ============

#[derive(Debug, Deserialize)]
pub struct CreateRideRequest {
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    pub pickup_location: String,
    pub dropoff_location: String,
    pub vehicle_tier: Option<VehicleTier>,
}

/// Create a ride request and try to match the nearest driver
///
/// The ride is returned in `searching` when nobody is nearby; the
/// passenger can retry through the match endpoint or wait for a driver
/// to pick the request up from the open list.
pub async fn create_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateRideRequest>,
) -> AppResult<Json<ride::Model>> {
    validate_trip_coords(
        payload.pickup_lat,
        payload.pickup_lng,
        payload.dropoff_lat,
        payload.dropoff_lng,
    )?;
    if payload.pickup_location.trim().is_empty() || payload.dropoff_location.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Pickup and dropoff labels are required".to_string(),
        ));
    }

    let tier = payload.vehicle_tier.unwrap_or_default();
    let estimate = fare::quote(
        payload.pickup_lat,
        payload.pickup_lng,
        payload.dropoff_lat,
        payload.dropoff_lng,
        tier,
    );

    let ride = store::create(
        &*state.db,
        store::NewRide {
            passenger_id: claims.sub,
            pickup_lat: payload.pickup_lat,
            pickup_lng: payload.pickup_lng,
            dropoff_lat: payload.dropoff_lat,
            dropoff_lng: payload.dropoff_lng,
            pickup_location: payload.pickup_location,
            dropoff_location: payload.dropoff_location,
            vehicle_tier: tier,
            price: estimate.fare,
        },
    )
    .await?;

    state.events.publish(Event::RideRequested { ride: ride.clone() });

    // Push matching; falling back to the open-request list is not an error
    match matching::match_ride(&*state.db, &state.events, &state.config, ride.id).await {
        Ok(matched) => Ok(Json(matched)),
        Err(AppError::NoDriversAvailable) => {
            tracing::debug!(ride_id = %ride.id, "no drivers nearby at creation");
            Ok(Json(ride))
        }
        Err(err) => Err(err),
    }
}

/// List the caller's rides, newest first
pub async fn my_rides(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<ride::Model>>> {
    Ok(Json(store::list_by_passenger(&*state.db, claims.sub).await?))
}

/// Get a single ride (passenger, assigned driver, or admin)
pub async fn get_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<ride::Model>> {
    let ride = store::get(&*state.db, ride_id).await?;
    authorize_view(&ride, &claims)?;
    Ok(Json(ride))
}

/// Retry matching an unmatched ride
pub async fn match_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<ride::Model>> {
    let ride = store::get(&*state.db, ride_id).await?;
    if ride.passenger_id != claims.sub {
        return Err(AppError::Forbidden(
            "You may only match your own rides".to_string(),
        ));
    }

    let matched = matching::match_ride(&*state.db, &state.events, &state.config, ride_id).await?;
    Ok(Json(matched))
}

/// Cancel a ride the caller owns
pub async fn cancel_ride(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Json<ride::Model>> {
    let cancelled = store::cancel(&*state.db, ride_id, &Actor::Passenger(claims.sub)).await?;
    state.events.publish(Event::RideUpdated { ride: cancelled.clone() });
    Ok(Json(cancelled))
}

/// Live feed for one ride: status changes plus the assigned driver's
/// position. The subscription ends when the client disconnects.
pub async fn ride_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(ride_id): Path<Uuid>,
) -> AppResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    let ride = store::get(&*state.db, ride_id).await?;
    authorize_view(&ride, &claims)?;

    let rx = state.events.subscribe();
    // Track the assignment as it changes so location events follow the
    // driver that actually holds the ride
    let mut driver_id = ride.driver_id;

    let stream = BroadcastStream::new(rx).filter_map(move |event| match event {
        Ok(Event::RideUpdated { ride }) if ride.id == ride_id => {
            driver_id = ride.driver_id;
            realtime::sse_event("ride_updated", &ride)
        }
        Ok(Event::DriverLocation { location }) if Some(location.driver_id) == driver_id => {
            realtime::sse_event("driver_location", &location)
        }
        _ => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn authorize_view(ride: &ride::Model, claims: &Claims) -> AppResult<()> {
    let allowed = ride.passenger_id == claims.sub
        || ride.driver_id == Some(claims.sub)
        || claims.role == UserRole::Admin;

    if allowed {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You are not a party to this ride".to_string(),
        ))
    }
}

fn validate_trip_coords(
    pickup_lat: f64,
    pickup_lng: f64,
    dropoff_lat: f64,
    dropoff_lng: f64,
) -> AppResult<()> {
    if !geo::validate_coords(pickup_lat, pickup_lng) {
        return Err(AppError::BadRequest(
            "Invalid pickup coordinates".to_string(),
        ));
    }
    if !geo::validate_coords(dropoff_lat, dropoff_lng) {
        return Err(AppError::BadRequest(
            "Invalid dropoff coordinates".to_string(),
        ));
    }
    Ok(())
}
