use uuid::Uuid;

use crate::entities::ride::{self, RideStatus};
use crate::error::{AppError, AppResult};

/// Who is asking for a transition. Every status change is checked against
/// the actor; nothing trusts the caller to be well-behaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Passenger(Uuid),
    Driver(Uuid),
    /// Background jobs (the search-timeout sweeper).
    System,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Searching => "searching",
            RideStatus::Accepted => "accepted",
            RideStatus::Arrived => "arrived",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
            RideStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RideStatus::Completed | RideStatus::Cancelled | RideStatus::Expired
        )
    }

    /// Position along the forward lifecycle. Terminal side-exits
    /// (cancelled/expired) have no rank; they end the sequence wherever
    /// it stood.
    pub fn rank(&self) -> Option<u8> {
        match self {
            RideStatus::Searching => Some(0),
            RideStatus::Accepted => Some(1),
            RideStatus::Arrived => Some(2),
            RideStatus::InProgress => Some(3),
            RideStatus::Completed => Some(4),
            RideStatus::Cancelled | RideStatus::Expired => None,
        }
    }
}

/// The expected prior status for each forward transition. Conditional
/// updates in the store filter on exactly this, so two concurrent calls
/// can never both succeed.
pub fn expected_prior(to: RideStatus) -> Option<RideStatus> {
    match to {
        RideStatus::Accepted => Some(RideStatus::Searching),
        RideStatus::Arrived => Some(RideStatus::Accepted),
        RideStatus::InProgress => Some(RideStatus::Arrived),
        RideStatus::Completed => Some(RideStatus::InProgress),
        _ => None,
    }
}

/// Statuses from which the given actor may cancel a ride.
pub fn cancellable_from(actor: &Actor) -> &'static [RideStatus] {
    match actor {
        // The passenger may bail out any time before completion
        Actor::Passenger(_) => &[
            RideStatus::Searching,
            RideStatus::Accepted,
            RideStatus::Arrived,
            RideStatus::InProgress,
        ],
        // The driver may only back out before the trip has started
        Actor::Driver(_) => &[RideStatus::Accepted, RideStatus::Arrived],
        Actor::System => &[],
    }
}

/// Validate a forward transition against the current ride row and actor.
/// The store re-checks the same conditions atomically; this gives callers
/// a precise error before any write, and tests a pure surface.
pub fn check_transition(ride: &ride::Model, to: RideStatus, actor: &Actor) -> AppResult<()> {
    let expected = expected_prior(to).ok_or_else(|| {
        AppError::BadRequest(format!("{} is not a forward transition target", to.as_str()))
    })?;

    if ride.status.is_terminal() {
        return Err(AppError::Conflict(format!(
            "Ride is already {}",
            ride.status.as_str()
        )));
    }

    if ride.status != expected {
        return Err(AppError::Conflict(format!(
            "Cannot move ride from {} to {}",
            ride.status.as_str(),
            to.as_str()
        )));
    }

    match (to, actor) {
        // Any driver may accept an unclaimed search
        (RideStatus::Accepted, Actor::Driver(_)) => Ok(()),
        // Everything past accepted belongs to the assigned driver alone
        (_, Actor::Driver(driver_id)) if ride.driver_id == Some(*driver_id) => Ok(()),
        (_, Actor::Driver(_)) => Err(AppError::Forbidden(
            "Only the assigned driver may update this ride".to_string(),
        )),
        _ => Err(AppError::Forbidden(
            "Only the assigned driver may advance a ride".to_string(),
        )),
    }
}
