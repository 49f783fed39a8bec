use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::config::Config;
use crate::entities::ride::{self, RideStatus};
use crate::error::AppResult;
use crate::realtime::{Event, EventHub};
use crate::rides::store;

/// Background sweep: rides still `searching` after the configured bound
/// move to the terminal `expired` state so passengers are not left
/// waiting forever on a search nobody will answer.
pub async fn run_sweeper(db: Arc<DatabaseConnection>, events: EventHub, config: Config) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_secs));
    // First tick fires immediately; skip straight into the cadence
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(err) = sweep_once(&db, &events, &config).await {
            tracing::error!(error = %err, "search timeout sweep failed");
        }
    }
}

pub async fn sweep_once(
    db: &DatabaseConnection,
    events: &EventHub,
    config: &Config,
) -> AppResult<usize> {
    let cutoff = Utc::now() - chrono::Duration::seconds(config.search_timeout_secs);

    let stale = ride::Entity::find()
        .filter(ride::Column::Status.eq(RideStatus::Searching))
        .filter(ride::Column::CreatedAt.lte(cutoff))
        .all(db)
        .await?;

    let mut expired = 0;
    for ride in stale {
        // Conditional per-ride update: a ride matched between the scan
        // and the write is left alone
        if let Some(updated) = store::expire(db, ride.id).await? {
            events.publish(Event::RideUpdated { ride: updated });
            expired += 1;
        }
    }

    if expired > 0 {
        tracing::info!(count = expired, "expired unmatched rides");
    }

    Ok(expired)
}
