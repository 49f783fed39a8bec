use std::future::Future;
use std::time::Duration;

use sea_orm::{Database, DatabaseConnection, DbErr};

use crate::config::Config;
use crate::error::{AppError, AppResult};

/// Attempts for idempotent reads hitting transient connection failures.
/// Writes are never retried here: a retried insert could duplicate a ride.
const READ_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

pub async fn connect(config: &Config) -> AppResult<DatabaseConnection> {
    Database::connect(&config.database_url)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to connect to database: {}", e)))
}

fn is_transient(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

/// Run an idempotent read, retrying transient transport errors a bounded
/// number of times with a short backoff.
pub async fn read_with_retry<T, Fut, F>(mut op: F) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < READ_ATTEMPTS => {
                tracing::warn!(error = %err, attempt, "transient read error, retrying");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
