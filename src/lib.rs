pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod realtime;
pub mod rides;
pub mod routes;
pub mod utils;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use realtime::EventHub;

// The connection is behind an Arc because sea-orm's `mock` feature (a
// dev-dependency here) removes Clone from DatabaseConnection, and the
// state must stay cloneable in test builds too.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Config,
    pub events: EventHub,
}
