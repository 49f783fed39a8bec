use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_hours: i64,
    pub server_host: String,
    pub server_port: u16,
    /// Radius around the pickup point searched for candidate drivers.
    pub match_radius_km: f64,
    /// How many candidates a single match pass will try to claim.
    pub match_max_attempts: usize,
    /// How long a ride may stay in `searching` before it expires.
    pub search_timeout_secs: i64,
    /// Cadence of the background sweep that expires stale searches.
    pub sweep_interval_secs: u64,
    /// Locations older than this are ignored by matching.
    pub location_staleness_secs: i64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: env::var("DATABASE_URL")
                .expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET")
                .expect("JWT_SECRET must be set"),
            jwt_expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a number"),
            server_host: env::var("SERVER_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
            match_radius_km: env::var("MATCH_RADIUS_KM")
                .unwrap_or_else(|_| "5.0".to_string())
                .parse()
                .expect("MATCH_RADIUS_KM must be a number"),
            match_max_attempts: env::var("MATCH_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .expect("MATCH_MAX_ATTEMPTS must be a number"),
            search_timeout_secs: env::var("SEARCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .expect("SEARCH_TIMEOUT_SECS must be a number"),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("SWEEP_INTERVAL_SECS must be a number"),
            location_staleness_secs: env::var("LOCATION_STALENESS_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("LOCATION_STALENESS_SECS must be a number"),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
