//! Environment-backed configuration. Call `dotenvy::dotenv()` before
//! `Config::from_env` so a local `.env` file is honored.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_expiry_secs: u64,
    /// Maximum chat message length in characters.
    pub max_message_len: usize,
    /// Capacity of each connection's outbound send buffer.
    pub send_buffer: usize,
    /// Connections silent longer than this are force-closed.
    pub heartbeat_timeout_secs: u64,
    /// How often the stale-connection sweep runs.
    pub prune_interval_secs: u64,
    /// Upper bound on any single store call.
    pub store_timeout: Duration,
    /// Snowflake machine id, must be unique per server instance.
    pub machine_id: u64,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;
        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| "JWT_SECRET must be set".to_string())?;
        let bind_addr = env_parse("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)));
        Ok(Config {
            database_url,
            bind_addr,
            jwt_secret,
            jwt_expiry_secs: env_parse("JWT_EXPIRY_SECS", 86_400),
            max_message_len: env_parse("MAX_MESSAGE_LEN", 1000),
            send_buffer: env_parse("WS_SEND_BUFFER", 64),
            heartbeat_timeout_secs: env_parse("WS_HEARTBEAT_TIMEOUT_SECS", 300),
            prune_interval_secs: env_parse("WS_PRUNE_INTERVAL_SECS", 60),
            store_timeout: Duration::from_millis(env_parse("STORE_TIMEOUT_MS", 5_000)),
            machine_id: env_parse("MACHINE_ID", 0),
        })
    }
}
