//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level coordinator configuration.
///
/// Loaded once at startup via [`CoordinatorConfig::from_env`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Redis connection URL.
    pub redis_url: String,

    /// Session inactivity window in seconds. Every owned key expires this
    /// long after the last activity refresh.
    pub session_ttl_secs: u64,

    /// Independent TTL for cached catalog entries (`option:{id}` keys).
    pub catalog_ttl_secs: u64,

    /// Capacity of each session room's broadcast channel.
    pub room_channel_capacity: usize,
}

impl CoordinatorConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`], or if `REDIS_URL` does not use a redis scheme.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        if !redis_url.starts_with("redis://") && !redis_url.starts_with("rediss://") {
            return Err("REDIS_URL must use redis:// or rediss:// scheme".into());
        }

        let session_ttl_secs = parse_env("SESSION_TTL_SECS", 1800);
        let catalog_ttl_secs = parse_env("CATALOG_TTL_SECS", 7200);
        let room_channel_capacity = parse_env("ROOM_CHANNEL_CAPACITY", 128);

        Ok(Self {
            listen_addr,
            redis_url,
            session_ttl_secs,
            catalog_ttl_secs,
            room_channel_capacity,
        })
    }

    /// Session TTL as a [`Duration`].
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Catalog TTL as a [`Duration`].
    #[must_use]
    pub const fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: std::net::SocketAddr::from(([0, 0, 0, 0], 3000)),
            redis_url: "redis://localhost:6379".to_string(),
            session_ttl_secs: 1800,
            catalog_ttl_secs: 7200,
            room_channel_capacity: 128,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.session_ttl_secs, 1800);
        assert_eq!(config.catalog_ttl_secs, 7200);
        assert_eq!(config.room_channel_capacity, 128);
    }

    #[test]
    fn ttl_durations() {
        let config = CoordinatorConfig {
            session_ttl_secs: 60,
            ..Default::default()
        };
        assert_eq!(config.session_ttl(), Duration::from_secs(60));
    }
}
