//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address (PORT, default 4000)
    pub server_addr: SocketAddr,
    /// Deployment mode: "development" or "production"
    pub env: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (CLIENT_URL, comma-separated)
    pub allowed_origins: Vec<String>,
    /// How long a player's slot survives with no live connections
    pub disconnect_grace_ms: u64,
    /// Simulation tick rate in Hz
    pub tick_rate: u32,
    /// Delay between a round death and the respawn reset
    pub respawn_delay_ms: u64,
    /// Default world 2 ground base before any client reports a viewport
    pub world2_base_y: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid("PORT"))?,
            Err(_) => 4000,
        };
        let server_addr = format!("0.0.0.0:{port}")
            .parse()
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let allowed_origins = env::var("CLIENT_URL")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            server_addr,
            env: env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            allowed_origins,
            disconnect_grace_ms: parse_or("DISCONNECT_GRACE_MS", 15_000)?,
            tick_rate: parse_or("TICK_RATE", 60)?,
            respawn_delay_ms: parse_or("RESPAWN_DELAY_MS", 1_800)?,
            world2_base_y: parse_or("WORLD2_BASE_Y", 820.0)?,
        })
    }

    pub fn is_development(&self) -> bool {
        self.env != "production"
    }

    /// Tick period in milliseconds, floored at 10ms.
    pub fn tick_interval_ms(&self) -> u64 {
        (1000 / u64::from(self.tick_rate.max(1))).max(10)
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_is_floored() {
        let mut config = Config {
            server_addr: "0.0.0.0:4000".parse().unwrap(),
            env: "development".into(),
            log_level: "info".into(),
            allowed_origins: Vec::new(),
            disconnect_grace_ms: 15_000,
            tick_rate: 60,
            respawn_delay_ms: 1_800,
            world2_base_y: 820.0,
        };
        assert_eq!(config.tick_interval_ms(), 16);
        config.tick_rate = 500;
        assert_eq!(config.tick_interval_ms(), 10);
        config.tick_rate = 0;
        assert_eq!(config.tick_interval_ms(), 1000);
    }

    #[test]
    fn development_is_the_default_mode() {
        let config = Config {
            server_addr: "0.0.0.0:4000".parse().unwrap(),
            env: "development".into(),
            log_level: "info".into(),
            allowed_origins: Vec::new(),
            disconnect_grace_ms: 15_000,
            tick_rate: 60,
            respawn_delay_ms: 1_800,
            world2_base_y: 820.0,
        };
        assert!(config.is_development());
    }
}
