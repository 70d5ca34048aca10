/// Configuration management for the Squad dashboard
use crate::error::{DashboardError, DashboardResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Log filter used when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_FILTER: &str = "squad_dashboard=debug,tower_http=debug";

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub rcon: RconConfig,
    pub authentication: AuthConfig,
    pub battlemetrics: Option<BattleMetricsConfig>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub database: PathBuf,
}

/// Game-server bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RconConfig {
    /// WebSocket URL of the game-server bridge
    pub bridge_url: String,
    /// Seconds to wait for a command acknowledgement
    pub ack_timeout_secs: u64,
    /// Seconds between reconnect attempts
    pub reconnect_interval_secs: u64,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret used to sign dashboard session tokens
    pub session_secret: String,
    /// Discord ids that always hold the owner role (comma-separated)
    pub owner_ids: Vec<String>,
}

/// BattleMetrics API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleMetricsConfig {
    pub token: String,
    pub server_id: String,
    pub game: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DashboardResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("DASHBOARD_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("DASHBOARD_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| DashboardError::Validation("Invalid port number".to_string()))?;

        let data_directory: PathBuf = env::var("DASHBOARD_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("DASHBOARD_DATABASE_LOCATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("dashboard.sqlite"));

        let bridge_url = env::var("RCON_BRIDGE_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:3001".to_string());
        let ack_timeout_secs = env::var("RCON_ACK_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);
        let reconnect_interval_secs = env::var("RCON_RECONNECT_INTERVAL_SECS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let session_secret = env::var("DASHBOARD_SESSION_SECRET")
            .map_err(|_| DashboardError::Validation("Session secret required".to_string()))?;

        // Parse owner ids from comma-separated list
        let owner_ids = env::var("DASHBOARD_OWNER_IDS")
            .unwrap_or_else(|_| String::new())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<String>>();

        let battlemetrics = match (
            env::var("BATTLEMETRICS_TOKEN"),
            env::var("BATTLEMETRICS_SERVER_ID"),
        ) {
            (Ok(token), Ok(server_id)) => Some(BattleMetricsConfig {
                token,
                server_id,
                game: env::var("GAMENAME").unwrap_or_else(|_| "squad".to_string()),
            }),
            _ => None,
        };

        let rate_limit_enabled = env::var("DASHBOARD_RATE_LIMITS_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse()
            .unwrap_or(true);
        let requests_per_second = env::var("DASHBOARD_RATE_LIMIT_RPS")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .unwrap_or(50);
        let burst_size = env::var("DASHBOARD_RATE_LIMIT_BURST")
            .unwrap_or_else(|_| "100".to_string())
            .parse()
            .unwrap_or(100);

        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let json = env::var("LOG_FORMAT")
            .map(|f| f.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(ServerConfig {
            service: ServiceConfig { hostname, port },
            storage: StorageConfig {
                data_directory,
                database,
            },
            rcon: RconConfig {
                bridge_url,
                ack_timeout_secs,
                reconnect_interval_secs,
            },
            authentication: AuthConfig {
                session_secret,
                owner_ids,
            },
            battlemetrics,
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                requests_per_second,
                burst_size,
            },
            logging: LoggingConfig { level, json },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> DashboardResult<()> {
        if self.service.hostname.is_empty() {
            return Err(DashboardError::Validation("Hostname cannot be empty".to_string()));
        }

        if self.authentication.session_secret.len() < 32 {
            return Err(DashboardError::Validation(
                "Session secret must be at least 32 characters".to_string(),
            ));
        }

        if self.rcon.ack_timeout_secs == 0 {
            return Err(DashboardError::Validation(
                "RCON acknowledgement timeout must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration for in-process use: no bridge, no BattleMetrics, in-memory paths
    pub fn local(session_secret: impl Into<String>) -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 0,
            },
            storage: StorageConfig {
                data_directory: PathBuf::from("./data"),
                database: PathBuf::from("./data/dashboard.sqlite"),
            },
            rcon: RconConfig {
                bridge_url: "ws://127.0.0.1:3001".to_string(),
                ack_timeout_secs: 10,
                reconnect_interval_secs: 5,
            },
            authentication: AuthConfig {
                session_secret: session_secret.into(),
                owner_ids: Vec::new(),
            },
            battlemetrics: None,
            rate_limit: RateLimitConfig {
                enabled: false,
                requests_per_second: 50,
                burst_size: 100,
            },
            logging: LoggingConfig {
                level: DEFAULT_LOG_FILTER.to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_short_secret() {
        let config = ServerConfig::local("short");
        assert!(config.validate().is_err());

        let config = ServerConfig::local("0123456789abcdef0123456789abcdef");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_log_filter_parses() {
        let config = ServerConfig::local("0123456789abcdef0123456789abcdef");
        assert_eq!(config.logging.level, DEFAULT_LOG_FILTER);
        assert!(tracing_subscriber::EnvFilter::try_new(&config.logging.level).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ServerConfig::local("0123456789abcdef0123456789abcdef");
        config.rcon.ack_timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
