/// Configuration management for dbroute

use crate::core::EndpointRole;
pub use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main dbroute configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Reader selection configuration
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Health check configuration
    #[serde(default)]
    pub health: HealthConfig,
    /// Per-endpoint connection pool configuration
    #[serde(default)]
    pub connections: ConnectionConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Database endpoints, exactly one of which is the writer
    pub endpoints: Vec<EndpointConfig>,
}

/// A single configured database endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Unique identifier used in logs and routing decisions
    pub id: String,
    /// Socket address of the database instance
    pub address: String,
    /// Writer (primary) or reader (replica)
    pub role: EndpointRole,
    /// Maximum connections held by this endpoint's pool
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

/// How a healthy reader is picked among several
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    #[default]
    RoundRobin,
    LeastRecentlyUsed,
    LeastInFlight,
}

/// Routing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Reader selection policy
    #[serde(default)]
    pub policy: SelectionPolicy,
}

/// Health check configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Probe interval in seconds
    pub interval_sec: u64,
    /// Probe timeout in seconds
    pub timeout_sec: u64,
    /// Number of consecutive failures before marking unhealthy
    pub failure_threshold: u32,
}

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Bound on waiting for a free pool slot and on the TCP connect, in milliseconds
    pub connect_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (json, text)
    pub format: String,
}

fn default_pool_size() -> usize {
    10
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_sec: 10,
            timeout_sec: 2,
            failure_threshold: 3,
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_sec)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_sec)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            routing: RoutingConfig::default(),
            health: HealthConfig::default(),
            connections: ConnectionConfig::default(),
            logging: LoggingConfig::default(),
            endpoints: vec![EndpointConfig {
                id: "writer".to_string(),
                address: "127.0.0.1:5432".to_string(),
                role: EndpointRole::Writer,
                pool_size: 20,
            }],
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::ValidationError(
                "endpoints cannot be empty".to_string(),
            ));
        }

        let writers = self
            .endpoints
            .iter()
            .filter(|e| e.role == EndpointRole::Writer)
            .count();
        if writers != 1 {
            return Err(ConfigError::ValidationError(format!(
                "exactly one writer endpoint is required, found {}",
                writers
            )));
        }

        let mut seen = HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate endpoint id: {}",
                    endpoint.id
                )));
            }

            endpoint
                .address
                .parse::<std::net::SocketAddr>()
                .map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "Invalid address for endpoint {}: {}",
                        endpoint.id, endpoint.address
                    ))
                })?;

            if endpoint.pool_size == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "pool_size for endpoint {} must be greater than 0",
                    endpoint.id
                )));
            }
        }

        // Validate health config
        if self.health.interval_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health check interval_sec must be greater than 0".to_string(),
            ));
        }

        if self.health.timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "health check timeout_sec must be greater than 0".to_string(),
            ));
        }

        if self.health.timeout_sec >= self.health.interval_sec {
            return Err(ConfigError::ValidationError(
                "health check timeout_sec must be less than interval_sec".to_string(),
            ));
        }

        if self.health.failure_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "health check failure_threshold must be at least 1".to_string(),
            ));
        }

        if self.connections.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connections connect_timeout_ms must be greater than 0".to_string(),
            ));
        }

        // Validate logging config
        match self.logging.level.as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}",
                    self.logging.level
                )))
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            _ => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}",
                    self.logging.format
                )))
            }
        }

        Ok(())
    }

    /// The configured writer endpoint
    pub fn writer(&self) -> Option<&EndpointConfig> {
        self.endpoints
            .iter()
            .find(|e| e.role == EndpointRole::Writer)
    }

    /// All configured reader endpoints, in declaration order
    pub fn readers(&self) -> impl Iterator<Item = &EndpointConfig> {
        self.endpoints
            .iter()
            .filter(|e| e.role == EndpointRole::Reader)
    }

    /// Create example configuration file with one writer and two readers
    pub fn create_example_config<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config {
            endpoints: vec![
                EndpointConfig {
                    id: "writer-1".to_string(),
                    address: "10.0.1.10:5432".to_string(),
                    role: EndpointRole::Writer,
                    pool_size: 20,
                },
                EndpointConfig {
                    id: "reader-1".to_string(),
                    address: "10.0.1.11:5432".to_string(),
                    role: EndpointRole::Reader,
                    pool_size: 40,
                },
                EndpointConfig {
                    id: "reader-2".to_string(),
                    address: "10.0.1.12:5432".to_string(),
                    role: EndpointRole::Reader,
                    pool_size: 40,
                },
            ],
            ..Default::default()
        };

        config.save_to_file(path)
    }
}
