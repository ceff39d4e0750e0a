use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL embedded into QR payloads; the token is appended to it.
    pub login_base_url: String,
    pub node: NodeConfig,
    /// Enables dangerous operations like purge. Must never be true in production.
    pub test_mode: bool,
    pub tokens: TokenConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_address: String,
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Max rows touched per maintenance pass (bounds write transaction time)
    pub cleanup_batch_size: usize,
    pub cleanup_interval_seconds: u64,
    /// How long terminal/expired rows stay visible before deletion
    pub retention_seconds: u64,
    /// Token lifetime from creation; never extended
    pub ttl_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            cleanup_batch_size: 500,
            cleanup_interval_seconds: 60,
            retention_seconds: 3600, // 1 hour
            ttl_seconds: 300,        // 5 minutes
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let login_base_url = std::env::var("LOGIN_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080/login".to_string());

        let defaults = TokenConfig::default();
        let tokens = TokenConfig {
            cleanup_batch_size: env_parse("CLEANUP_BATCH_SIZE", defaults.cleanup_batch_size),
            cleanup_interval_seconds: env_parse(
                "CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_interval_seconds,
            ),
            retention_seconds: env_parse("RETENTION_SECONDS", defaults.retention_seconds),
            ttl_seconds: env_parse("TOKEN_TTL_SECONDS", defaults.ttl_seconds),
        };

        let test_mode = std::env::var("TEST_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let config = Config {
            login_base_url,
            node: NodeConfig {
                bind_address,
                data_dir,
            },
            test_mode,
            tokens,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.ttl_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "TOKEN_TTL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if self.tokens.cleanup_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "CLEANUP_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.login_base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "LOGIN_BASE_URL cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
