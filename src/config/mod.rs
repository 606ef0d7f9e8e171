//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod services;
mod startup;
mod storage;

pub use services::ServicesConfig;
pub use startup::StartupConfig;
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

use serde::Deserialize;

use crate::bus::{MessagingConfig, MessagingType};
use crate::gateway::GatewayConfig;
use crate::outbox::OutboxConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "ORDER_MESH_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "ORDER_MESH";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "ORDER_MESH_LOG";

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messaging configuration.
    pub messaging: MessagingConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Collaborator service endpoints.
    pub services: ServicesConfig,
    /// Gateway cache configuration.
    pub gateway: GatewayConfig,
    /// Transactional outbox configuration.
    pub outbox: OutboxConfig,
    /// Startup connect loop.
    pub startup: StartupConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the runtime misbehave silently.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.startup.connect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "startup.connect_attempts must be at least 1".to_string(),
            ));
        }
        if self.gateway.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "gateway.cache.ttl_secs must be positive".to_string(),
            ));
        }
        if self.outbox.enabled && self.outbox.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "outbox.max_attempts must be at least 1 when the outbox is enabled".to_string(),
            ));
        }
        if self.outbox.enabled && self.outbox.relay_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "outbox.relay_interval_secs must be positive when the outbox is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Require a broker that separate processes can share.
    ///
    /// The channel bus lives inside one process, so two service binaries on
    /// it would never see each other's events.
    pub fn require_shared_broker(&self) -> Result<(), ConfigError> {
        if self.messaging.messaging_type == MessagingType::Channel {
            return Err(ConfigError::Invalid(
                "messaging.type 'channel' cannot connect separate service processes; \
                 set messaging.type to 'amqp' or run order-mesh-standalone"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.sqlite.path = ":memory:".to_string();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::AckMode;
    use crate::gateway::CachePolicy;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.messaging.messaging_type, MessagingType::Channel);
        assert_eq!(config.startup.connect_attempts, 12);
        assert_eq!(config.startup.connect_delay_secs, 5);
        assert_eq!(config.gateway.cache.ttl_secs, 300);
        assert_eq!(config.gateway.cache_policy, CachePolicy::TtlOnly);
        assert!(!config.outbox.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_for_test_uses_memory_sqlite() {
        let config = Config::for_test();
        assert_eq!(config.storage.sqlite.url(), "sqlite::memory:");
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.startup.connect_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_busy_outbox_relay() {
        let mut config = Config::default();
        config.outbox.relay_interval_secs = 0;
        assert!(config.validate().is_ok());

        config.outbox.enabled = true;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_service_processes_require_shared_broker() {
        let mut config = Config::default();
        assert!(matches!(
            config.require_shared_broker(),
            Err(ConfigError::Invalid(_))
        ));

        config.messaging.messaging_type = MessagingType::Amqp;
        assert!(config.require_shared_broker().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "messaging:\n  type: amqp\n  ack_mode: manual\n  amqp:\n    url: amqp://rabbit:5672\ngateway:\n  cache_policy: invalidate_on_write\n  cache:\n    ttl_secs: 60\nstorage:\n  type: postgres"
        )
        .unwrap();

        let config = Config::load(file.path().to_str()).unwrap();
        assert_eq!(config.messaging.messaging_type, MessagingType::Amqp);
        assert_eq!(config.messaging.ack_mode, AckMode::Manual);
        assert_eq!(config.messaging.amqp.url, "amqp://rabbit:5672");
        assert_eq!(config.gateway.cache_policy, CachePolicy::InvalidateOnWrite);
        assert_eq!(config.gateway.cache.ttl_secs, 60);
        assert_eq!(config.storage.storage_type, StorageType::Postgres);
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        std::env::set_var("ORDER_MESH__STARTUP__CONNECT_ATTEMPTS", "3");
        let config = Config::load(None);
        std::env::remove_var("ORDER_MESH__STARTUP__CONNECT_ATTEMPTS");

        assert_eq!(config.unwrap().startup.connect_attempts, 3);
    }
}
