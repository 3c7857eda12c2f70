//! Configuration management
//!
//! YAML-based configuration with environment variable overrides, multiple
//! file locations and defaults for every setting. Loaded once at startup;
//! the resulting `AppConfig` is cloned into application state.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity provider management API
    pub identity: IdentityConfig,
    /// Webhook delivery service
    pub relay: RelayConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Origins allowed by CORS; empty list allows any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5080
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            request_timeout_secs: None,
            cors_allowed_origins: vec![],
        }
    }
}

/// Identity provider connection configuration
///
/// The management API is authenticated with client credentials; the same
/// endpoint base serves the OIDC token and userinfo endpoints used during
/// sign-in.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    /// Base URL of the identity provider (e.g. "https://id.example.com")
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: u64,
}

/// Webhook relay connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Base URL of the webhook delivery service
    pub base_url: String,
    /// Admin API key, sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

/// Cache store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Redis connection URL; when absent, an in-memory cache is used
    #[serde(default)]
    pub redis_url: Option<String>,
    /// TTL for user profile entries in seconds
    #[serde(default = "default_profile_ttl")]
    pub profile_ttl_secs: u64,
    /// TTL for membership-list entries in seconds
    #[serde(default = "default_membership_ttl")]
    pub membership_ttl_secs: u64,
    /// TTL for workspace detail entries in seconds
    #[serde(default = "default_workspace_ttl")]
    pub workspace_ttl_secs: u64,
    /// Entry cap for the in-memory fallback
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_profile_ttl() -> u64 {
    300
}

fn default_membership_ttl() -> u64 {
    300
}

fn default_workspace_ttl() -> u64 {
    300
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            profile_ttl_secs: default_profile_ttl(),
            membership_ttl_secs: default_membership_ttl(),
            workspace_ttl_secs: default_workspace_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Session cookie name
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,
    /// Sticky workspace-selection cookie name
    #[serde(default = "default_workspace_cookie")]
    pub workspace_cookie_name: String,
    /// Sliding-window session lifetime in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
    /// Mark cookies Secure (disable for plain-HTTP development)
    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,
}

fn default_session_cookie() -> String {
    "sid".to_string()
}

fn default_workspace_cookie() -> String {
    "workspace".to_string()
}

fn default_session_ttl() -> u64 {
    14 * 24 * 3600
}

fn default_cookie_secure() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie(),
            workspace_cookie_name: default_workspace_cookie(),
            ttl_secs: default_session_ttl(),
            cookie_secure: default_cookie_secure(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
}

/// Log output format
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/crewdeck")
}

fn default_log_prefix() -> String {
    "crewdeck".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            identity: IdentityConfig {
                base_url: "http://127.0.0.1:3001".to_string(),
                client_id: String::new(),
                client_secret: String::new(),
                timeout_secs: default_timeout(),
            },
            relay: RelayConfig {
                base_url: "http://127.0.0.1:3333".to_string(),
                api_key: None,
                timeout_secs: default_timeout(),
            },
            database: DatabaseConfig {
                url: "sqlite://crewdeck.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            cache: CacheConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides
    /// earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables (prefixed with CREWDECK_)
    pub fn load() -> Result<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("CREWDECK_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = if let Some(ref path) = config_path {
            if path.exists() {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            } else {
                eprintln!("[CONFIG] Config file not found: {:?}", path);
                AppConfig::default()
            }
        } else {
            eprintln!("[CONFIG] No config file found, using defaults");
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/crewdeck/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("crewdeck/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("CREWDECK_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CREWDECK_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            self.cache.redis_url = Some(url);
        }

        if let Ok(url) = std::env::var("CREWDECK_IDENTITY_BASE_URL") {
            self.identity.base_url = url;
        }
        if let Ok(id) = std::env::var("CREWDECK_IDENTITY_CLIENT_ID") {
            self.identity.client_id = id;
        }
        if let Ok(secret) = std::env::var("CREWDECK_IDENTITY_CLIENT_SECRET") {
            self.identity.client_secret = secret;
        }

        if let Ok(url) = std::env::var("CREWDECK_RELAY_BASE_URL") {
            self.relay.base_url = url;
        }
        if let Ok(key) = std::env::var("CREWDECK_RELAY_API_KEY") {
            self.relay.api_key = Some(key);
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("CREWDECK_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
    }

    /// Validate configuration values that have no workable default
    fn validate(&self) -> Result<()> {
        if self.identity.client_id.is_empty() || self.identity.client_secret.is_empty() {
            anyhow::bail!(
                "identity.client_id and identity.client_secret must be set \
                 (CREWDECK_IDENTITY_CLIENT_ID / CREWDECK_IDENTITY_CLIENT_SECRET)"
            );
        }
        if self.database.url.is_empty() {
            anyhow::bail!("database.url must be set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5080);
        assert_eq!(config.cache.profile_ttl_secs, 300);
        assert_eq!(config.session.cookie_name, "sid");
        assert_eq!(config.session.ttl_secs, 14 * 24 * 3600);
        assert!(config.cache.redis_url.is_none());
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
identity:
  base_url: "https://id.example.com"
  client_id: "m2m-app"
  client_secret: "shhh"
relay:
  base_url: "https://relay.example.com"
database:
  url: "sqlite://test.db"
"#;
        let config: AppConfig = serde_norway::from_str(yaml).unwrap();
        assert_eq!(config.identity.client_id, "m2m-app");
        assert_eq!(config.identity.timeout_secs, 30);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_credentials() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parsing() {
        let yaml = r#"
identity:
  base_url: "https://id.example.com"
  client_id: "a"
  client_secret: "b"
relay:
  base_url: "https://relay.example.com"
database:
  url: "sqlite://test.db"
logging:
  level: "debug"
  format: "json"
  target: "both"
"#;
        let config: AppConfig = serde_norway::from_str(yaml).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.target, LogTarget::Both);
    }
}
