//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via BOOKSHELF_CONFIG)
//! 3. Environment variables
//!
//! `RPC_PORT`, `MONGO_HOST` and `MONGO_PORT` have no defaults; [`Config::validate`]
//! rejects a configuration that still lacks them after all layers are applied.
//! `GRPC_PORT` is read when `RPC_PORT` is unset.

use crate::server::ServerConfig;
use bookshelf_storage::MongoConfig;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Seeding configuration.
    pub seed: SeedConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::load`], reading variables through `lookup`.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup("BOOKSHELF_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides(&lookup)?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        self.network.apply_env_overrides(lookup)?;
        self.database.apply_env_overrides(lookup)?;
        self.seed.apply_env_overrides(lookup)?;
        Ok(())
    }

    /// Checks that every required setting is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.port.is_none() {
            return Err(ConfigError::Missing("RPC_PORT"));
        }
        self.network.bind_addr()?;

        if self.database.backend == StorageBackend::Mongo {
            self.database.mongo_config()?;
        }
        Ok(())
    }

    /// Builds the TCP server settings.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        Ok(ServerConfig {
            bind_addr: self.network.bind_addr()?,
            idle_timeout: self.network.idle_timeout(),
            max_connections: self.network.max_connections,
        })
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// IP address to bind to.
    pub bind_host: String,
    /// RPC port. Required.
    pub port: Option<u16>,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: None,
            idle_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(host) = lookup("BOOKSHELF_BIND_HOST") {
            self.bind_host = host;
        }
        // GRPC_PORT is the older name; RPC_PORT wins when both are set.
        if let Some(port) = parse_var(lookup, "RPC_PORT")? {
            self.port = Some(port);
        } else if let Some(port) = parse_var(lookup, "GRPC_PORT")? {
            self.port = Some(port);
        }
        if let Some(secs) = parse_var(lookup, "BOOKSHELF_IDLE_TIMEOUT")? {
            self.idle_timeout_secs = secs;
        }
        if let Some(max) = parse_var(lookup, "BOOKSHELF_MAX_CONNECTIONS")? {
            self.max_connections = max;
        }
        Ok(())
    }

    /// Returns the socket address to listen on.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let port = self.port.ok_or(ConfigError::Missing("RPC_PORT"))?;
        let ip: IpAddr = self.bind_host.parse().map_err(|_| {
            ConfigError::InvalidValue("BOOKSHELF_BIND_HOST", self.bind_host.clone())
        })?;
        Ok(SocketAddr::new(ip, port))
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Collection backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// MongoDB at `MONGO_HOST:MONGO_PORT`.
    #[default]
    Mongo,
    /// Process memory; contents are lost on exit.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(StorageBackend::Mongo),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// Database host. Required for the mongo backend.
    pub host: Option<String>,
    /// Database port. Required for the mongo backend.
    pub port: Option<u16>,
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
    /// Create a unique index on isbn at startup.
    pub unique_isbn_index: bool,
    /// Seconds allowed to reach the database at startup.
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Mongo,
            host: None,
            port: None,
            database: "bookshelf".to_string(),
            collection: "books".to_string(),
            unique_isbn_index: false,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    fn apply_env_overrides(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(backend) = lookup("BOOKSHELF_STORAGE") {
            self.backend = backend
                .parse()
                .map_err(|_| ConfigError::InvalidValue("BOOKSHELF_STORAGE", backend))?;
        }
        if let Some(host) = lookup("MONGO_HOST") {
            self.host = Some(host);
        }
        if let Some(port) = parse_var(lookup, "MONGO_PORT")? {
            self.port = Some(port);
        }
        if let Some(database) = lookup("MONGO_DATABASE") {
            self.database = database;
        }
        if let Some(collection) = lookup("MONGO_COLLECTION") {
            self.collection = collection;
        }
        if let Some(unique) = parse_bool(lookup, "MONGO_UNIQUE_ISBN_INDEX")? {
            self.unique_isbn_index = unique;
        }
        if let Some(secs) = parse_var(lookup, "MONGO_CONNECT_TIMEOUT")? {
            self.connect_timeout_secs = secs;
        }
        Ok(())
    }

    /// Builds the MongoDB connection settings.
    pub fn mongo_config(&self) -> Result<MongoConfig, ConfigError> {
        let host = match self.host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => return Err(ConfigError::Missing("MONGO_HOST")),
        };
        let port = self.port.ok_or(ConfigError::Missing("MONGO_PORT"))?;

        let mut config = MongoConfig::new(host, port);
        config.database = self.database.clone();
        config.collection = self.collection.clone();
        config.unique_isbn_index = self.unique_isbn_index;
        config.connect_timeout = Duration::from_secs(self.connect_timeout_secs);
        Ok(config)
    }
}

/// Seeding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// Insert the sample catalogue at startup.
    pub enabled: bool,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl SeedConfig {
    fn apply_env_overrides(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(enabled) = parse_bool(lookup, "BOOKSHELF_SEED")? {
            self.enabled = enabled;
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ConfigError::InvalidValue(name, raw)),
        },
        None => Ok(None),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match lookup(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(Some(true)),
            "0" | "false" | "no" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue(name, raw)),
        },
        None => Ok(None),
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    Missing(&'static str),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Missing(name) => {
                write!(f, "required setting {} is not set", name)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("RPC_PORT", "8082"),
            ("MONGO_HOST", "db.local"),
            ("MONGO_PORT", "27017"),
        ]
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_host, "0.0.0.0");
        assert!(config.network.port.is_none());
        assert_eq!(config.network.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.database.database, "bookshelf");
        assert_eq!(config.database.collection, "books");
        assert_eq!(config.database.backend, StorageBackend::Mongo);
        assert!(config.seed.enabled);
    }

    #[test]
    fn test_required_variables() {
        let config = Config::load_with(env(&required())).unwrap();
        config.validate().unwrap();

        assert_eq!(
            config.network.bind_addr().unwrap(),
            "0.0.0.0:8082".parse::<SocketAddr>().unwrap()
        );
        let mongo = config.database.mongo_config().unwrap();
        assert_eq!(mongo.uri(), "mongodb://db.local:27017");
    }

    #[test]
    fn test_missing_variables_fail_fast() {
        for missing in ["RPC_PORT", "MONGO_HOST", "MONGO_PORT"] {
            let vars: Vec<_> = required()
                .into_iter()
                .filter(|(k, _)| *k != missing)
                .collect();
            let config = Config::load_with(env(&vars)).unwrap();
            let err = config.validate().unwrap_err();
            assert!(matches!(err, ConfigError::Missing(name) if name == missing));
            assert!(err.to_string().contains(missing));
        }
    }

    #[test]
    fn test_grpc_port_fallback() {
        let config = Config::load_with(env(&[("GRPC_PORT", "50051")])).unwrap();
        assert_eq!(config.network.port, Some(50051));

        let config =
            Config::load_with(env(&[("GRPC_PORT", "50051"), ("RPC_PORT", "8082")])).unwrap();
        assert_eq!(config.network.port, Some(8082));

        let err = Config::load_with(env(&[("GRPC_PORT", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("GRPC_PORT", _)));
    }

    #[test]
    fn test_memory_backend_needs_no_database() {
        let config =
            Config::load_with(env(&[("RPC_PORT", "9000"), ("BOOKSHELF_STORAGE", "memory")]))
                .unwrap();
        config.validate().unwrap();
        assert_eq!(config.database.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::load_with(env(&[("RPC_PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("RPC_PORT", _)));

        let err = Config::load_with(env(&[("MONGO_PORT", "70000")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("MONGO_PORT", _)));

        let err = Config::load_with(env(&[("BOOKSHELF_SEED", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("BOOKSHELF_SEED", _)));

        let err = Config::load_with(env(&[("BOOKSHELF_STORAGE", "sqlite")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("BOOKSHELF_STORAGE", _)));

        let mut vars = required();
        vars.push(("BOOKSHELF_BIND_HOST", "not-an-ip"));
        let config = Config::load_with(env(&vars)).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue("BOOKSHELF_BIND_HOST", _))
        ));
    }

    #[test]
    fn test_optional_overrides() {
        let mut vars = required();
        vars.extend([
            ("BOOKSHELF_BIND_HOST", "127.0.0.1"),
            ("BOOKSHELF_IDLE_TIMEOUT", "30"),
            ("BOOKSHELF_MAX_CONNECTIONS", "8"),
            ("MONGO_DATABASE", "library"),
            ("MONGO_COLLECTION", "volumes"),
            ("MONGO_UNIQUE_ISBN_INDEX", "true"),
            ("BOOKSHELF_SEED", "0"),
        ]);
        let config = Config::load_with(env(&vars)).unwrap();

        let server = config.server_config().unwrap();
        assert_eq!(server.bind_addr, "127.0.0.1:8082".parse::<SocketAddr>().unwrap());
        assert_eq!(server.idle_timeout, Duration::from_secs(30));
        assert_eq!(server.max_connections, 8);

        let mongo = config.database.mongo_config().unwrap();
        assert_eq!(mongo.database, "library");
        assert_eq!(mongo.collection, "volumes");
        assert!(mongo.unique_isbn_index);
        assert!(!config.seed.enabled);
    }

    #[test]
    fn test_yaml_file_then_env_override() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "network:\n  port: 7000\n\
             database:\n  host: yaml-host\n  port: 27018\n  collection: shelf"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = Config::load_with(env(&[
            ("BOOKSHELF_CONFIG", path.as_str()),
            ("MONGO_HOST", "env-host"),
        ]))
        .unwrap();
        config.validate().unwrap();

        assert_eq!(config.network.port, Some(7000));
        assert_eq!(config.database.host.as_deref(), Some("env-host"));
        assert_eq!(config.database.port, Some(27018));
        assert_eq!(config.database.collection, "shelf");
        assert_eq!(config.database.database, "bookshelf");
    }

    #[test]
    fn test_missing_config_file() {
        let err =
            Config::load_with(env(&[("BOOKSHELF_CONFIG", "/nonexistent/bookshelf.yaml")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_, _)));
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::load_with(env(&required())).unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.port, config.network.port);
        assert_eq!(parsed.database.host, config.database.host);
    }
}
