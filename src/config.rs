//! Configuration module for nimbus.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{NimbusError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Whether to serve the frontend bundle.
    #[serde(default)]
    pub serve_static: bool,
    /// Path to the frontend bundle.
    #[serde(default = "default_static_path")]
    pub static_path: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8006
}

fn default_static_path() -> String {
    "frontend/dist".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            serve_static: false,
            static_path: default_static_path(),
        }
    }
}

/// Storage root configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory every user path is resolved against.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_storage_root() -> String {
    "data/storage".to_string()
}

fn default_max_upload_size() -> u64 {
    512
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

impl StorageConfig {
    /// Maximum upload size in bytes.
    pub fn max_upload_size_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }
}

/// Background archive configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Scratch directory for temporary archives (empty = system temp dir).
    #[serde(default)]
    pub scratch_dir: String,
    /// Maximum number of archive builds running at once.
    #[serde(default = "default_max_concurrent_builds")]
    pub max_concurrent_builds: usize,
    /// Finished jobs older than this are swept along with their artifact.
    #[serde(default = "default_stale_job_ttl")]
    pub stale_job_ttl_secs: u64,
    /// Interval between stale job sweeps (0 = disabled).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_max_concurrent_builds() -> usize {
    4
}

fn default_stale_job_ttl() -> u64 {
    86400 // 24 hours
}

fn default_sweep_interval() -> u64 {
    900 // 15 minutes
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            scratch_dir: String::new(),
            max_concurrent_builds: default_max_concurrent_builds(),
            stale_job_ttl_secs: default_stale_job_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl ArchiveConfig {
    /// Resolve the scratch directory, falling back to the system temp dir.
    pub fn scratch_path(&self) -> PathBuf {
        if self.scratch_dir.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.scratch_dir)
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/nimbus.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Archive job configuration.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(NimbusError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| NimbusError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `NIMBUS_STORAGE_ROOT`: Override the storage root
    /// - `NIMBUS_SCRATCH_DIR`: Override the archive scratch directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("NIMBUS_STORAGE_ROOT") {
            if !root.is_empty() {
                self.storage.root = root;
            }
        }
        if let Ok(scratch) = std::env::var("NIMBUS_SCRATCH_DIR") {
            if !scratch.is_empty() {
                self.archive.scratch_dir = scratch;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.root.trim().is_empty() {
            return Err(NimbusError::Config("storage.root must not be empty".to_string()));
        }
        if self.archive.max_concurrent_builds == 0 {
            return Err(NimbusError::Config(
                "archive.max_concurrent_builds must be at least 1".to_string(),
            ));
        }
        if self.storage.max_upload_size_mb == 0 {
            return Err(NimbusError::Config(
                "storage.max_upload_size_mb must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8006);
        assert!(config.server.cors_origins.is_empty());
        assert!(!config.server.serve_static);
        assert_eq!(config.server.static_path, "frontend/dist");

        assert_eq!(config.storage.root, "data/storage");
        assert_eq!(config.storage.max_upload_size_mb, 512);

        assert!(config.archive.scratch_dir.is_empty());
        assert_eq!(config.archive.max_concurrent_builds, 4);
        assert_eq!(config.archive.stale_job_ttl_secs, 86400);
        assert_eq!(config.archive.sweep_interval_secs, 900);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/nimbus.log");
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
cors_origins = ["http://localhost:5173"]
serve_static = true
static_path = "public"

[storage]
root = "/mnt/cloud_storage"
max_upload_size_mb = 64

[archive]
scratch_dir = "/var/tmp/nimbus"
max_concurrent_builds = 2
stale_job_ttl_secs = 3600
sweep_interval_secs = 60

[logging]
level = "debug"
file = "custom/logs/app.log"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.cors_origins, vec!["http://localhost:5173"]);
        assert!(config.server.serve_static);
        assert_eq!(config.server.static_path, "public");

        assert_eq!(config.storage.root, "/mnt/cloud_storage");
        assert_eq!(config.storage.max_upload_size_mb, 64);
        assert_eq!(config.storage.max_upload_size_bytes(), 64 * 1024 * 1024);

        assert_eq!(config.archive.scratch_path(), PathBuf::from("/var/tmp/nimbus"));
        assert_eq!(config.archive.max_concurrent_builds, 2);
        assert_eq!(config.archive.stale_job_ttl_secs, 3600);
        assert_eq!(config.archive.sweep_interval_secs, 60);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/logs/app.log");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[storage]
root = "/srv/files"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.storage.root, "/srv/files");
        assert_eq!(config.storage.max_upload_size_mb, 512);
        assert_eq!(config.server.port, 8006);
        assert_eq!(config.archive.max_concurrent_builds, 4);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.root, "data/storage");
    }

    #[test]
    fn test_scratch_path_defaults_to_temp_dir() {
        let config = ArchiveConfig::default();
        assert_eq!(config.scratch_path(), std::env::temp_dir());
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(NimbusError::Config(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Config error");
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");

        assert!(matches!(result, Err(NimbusError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_root = std::env::var("NIMBUS_STORAGE_ROOT").ok();
        let original_scratch = std::env::var("NIMBUS_SCRATCH_DIR").ok();

        std::env::set_var("NIMBUS_STORAGE_ROOT", "/env/root");
        std::env::set_var("NIMBUS_SCRATCH_DIR", "");

        let mut config = Config::default();
        config.archive.scratch_dir = "/configured/scratch".to_string();
        config.apply_env_overrides();

        assert_eq!(config.storage.root, "/env/root");
        // Empty values never override
        assert_eq!(config.archive.scratch_dir, "/configured/scratch");

        match original_root {
            Some(val) => std::env::set_var("NIMBUS_STORAGE_ROOT", val),
            None => std::env::remove_var("NIMBUS_STORAGE_ROOT"),
        }
        match original_scratch {
            Some(val) => std::env::set_var("NIMBUS_SCRATCH_DIR", val),
            None => std::env::remove_var("NIMBUS_SCRATCH_DIR"),
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.archive.max_concurrent_builds = 0;

        let result = config.validate();
        assert!(matches!(result, Err(NimbusError::Config(msg)) if msg.contains("max_concurrent_builds")));
    }

    #[test]
    fn test_validate_empty_root() {
        let mut config = Config::default();
        config.storage.root = "  ".to_string();

        assert!(config.validate().is_err());
    }
}
