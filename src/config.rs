// src/config.rs

//! Engine configuration, read from TOML.
//!
//! Lookup order: an explicit `--config` path, then `config.toml` in the
//! per-user config directory, then the built-in defaults below.

use crate::core::errors::ScanError;
use crate::logging::{get_data_dir, project_directory};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub scanner: ScannerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL.
    pub url: String,
    pub max_connections: u32,
    /// Total attempts at writing one scan before giving up.
    pub write_attempts: u32,
    /// Backoff before retry `n` is `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = get_data_dir().join("scans.db");
        Self {
            url: format!("sqlite://{}?mode=rwc", path.display()),
            max_connections: 5,
            write_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

/// Independent recursive resolver used to cross-check DoH answers and to
/// locate nameservers for zone-transfer attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrossCheckResolver {
    Google,
    Cloudflare,
    Quad9,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    pub user_agent: String,
    pub probe_timeout_secs: u64,
    pub scan_deadline_secs: u64,
    /// Outbound requests per second allowed against any single host.
    pub requests_per_second: u32,
    pub max_concurrent_analyzers: usize,
    pub max_body_bytes: usize,
    pub doh_endpoint: String,
    pub cross_check_resolver: CrossCheckResolver,
    /// Number of findings returned inline; the full list is only persisted.
    pub preview_limit: usize,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (compatible; EternyxScanner/0.1)".to_string(),
            probe_timeout_secs: 10,
            scan_deadline_secs: 90,
            requests_per_second: 5,
            max_concurrent_analyzers: 4,
            max_body_bytes: 2 * 1024 * 1024,
            doh_endpoint: "https://cloudflare-dns.com/dns-query".to_string(),
            cross_check_resolver: CrossCheckResolver::Google,
            preview_limit: 10,
        }
    }
}

impl ScannerSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    project_directory().map(|dirs| dirs.config_dir().join("config.toml"))
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ScanError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No config file found, using defaults.");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ScanError> {
        info!(path = %path.display(), "Loading configuration.");
        let text = std::fs::read_to_string(path)
            .map_err(|e| ScanError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ScanError> {
        let config: Config = toml::from_str(text).map_err(|e| ScanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ScanError> {
        let scanner = &self.scanner;
        let checks = [
            (scanner.probe_timeout_secs == 0, "scanner.probe_timeout_secs must be positive"),
            (scanner.scan_deadline_secs == 0, "scanner.scan_deadline_secs must be positive"),
            (scanner.requests_per_second == 0, "scanner.requests_per_second must be positive"),
            (scanner.max_concurrent_analyzers == 0, "scanner.max_concurrent_analyzers must be positive"),
            (scanner.max_body_bytes == 0, "scanner.max_body_bytes must be positive"),
            (self.database.write_attempts == 0, "database.write_attempts must be positive"),
            (self.database.max_connections == 0, "database.max_connections must be positive"),
        ];
        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ScanError::Config(message.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.scanner.preview_limit, 10);
        assert_eq!(config.scanner.cross_check_resolver, CrossCheckResolver::Google);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [scanner]
            requests_per_second = 2
            cross_check_resolver = "quad9"

            [database]
            url = "sqlite::memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.scanner.requests_per_second, 2);
        assert_eq!(config.scanner.cross_check_resolver, CrossCheckResolver::Quad9);
        assert_eq!(config.scanner.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.write_attempts, 3);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let err = Config::from_toml("[scanner]\nrequests_per_second = 0\n").unwrap_err();
        assert!(matches!(err, ScanError::Config(msg) if msg.contains("requests_per_second")));
    }

    #[test]
    fn loads_from_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"127.0.0.1:8080\"").unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }
}
