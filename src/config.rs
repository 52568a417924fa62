//! Configuration management for Reformat Server

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::codecs::document::DEFAULT_MAX_INFLATED_BYTES;
use crate::codecs::AlphaPolicy;

/// Default upload ceiling per domain (10 MiB)
const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub image: DomainConfig,
    pub document: DomainConfig,
    pub probe_rate_limit: u32,
    pub rate_limit_window_secs: u64,
    pub alpha_policy: AlphaPolicy,
    /// Ceiling on bytes a document may inflate to while being read
    pub max_inflated_bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub image_dir: PathBuf,
    pub document_dir: PathBuf,
    pub retention_secs: u64,
    pub cleanup_interval_secs: u64,
}

/// Limits for one conversion domain
#[derive(Debug, Clone, Deserialize)]
pub struct DomainConfig {
    pub max_bytes: u64,
    pub rate_limit: u32,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                image_dir: PathBuf::from("temp_images"),
                document_dir: PathBuf::from("temp_documents"),
                retention_secs: 3600,
                cleanup_interval_secs: 3600,
            },
            image: DomainConfig {
                max_bytes: DEFAULT_MAX_BYTES,
                rate_limit: 10,
                timeout_secs: 10,
            },
            document: DomainConfig {
                max_bytes: DEFAULT_MAX_BYTES,
                rate_limit: 5,
                timeout_secs: 10,
            },
            probe_rate_limit: 10,
            rate_limit_window_secs: 60,
            alpha_policy: AlphaPolicy::Flatten,
            max_inflated_bytes: DEFAULT_MAX_INFLATED_BYTES,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables take defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let retention_secs = parse(&lookup, "RETENTION_SECS", defaults.storage.retention_secs)?;

        let config = Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            storage: StorageConfig {
                image_dir: lookup("IMAGE_ARTIFACT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.image_dir),
                document_dir: lookup("DOCUMENT_ARTIFACT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.document_dir),
                retention_secs,
                cleanup_interval_secs: parse(&lookup, "CLEANUP_INTERVAL_SECS", retention_secs)?,
            },
            image: DomainConfig {
                max_bytes: parse(&lookup, "IMAGE_MAX_BYTES", defaults.image.max_bytes)?,
                rate_limit: parse(&lookup, "IMAGE_RATE_LIMIT", defaults.image.rate_limit)?,
                timeout_secs: parse(&lookup, "IMAGE_TIMEOUT_SECS", defaults.image.timeout_secs)?,
            },
            document: DomainConfig {
                max_bytes: parse(&lookup, "DOCUMENT_MAX_BYTES", defaults.document.max_bytes)?,
                rate_limit: parse(&lookup, "DOCUMENT_RATE_LIMIT", defaults.document.rate_limit)?,
                timeout_secs: parse(
                    &lookup,
                    "DOCUMENT_TIMEOUT_SECS",
                    defaults.document.timeout_secs,
                )?,
            },
            probe_rate_limit: parse(&lookup, "PROBE_RATE_LIMIT", defaults.probe_rate_limit)?,
            rate_limit_window_secs: parse(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                defaults.rate_limit_window_secs,
            )?,
            alpha_policy: if parse(&lookup, "PRESERVE_ALPHA", false)? {
                AlphaPolicy::PreserveWhereSupported
            } else {
                AlphaPolicy::Flatten
            },
            max_inflated_bytes: parse(
                &lookup,
                "DOCUMENT_MAX_INFLATED_BYTES",
                defaults.max_inflated_bytes,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("RETENTION_SECS", self.storage.retention_secs),
            ("CLEANUP_INTERVAL_SECS", self.storage.cleanup_interval_secs),
            ("IMAGE_TIMEOUT_SECS", self.image.timeout_secs),
            ("DOCUMENT_TIMEOUT_SECS", self.document.timeout_secs),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs),
            ("IMAGE_RATE_LIMIT", u64::from(self.image.rate_limit)),
            ("DOCUMENT_RATE_LIMIT", u64::from(self.document.rate_limit)),
            ("PROBE_RATE_LIMIT", u64::from(self.probe_rate_limit)),
            ("DOCUMENT_MAX_INFLATED_BYTES", self.max_inflated_bytes),
        ];

        for (var, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    var,
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.storage.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.storage.cleanup_interval_secs)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl DomainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse<T, F>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
