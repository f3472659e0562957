// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Panoscope

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable consulted when `api.key` is empty
pub const API_KEY_ENV: &str = "PANOSCOPE_API_KEY";

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Street-level imagery API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Grid scan settings
    #[serde(default)]
    pub scan: ScanConfig,

    /// Panorama download settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Database settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Named region index
    #[serde(default)]
    pub regions: RegionsConfig,

    /// Query server settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default)]
    pub key: String,
    #[serde(default = "default_metadata_url")]
    pub metadata_url: String,
    #[serde(default = "default_static_url")]
    pub static_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScanConfig {
    #[serde(default = "default_coarse_spacing")]
    pub coarse_spacing: f64,
    #[serde(default = "default_fine_spacing")]
    pub fine_spacing: f64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_min: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DownloadConfig {
    #[serde(default = "default_face_size")]
    pub face_size: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_region_label")]
    pub region: String,
    #[serde(default)]
    pub max_images: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RegionsConfig {
    #[serde(default = "default_regions_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

// Default value functions
fn default_metadata_url() -> String { "https://maps.googleapis.com/maps/api/streetview/metadata".to_string() }
fn default_static_url() -> String { "https://maps.googleapis.com/maps/api/streetview".to_string() }
fn default_timeout() -> u64 { 10 }
fn default_max_attempts() -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 2_000 }
fn default_backoff_max_ms() -> u64 { 10_000 }
fn default_coarse_spacing() -> f64 { 0.003 }
fn default_fine_spacing() -> f64 { 0.001 }
fn default_max_workers() -> usize { 5 }
fn default_rate_limit() -> u32 { 30_000 }
fn default_face_size() -> u32 { 1024 }
fn default_output_dir() -> String { "data/raw".to_string() }
fn default_region_label() -> String { "aizawl".to_string() }
fn default_db_path() -> String { "scan_data.db".to_string() }
fn default_regions_path() -> String { "index_map.json".to_string() }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: String::new(),
            metadata_url: default_metadata_url(),
            static_url: default_static_url(),
            timeout_secs: default_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            coarse_spacing: default_coarse_spacing(),
            fine_spacing: default_fine_spacing(),
            max_workers: default_max_workers(),
            rate_limit_per_min: default_rate_limit(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            face_size: default_face_size(),
            output_dir: default_output_dir(),
            region: default_region_label(),
            max_images: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            path: default_regions_path(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The configured key, or the environment fallback
    pub fn resolved_key(&self) -> Option<String> {
        if !self.key.trim().is_empty() {
            return Some(self.key.trim().to_string());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::PanoscopeError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings no component can run with
    pub fn validate(&self) -> crate::Result<()> {
        let err = |msg: &str| Err(crate::PanoscopeError::Config(msg.to_string()));

        if !(self.scan.coarse_spacing.is_finite() && self.scan.coarse_spacing > 0.0) {
            return err("scan.coarse_spacing must be positive");
        }
        if !(self.scan.fine_spacing.is_finite() && self.scan.fine_spacing > 0.0) {
            return err("scan.fine_spacing must be positive");
        }
        if self.scan.max_workers == 0 {
            return err("scan.max_workers must be at least 1");
        }
        if self.scan.rate_limit_per_min == 0 {
            return err("scan.rate_limit_per_min must be at least 1");
        }
        if self.download.face_size == 0 {
            return err("download.face_size must be at least 1");
        }
        if self.api.max_attempts == 0 {
            return err("api.max_attempts must be at least 1");
        }
        if self.api.timeout_secs == 0 {
            return err("api.timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// API key or a configuration error naming both sources
    pub fn require_api_key(&self) -> crate::Result<String> {
        self.api.resolved_key().ok_or_else(|| {
            crate::PanoscopeError::Config(format!(
                "No API key: set api.key in the config file or {}",
                API_KEY_ENV
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"scan": {"max_workers": 12}, "api": {"key": "k"}}"#).unwrap();
        assert_eq!(config.scan.max_workers, 12);
        assert_eq!(config.scan.coarse_spacing, 0.003);
        assert_eq!(config.scan.fine_spacing, 0.001);
        assert_eq!(config.download.face_size, 1024);
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.require_api_key().unwrap(), "k");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.scan.max_workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scan.fine_spacing = -0.001;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.download.face_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.download.region = "shillong".to_string();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.download.region, "shillong");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.database.path, "scan_data.db");
    }
}
