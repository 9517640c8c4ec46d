//! Configuration Management
//!
//! Provides functionality for:
//! - Loading/saving configuration
//! - Overlaying partial configuration onto the current settings
//! - Deriving the settings each component consumes

use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}, time::Duration};
use tracing::debug;
use crate::error::PeerError;
use crate::fleet::resolver::GroupStrategy;
use crate::peer::executor::RequestSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Maximum age of the cached peer list in milliseconds
    #[serde(default = "default_max_cache_age_ms")]
    pub max_cache_age_ms: u64,
    /// Call peers over https instead of http
    #[serde(default)]
    pub use_ssl: bool,
    /// Explicit port appended to each peer address
    #[serde(default)]
    pub port: Option<u16>,
    /// Address peers by their public ip instead of the private one
    #[serde(default)]
    pub use_public_ip: bool,
    /// Shared secret carried in the X-NODE-ASG-AUTH header
    #[serde(default)]
    pub secret: Option<String>,
    /// Pin discovery to a named auto scaling group
    #[serde(default)]
    pub group_name: Option<String>,
    /// Id of the local instance, skipping the metadata lookup
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Provider region override
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for rotated JSON log files
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Partial configuration; every set field replaces the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetConfigPatch {
    pub max_cache_age_ms: Option<u64>,
    pub use_ssl: Option<bool>,
    pub port: Option<u16>,
    pub use_public_ip: Option<bool>,
    pub secret: Option<String>,
    pub group_name: Option<String>,
    pub instance_id: Option<String>,
    pub region: Option<String>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            max_cache_age_ms: default_max_cache_age_ms(),
            use_ssl: false,
            port: None,
            use_public_ip: false,
            secret: None,
            group_name: None,
            instance_id: None,
            region: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_max_cache_age_ms() -> u64 { 2 * 60 * 1000 }
fn default_log_level() -> String { "info".to_string() }

impl FleetConfig {
    /// Load configuration from the first file found in the usual locations,
    /// falling back to defaults
    pub fn load() -> Result<Self, PeerError> {
        let config_paths = [
            PathBuf::from("asg-peers.yml"),
            dirs::config_dir()
                .map(|p| p.join("asg-peers/config.yml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/asg-peers/config.yml"),
        ];

        for path in &config_paths {
            if path.is_file() {
                return Self::load_from_file(path);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, PeerError> {
        let content = fs::read_to_string(path)
            .map_err(|e| PeerError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| PeerError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), PeerError> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| PeerError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| PeerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        // Write atomically using a temporary file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, yaml)
            .map_err(|e| PeerError::Config(format!("Failed to write config: {}", e)))?;
        fs::rename(&temp_path, path)
            .map_err(|e| PeerError::Config(format!("Failed to save config: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), PeerError> {
        if self.port == Some(0) {
            return Err(PeerError::Config("port must be between 1 and 65535".to_string()));
        }
        if matches!(self.group_name.as_deref(), Some("")) {
            return Err(PeerError::Config("group_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Overlay the set fields of `patch` onto this configuration.
    pub fn merge(mut self, patch: FleetConfigPatch) -> Result<Self, PeerError> {
        if let Some(age) = patch.max_cache_age_ms {
            self.max_cache_age_ms = age;
        }
        if let Some(use_ssl) = patch.use_ssl {
            self.use_ssl = use_ssl;
        }
        if patch.port.is_some() {
            self.port = patch.port;
        }
        if let Some(use_public_ip) = patch.use_public_ip {
            self.use_public_ip = use_public_ip;
        }
        if patch.secret.is_some() {
            self.secret = patch.secret;
        }
        if patch.group_name.is_some() {
            self.group_name = patch.group_name;
        }
        if patch.instance_id.is_some() {
            self.instance_id = patch.instance_id;
        }
        if patch.region.is_some() {
            self.region = patch.region;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn max_cache_age(&self) -> Duration {
        Duration::from_millis(self.max_cache_age_ms)
    }

    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            use_ssl: self.use_ssl,
            port: self.port,
            use_public_ip: self.use_public_ip,
            secret: self.secret.clone().filter(|s| !s.is_empty()),
        }
    }

    pub fn group_strategy(&self) -> GroupStrategy {
        match &self.group_name {
            Some(name) => GroupStrategy::ByName(name.clone()),
            None => GroupStrategy::BySelfId,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.max_cache_age(), Duration::from_secs(120));
        assert!(!config.use_ssl);
        assert!(!config.use_public_ip);
        assert_eq!(config.port, None);
        assert_eq!(config.group_strategy(), GroupStrategy::BySelfId);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: FleetConfig = serde_yaml::from_str("use_ssl: true\nport: 8443\n").unwrap();
        assert!(config.use_ssl);
        assert_eq!(config.port, Some(8443));
        assert_eq!(config.max_cache_age_ms, 120_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_merge_only_overrides_set_fields() {
        let base = FleetConfig {
            secret: Some("s3cr3t".to_string()),
            port: Some(8080),
            ..FleetConfig::default()
        };
        let merged = base
            .merge(FleetConfigPatch {
                group_name: Some("web-asg".to_string()),
                use_public_ip: Some(true),
                ..FleetConfigPatch::default()
            })
            .unwrap();

        assert_eq!(merged.secret.as_deref(), Some("s3cr3t"));
        assert_eq!(merged.port, Some(8080));
        assert!(merged.use_public_ip);
        assert_eq!(merged.group_strategy(), GroupStrategy::ByName("web-asg".to_string()));
    }

    #[test]
    fn test_empty_secret_is_no_secret() {
        let config: FleetConfig = serde_yaml::from_str("secret: \"\"\n").unwrap();
        assert!(config.request_settings().secret.is_none());
    }

    #[test]
    fn test_merge_rejects_zero_port() {
        let result = FleetConfig::default().merge(FleetConfigPatch {
            port: Some(0),
            ..FleetConfigPatch::default()
        });
        assert!(matches!(result, Err(PeerError::Config(_))));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.yml");
        let config = FleetConfig {
            group_name: Some("api".to_string()),
            max_cache_age_ms: 5_000,
            ..FleetConfig::default()
        };

        config.save(&path).unwrap();
        let loaded = FleetConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_from_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(&path, "port: [not, a, number]").unwrap();
        assert!(matches!(FleetConfig::load_from_file(&path), Err(PeerError::Config(_))));
    }
}
