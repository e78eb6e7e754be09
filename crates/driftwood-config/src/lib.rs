//! Provider configuration
//!
//! Settings are read from a YAML file found by [`find_config_file`] and
//! may be overridden from the environment. The bearer token is only ever
//! taken from the environment.

pub mod error;

pub use error::*;

use driftwood_core::{PollConfig, ProviderScope, Timeouts};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "DRIFTWOOD_CONFIG";
pub const ENDPOINT_ENV: &str = "DRIFTWOOD_ENDPOINT";
pub const SUBSCRIPTION_ENV: &str = "DRIFTWOOD_SUBSCRIPTION_ID";
pub const TOKEN_ENV: &str = "DRIFTWOOD_TOKEN";

pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

const CANDIDATES: [&str; 2] = ["driftwood.local.yaml", "driftwood.yaml"];

/// Find the provider config file
///
/// Search order:
/// 1. `DRIFTWOOD_CONFIG` (direct path)
/// 2. current directory: `driftwood.local.yaml`, `driftwood.yaml`
/// 3. `./.driftwood/driftwood.yaml`
/// 4. `~/.config/driftwood/driftwood.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{CONFIG_ENV} points at {} which does not exist", path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_config = current_dir.join(".driftwood").join("driftwood.yaml");
    if project_config.exists() {
        return Ok(project_config);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("driftwood").join("driftwood.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Per-operation timeouts in seconds; unset values keep the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutSettings {
    pub create_secs: Option<u64>,
    pub read_secs: Option<u64>,
    pub update_secs: Option<u64>,
    pub delete_secs: Option<u64>,
}

/// Polling cadence for long-running operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PollSettings {
    pub initial_interval_secs: u64,
    pub max_interval_secs: u64,
    pub multiplier: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        let defaults = PollConfig::default();
        Self {
            initial_interval_secs: defaults.initial_interval.as_secs(),
            max_interval_secs: defaults.max_interval.as_secs(),
            multiplier: defaults.multiplier,
        }
    }
}

/// Provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub subscription_id: Option<String>,

    /// Bearer token, environment only
    #[serde(skip)]
    pub token: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutSettings,

    #[serde(default)]
    pub poll: PollSettings,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            subscription_id: None,
            token: None,
            timeouts: TimeoutSettings::default(),
            poll: PollSettings::default(),
        }
    }
}

impl ProviderConfig {
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content, &path.display().to_string())?;
        tracing::debug!("Loaded provider config from {}", path.display());
        Ok(config)
    }

    /// Load the discovered config file, or defaults when none exists, then
    /// apply environment overrides and validate
    pub fn discover() -> Result<Self> {
        let mut config = match find_config_file() {
            Ok(path) => Self::load(&path)?,
            Err(ConfigError::ConfigFileNotFound) => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
            Err(err) => return Err(err),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Override settings from `DRIFTWOOD_*` environment variables
    pub fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            self.endpoint = endpoint;
        }
        if let Ok(subscription_id) = std::env::var(SUBSCRIPTION_ENV) {
            self.subscription_id = Some(subscription_id);
        }
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            self.token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.endpoint.starts_with("https://") && !self.endpoint.starts_with("http://") {
            return Err(ConfigError::Invalid(format!(
                "endpoint must be an http(s) URL: {:?}",
                self.endpoint
            )));
        }
        if let Some(subscription_id) = &self.subscription_id {
            if subscription_id.is_empty() || subscription_id.contains('/') {
                return Err(ConfigError::Invalid(format!(
                    "subscription_id is not valid: {subscription_id:?}"
                )));
            }
        }

        let timeouts = [
            ("timeouts.create_secs", self.timeouts.create_secs),
            ("timeouts.read_secs", self.timeouts.read_secs),
            ("timeouts.update_secs", self.timeouts.update_secs),
            ("timeouts.delete_secs", self.timeouts.delete_secs),
        ];
        for (field, value) in timeouts {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{field} must be positive")));
            }
        }

        let poll = &self.poll;
        if poll.initial_interval_secs == 0 || poll.initial_interval_secs > poll.max_interval_secs {
            return Err(ConfigError::Invalid(
                "poll.initial_interval_secs must be positive and at most poll.max_interval_secs"
                    .to_string(),
            ));
        }
        if poll.multiplier.is_nan() || poll.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "poll.multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> Timeouts {
        let defaults = Timeouts::default();
        let secs = |value: Option<u64>, default: Duration| value.map_or(default, Duration::from_secs);
        Timeouts {
            create: secs(self.timeouts.create_secs, defaults.create),
            read: secs(self.timeouts.read_secs, defaults.read),
            update: secs(self.timeouts.update_secs, defaults.update),
            delete: secs(self.timeouts.delete_secs, defaults.delete),
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            initial_interval: Duration::from_secs(self.poll.initial_interval_secs),
            max_interval: Duration::from_secs(self.poll.max_interval_secs),
            multiplier: self.poll.multiplier,
        }
    }

    pub fn scope(&self) -> Result<ProviderScope> {
        self.subscription_id
            .as_deref()
            .map(ProviderScope::new)
            .ok_or(ConfigError::Missing("subscription_id"))
    }

    pub fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or(ConfigError::Missing(TOKEN_ENV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    const NO_ENV: [(&str, Option<&str>); 4] = [
        (CONFIG_ENV, None),
        (ENDPOINT_ENV, None),
        (SUBSCRIPTION_ENV, None),
        (TOKEN_ENV, None),
    ];

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("driftwood.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("driftwood.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_local_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        fs::write(temp_dir.path().join("driftwood.yaml"), "{}").unwrap();
        fs::write(temp_dir.path().join("driftwood.local.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with("driftwood.local.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        let project_dir = temp_dir.path().join(".driftwood");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("driftwood.yaml"), "{}").unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_var_unset(CONFIG_ENV, find_config_file);
        std::env::set_current_dir(original_dir).unwrap();

        assert!(result.unwrap().ends_with(".driftwood/driftwood.yaml"));
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "{}").unwrap();

        let result = temp_env::with_var(CONFIG_ENV, Some(config_path.as_os_str()), find_config_file);
        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_parse_full_config() {
        let config = ProviderConfig::from_yaml(
            r#"
endpoint: https://management.example.test
subscription_id: 00000000-0000-0000-0000-000000000000
timeouts:
  create_secs: 600
  read_secs: 60
poll:
  initial_interval_secs: 1
  max_interval_secs: 10
  multiplier: 1.5
"#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.endpoint, "https://management.example.test");
        config.validate().unwrap();

        let timeouts = config.timeouts();
        assert_eq!(timeouts.create, Duration::from_secs(600));
        assert_eq!(timeouts.read, Duration::from_secs(60));
        assert_eq!(timeouts.delete, Timeouts::default().delete);

        let poll = config.poll_config();
        assert_eq!(poll.initial_interval, Duration::from_secs(1));
        assert_eq!(poll.multiplier, 1.5);
        assert_eq!(
            config.scope().unwrap().subscription_id,
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ProviderConfig::from_yaml("", "inline").unwrap();
        assert_eq!(config, ProviderConfig::default());
        assert_eq!(config.timeouts(), Timeouts::default());
        assert_eq!(config.poll_config(), PollConfig::default());
        assert!(matches!(config.scope(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = ProviderConfig::from_yaml("endpont: https://typo.test\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_token_is_not_read_from_file() {
        let err = ProviderConfig::from_yaml("token: secret\n", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation() {
        let mut config = ProviderConfig::default();
        config.endpoint = "management.azure.com".to_string();
        assert!(config.validate().is_err());

        let mut config = ProviderConfig::default();
        config.timeouts.read_secs = Some(0);
        assert!(config.validate().is_err());

        let mut config = ProviderConfig::default();
        config.poll.initial_interval_secs = 60;
        assert!(config.validate().is_err());

        let mut config = ProviderConfig::default();
        config.poll.multiplier = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        temp_env::with_vars(
            [
                (ENDPOINT_ENV, Some("http://127.0.0.1:8080")),
                (SUBSCRIPTION_ENV, Some("sub-from-env")),
                (TOKEN_ENV, Some("t0ken")),
            ],
            || {
                let mut config = ProviderConfig::from_yaml("subscription_id: sub-from-file\n", "inline").unwrap();
                config.apply_env();

                assert_eq!(config.endpoint, "http://127.0.0.1:8080");
                assert_eq!(config.subscription_id.as_deref(), Some("sub-from-env"));
                assert_eq!(config.token().unwrap(), "t0ken");
            },
        );
    }

    #[test]
    #[serial]
    fn test_discover_without_file_uses_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        std::env::set_current_dir(&temp_dir).unwrap();
        let result = temp_env::with_vars(NO_ENV, ProviderConfig::discover);
        std::env::set_current_dir(original_dir).unwrap();

        let config = result.unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.token.is_none());
    }
}
