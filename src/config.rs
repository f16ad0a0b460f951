//! Credential and configuration persistence
//!
//! Configuration is stored as TOML in the platform-specific config directory:
//! - Linux: ~/.config/voice-input/config.toml
//! - Windows: %APPDATA%\voice-input\config.toml
//! - macOS: ~/Library/Application Support/voice-input/config.toml

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::protocol::DEFAULT_LANGUAGE;

/// Application name used for the configuration directory
const APP_NAME: &str = "voice-input";

/// Minimum length accepted for a configured key-pair field
const MIN_KEY_LENGTH: usize = 10;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to access {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Which recognition model the credentials target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Built-in service endpoints
    #[default]
    Standard,
    /// A single user-supplied endpoint
    Custom,
}

/// Credentials used to authenticate a session.
///
/// The key pair takes precedence over the token pair when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default)]
    pub model_type: ModelType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_endpoint_url: Option<String>,
}

impl CredentialSet {
    /// Key-pair credentials
    pub fn key_pair(id: &str, secret: &str) -> Self {
        Self {
            access_key_id: Some(id.to_string()),
            access_key_secret: Some(secret.to_string()),
            ..Default::default()
        }
    }

    /// Token credentials
    pub fn token(app_id: &str, access_token: &str) -> Self {
        Self {
            app_id: Some(app_id.to_string()),
            access_token: Some(access_token.to_string()),
            ..Default::default()
        }
    }

    pub fn access_key_id(&self) -> Option<&str> {
        non_empty(&self.access_key_id)
    }

    pub fn access_key_secret(&self) -> Option<&str> {
        non_empty(&self.access_key_secret)
    }

    pub fn app_id(&self) -> Option<&str> {
        non_empty(&self.app_id)
    }

    pub fn access_token(&self) -> Option<&str> {
        non_empty(&self.access_token)
    }

    pub fn custom_endpoint_url(&self) -> Option<&str> {
        non_empty(&self.custom_endpoint_url)
    }

    pub fn has_key_pair(&self) -> bool {
        self.access_key_id().is_some() || self.access_key_secret().is_some()
    }

    pub fn has_token(&self) -> bool {
        self.app_id().is_some() || self.access_token().is_some()
    }

    /// At least one secret field is set
    pub fn has_secret(&self) -> bool {
        self.has_key_pair() || self.has_token()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Recognition language sent in the handshake
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default)]
    pub credentials: CredentialSet,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            credentials: CredentialSet::default(),
        }
    }
}

impl AppConfig {
    /// Validate the configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let credentials = &self.credentials;

        if credentials.model_type == ModelType::Custom && credentials.custom_endpoint_url().is_none()
        {
            return Err(ConfigError::Invalid(
                "Custom model requires an endpoint URL".to_string(),
            ));
        }

        if let Some(url) = credentials.custom_endpoint_url() {
            let lower = url.trim().to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "Invalid endpoint URL: {}. Must use ws:// or wss://",
                    url
                )));
            }
        }

        for (name, value) in [
            ("access_key_id", credentials.access_key_id()),
            ("access_key_secret", credentials.access_key_secret()),
        ] {
            if let Some(value) = value {
                if value.trim().len() < MIN_KEY_LENGTH {
                    return Err(ConfigError::Invalid(format!(
                        "{} must be at least {} characters",
                        name, MIN_KEY_LENGTH
                    )));
                }
            }
        }

        if self.language.trim().is_empty() {
            return Err(ConfigError::Invalid("Language must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Get the configuration file path
pub fn config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from a file.
///
/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        debug!("No config file at {:?}, using defaults", path);
        return Ok(AppConfig::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: AppConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Save configuration to a specific file, creating its directory if needed
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    config.validate()?;

    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Saved config to {:?}", path);
    Ok(())
}

/// Source of credentials, consulted on every session start
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn get_credentials(&self) -> Result<CredentialSet, ConfigError>;
}

/// Reads credentials from a TOML config file on each call
pub struct FileCredentialProvider {
    path: PathBuf,
}

impl FileCredentialProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialProvider for FileCredentialProvider {
    async fn get_credentials(&self) -> Result<CredentialSet, ConfigError> {
        let path = self.path.clone();
        let config = tokio::task::spawn_blocking(move || load_config_from(&path))
            .await
            .map_err(|e| ConfigError::Invalid(format!("Config loader panicked: {}", e)))??;
        Ok(config.credentials)
    }
}

/// Fixed credentials
pub struct StaticCredentialProvider(pub CredentialSet);

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_credentials(&self) -> Result<CredentialSet, ConfigError> {
        Ok(self.0.clone())
    }
}

/// Mask a secret for display, keeping a short prefix
pub fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
