use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub spotify: SpotifyCredentials,
    #[serde(default = "default_device_name")]
    pub device_name: String,
    #[serde(default = "default_volume")]
    pub default_volume: u8,
    #[serde(default)]
    pub volume_ramp: VolumeRampConfig,
    #[serde(default = "default_token_cache")]
    pub token_cache: PathBuf,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Application credentials plus the optional account login forwarded to spotifyd.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotifyCredentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRampConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ramp_start")]
    pub start_volume: u8,
    #[serde(default = "default_ramp_duration")]
    pub duration_seconds: u64,
    #[serde(default = "default_ramp_increment")]
    pub increment: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_device_name() -> String {
    "SpotifyBot".to_string()
}

fn default_volume() -> u8 {
    50
}

fn default_token_cache() -> PathBuf {
    PathBuf::from(".spotify_cache")
}

fn default_redirect_uri() -> String {
    "http://localhost:8888/callback".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ramp_start() -> u8 {
    10
}

fn default_ramp_duration() -> u64 {
    300
}

fn default_ramp_increment() -> u8 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for VolumeRampConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            start_volume: default_ramp_start(),
            duration_seconds: default_ramp_duration(),
            increment: default_ramp_increment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            return Err(AppError::Config(format!(
                "Configuration file not found: {}. Please create it with your Spotify credentials",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| AppError::Config(format!("Malformed configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.spotify.client_id.trim().is_empty() {
            return Err(AppError::Config("spotify.client_id is required".into()));
        }
        if self.spotify.client_secret.trim().is_empty() {
            return Err(AppError::Config("spotify.client_secret is required".into()));
        }
        if self.default_volume > 100 {
            return Err(AppError::Config(format!(
                "default_volume must be 0-100, got {}",
                self.default_volume
            )));
        }
        if self.volume_ramp.start_volume > 100 {
            return Err(AppError::Config(format!(
                "volume_ramp.start_volume must be 0-100, got {}",
                self.volume_ramp.start_volume
            )));
        }
        if self.volume_ramp.increment == 0 {
            return Err(AppError::Config(
                "volume_ramp.increment must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// OAuth tokens persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenCache {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl TokenCache {
    /// An unsaved cache holding a ready access token.
    pub fn with_access_token(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            refresh_token: None,
            expires_at: None,
            path: None,
        }
    }

    /// Reads the cache at `path`, or starts an empty one bound to it.
    pub fn load(path: &Path) -> AppResult<Self> {
        let mut cache = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match serde_json::from_str::<TokenCache>(&content) {
                Ok(cache) => cache,
                Err(e) => {
                    log::warn!(target: "auth", "Ignoring unreadable token cache {}: {}", path.display(), e);
                    TokenCache::default()
                }
            }
        } else {
            TokenCache::default()
        };
        cache.path = Some(path.to_path_buf());
        Ok(cache)
    }

    pub fn save(&self) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        restrict_permissions(path)?;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_token_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => Utc::now() >= expires,
            None => self.access_token.is_none(),
        }
    }

    pub fn store(&mut self, token: crate::api::models::TokenResponse) {
        self.access_token = Some(token.access_token);
        if let Some(rt) = token.refresh_token {
            self.refresh_token = Some(rt);
        }
        self.expires_at = Some(Utc::now() + chrono::Duration::seconds(token.expires_in as i64));
    }
}

/// Owner-only permissions for files that hold secrets.
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
