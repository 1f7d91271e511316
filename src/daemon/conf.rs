use crate::config::SpotifyCredentials;
use crate::error::{AppError, AppResult};
use crate::platform::PlatformRecommendations;
use serde::Serialize;
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "spotifyd.conf";

const PI_INITIAL_VOLUME: &str = "50";
const PI_MAX_CACHE_SIZE: u64 = 1_000_000_000;

/// On-disk layout of `spotifyd.conf`.
#[derive(Debug, Serialize)]
pub struct SpotifydConfig {
    pub global: GlobalSection,
}

#[derive(Debug, Serialize)]
pub struct GlobalSection {
    pub username: String,
    pub password: String,
    pub client_id: String,
    pub client_secret: String,
    pub device_name: String,
    pub device_type: String,
    pub mixer: String,
    pub volume_controller: String,
    pub backend: String,
    pub bitrate: u32,
    pub cache_path: String,
    pub volume_normalisation: bool,
    pub normalisation_pregain: i32,
    pub no_audio_cache: bool,
    pub use_mpris: bool,
    // Raspberry Pi only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cache_size: Option<u64>,
}

impl SpotifydConfig {
    pub fn new(
        device_name: &str,
        credentials: &SpotifyCredentials,
        recommendations: &PlatformRecommendations,
        cache_dir: &Path,
        is_raspberry_pi: bool,
    ) -> Self {
        Self {
            global: GlobalSection {
                username: credentials.username.clone().unwrap_or_default(),
                password: credentials.password.clone().unwrap_or_default(),
                client_id: credentials.client_id.clone(),
                client_secret: credentials.client_secret.clone(),
                device_name: device_name.to_string(),
                device_type: "computer".into(),
                mixer: "softvol".into(),
                volume_controller: "softvol".into(),
                backend: recommendations.audio_backend.as_str().to_string(),
                bitrate: recommendations.bitrate,
                cache_path: cache_dir.to_string_lossy().into_owned(),
                volume_normalisation: recommendations.volume_normalisation,
                normalisation_pregain: recommendations.normalisation_pregain,
                no_audio_cache: false,
                use_mpris: false,
                initial_volume: is_raspberry_pi.then(|| PI_INITIAL_VOLUME.to_string()),
                max_cache_size: is_raspberry_pi.then_some(PI_MAX_CACHE_SIZE),
            },
        }
    }
}

/// Renders `spotifyd.conf`. The result holds secrets in plain text.
pub fn render(
    device_name: &str,
    credentials: &SpotifyCredentials,
    recommendations: &PlatformRecommendations,
    cache_dir: &Path,
    is_raspberry_pi: bool,
) -> AppResult<String> {
    let config = SpotifydConfig::new(
        device_name,
        credentials,
        recommendations,
        cache_dir,
        is_raspberry_pi,
    );
    toml::to_string_pretty(&config).map_err(|e| AppError::ConfigWriteFailed(e.to_string()))
}
