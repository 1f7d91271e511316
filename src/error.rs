#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authentication required")]
    AuthRequired,

    #[error("Unsupported platform: {0}")]
    PlatformUnsupported(String),

    #[error("No release asset matching '{wanted}' (available: {available})")]
    AssetNotFound { wanted: String, available: String },

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Install failed: {0}")]
    InstallFailed(String),

    #[error("Could not write daemon config: {0}")]
    ConfigWriteFailed(String),

    #[error("Daemon failed to start: {0}")]
    StartFailed(String),

    #[error("Spotify API error: {status} - {message}")]
    SpotifyApi { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Volume ramp already active")]
    RampAlreadyActive,

    #[error("No playback device: {0}")]
    NoDevice(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn kind(&self) -> &str {
        match self {
            AppError::Http(_) => "http",
            AppError::Json(_) => "json",
            AppError::Yaml(_) => "yaml",
            AppError::Config(_) => "config",
            AppError::Authentication(_) => "authentication",
            AppError::AuthRequired => "auth_required",
            AppError::PlatformUnsupported(_) => "platform_unsupported",
            AppError::AssetNotFound { .. } => "asset_not_found",
            AppError::DownloadFailed(_) => "download_failed",
            AppError::ExtractionFailed(_) => "extraction_failed",
            AppError::InstallFailed(_) => "install_failed",
            AppError::ConfigWriteFailed(_) => "config_write_failed",
            AppError::StartFailed(_) => "start_failed",
            AppError::SpotifyApi { .. } => "spotify_api",
            AppError::MalformedResponse(_) => "malformed_response",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::RampAlreadyActive => "ramp_already_active",
            AppError::NoDevice(_) => "no_device",
            AppError::NotFound(_) => "not_found",
            AppError::Io(_) => "io",
        }
    }

    /// Errors that abort startup instead of being reported per command.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Authentication(_) | AppError::PlatformUnsupported(_)
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
