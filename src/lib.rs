pub mod api;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod logging;
pub mod platform;
pub mod playback;

use api::client::SpotifyClient;
use catalog::CatalogClient;
use clap::Parser;
use config::{AppConfig, TokenCache};
use daemon::DaemonManager;
use error::{AppError, AppResult};
use platform::PlatformProfile;
use playback::{DeviceSelector, PlaybackSession};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const DEVICE_REGISTRATION_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Parser, Clone)]
#[command(name = "spotify-controller")]
#[command(about = "Search and play Spotify playlists on a local spotifyd device", long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(default_value = config::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the configured log level.
    #[arg(long, env = "SPOTIFY_CONTROLLER_LOG")]
    pub log_level: Option<String>,

    /// Download spotifyd again even if it is already installed.
    #[arg(long)]
    pub reinstall: bool,

    /// Keep spotifyd attached to this process instead of letting it detach.
    #[arg(long)]
    pub foreground_daemon: bool,
}

pub async fn run(cli: Cli) -> AppResult<()> {
    println!("🎵 Spotify Controller Starting...");

    let config = AppConfig::load(&cli.config)?;

    let mut logging = config.logging.clone();
    if let Some(level) = &cli.log_level {
        logging.level = level.clone();
    }
    logging::init(&logging)?;
    log::info!(target: "cli", "Configuration loaded from {}", cli.config.display());

    let platform = PlatformProfile::detect();
    log::info!(target: "cli", "Platform detected: {}", platform.summary());
    platform.daemon_asset_name()?;

    let tokens = Arc::new(RwLock::new(TokenCache::load(&config.token_cache)?));
    let client = Arc::new(SpotifyClient::new(config.spotify.clone(), tokens)?);

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    api::auth::ensure_token(&client, &mut stdin)
        .await
        .map_err(|e| AppError::Authentication(e.to_string()))?;
    let user = client
        .current_user()
        .await
        .map_err(|e| AppError::Authentication(e.to_string()))?;
    log::info!(target: "cli", "Authenticated as: {}", user.id);

    let mut daemon = DaemonManager::new(platform)?;
    let session = Arc::new(PlaybackSession::new(client.clone()));

    if let Err(e) = setup_device(&mut daemon, &session, &config, &cli).await {
        log::error!(target: "cli", "Failed to set up playback device: {}", e);
        daemon.shutdown().await;
        return Err(e);
    }

    let catalog = CatalogClient::new(client);
    let mut shell = crate::cli::Shell::new(catalog, session.clone(), &config, stdin, std::io::stdout());

    tokio::select! {
        result = shell.run() => {
            if let Err(e) = result {
                log::error!(target: "cli", "Interactive loop ended with error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            println!("\n\nShutting down...");
        }
    }

    session.shutdown().await;
    daemon.shutdown().await;
    println!("Goodbye!");
    Ok(())
}

async fn setup_device(
    daemon: &mut DaemonManager,
    session: &PlaybackSession,
    config: &AppConfig,
    cli: &Cli,
) -> AppResult<()> {
    if cli.reinstall {
        daemon.install(true).await?;
    }

    if cli.foreground_daemon {
        if let Err(e) = daemon.write_config(&config.device_name, &config.spotify) {
            log::warn!(target: "device_manager", "Could not create spotifyd config: {}", e);
        }
        daemon.start(&config.device_name, false).await?;
    } else {
        daemon
            .ensure_ready(&config.device_name, Some(&config.spotify))
            .await?;
    }

    // The device needs a moment to register with Spotify Connect.
    tokio::time::sleep(DEVICE_REGISTRATION_DELAY).await;

    session
        .select_device(DeviceSelector::Name(config.device_name.clone()))
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let term = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!(target: "cli", "Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let term = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = term => {},
    }

    log::warn!(target: "cli", "Shutdown signal received");
}
