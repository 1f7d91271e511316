//! Playback control against one Spotify Connect device, plus the background
//! volume ramp.

use crate::api::client::SpotifyClient;
use crate::api::models::{CurrentlyPlaying, Device};
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

const MIN_RAMP_DELAY: Duration = Duration::from_secs(1);
const RAMP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// The remote playback endpoints the session drives.
#[async_trait]
pub trait PlayerControl: Send + Sync {
    async fn devices(&self) -> AppResult<Vec<Device>>;
    async fn start_playback(&self, device_id: &str, uris: &[String]) -> AppResult<()>;
    async fn resume(&self, device_id: &str) -> AppResult<()>;
    async fn pause(&self, device_id: &str) -> AppResult<()>;
    async fn next(&self, device_id: &str) -> AppResult<()>;
    async fn previous(&self, device_id: &str) -> AppResult<()>;
    async fn set_volume(&self, device_id: &str, volume_percent: u8) -> AppResult<()>;
    async fn current_playback(&self) -> AppResult<Option<CurrentlyPlaying>>;
}

#[async_trait]
impl PlayerControl for SpotifyClient {
    async fn devices(&self) -> AppResult<Vec<Device>> {
        SpotifyClient::devices(self).await
    }

    async fn start_playback(&self, device_id: &str, uris: &[String]) -> AppResult<()> {
        SpotifyClient::start_playback(self, device_id, uris).await
    }

    async fn resume(&self, device_id: &str) -> AppResult<()> {
        self.resume_playback(device_id).await
    }

    async fn pause(&self, device_id: &str) -> AppResult<()> {
        self.pause_playback(device_id).await
    }

    async fn next(&self, device_id: &str) -> AppResult<()> {
        self.next_track(device_id).await
    }

    async fn previous(&self, device_id: &str) -> AppResult<()> {
        self.previous_track(device_id).await
    }

    async fn set_volume(&self, device_id: &str, volume_percent: u8) -> AppResult<()> {
        SpotifyClient::set_volume(self, device_id, volume_percent).await
    }

    async fn current_playback(&self) -> AppResult<Option<CurrentlyPlaying>> {
        SpotifyClient::current_playback(self).await
    }
}

#[derive(Debug, Clone)]
struct SessionState {
    device_id: Option<String>,
    is_playing: bool,
    current_volume: u8,
    ramp_active: bool,
    current_playlist: Option<String>,
    track_count: usize,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            device_id: None,
            is_playing: false,
            current_volume: 50,
            ramp_active: false,
            current_playlist: None,
            track_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub device_id: Option<String>,
    pub is_playing: bool,
    pub current_volume: u8,
    pub volume_ramp_active: bool,
    pub current_playlist: Option<String>,
    pub track_count: usize,
}

#[derive(Debug, Clone)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub progress_ms: u64,
    pub track_name: String,
    pub artists: String,
    pub duration_ms: u64,
    pub device_name: String,
    pub volume_percent: Option<u8>,
}

#[derive(Debug, Clone)]
pub enum DeviceSelector {
    Id(String),
    /// Case-insensitive substring of the device name.
    Name(String),
    First,
}

/// A linear volume increase: `start` to `end` in steps of `increment`,
/// spread over `duration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampPlan {
    pub start: u8,
    pub end: u8,
    pub duration: Duration,
    pub increment: u8,
}

impl RampPlan {
    pub fn new(start: u8, end: u8, duration: Duration, increment: u8) -> Self {
        Self {
            start,
            end,
            duration,
            increment,
        }
    }

    fn validate(&self) -> AppResult<()> {
        if self.start > 100 || self.end > 100 {
            return Err(AppError::InvalidInput(format!(
                "Ramp volumes must be 0-100, got {} -> {}",
                self.start, self.end
            )));
        }
        if self.increment == 0 {
            return Err(AppError::InvalidInput(
                "Ramp increment must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn steps(&self) -> i32 {
        (self.end as i32 - self.start as i32).div_euclid(self.increment.max(1) as i32)
    }

    pub fn delay_per_step(&self) -> Duration {
        match self.steps() {
            steps if steps > 0 => self.duration / steps as u32,
            _ => MIN_RAMP_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampOutcome {
    Completed,
    Cancelled,
}

struct RampHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<RampOutcome>,
}

pub struct PlaybackSession {
    player: Arc<dyn PlayerControl>,
    state: Arc<Mutex<SessionState>>,
    ramp: Mutex<Option<RampHandle>>,
}

impl PlaybackSession {
    pub fn new(player: Arc<dyn PlayerControl>) -> Self {
        log::info!(target: "playback_controller", "PlaybackController initialized");
        Self {
            player,
            state: Arc::new(Mutex::new(SessionState::default())),
            ramp: Mutex::new(None),
        }
    }

    pub async fn device_id(&self) -> Option<String> {
        self.state.lock().await.device_id.clone()
    }

    async fn require_device(&self) -> AppResult<String> {
        self.device_id().await.ok_or_else(|| {
            log::error!(target: "playback_controller", "No device specified for playback");
            AppError::NoDevice("no device selected".into())
        })
    }

    pub async fn available_devices(&self) -> AppResult<Vec<Device>> {
        let devices = self.player.devices().await.map_err(|e| {
            log::error!(target: "playback_controller", "Error getting devices: {}", e);
            e
        })?;
        log::info!(target: "playback_controller", "Found {} available devices", devices.len());
        Ok(devices)
    }

    pub async fn select_device(&self, selector: DeviceSelector) -> AppResult<String> {
        let chosen = match selector {
            DeviceSelector::Id(id) => {
                log::info!(target: "playback_controller", "Device set to ID: {}", id);
                id
            }
            DeviceSelector::Name(name) => {
                let wanted = name.to_lowercase();
                let devices = self.available_devices().await?;
                let device = devices
                    .into_iter()
                    .filter(|d| d.id.is_some())
                    .find(|d| d.name.to_lowercase().contains(&wanted))
                    .ok_or_else(|| {
                        log::error!(target: "playback_controller", "Device with name '{}' not found", name);
                        AppError::NoDevice(format!("no device named '{}'", name))
                    })?;
                let id = device.id.unwrap_or_default();
                log::info!(target: "playback_controller", "Device set to: {} (ID: {})", device.name, id);
                id
            }
            DeviceSelector::First => {
                let devices = self.available_devices().await?;
                let device = devices
                    .into_iter()
                    .find(|d| d.id.is_some())
                    .ok_or_else(|| {
                        log::error!(target: "playback_controller", "No devices available");
                        AppError::NoDevice("no devices available".into())
                    })?;
                log::info!(target: "playback_controller", "Using first available device: {}", device.name);
                device.id.unwrap_or_default()
            }
        };

        self.state.lock().await.device_id = Some(chosen.clone());
        Ok(chosen)
    }

    pub async fn start_playback(&self, uris: &[String]) -> AppResult<()> {
        let device_id = self.require_device().await?;
        log::info!(
            target: "playback_controller",
            "Starting playback of {} tracks on device: {}",
            uris.len(),
            device_id
        );

        self.player
            .start_playback(&device_id, uris)
            .await
            .map_err(|e| log_failure("starting playback", e))?;

        let mut state = self.state.lock().await;
        state.is_playing = true;
        state.track_count = uris.len();
        log::info!(target: "playback_controller", "Playback started successfully");
        Ok(())
    }

    pub async fn pause(&self) -> AppResult<()> {
        let device_id = self.require_device().await?;
        self.player
            .pause(&device_id)
            .await
            .map_err(|e| log_failure("pausing playback", e))?;
        self.state.lock().await.is_playing = false;
        log::info!(target: "playback_controller", "Playback paused");
        Ok(())
    }

    pub async fn resume(&self) -> AppResult<()> {
        let device_id = self.require_device().await?;
        self.player
            .resume(&device_id)
            .await
            .map_err(|e| log_failure("resuming playback", e))?;
        self.state.lock().await.is_playing = true;
        log::info!(target: "playback_controller", "Playback resumed");
        Ok(())
    }

    /// Cancels any ramp, pauses the device and resets the session.
    pub async fn stop(&self) -> AppResult<()> {
        self.stop_ramp().await;

        let device_id = self.require_device().await?;
        self.player
            .pause(&device_id)
            .await
            .map_err(|e| log_failure("stopping playback", e))?;

        let mut state = self.state.lock().await;
        state.is_playing = false;
        state.ramp_active = false;
        state.current_playlist = None;
        state.track_count = 0;
        log::info!(target: "playback_controller", "Playback stopped");
        Ok(())
    }

    pub async fn next_track(&self) -> AppResult<()> {
        let device_id = self.require_device().await?;
        self.player
            .next(&device_id)
            .await
            .map_err(|e| log_failure("skipping track", e))?;
        log::info!(target: "playback_controller", "Skipped to next track");
        Ok(())
    }

    pub async fn previous_track(&self) -> AppResult<()> {
        let device_id = self.require_device().await?;
        self.player
            .previous(&device_id)
            .await
            .map_err(|e| log_failure("going to previous track", e))?;
        log::info!(target: "playback_controller", "Went to previous track");
        Ok(())
    }

    /// Sets the device volume. Values outside 0-100 never reach the API.
    pub async fn set_volume(&self, volume: i32) -> AppResult<()> {
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= 100)
            .ok_or_else(|| {
                log::error!(
                    target: "playback_controller",
                    "Invalid volume level: {}. Must be 0-100",
                    volume
                );
                AppError::InvalidInput(format!("volume must be 0-100, got {}", volume))
            })?;

        let device_id = self.require_device().await?;
        self.player
            .set_volume(&device_id, volume)
            .await
            .map_err(|e| log_failure("setting volume", e))?;

        self.state.lock().await.current_volume = volume;
        log::info!(target: "playback_controller", "Volume set to {}%", volume);
        Ok(())
    }

    /// Device volume as reported by the API, or the last value set locally.
    pub async fn current_volume(&self) -> u8 {
        let device_id = self.device_id().await;
        match self.player.devices().await {
            Ok(devices) => {
                let reported = devices
                    .into_iter()
                    .find(|d| d.id.is_some() && d.id == device_id)
                    .and_then(|d| d.volume_percent);
                let mut state = self.state.lock().await;
                if let Some(volume) = reported {
                    state.current_volume = volume;
                }
                state.current_volume
            }
            Err(e) => {
                log::error!(target: "playback_controller", "Error getting volume: {}", e);
                self.state.lock().await.current_volume
            }
        }
    }

    pub async fn playback_state(&self) -> AppResult<Option<PlaybackSnapshot>> {
        let current = self
            .player
            .current_playback()
            .await
            .map_err(|e| log_failure("getting playback state", e))?;

        Ok(current.map(|playing| {
            let (track_name, artists, duration_ms) = match playing.item {
                Some(track) => (
                    track.name,
                    track
                        .artists
                        .iter()
                        .map(|a| a.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                    track.duration_ms,
                ),
                None => ("Unknown".to_string(), "Unknown".to_string(), 0),
            };
            PlaybackSnapshot {
                is_playing: playing.is_playing,
                progress_ms: playing.progress_ms.unwrap_or(0),
                track_name,
                artists,
                duration_ms,
                device_name: playing.device.name,
                volume_percent: playing.device.volume_percent,
            }
        }))
    }

    pub async fn status(&self) -> SessionStatus {
        let state = self.state.lock().await;
        SessionStatus {
            device_id: state.device_id.clone(),
            is_playing: state.is_playing,
            current_volume: state.current_volume,
            volume_ramp_active: state.ramp_active,
            current_playlist: state.current_playlist.clone(),
            track_count: state.track_count,
        }
    }

    pub async fn is_playing(&self) -> bool {
        self.state.lock().await.is_playing
    }

    pub async fn is_ramping(&self) -> bool {
        self.state.lock().await.ramp_active
    }

    /// Starts playback and, when given a plan, a volume ramp. A ramp that
    /// cannot start does not fail the playback.
    pub async fn play_playlist_with_ramp(
        &self,
        uris: &[String],
        playlist_name: Option<&str>,
        ramp: Option<RampPlan>,
    ) -> AppResult<()> {
        let name = playlist_name.unwrap_or("Unknown Playlist");
        log::info!(target: "playback_controller", "Starting playlist '{}'", name);

        self.start_playback(uris).await?;

        if let Some(plan) = ramp {
            if let Err(e) = self.start_ramp(plan).await {
                log::warn!(
                    target: "playback_controller",
                    "Failed to start volume ramp, continuing with playback: {}",
                    e
                );
            }
        }

        self.state.lock().await.current_playlist = Some(name.to_string());
        Ok(())
    }

    /// Sets the start volume now, then raises it in the background.
    pub async fn start_ramp(&self, plan: RampPlan) -> AppResult<()> {
        plan.validate()?;

        let mut slot = self.ramp.lock().await;
        if self.state.lock().await.ramp_active {
            log::warn!(target: "playback_controller", "Volume ramp already active");
            return Err(AppError::RampAlreadyActive);
        }

        let device_id = self.require_device().await?;
        let delay = plan.delay_per_step();
        log::info!(
            target: "playback_controller",
            "Starting volume ramp: {}% -> {}% over {}s",
            plan.start,
            plan.end,
            plan.duration.as_secs()
        );

        self.set_volume(plan.start as i32).await?;
        self.state.lock().await.ramp_active = true;

        let (cancel, cancelled) = watch::channel(false);
        let task = tokio::spawn(run_ramp(
            Arc::clone(&self.player),
            Arc::clone(&self.state),
            device_id,
            plan,
            delay,
            cancelled,
        ));
        *slot = Some(RampHandle { cancel, task });
        Ok(())
    }

    /// Cancels the running ramp and waits briefly for it to exit. Returns
    /// whether a ramp was active.
    pub async fn stop_ramp(&self) -> bool {
        // the slot stays locked until the flag is cleared so a concurrent
        // start_ramp cannot have its flag reset by this call
        let mut slot = self.ramp.lock().await;
        let Some(RampHandle { cancel, mut task }) = slot.take() else {
            log::info!(target: "playback_controller", "No active volume ramp to stop");
            return false;
        };

        let was_active = !task.is_finished();
        let _ = cancel.send(true);
        match tokio::time::timeout(RAMP_JOIN_TIMEOUT, &mut task).await {
            Ok(_) => {}
            Err(_) => {
                log::warn!(target: "playback_controller", "Volume ramp did not exit in time, aborting");
                task.abort();
            }
        }
        self.state.lock().await.ramp_active = false;
        drop(slot);

        if was_active {
            log::info!(target: "playback_controller", "Volume ramp stopped");
        }
        was_active
    }

    /// Best-effort teardown: cancel the ramp, then pause the device.
    pub async fn shutdown(&self) {
        self.stop_ramp().await;
        if self.device_id().await.is_none() {
            return;
        }
        if let Err(e) = self.pause().await {
            log::error!(target: "playback_controller", "Error pausing during shutdown: {}", e);
        }
    }
}

fn log_failure(action: &str, e: AppError) -> AppError {
    log::error!(target: "playback_controller", "Error {}: {}", action, e);
    e
}

async fn run_ramp(
    player: Arc<dyn PlayerControl>,
    state: Arc<Mutex<SessionState>>,
    device_id: String,
    plan: RampPlan,
    delay: Duration,
    mut cancelled: watch::Receiver<bool>,
) -> RampOutcome {
    let mut current = plan.start;

    let outcome = loop {
        if current >= plan.end {
            break RampOutcome::Completed;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancelled.changed() => break RampOutcome::Cancelled,
        }
        if *cancelled.borrow() {
            break RampOutcome::Cancelled;
        }

        current = current.saturating_add(plan.increment).min(plan.end);
        match player.set_volume(&device_id, current).await {
            Ok(()) => {
                state.lock().await.current_volume = current;
                log::debug!(target: "playback_controller", "Volume ramp: {}%", current);
            }
            Err(e) => {
                log::error!(target: "playback_controller", "Error setting volume during ramp: {}", e);
            }
        }
    };

    state.lock().await.ramp_active = false;
    match outcome {
        RampOutcome::Completed => {
            log::info!(target: "playback_controller", "Volume ramp completed at {}%", current)
        }
        RampOutcome::Cancelled => {
            log::info!(target: "playback_controller", "Volume ramp cancelled at {}%", current)
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_steps_and_delay() {
        let plan = RampPlan::new(10, 80, Duration::from_secs(300), 2);
        assert_eq!(plan.steps(), 35);
        assert_eq!(plan.delay_per_step(), Duration::from_secs(300) / 35);
    }

    #[test]
    fn flat_ramp_uses_minimum_delay() {
        let plan = RampPlan::new(50, 50, Duration::from_secs(300), 2);
        assert_eq!(plan.steps(), 0);
        assert_eq!(plan.delay_per_step(), MIN_RAMP_DELAY);

        let downward = RampPlan::new(80, 10, Duration::from_secs(30), 5);
        assert!(downward.steps() < 0);
        assert_eq!(downward.delay_per_step(), MIN_RAMP_DELAY);
    }

    #[test]
    fn invalid_plans_are_rejected() {
        assert!(RampPlan::new(10, 120, Duration::from_secs(1), 2).validate().is_err());
        assert!(RampPlan::new(10, 80, Duration::from_secs(1), 0).validate().is_err());
        assert!(RampPlan::new(0, 100, Duration::from_secs(1), 1).validate().is_ok());
    }
}
