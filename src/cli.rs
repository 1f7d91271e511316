//! The interactive command loop.

use crate::catalog::{CatalogClient, Playlist};
use crate::config::{AppConfig, VolumeRampConfig};
use crate::error::{AppError, AppResult};
use crate::playback::{PlaybackSession, RampPlan};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const SEARCH_LIMIT: usize = 10;

const HELP: &str = "\
Available commands:
  [p]ause     - Pause playback
  [r]esume    - Resume playback
  [s]top      - Stop playback
  [v] <num>   - Set volume (0-100)
  [n]ext      - Skip to next track
  [b]ack      - Go to previous track
  [i]nfo      - Show current track info
  [st]atus    - Show playback status
  [h]elp      - Show this help
  [q]uit      - Quit application
  <playlist>  - Search and play new playlist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    Volume(i32),
    Next,
    Previous,
    Info,
    Status,
    Help,
    Quit,
    Search(String),
}

impl Command {
    /// Parses one line of input. `Ok(None)` for blank lines.
    pub fn parse(input: &str) -> AppResult<Option<Self>> {
        let input = input.trim().to_lowercase();
        let command = match input.as_str() {
            "" => return Ok(None),
            "p" | "pause" => Self::Pause,
            "r" | "resume" => Self::Resume,
            "s" | "stop" => Self::Stop,
            "n" | "next" => Self::Next,
            "b" | "back" => Self::Previous,
            "i" | "info" => Self::Info,
            "st" | "status" => Self::Status,
            "h" | "help" => Self::Help,
            "q" | "quit" => Self::Quit,
            "v" => return Err(volume_usage()),
            other if other.starts_with("v ") => {
                let volume = other
                    .split_whitespace()
                    .nth(1)
                    .and_then(|v| v.parse::<i32>().ok())
                    .ok_or_else(volume_usage)?;
                Self::Volume(volume)
            }
            other => Self::Search(other.to_string()),
        };
        Ok(Some(command))
    }
}

fn volume_usage() -> AppError {
    AppError::InvalidInput("Usage: v <number> (0-100)".into())
}

fn format_ms(ms: u64) -> String {
    format!("{}:{:02}", ms / 60_000, (ms % 60_000) / 1000)
}

pub struct Shell<R, W> {
    catalog: CatalogClient,
    session: Arc<PlaybackSession>,
    default_volume: u8,
    ramp: VolumeRampConfig,
    input: R,
    out: W,
}

impl<R, W> Shell<R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        catalog: CatalogClient,
        session: Arc<PlaybackSession>,
        config: &AppConfig,
        input: R,
        out: W,
    ) -> Self {
        Self {
            catalog,
            session,
            default_volume: config.default_volume,
            ramp: config.volume_ramp.clone(),
            input,
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Reads commands until `quit` or end of input.
    pub async fn run(&mut self) -> AppResult<()> {
        let rule = "=".repeat(60);
        writeln!(self.out, "\n{}", rule)?;
        writeln!(self.out, "🎵 Spotify Controller - Interactive Mode")?;
        writeln!(self.out, "{}", rule)?;
        writeln!(self.out, "\n{}", HELP)?;

        let device = self.session.device_id().await;
        writeln!(
            self.out,
            "\nCurrent device: {}",
            device.as_deref().unwrap_or("None")
        )?;
        writeln!(
            self.out,
            "Ready! Enter a playlist name to search and play, or use commands above."
        )?;

        loop {
            let Some(line) = self.prompt("\n> ").await? else {
                break;
            };

            match Command::parse(&line) {
                Ok(None) => continue,
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => {
                    log::debug!(target: "cli", "Handling command: {:?}", command);
                    self.handle(command).await?;
                }
                Err(AppError::InvalidInput(message)) => writeln!(self.out, "{}", message)?,
                Err(e) => writeln!(self.out, "✗ {}", e)?,
            }
        }
        Ok(())
    }

    async fn prompt(&mut self, text: &str) -> AppResult<Option<String>> {
        write!(self.out, "{}", text)?;
        self.out.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Runs one command. Remote failures become a `✗` line; only output
    /// errors escape.
    pub async fn handle(&mut self, command: Command) -> AppResult<()> {
        match command {
            Command::Pause => {
                let result = self.session.pause().await;
                self.report(result, "⏸ Playback paused", "Failed to pause")?;
            }
            Command::Resume => {
                let result = self.session.resume().await;
                self.report(result, "▶ Playback resumed", "Failed to resume")?;
            }
            Command::Stop => {
                let result = self.session.stop().await;
                self.report(result, "⏹ Playback stopped", "Failed to stop")?;
            }
            Command::Volume(volume) => match self.session.set_volume(volume).await {
                Ok(()) => writeln!(self.out, "🔊 Volume set to {}%", volume)?,
                Err(AppError::InvalidInput(_)) => writeln!(self.out, "✗ Volume must be 0-100")?,
                Err(_) => writeln!(self.out, "✗ Failed to set volume")?,
            },
            Command::Next => {
                let result = self.session.next_track().await;
                self.report(result, "⏭ Skipped to next track", "Failed to skip track")?;
            }
            Command::Previous => {
                let result = self.session.previous_track().await;
                self.report(result, "⏮ Went to previous track", "Failed to go back")?;
            }
            Command::Info => self.show_info().await?,
            Command::Status => self.show_status().await?,
            Command::Help => writeln!(self.out, "\n{}", HELP)?,
            Command::Quit => {}
            Command::Search(query) => {
                if let Some(playlist) = self.search_and_select(&query).await? {
                    if let Err(e) = self.play(&playlist).await {
                        log::error!(target: "cli", "Error starting playlist playback: {}", e);
                        writeln!(self.out, "✗ Failed to start playback")?;
                    }
                }
            }
        }
        Ok(())
    }

    fn report(&mut self, result: AppResult<()>, ok: &str, failed: &str) -> AppResult<()> {
        match result {
            Ok(()) => writeln!(self.out, "{}", ok)?,
            Err(_) => writeln!(self.out, "✗ {}", failed)?,
        }
        Ok(())
    }

    async fn show_info(&mut self) -> AppResult<()> {
        match self.session.playback_state().await {
            Ok(Some(state)) => {
                writeln!(self.out, "🎵 {} by {}", state.track_name, state.artists)?;
                writeln!(
                    self.out,
                    "⏱ {} / {}",
                    format_ms(state.progress_ms),
                    format_ms(state.duration_ms)
                )?;
                match state.volume_percent {
                    Some(volume) => writeln!(self.out, "🔊 Volume: {}%", volume)?,
                    None => writeln!(self.out, "🔊 Volume: unknown")?,
                }
            }
            Ok(None) => writeln!(self.out, "No playback information available")?,
            Err(_) => writeln!(self.out, "✗ Failed to get playback information")?,
        }
        Ok(())
    }

    async fn show_status(&mut self) -> AppResult<()> {
        let status = self.session.status().await;
        writeln!(self.out, "\nPlayback Status:")?;
        writeln!(
            self.out,
            "  Playing: {}",
            if status.is_playing { "Yes" } else { "No" }
        )?;
        writeln!(self.out, "  Volume: {}%", status.current_volume)?;
        writeln!(
            self.out,
            "  Volume Ramp: {}",
            if status.volume_ramp_active { "Active" } else { "Inactive" }
        )?;
        writeln!(
            self.out,
            "  Playlist: {}",
            status.current_playlist.as_deref().unwrap_or("None")
        )?;
        writeln!(self.out, "  Tracks: {}", status.track_count)?;
        Ok(())
    }

    /// Lists matches and asks for a choice. `None` when nothing matched or
    /// the user backed out.
    pub async fn search_and_select(&mut self, query: &str) -> AppResult<Option<Playlist>> {
        writeln!(self.out, "\nSearching for playlists matching '{}'...", query)?;
        let playlists = self.catalog.search_playlists(query, SEARCH_LIMIT).await;

        if playlists.is_empty() {
            writeln!(self.out, "No playlists found matching your search.")?;
            return Ok(None);
        }

        writeln!(self.out, "\nFound playlists:")?;
        for (i, playlist) in playlists.iter().enumerate() {
            writeln!(self.out, "{}. {}", i + 1, playlist.summary())?;
        }

        if let [only] = playlists.as_slice() {
            writeln!(self.out, "\nAuto-selecting: {}", only.name)?;
            return Ok(Some(only.clone()));
        }

        let question = format!("\nSelect playlist (1-{}) or 'q' to quit: ", playlists.len());
        loop {
            let Some(choice) = self.prompt(&question).await? else {
                return Ok(None);
            };
            if choice.eq_ignore_ascii_case("q") {
                return Ok(None);
            }
            match CatalogClient::pick(&playlists, &choice) {
                Ok(playlist) => return Ok(Some(playlist)),
                Err(AppError::InvalidInput(message)) => writeln!(self.out, "{}", message)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Loads the playlist's tracks and plays them, ramping the volume up to
    /// the configured default when enabled.
    pub async fn play(&mut self, playlist: &Playlist) -> AppResult<()> {
        writeln!(self.out, "\nLoading tracks from '{}'...", playlist.name)?;
        let uris = self.catalog.get_playlist_tracks(&playlist.id).await?;

        if uris.is_empty() {
            writeln!(self.out, "No tracks found in playlist")?;
            return Ok(());
        }
        writeln!(self.out, "Found {} tracks", uris.len())?;
        writeln!(self.out, "Starting playback...")?;

        let ramp = (self.ramp.enabled && self.ramp.start_volume < self.default_volume).then(|| {
            RampPlan::new(
                self.ramp.start_volume,
                self.default_volume,
                Duration::from_secs(self.ramp.duration_seconds),
                self.ramp.increment,
            )
        });

        self.session
            .play_playlist_with_ramp(&uris, Some(&playlist.name), ramp)
            .await?;

        let ramping = self.session.is_ramping().await;
        match ramp {
            Some(plan) if ramping => writeln!(
                self.out,
                "Volume ramping from {}% to {}% over {}s",
                plan.start,
                plan.end,
                plan.duration.as_secs()
            )?,
            _ => match self.session.set_volume(self.default_volume as i32).await {
                Ok(()) => writeln!(self.out, "Volume set to {}%", self.default_volume)?,
                Err(e) => {
                    log::warn!(target: "cli", "Could not set default volume: {}", e);
                }
            },
        }

        writeln!(self.out, "✓ Now playing: {}", playlist.name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(Command::parse("p").unwrap(), Some(Command::Pause));
        assert_eq!(Command::parse("  PAUSE ").unwrap(), Some(Command::Pause));
        assert_eq!(Command::parse("r").unwrap(), Some(Command::Resume));
        assert_eq!(Command::parse("stop").unwrap(), Some(Command::Stop));
        assert_eq!(Command::parse("n").unwrap(), Some(Command::Next));
        assert_eq!(Command::parse("back").unwrap(), Some(Command::Previous));
        assert_eq!(Command::parse("i").unwrap(), Some(Command::Info));
        assert_eq!(Command::parse("st").unwrap(), Some(Command::Status));
        assert_eq!(Command::parse("h").unwrap(), Some(Command::Help));
        assert_eq!(Command::parse("quit").unwrap(), Some(Command::Quit));
        assert_eq!(Command::parse("   ").unwrap(), None);
    }

    #[test]
    fn parses_volume() {
        assert_eq!(Command::parse("v 40").unwrap(), Some(Command::Volume(40)));
        assert_eq!(Command::parse("v 150").unwrap(), Some(Command::Volume(150)));
        assert_eq!(Command::parse("v -5").unwrap(), Some(Command::Volume(-5)));
        assert!(matches!(Command::parse("v loud"), Err(AppError::InvalidInput(_))));
        assert!(matches!(Command::parse("v"), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn anything_else_is_a_search() {
        assert_eq!(
            Command::parse("Road Trip").unwrap(),
            Some(Command::Search("road trip".into()))
        );
        assert_eq!(
            Command::parse("stopwatch").unwrap(),
            Some(Command::Search("stopwatch".into()))
        );
    }

    #[test]
    fn formats_minutes_and_seconds() {
        assert_eq!(format_ms(0), "0:00");
        assert_eq!(format_ms(65_000), "1:05");
        assert_eq!(format_ms(3_599_999), "59:59");
    }
}
