//! Lifecycle of the local spotifyd daemon: install, configure, start, stop.
//!
//! Every operation is safe to call when the daemon is already in the
//! requested state. Whether it runs is always read from the process table,
//! because it may be launched or killed outside this program.

mod conf;
mod install;
pub mod process;

use crate::config::SpotifyCredentials;
use crate::error::{AppError, AppResult};
use crate::platform::PlatformProfile;
use process::{ProcessTable, StopSignal, SysinfoProcessTable};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

pub use conf::CONFIG_FILE_NAME;

pub const DAEMON_BINARY: &str = "spotifyd";
const RELEASES_URL: &str = "https://api.github.com/repos/Spotifyd/spotifyd/releases/latest";

/// Where the daemon binary, its config and its cache live.
#[derive(Debug, Clone)]
pub struct DaemonInstallation {
    pub binary_path: PathBuf,
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl DaemonInstallation {
    pub fn for_platform(platform: &PlatformProfile) -> Self {
        let recs = platform.recommendations();
        Self {
            binary_path: platform
                .home()
                .join(".local")
                .join("bin")
                .join(DAEMON_BINARY),
            config_dir: recs.config_dir,
            cache_dir: recs.cache_dir,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }
}

/// Snapshot of the daemon process, valid only for the moment it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonProcess {
    pub pid: Option<u32>,
    pub is_running: bool,
}

#[derive(Debug, Clone)]
pub struct DaemonTimings {
    pub start_settle: Duration,
    pub foreground_settle: Duration,
    pub stop_grace: Duration,
    pub kill_settle: Duration,
    pub restart_settle: Duration,
}

impl Default for DaemonTimings {
    fn default() -> Self {
        Self {
            start_settle: Duration::from_secs(3),
            foreground_settle: Duration::from_secs(2),
            stop_grace: Duration::from_secs(2),
            kill_settle: Duration::from_secs(1),
            restart_settle: Duration::from_secs(2),
        }
    }
}

impl DaemonTimings {
    pub fn immediate() -> Self {
        Self {
            start_settle: Duration::ZERO,
            foreground_settle: Duration::ZERO,
            stop_grace: Duration::ZERO,
            kill_settle: Duration::ZERO,
            restart_settle: Duration::ZERO,
        }
    }
}

pub struct DaemonManager {
    platform: PlatformProfile,
    installation: DaemonInstallation,
    http: reqwest::Client,
    releases_url: String,
    timings: DaemonTimings,
    processes: Box<dyn ProcessTable>,
    foreground: Option<tokio::process::Child>,
}

impl DaemonManager {
    pub fn new(platform: PlatformProfile) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("spotify-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let installation = DaemonInstallation::for_platform(&platform);

        log::info!(
            target: "device_manager",
            "DeviceManager initialized for platform: {}",
            platform.summary()
        );

        Ok(Self {
            platform,
            installation,
            http,
            releases_url: RELEASES_URL.to_string(),
            timings: DaemonTimings::default(),
            processes: Box::new(SysinfoProcessTable),
            foreground: None,
        })
    }

    pub fn with_installation(mut self, installation: DaemonInstallation) -> Self {
        self.installation = installation;
        self
    }

    pub fn with_releases_url(mut self, url: impl Into<String>) -> Self {
        self.releases_url = url.into();
        self
    }

    pub fn with_timings(mut self, timings: DaemonTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_process_table(mut self, processes: Box<dyn ProcessTable>) -> Self {
        self.processes = processes;
        self
    }

    pub fn installation(&self) -> &DaemonInstallation {
        &self.installation
    }

    pub fn platform(&self) -> &PlatformProfile {
        &self.platform
    }

    pub fn is_installed(&self) -> bool {
        let installed = is_executable(&self.installation.binary_path);
        log::debug!(
            target: "device_manager",
            "spotifyd installed check: {} at {}",
            installed,
            self.installation.binary_path.display()
        );
        installed
    }

    pub fn pid(&self) -> Option<u32> {
        self.processes.find(DAEMON_BINARY)
    }

    pub fn process(&self) -> DaemonProcess {
        let pid = self.pid();
        DaemonProcess {
            pid,
            is_running: pid.is_some(),
        }
    }

    pub fn is_running(&self) -> bool {
        match self.pid() {
            Some(pid) => {
                log::debug!(target: "device_manager", "Found running spotifyd process: PID {}", pid);
                true
            }
            None => {
                log::debug!(target: "device_manager", "No running spotifyd process found");
                false
            }
        }
    }

    /// Writes `spotifyd.conf`, replacing any previous file.
    pub fn write_config(
        &self,
        device_name: &str,
        credentials: &SpotifyCredentials,
    ) -> AppResult<PathBuf> {
        let io_failure = |e: std::io::Error| AppError::ConfigWriteFailed(e.to_string());

        std::fs::create_dir_all(&self.installation.config_dir).map_err(io_failure)?;
        std::fs::create_dir_all(&self.installation.cache_dir).map_err(io_failure)?;

        let recs = self.platform.recommendations();
        let content = conf::render(
            device_name,
            credentials,
            &recs,
            &self.installation.cache_dir,
            self.platform.is_raspberry_pi,
        )?;
        let path = self.installation.config_file();
        std::fs::write(&path, content).map_err(io_failure)?;
        crate::config::restrict_permissions(&path).map_err(io_failure)?;

        log::info!(target: "device_manager", "Created spotifyd config at: {}", path.display());
        Ok(path)
    }

    pub async fn start(&mut self, device_name: &str, background: bool) -> AppResult<()> {
        if !self.is_installed() {
            log::info!(target: "device_manager", "spotifyd is not installed. Installing now...");
            self.install(false).await?;
        }

        if self.is_running() {
            log::info!(target: "device_manager", "spotifyd is already running");
            return Ok(());
        }

        let device_name = if device_name.trim().is_empty() {
            format!("SpotifyBot-{}", self.platform.device_name_suffix())
        } else {
            device_name.to_string()
        };
        let args = self.launch_args(&device_name, background);

        log::info!(
            target: "device_manager",
            "Starting spotifyd with command: {} {}",
            self.installation.binary_path.display(),
            args.join(" ")
        );

        let mut command = std::process::Command::new(&self.installation.binary_path);
        command.args(&args);

        if background {
            command
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null());
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                command.process_group(0);
            }
            // Dropping the handle leaves the process running; tokio reaps it.
            tokio::process::Command::from(command)
                .spawn()
                .map_err(|e| AppError::StartFailed(e.to_string()))?;

            tokio::time::sleep(self.timings.start_settle).await;

            if self.is_running() {
                log::info!(
                    target: "device_manager",
                    "spotifyd started successfully as device: {}",
                    device_name
                );
                Ok(())
            } else {
                log::error!(target: "device_manager", "spotifyd failed to start");
                Err(AppError::StartFailed(
                    "process not found after launch".into(),
                ))
            }
        } else {
            let mut child = tokio::process::Command::from(command)
                .spawn()
                .map_err(|e| AppError::StartFailed(e.to_string()))?;

            tokio::time::sleep(self.timings.foreground_settle).await;

            match child.try_wait()? {
                None => {
                    log::info!(
                        target: "device_manager",
                        "spotifyd started in foreground as device: {}",
                        device_name
                    );
                    self.foreground = Some(child);
                    Ok(())
                }
                Some(status) => {
                    log::error!(target: "device_manager", "spotifyd failed to start in foreground");
                    Err(AppError::StartFailed(format!("exited with {}", status)))
                }
            }
        }
    }

    fn launch_args(&self, device_name: &str, background: bool) -> Vec<String> {
        let mut args = Vec::new();
        // spotifyd detaches on its own unless told not to
        if !background {
            args.push("--no-daemon".to_string());
        }
        args.push("--device-name".to_string());
        args.push(device_name.to_string());

        let config_file = self.installation.config_file();
        if config_file.exists() {
            log::debug!(target: "device_manager", "Using config file: {}", config_file.display());
            args.push("--config-path".to_string());
            args.push(config_file.to_string_lossy().into_owned());
        }
        args
    }

    pub async fn stop(&mut self) -> AppResult<()> {
        let result = match self.pid() {
            Some(pid) => {
                log::info!(target: "device_manager", "Stopping spotifyd process (PID: {})", pid);
                self.processes.signal(pid, StopSignal::Terminate);
                tokio::time::sleep(self.timings.stop_grace).await;

                if self.pid() == Some(pid) {
                    log::warn!(target: "device_manager", "spotifyd still running, force killing...");
                    self.processes.signal(pid, StopSignal::Kill);
                    tokio::time::sleep(self.timings.kill_settle).await;
                }

                log::info!(target: "device_manager", "spotifyd stopped");
                Ok(())
            }
            None => {
                log::info!(target: "device_manager", "spotifyd is not running");
                Ok(())
            }
        };

        if let Some(mut child) = self.foreground.take() {
            if let Ok(None) = child.try_wait() {
                let _ = child.kill().await;
            }
        }

        result
    }

    pub async fn restart(&mut self, device_name: &str) -> AppResult<()> {
        log::info!(target: "device_manager", "Restarting spotifyd...");
        if let Err(e) = self.stop().await {
            log::warn!(target: "device_manager", "Error stopping spotifyd before restart: {}", e);
        }
        tokio::time::sleep(self.timings.restart_settle).await;
        self.start(device_name, true).await
    }

    /// Install, configure (best effort) and start the daemon.
    pub async fn ensure_ready(
        &mut self,
        device_name: &str,
        credentials: Option<&SpotifyCredentials>,
    ) -> AppResult<()> {
        log::info!(target: "device_manager", "Ensuring spotifyd is ready...");

        if !self.is_installed() {
            self.install(false).await?;
        }

        if let Some(credentials) = credentials {
            let name = if device_name.is_empty() {
                "SpotifyBot"
            } else {
                device_name
            };
            if let Err(e) = self.write_config(name, credentials) {
                log::warn!(target: "device_manager", "Could not create spotifyd config: {}", e);
            }
        }

        if !self.is_running() {
            self.start(device_name, true).await?;
        }

        log::info!(target: "device_manager", "spotifyd is ready!");
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stop().await {
            log::error!(target: "device_manager", "Error stopping spotifyd: {}", e);
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{AudioBackend, OsFamily};

    fn manager(home: &Path) -> DaemonManager {
        let platform = PlatformProfile::from_parts(
            OsFamily::Linux,
            "x86_64",
            false,
            AudioBackend::Alsa,
            home,
        );
        DaemonManager::new(platform).unwrap()
    }

    #[test]
    fn installation_paths_follow_home() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let installation = manager.installation();
        assert_eq!(
            installation.binary_path,
            dir.path().join(".local/bin/spotifyd")
        );
        assert_eq!(
            installation.config_file(),
            dir.path().join(".config/spotifyd/spotifyd.conf")
        );
    }

    #[test]
    fn launch_args_include_config_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());

        let args = manager.launch_args("Kitchen", true);
        assert_eq!(args, vec!["--device-name", "Kitchen"]);

        manager
            .write_config("Kitchen", &SpotifyCredentials::default())
            .unwrap();
        let args = manager.launch_args("Kitchen", false);
        assert_eq!(args[0], "--no-daemon");
        assert_eq!(args[3], "--config-path");
    }

    #[cfg(unix)]
    #[test]
    fn written_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let path = manager
            .write_config("Kitchen", &SpotifyCredentials::default())
            .unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
