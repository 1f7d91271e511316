//! Host detection: operating system, architecture, Raspberry Pi boards, the
//! audio subsystem, and the spotifyd release asset that matches them.

use crate::error::{AppError, AppResult};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOs,
    Other(String),
}

impl OsFamily {
    fn from_consts(os: &str) -> Self {
        match os {
            "linux" => OsFamily::Linux,
            "macos" => OsFamily::MacOs,
            other => OsFamily::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    CoreAudio,
    PulseAudio,
    Alsa,
    Unknown,
}

impl AudioBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioBackend::CoreAudio => "coreaudio",
            AudioBackend::PulseAudio => "pulseaudio",
            AudioBackend::Alsa => "alsa",
            AudioBackend::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AudioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable description of the host, computed once at startup.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub os: OsFamily,
    pub arch: String,
    pub is_raspberry_pi: bool,
    pub audio_backend: AudioBackend,
    pub has_gui: bool,
    home: PathBuf,
}

/// Settings spotifyd should run with on this host.
#[derive(Debug, Clone)]
pub struct PlatformRecommendations {
    pub device_name_suffix: &'static str,
    pub audio_backend: AudioBackend,
    pub bitrate: u32,
    pub volume_normalisation: bool,
    pub normalisation_pregain: i32,
    pub cache_dir: PathBuf,
    pub config_dir: PathBuf,
}

const PI_MODEL_FILES: [&str; 2] = [
    "/proc/device-tree/model",
    "/sys/firmware/devicetree/base/model",
];

impl PlatformProfile {
    pub fn detect() -> Self {
        let os = OsFamily::from_consts(std::env::consts::OS);
        let arch = std::env::consts::ARCH.to_string();
        let is_raspberry_pi = os == OsFamily::Linux && detect_raspberry_pi();
        let audio_backend = detect_audio_backend(&os);
        let has_gui = match os {
            OsFamily::MacOs => true,
            OsFamily::Linux => {
                std::env::var_os("DISPLAY").is_some()
                    || std::env::var_os("WAYLAND_DISPLAY").is_some()
            }
            OsFamily::Other(_) => false,
        };
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            os,
            arch,
            is_raspberry_pi,
            audio_backend,
            has_gui,
            home,
        }
    }

    /// Builds a profile from explicit facts instead of probing the host.
    pub fn from_parts(
        os: OsFamily,
        arch: &str,
        is_raspberry_pi: bool,
        audio_backend: AudioBackend,
        home: &Path,
    ) -> Self {
        Self {
            has_gui: os == OsFamily::MacOs,
            os,
            arch: arch.to_string(),
            is_raspberry_pi,
            audio_backend,
            home: home.to_path_buf(),
        }
    }

    pub fn is_macos(&self) -> bool {
        self.os == OsFamily::MacOs
    }

    pub fn is_linux(&self) -> bool {
        self.os == OsFamily::Linux
    }

    pub fn is_arm(&self) -> bool {
        self.arch.contains("arm") || self.arch.contains("aarch64")
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Release asset name prefix of the spotifyd build for this host.
    pub fn daemon_asset_name(&self) -> AppResult<&'static str> {
        match &self.os {
            OsFamily::MacOs => {
                if self.is_arm() {
                    Ok("spotifyd-macos-arm64")
                } else {
                    Ok("spotifyd-macos-x86_64")
                }
            }
            // armhf builds do not run reliably on current Pi images
            OsFamily::Linux if self.is_raspberry_pi => Ok("spotifyd-linux-aarch64"),
            OsFamily::Linux if self.arch.contains("aarch64") || self.arch.contains("arm64") => {
                Ok("spotifyd-linux-aarch64")
            }
            OsFamily::Linux => Ok("spotifyd-linux-x86_64"),
            OsFamily::Other(name) => Err(AppError::PlatformUnsupported(format!(
                "{} ({})",
                name, self.arch
            ))),
        }
    }

    pub fn device_name_suffix(&self) -> &'static str {
        if self.is_raspberry_pi {
            "RaspberryPi"
        } else if self.is_macos() {
            "Mac"
        } else {
            "Linux"
        }
    }

    pub fn recommendations(&self) -> PlatformRecommendations {
        let (cache_dir, config_dir) = if self.is_macos() {
            (
                self.home.join("Library").join("Caches").join("spotifyd"),
                self.home
                    .join("Library")
                    .join("Application Support")
                    .join("spotifyd"),
            )
        } else {
            (
                self.home.join(".cache").join("spotifyd"),
                self.home.join(".config").join("spotifyd"),
            )
        };

        let (bitrate, normalisation_pregain) = if self.is_raspberry_pi {
            (160, -10)
        } else {
            (320, -6)
        };

        PlatformRecommendations {
            device_name_suffix: self.device_name_suffix(),
            audio_backend: self.audio_backend,
            bitrate,
            volume_normalisation: true,
            normalisation_pregain,
            cache_dir,
            config_dir,
        }
    }

    pub fn summary(&self) -> String {
        let os = match &self.os {
            OsFamily::Linux => "linux",
            OsFamily::MacOs => "macos",
            OsFamily::Other(name) => name.as_str(),
        };
        format!(
            "{}/{} (raspberry_pi={}, audio={}, gui={})",
            os, self.arch, self.is_raspberry_pi, self.audio_backend, self.has_gui
        )
    }
}

fn detect_raspberry_pi() -> bool {
    for indicator in PI_MODEL_FILES {
        if let Ok(content) = std::fs::read_to_string(indicator) {
            if content.to_lowercase().contains("raspberry pi") {
                return true;
            }
        }
    }

    match std::fs::read_to_string("/proc/cpuinfo") {
        Ok(content) => {
            let content = content.to_lowercase();
            content.contains("raspberry pi") || content.contains("bcm")
        }
        Err(_) => false,
    }
}

fn detect_audio_backend(os: &OsFamily) -> AudioBackend {
    match os {
        OsFamily::MacOs => AudioBackend::CoreAudio,
        OsFamily::Linux => {
            if find_in_path("pulseaudio") || Path::new("/usr/bin/pulseaudio").exists() {
                AudioBackend::PulseAudio
            } else {
                AudioBackend::Alsa
            }
        }
        OsFamily::Other(_) => AudioBackend::Unknown,
    }
}

fn find_in_path(program: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}
