use crate::config::LoggingConfig;
use crate::error::AppResult;
use std::fs::{File, OpenOptions};
use std::io::Write;

/// Writes every log line to stderr and, when configured, appends it to a file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

pub fn default_filter(level: &str) -> String {
    format!("spotify_controller={level},device_manager={level},playlist_manager={level},playback_controller={level},auth={level},cli={level}")
}

/// Installs the process-wide logger. Called once from `run()`.
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let file = match &config.file {
        Some(path) => {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() {
                    std::fs::create_dir_all(dir)?;
                }
            }
            Some(OpenOptions::new().create(true).append(true).open(path)?)
        }
        None => None,
    };

    let result = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(&config.level)),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "{} - {} - {} - {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.target(),
            record.level(),
            record.args()
        )
    })
    .target(env_logger::Target::Pipe(Box::new(TeeWriter { file })))
    .try_init();

    if let Err(e) = result {
        log::debug!("Logger already initialised: {}", e);
    }
    Ok(())
}
