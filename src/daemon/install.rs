use super::{DaemonManager, DAEMON_BINARY};
use crate::api::models::{Release, ReleaseAsset};
use crate::error::{AppError, AppResult};
use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

impl DaemonManager {
    /// Download and install spotifyd for this platform.
    ///
    /// Does nothing, and makes no network call, when the binary is already in
    /// place and `force` is false.
    pub async fn install(&self, force: bool) -> AppResult<()> {
        if self.is_installed() && !force {
            log::info!(target: "device_manager", "spotifyd is already installed");
            return Ok(());
        }

        let wanted = self.platform.daemon_asset_name()?;
        log::info!(
            target: "device_manager",
            "Installing spotifyd for {}",
            self.platform.summary()
        );

        let binary_path = self.installation.binary_path.clone();
        if let Some(parent) = binary_path.parent() {
            std::fs::create_dir_all(parent).map_err(install_failure)?;
        }

        let asset = self.find_release_asset(wanted).await?;
        log::info!(target: "device_manager", "Downloading from: {}", asset.browser_download_url);

        let temp_dir = tempfile::tempdir()?;
        let file_name = asset_file_name(&asset);
        let download_path = temp_dir.path().join(&file_name);
        self.download(&asset, &download_path).await?;

        let staged = temp_dir.path().join(format!("{}.staged", DAEMON_BINARY));
        let archive = download_path.clone();
        let staged_for_task = staged.clone();
        tokio::task::spawn_blocking(move || {
            extract_binary(&archive, &file_name, DAEMON_BINARY, &staged_for_task)
        })
        .await
        .map_err(|e| AppError::ExtractionFailed(e.to_string()))??;

        install_binary(&staged, &binary_path)?;
        log::info!(
            target: "device_manager",
            "spotifyd installed successfully at: {}",
            binary_path.display()
        );
        Ok(())
    }

    async fn find_release_asset(&self, wanted: &str) -> AppResult<ReleaseAsset> {
        log::debug!(target: "device_manager", "Fetching release info from: {}", self.releases_url);
        let response = self
            .http
            .get(&self.releases_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| AppError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::DownloadFailed(format!(
                "release metadata request returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::DownloadFailed(e.to_string()))?;
        let release: Release = serde_json::from_str(&body)
            .map_err(|e| AppError::MalformedResponse(format!("release metadata: {}", e)))?;

        log::debug!(target: "device_manager", "Looking for binary matching: {}", wanted);
        select_asset(release, wanted)
    }

    async fn download(&self, asset: &ReleaseAsset, dest: &Path) -> AppResult<()> {
        let response = self
            .http
            .get(&asset.browser_download_url)
            .send()
            .await
            .map_err(|e| AppError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::DownloadFailed(format!(
                "{} returned {}",
                asset.browser_download_url,
                response.status()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut size = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| AppError::DownloadFailed(e.to_string()))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = asset.sha256() {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(AppError::DownloadFailed(format!(
                    "checksum mismatch for {}: expected {}, got {}",
                    asset.name, expected, actual
                )));
            }
        }

        log::debug!(target: "device_manager", "Downloaded {} ({} bytes)", asset.name, size);
        Ok(())
    }
}

/// First asset whose name contains `wanted`.
pub(crate) fn select_asset(release: Release, wanted: &str) -> AppResult<ReleaseAsset> {
    let available: Vec<String> = release.assets.iter().map(|a| a.name.clone()).collect();
    match release.assets.into_iter().find(|a| a.name.contains(wanted)) {
        Some(asset) => {
            log::debug!(
                target: "device_manager",
                "Found matching asset: {} -> {}",
                asset.name,
                asset.browser_download_url
            );
            Ok(asset)
        }
        None => {
            log::debug!(target: "device_manager", "Available assets: {:?}", available);
            Err(AppError::AssetNotFound {
                wanted: wanted.to_string(),
                available: available.join(", "),
            })
        }
    }
}

fn asset_file_name(asset: &ReleaseAsset) -> String {
    asset
        .browser_download_url
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(&asset.name)
        .to_string()
}

/// Pulls the daemon out of a downloaded asset into `dest`.
///
/// `.tar.gz`/`.tgz` and `.zip` are searched for a regular file whose path
/// ends with `binary_name`; anything else is taken as the binary itself.
pub(crate) fn extract_binary(
    archive: &Path,
    file_name: &str,
    binary_name: &str,
    dest: &Path,
) -> AppResult<()> {
    if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
        log::debug!(target: "device_manager", "Extracting tar.gz archive");
        extract_from_tar_gz(archive, binary_name, dest)
    } else if file_name.ends_with(".zip") {
        log::debug!(target: "device_manager", "Extracting zip archive");
        extract_from_zip(archive, binary_name, dest)
    } else {
        log::debug!(target: "device_manager", "Treating as direct binary");
        std::fs::copy(archive, dest)?;
        Ok(())
    }
}

fn extract_from_tar_gz(archive: &Path, binary_name: &str, dest: &Path) -> AppResult<()> {
    let extraction = |e: std::io::Error| AppError::ExtractionFailed(e.to_string());

    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(file));
    for entry in tar.entries().map_err(extraction)? {
        let mut entry = entry.map_err(extraction)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let member = entry.path().map_err(extraction)?.to_string_lossy().into_owned();
        if member.ends_with(binary_name) {
            copy_member(&mut entry, dest)?;
            log::debug!(target: "device_manager", "Extracted binary from {}", member);
            return Ok(());
        }
    }
    Err(missing_member(binary_name))
}

fn extract_from_zip(archive: &Path, binary_name: &str, dest: &Path) -> AppResult<()> {
    let file = File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| AppError::ExtractionFailed(e.to_string()))?;
    for index in 0..zip.len() {
        let mut member = zip
            .by_index(index)
            .map_err(|e| AppError::ExtractionFailed(e.to_string()))?;
        if member.is_file() && member.name().ends_with(binary_name) {
            let name = member.name().to_string();
            copy_member(&mut member, dest)?;
            log::debug!(target: "device_manager", "Extracted binary from {}", name);
            return Ok(());
        }
    }
    Err(missing_member(binary_name))
}

fn copy_member(reader: &mut impl Read, dest: &Path) -> AppResult<()> {
    let mut out = File::create(dest)?;
    std::io::copy(reader, &mut out).map_err(|e| AppError::ExtractionFailed(e.to_string()))?;
    Ok(())
}

fn missing_member(binary_name: &str) -> AppError {
    log::error!(target: "device_manager", "Could not find spotifyd binary in downloaded archive");
    AppError::ExtractionFailed(format!("no member ending with '{}'", binary_name))
}

fn install_failure(e: std::io::Error) -> AppError {
    AppError::InstallFailed(e.to_string())
}

/// Moves the staged binary over `target` by rename, so a running daemon keeps
/// its old inode and the path never points at a partial file.
fn install_binary(staged: &Path, target: &Path) -> AppResult<PathBuf> {
    let parent = target
        .parent()
        .ok_or_else(|| AppError::InstallFailed(format!("{} has no parent", target.display())))?;

    // staged in the target directory so the final rename stays on one filesystem
    let mut replacement = tempfile::NamedTempFile::new_in(parent).map_err(install_failure)?;
    let mut source = File::open(staged).map_err(install_failure)?;
    std::io::copy(&mut source, replacement.as_file_mut()).map_err(install_failure)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        replacement
            .as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o755))
            .map_err(install_failure)?;
    }
    replacement
        .persist(target)
        .map_err(|e| install_failure(e.error))?;
    Ok(target.to_path_buf())
}
