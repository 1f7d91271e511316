//! Playlist search and track listing on top of the Web API client.

use crate::api::client::SpotifyClient;
use crate::api::models::SimplifiedPlaylist;
use crate::error::{AppError, AppResult};
use std::collections::HashSet;
use std::sync::Arc;

const USER_PAGE_SIZE: u32 = 50;
const TRACK_PAGE_SIZE: u32 = 100;
const DESCRIPTION_LIMIT: usize = 100;

/// A playlist as offered to the user. Identity is `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub track_count: u32,
    pub is_own: bool,
    pub is_public: bool,
    pub description: String,
    pub uri: String,
}

impl Playlist {
    fn from_api(playlist: SimplifiedPlaylist, is_own: bool) -> Option<Self> {
        let name = playlist.name.filter(|n| !n.is_empty())?;
        Some(Self {
            owner: playlist.owner.label(),
            id: playlist.id,
            name,
            track_count: playlist.tracks.total,
            is_own,
            is_public: playlist.public.unwrap_or(false),
            description: playlist.description.unwrap_or_default(),
            uri: playlist.uri,
        })
    }

    /// One line for listings, e.g. `'Focus' by alice (42 tracks) [Your playlist]`.
    pub fn summary(&self) -> String {
        let mut summary = format!("'{}' by {} ({} tracks)", self.name, self.owner, self.track_count);

        if self.is_own {
            summary.push_str(" [Your playlist]");
        } else if self.is_public {
            summary.push_str(" [Public]");
        } else {
            summary.push_str(" [Private]");
        }

        if !self.description.is_empty() {
            let truncated: String = self.description.chars().take(DESCRIPTION_LIMIT).collect();
            summary.push_str(" - ");
            summary.push_str(&truncated);
            if self.description.chars().count() > DESCRIPTION_LIMIT {
                summary.push_str("...");
            }
        }

        summary
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub track_count: u32,
    pub followers: u32,
    pub is_public: bool,
    pub collaborative: bool,
    pub uri: String,
    pub external_url: Option<String>,
    pub image_url: Option<String>,
}

/// Concatenates result branches in order, keeping the first playlist seen for
/// each id.
pub fn merge_unique<I>(branches: I) -> Vec<Playlist>
where
    I: IntoIterator<Item = Vec<Playlist>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for playlist in branches.into_iter().flatten() {
        if seen.insert(playlist.id.clone()) {
            merged.push(playlist);
        }
    }
    merged
}

pub struct CatalogClient {
    client: Arc<SpotifyClient>,
}

impl CatalogClient {
    pub fn new(client: Arc<SpotifyClient>) -> Self {
        log::info!(target: "playlist_manager", "PlaylistManager initialized");
        Self { client }
    }

    /// Own playlists matching `query` first, then public results, deduplicated.
    pub async fn search_playlists(&self, query: &str, limit: usize) -> Vec<Playlist> {
        log::info!(target: "playlist_manager", "Searching for playlists with query: '{}'", query);

        let own = match self.search_user_playlists(query, limit / 2).await {
            Ok(found) => found,
            Err(e) => {
                log::error!(target: "playlist_manager", "Error searching user playlists: {}", e);
                Vec::new()
            }
        };

        let remaining = limit.saturating_sub(own.len());
        let public = if remaining == 0 {
            Vec::new()
        } else {
            match self.search_public_playlists(query, remaining).await {
                Ok(found) => found,
                Err(e) => {
                    log::error!(target: "playlist_manager", "Error searching public playlists: {}", e);
                    Vec::new()
                }
            }
        };

        let mut unique = merge_unique([own, public]);
        unique.truncate(limit);
        log::info!(target: "playlist_manager", "Found {} unique playlists", unique.len());
        unique
    }

    async fn search_user_playlists(&self, query: &str, limit: usize) -> AppResult<Vec<Playlist>> {
        let needle = query.to_lowercase();
        let mut found = Vec::new();
        let mut offset = 0;

        while found.len() < limit {
            let page = self
                .client
                .current_user_playlists(USER_PAGE_SIZE, offset)
                .await?;
            if page.items.is_empty() {
                break;
            }

            for playlist in page.items {
                let matches = playlist
                    .name
                    .as_deref()
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
                if let Some(playlist) = Playlist::from_api(playlist, true) {
                    found.push(playlist);
                    if found.len() >= limit {
                        break;
                    }
                }
            }

            offset += USER_PAGE_SIZE;
            if offset >= page.total {
                break;
            }
        }

        log::debug!(
            target: "playlist_manager",
            "Found {} user playlists matching '{}'",
            found.len(),
            query
        );
        Ok(found)
    }

    async fn search_public_playlists(&self, query: &str, limit: usize) -> AppResult<Vec<Playlist>> {
        let limit = limit.clamp(1, 50) as u32;
        let page = self.client.search_playlists(query, limit).await?;
        let found: Vec<Playlist> = page
            .items
            .into_iter()
            .flatten()
            .filter_map(|playlist| Playlist::from_api(playlist, false))
            .collect();

        log::debug!(
            target: "playlist_manager",
            "Found {} public playlists matching '{}'",
            found.len(),
            query
        );
        Ok(found)
    }

    /// Every track URI of a playlist, in playlist order.
    pub async fn get_playlist_tracks(&self, playlist_id: &str) -> AppResult<Vec<String>> {
        log::info!(target: "playlist_manager", "Fetching tracks for playlist ID: {}", playlist_id);

        let mut uris = Vec::new();
        let mut offset = 0;
        loop {
            let page = match self
                .client
                .playlist_tracks(playlist_id, TRACK_PAGE_SIZE, offset)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    log::error!(target: "playlist_manager", "Error fetching playlist tracks: {}", e);
                    return Err(e);
                }
            };

            uris.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track.and_then(|track| track.uri)),
            );

            if page.next.is_none() {
                break;
            }
            offset += TRACK_PAGE_SIZE;
        }

        log::info!(target: "playlist_manager", "Retrieved {} tracks from playlist", uris.len());
        Ok(uris)
    }

    pub async fn get_playlist_by_name(&self, name: &str, exact: bool) -> Option<Playlist> {
        let playlists = self.search_playlists(name, 50).await;

        if exact {
            let wanted = name.to_lowercase();
            let found = playlists
                .into_iter()
                .find(|playlist| playlist.name.to_lowercase() == wanted);
            if found.is_some() {
                log::info!(target: "playlist_manager", "Found exact match for playlist: '{}'", name);
            }
            found
        } else {
            let found = playlists.into_iter().next();
            if let Some(playlist) = &found {
                log::info!(target: "playlist_manager", "Found playlist match: '{}'", playlist.name);
            }
            found
        }
    }

    pub async fn get_playlist_info(&self, playlist_id: &str) -> AppResult<PlaylistInfo> {
        let playlist = self.client.playlist(playlist_id).await.map_err(|e| {
            log::error!(target: "playlist_manager", "Error getting playlist info: {}", e);
            e
        })?;

        let info = PlaylistInfo {
            owner: playlist.owner.label(),
            id: playlist.id,
            name: playlist.name,
            description: playlist.description.unwrap_or_default(),
            track_count: playlist.tracks.total,
            followers: playlist.followers.total,
            is_public: playlist.public.unwrap_or(false),
            collaborative: playlist.collaborative,
            uri: playlist.uri,
            external_url: playlist.external_urls.spotify,
            image_url: playlist.images.first().map(|image| image.url.clone()),
        };
        log::debug!(target: "playlist_manager", "Retrieved info for playlist: '{}'", info.name);
        Ok(info)
    }

    pub async fn list_user_playlists(&self, limit: usize) -> AppResult<Vec<Playlist>> {
        log::info!(target: "playlist_manager", "Fetching user's playlists");

        let mut playlists = Vec::new();
        let mut offset = 0;
        'pages: while playlists.len() < limit {
            let page = self
                .client
                .current_user_playlists(USER_PAGE_SIZE, offset)
                .await?;
            if page.items.is_empty() {
                break;
            }
            for playlist in page.items {
                if let Some(playlist) = Playlist::from_api(playlist, true) {
                    playlists.push(playlist);
                    if playlists.len() >= limit {
                        break 'pages;
                    }
                }
            }
            offset += USER_PAGE_SIZE;
            if offset >= page.total {
                break;
            }
        }

        log::info!(target: "playlist_manager", "Retrieved {} user playlists", playlists.len());
        Ok(playlists)
    }

    /// Selection helper for numbered listings: `choice` is 1-based.
    pub fn pick(playlists: &[Playlist], choice: &str) -> AppResult<Playlist> {
        let index: usize = choice
            .trim()
            .parse()
            .map_err(|_| AppError::InvalidInput("Please enter a valid number or 'q' to quit".into()))?;
        if index == 0 || index > playlists.len() {
            return Err(AppError::InvalidInput(format!(
                "Please enter a number between 1 and {}",
                playlists.len()
            )));
        }
        Ok(playlists[index - 1].clone())
    }
}
