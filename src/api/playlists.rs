use crate::api::client::SpotifyClient;
use crate::api::models::{FullPlaylist, Paging, PlaylistTrackItem, SearchResponse, SimplifiedPlaylist};
use crate::error::AppResult;

impl SpotifyClient {
    pub async fn current_user_playlists(
        &self,
        limit: u32,
        offset: u32,
    ) -> AppResult<Paging<SimplifiedPlaylist>> {
        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self
            .get_with_query(
                "/me/playlists",
                &[("limit", limit.as_str()), ("offset", offset.as_str())],
            )
            .await?;
        Self::json(response).await
    }

    pub async fn search_playlists(
        &self,
        query: &str,
        limit: u32,
    ) -> AppResult<Paging<Option<SimplifiedPlaylist>>> {
        let limit = limit.to_string();
        let response = self
            .get_with_query(
                "/search",
                &[("q", query), ("type", "playlist"), ("limit", limit.as_str())],
            )
            .await?;
        let body: SearchResponse = Self::json(response).await?;
        Ok(body.playlists)
    }

    pub async fn playlist_tracks(
        &self,
        playlist_id: &str,
        limit: u32,
        offset: u32,
    ) -> AppResult<Paging<PlaylistTrackItem>> {
        let path = format!("/playlists/{}/tracks", playlist_id);
        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self
            .get_with_query(
                &path,
                &[("limit", limit.as_str()), ("offset", offset.as_str())],
            )
            .await?;
        Self::json(response).await
    }

    pub async fn playlist(&self, playlist_id: &str) -> AppResult<FullPlaylist> {
        let path = format!("/playlists/{}", playlist_id);
        let response = self.get(&path).await?;
        Self::json(response).await
    }
}
