use crate::api::client::SpotifyClient;
use crate::api::models::{CurrentlyPlaying, Device, DevicesResponse};
use crate::error::AppResult;

impl SpotifyClient {
    pub async fn devices(&self) -> AppResult<Vec<Device>> {
        let response = self.get("/me/player/devices").await?;
        let body: DevicesResponse = Self::json(response).await?;
        Ok(body.devices)
    }

    pub async fn start_playback(&self, device_id: &str, uris: &[String]) -> AppResult<()> {
        let body = serde_json::json!({ "uris": uris });
        self.put("/me/player/play", &[("device_id", device_id)], Some(&body))
            .await?;
        Ok(())
    }

    pub async fn resume_playback(&self, device_id: &str) -> AppResult<()> {
        self.put("/me/player/play", &[("device_id", device_id)], None)
            .await?;
        Ok(())
    }

    pub async fn pause_playback(&self, device_id: &str) -> AppResult<()> {
        self.put("/me/player/pause", &[("device_id", device_id)], None)
            .await?;
        Ok(())
    }

    pub async fn next_track(&self, device_id: &str) -> AppResult<()> {
        self.post("/me/player/next", &[("device_id", device_id)])
            .await?;
        Ok(())
    }

    pub async fn previous_track(&self, device_id: &str) -> AppResult<()> {
        self.post("/me/player/previous", &[("device_id", device_id)])
            .await?;
        Ok(())
    }

    pub async fn set_volume(&self, device_id: &str, volume_percent: u8) -> AppResult<()> {
        let volume = volume_percent.to_string();
        self.put(
            "/me/player/volume",
            &[("volume_percent", volume.as_str()), ("device_id", device_id)],
            None,
        )
        .await?;
        Ok(())
    }

    /// `None` when nothing is playing anywhere (HTTP 204).
    pub async fn current_playback(&self) -> AppResult<Option<CurrentlyPlaying>> {
        let response = self.get("/me/player").await?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(Some(Self::json(response).await?))
    }
}
