use crate::api::client::SpotifyClient;
use crate::api::models::UserProfile;
use crate::error::AppResult;

impl SpotifyClient {
    pub async fn current_user(&self) -> AppResult<UserProfile> {
        let response = self.get("/me").await?;
        Self::json(response).await
    }
}
