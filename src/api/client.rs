use crate::config::{SpotifyCredentials, TokenCache};
use crate::error::{AppError, AppResult};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::RwLock;

const BASE_URL: &str = "https://api.spotify.com/v1";
pub const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    credentials: SpotifyCredentials,
    tokens: Arc<RwLock<TokenCache>>,
}

impl SpotifyClient {
    pub fn new(credentials: SpotifyCredentials, tokens: Arc<RwLock<TokenCache>>) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("spotify-controller/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: BASE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            credentials,
            tokens,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn tokens(&self) -> &Arc<RwLock<TokenCache>> {
        &self.tokens
    }

    pub fn credentials(&self) -> &SpotifyCredentials {
        &self.credentials
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    async fn auth_headers(&self) -> AppResult<HeaderMap> {
        let tokens = self.tokens.read().await;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let token = tokens.access_token.as_ref().ok_or(AppError::AuthRequired)?;
        let auth_value = format!("Bearer {}", token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value).map_err(|e| AppError::Config(e.to_string()))?,
        );

        Ok(headers)
    }

    /// Sends a request, refreshing the token and retrying once on 401.
    async fn send<F>(&self, build: F) -> AppResult<reqwest::Response>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let headers = self.auth_headers().await?;
        let response = build(&self.http).headers(headers).send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.refresh_token().await?;
            let headers = self.auth_headers().await?;
            let response = build(&self.http).headers(headers).send().await?;
            self.check_response(response).await
        } else {
            self.check_response(response).await
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> AppResult<reqwest::Response> {
        let url = self.url(path);
        self.send(|http| http.get(&url)).await
    }

    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<reqwest::Response> {
        let url = self.url(path);
        self.send(|http| http.get(&url).query(query)).await
    }

    pub async fn put(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> AppResult<reqwest::Response> {
        let url = self.url(path);
        self.send(|http| {
            let request = http.put(&url).query(query);
            match body {
                Some(body) => request.json(body),
                None => request.body(Vec::new()),
            }
        })
        .await
    }

    pub async fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<reqwest::Response> {
        let url = self.url(path);
        self.send(|http| http.post(&url).query(query).body(Vec::new()))
            .await
    }

    /// Decodes a JSON body into a typed record.
    pub async fn json<T: DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse(e.to_string()))
    }

    async fn check_response(&self, response: reqwest::Response) -> AppResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            Err(AppError::AuthRequired)
        } else if status == reqwest::StatusCode::NOT_FOUND {
            let message = response.text().await.unwrap_or_default();
            Err(AppError::NotFound(if message.is_empty() {
                "Resource not found".into()
            } else {
                message
            }))
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".into());
            Err(AppError::SpotifyApi {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn refresh_token(&self) -> AppResult<()> {
        let mut tokens = self.tokens.write().await;

        let refresh_token = tokens
            .refresh_token
            .as_ref()
            .ok_or(AppError::AuthRequired)?
            .clone();

        let token = crate::api::auth::refresh_user_token(
            &self.http,
            &self.token_url,
            &self.credentials,
            &refresh_token,
        )
        .await?;

        tokens.store(token);
        tokens.save()?;
        log::info!(target: "auth", "Access token refreshed");

        Ok(())
    }
}
