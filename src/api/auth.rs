use crate::api::client::SpotifyClient;
use crate::api::models::TokenResponse;
use crate::config::SpotifyCredentials;
use crate::error::{AppError, AppResult};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

const AUTH_URL: &str = "https://accounts.spotify.com/authorize";

pub const SCOPES: [&str; 4] = [
    "user-read-playback-state",
    "user-modify-playback-state",
    "playlist-read-private",
    "playlist-read-collaborative",
];

/// Random value echoed back by the authorization server.
pub fn generate_state() -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..16).map(|_| rng.gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

pub fn build_auth_url(client_id: &str, redirect_uri: &str, state: &str) -> String {
    let url = format!(
        "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}",
        AUTH_URL,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&SCOPES.join(" ")),
        urlencoding::encode(state)
    );
    log::debug!(target: "auth", "Auth URL: {}", url);
    url
}

/// Pulls the authorization code out of the URL the browser was redirected to.
pub fn parse_redirect(redirected: &str, expected_state: &str) -> AppResult<String> {
    let url = url::Url::parse(redirected.trim())
        .map_err(|e| AppError::Authentication(format!("Invalid redirect URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(AppError::Authentication(format!(
                    "Authorization denied: {}",
                    value
                )))
            }
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AppError::Authentication(
            "State mismatch in authorization response".into(),
        ));
    }
    code.ok_or_else(|| AppError::Authentication("Redirect URL has no authorization code".into()))
}

fn basic_auth(credentials: &SpotifyCredentials) -> String {
    let pair = format!("{}:{}", credentials.client_id, credentials.client_secret);
    format!("Basic {}", STANDARD.encode(pair.as_bytes()))
}

async fn request_token(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &SpotifyCredentials,
    params: &[(&str, &str)],
    what: &str,
) -> AppResult<TokenResponse> {
    let response = http
        .post(token_url)
        .header("Authorization", basic_auth(credentials))
        .form(params)
        .send()
        .await?;

    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::Authentication(format!("{} failed: {}", what, body)));
    }

    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| AppError::MalformedResponse(e.to_string()))
}

pub async fn exchange_code(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &SpotifyCredentials,
    code: &str,
) -> AppResult<TokenResponse> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", credentials.redirect_uri.as_str()),
    ];
    request_token(http, token_url, credentials, &params, "Token exchange").await
}

/// Refresh an expired user token using the refresh_token grant.
pub async fn refresh_user_token(
    http: &reqwest::Client,
    token_url: &str,
    credentials: &SpotifyCredentials,
    refresh_token: &str,
) -> AppResult<TokenResponse> {
    let params = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
    ];
    request_token(http, token_url, credentials, &params, "Token refresh").await
}

/// Walks the user through the authorization-code flow on the terminal.
pub async fn authorize_interactive<R>(client: &SpotifyClient, input: &mut R) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let credentials = client.credentials();
    let state = generate_state();
    let url = build_auth_url(&credentials.client_id, &credentials.redirect_uri, &state);

    println!("\nOpen this URL in a browser and approve access:\n\n  {}\n", url);
    println!("Then paste the URL you were redirected to:");

    let mut line = String::new();
    let read = input.read_line(&mut line).await?;
    if read == 0 {
        return Err(AppError::Authentication(
            "No redirect URL provided".into(),
        ));
    }

    let code = parse_redirect(&line, &state)?;
    let token = exchange_code(
        client.http_client(),
        client.token_url(),
        credentials,
        &code,
    )
    .await?;

    let mut tokens = client.tokens().write().await;
    tokens.store(token);
    tokens.save()?;
    log::info!(target: "auth", "Authorization complete, token cached");
    Ok(())
}

/// Makes sure the client holds a usable token: cached, refreshed, or freshly
/// authorized.
pub async fn ensure_token<R>(client: &SpotifyClient, input: &mut R) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
{
    let tokens = client.tokens().read().await;
    let authenticated = tokens.is_authenticated();
    let expired = tokens.is_token_expired();
    let refresh_token = tokens.refresh_token.clone();
    drop(tokens);

    if authenticated && !expired {
        log::debug!(target: "auth", "Using cached access token");
        return Ok(());
    }

    if let Some(rt) = refresh_token {
        log::info!(target: "auth", "Refreshing cached access token...");
        match refresh_user_token(
            client.http_client(),
            client.token_url(),
            client.credentials(),
            &rt,
        )
        .await
        {
            Ok(token) => {
                let mut tokens = client.tokens().write().await;
                tokens.store(token);
                if let Err(e) = tokens.save() {
                    log::error!(target: "auth", "Failed to save refreshed token: {}", e);
                }
                return Ok(());
            }
            Err(e) => {
                log::warn!(target: "auth", "Token refresh failed: {}. Re-authorizing.", e);
            }
        }
    }

    authorize_interactive(client, input).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_url_carries_scopes_and_state() {
        let url = build_auth_url("abc", "http://localhost:8888/callback", "xyz");
        assert!(url.starts_with(AUTH_URL));
        assert!(url.contains("client_id=abc"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8888%2Fcallback"));
        assert!(url.contains("user-modify-playback-state"));
        assert!(url.contains("state=xyz"));
    }

    #[test]
    fn redirect_yields_code() {
        let code = parse_redirect(
            "http://localhost:8888/callback?code=AQD123&state=s1",
            "s1",
        )
        .unwrap();
        assert_eq!(code, "AQD123");
    }

    #[test]
    fn redirect_with_wrong_state_is_rejected() {
        let err = parse_redirect("http://localhost:8888/callback?code=a&state=bad", "good")
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn redirect_with_error_is_rejected() {
        let err = parse_redirect(
            "http://localhost:8888/callback?error=access_denied&state=s",
            "s",
        )
        .unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn states_are_unique() {
        assert_ne!(generate_state(), generate_state());
    }
}
