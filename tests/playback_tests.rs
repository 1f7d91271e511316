//! Playback session tests: an in-memory player for state and ramp timing,
//! and a mock Web API for the request shapes.

use async_trait::async_trait;
use serde_json::json;
use spotify_controller::api::client::SpotifyClient;
use spotify_controller::api::models::{CurrentlyPlaying, Device};
use spotify_controller::config::{SpotifyCredentials, TokenCache};
use spotify_controller::error::{AppError, AppResult};
use spotify_controller::playback::{DeviceSelector, PlaybackSession, PlayerControl, RampPlan};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn device(id: &str, name: &str, volume: Option<u8>) -> Device {
    Device {
        id: Some(id.to_string()),
        name: name.to_string(),
        device_type: "Computer".to_string(),
        is_active: false,
        is_private_session: false,
        is_restricted: false,
        volume_percent: volume,
    }
}

#[derive(Default)]
struct FakePlayer {
    devices: Vec<Device>,
    calls: Mutex<Vec<String>>,
    volumes: Mutex<Vec<u8>>,
    fail_volume: bool,
}

impl FakePlayer {
    fn with_devices(devices: Vec<Device>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn volumes(&self) -> Vec<u8> {
        self.volumes.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PlayerControl for FakePlayer {
    async fn devices(&self) -> AppResult<Vec<Device>> {
        Ok(self.devices.clone())
    }

    async fn start_playback(&self, device_id: &str, uris: &[String]) -> AppResult<()> {
        self.record(format!("play {} {}", device_id, uris.len()));
        Ok(())
    }

    async fn resume(&self, device_id: &str) -> AppResult<()> {
        self.record(format!("resume {}", device_id));
        Ok(())
    }

    async fn pause(&self, device_id: &str) -> AppResult<()> {
        self.record(format!("pause {}", device_id));
        Ok(())
    }

    async fn next(&self, device_id: &str) -> AppResult<()> {
        self.record(format!("next {}", device_id));
        Ok(())
    }

    async fn previous(&self, device_id: &str) -> AppResult<()> {
        self.record(format!("previous {}", device_id));
        Ok(())
    }

    async fn set_volume(&self, device_id: &str, volume_percent: u8) -> AppResult<()> {
        self.record(format!("volume {} {}", device_id, volume_percent));
        if self.fail_volume {
            return Err(AppError::SpotifyApi {
                status: 502,
                message: "bad gateway".into(),
            });
        }
        self.volumes.lock().unwrap().push(volume_percent);
        Ok(())
    }

    async fn current_playback(&self) -> AppResult<Option<CurrentlyPlaying>> {
        Ok(None)
    }
}

async fn session_on(player: Arc<FakePlayer>) -> PlaybackSession {
    let session = PlaybackSession::new(player);
    session
        .select_device(DeviceSelector::Id("dev-1".into()))
        .await
        .unwrap();
    session
}

// =============================================================================
// Device selection
// =============================================================================

mod devices {
    use super::*;

    #[tokio::test]
    async fn test_select_by_name_is_case_insensitive_substring() {
        let player = Arc::new(FakePlayer::with_devices(vec![
            device("a", "Kitchen Speaker", None),
            device("b", "SpotifyBot-Linux", None),
        ]));
        let session = PlaybackSession::new(player);

        let id = session
            .select_device(DeviceSelector::Name("spotifybot".into()))
            .await
            .unwrap();
        assert_eq!(id, "b");
        assert_eq!(session.device_id().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_unknown_name_is_no_device() {
        let player = Arc::new(FakePlayer::with_devices(vec![device("a", "Kitchen", None)]));
        let session = PlaybackSession::new(player);

        let result = session
            .select_device(DeviceSelector::Name("Garage".into()))
            .await;
        assert!(matches!(result, Err(AppError::NoDevice(_))));
        assert!(session.device_id().await.is_none());
    }

    #[tokio::test]
    async fn test_first_device_fallback() {
        let player = Arc::new(FakePlayer::with_devices(vec![
            device("a", "Kitchen", None),
            device("b", "Bedroom", None),
        ]));
        let session = PlaybackSession::new(player);

        let id = session.select_device(DeviceSelector::First).await.unwrap();
        assert_eq!(id, "a");
    }

    #[tokio::test]
    async fn test_commands_without_device_fail() {
        let player = Arc::new(FakePlayer::default());
        let session = PlaybackSession::new(player.clone());

        assert!(matches!(session.pause().await, Err(AppError::NoDevice(_))));
        assert!(matches!(session.next_track().await, Err(AppError::NoDevice(_))));
        assert!(matches!(session.set_volume(30).await, Err(AppError::NoDevice(_))));
        assert!(player.calls().is_empty());
    }
}

// =============================================================================
// Transport and volume
// =============================================================================

mod transport {
    use super::*;

    #[tokio::test]
    async fn test_playback_updates_state() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        let uris: Vec<String> = (0..3).map(|i| format!("spotify:track:{}", i)).collect();
        session.start_playback(&uris).await.unwrap();
        let status = session.status().await;
        assert!(status.is_playing);
        assert_eq!(status.track_count, 3);

        session.pause().await.unwrap();
        assert!(!session.is_playing().await);

        session.resume().await.unwrap();
        assert!(session.is_playing().await);

        session.next_track().await.unwrap();
        session.previous_track().await.unwrap();

        assert_eq!(
            player.calls(),
            vec![
                "play dev-1 3",
                "pause dev-1",
                "resume dev-1",
                "next dev-1",
                "previous dev-1"
            ]
        );
    }

    #[tokio::test]
    async fn test_volume_accepts_only_0_to_100() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        session.set_volume(0).await.unwrap();
        session.set_volume(100).await.unwrap();
        assert_eq!(session.status().await.current_volume, 100);

        for bad in [-1, 101, 255, 1000] {
            let result = session.set_volume(bad).await;
            assert!(matches!(result, Err(AppError::InvalidInput(_))), "{bad}");
        }

        assert_eq!(player.volumes(), vec![0, 100]);
        assert_eq!(session.status().await.current_volume, 100);
    }

    #[tokio::test]
    async fn test_failed_volume_call_keeps_state() {
        let player = Arc::new(FakePlayer {
            fail_volume: true,
            ..Default::default()
        });
        let session = session_on(player).await;

        let before = session.status().await.current_volume;
        assert!(session.set_volume(20).await.is_err());
        assert_eq!(session.status().await.current_volume, before);
    }

    #[tokio::test]
    async fn test_current_volume_prefers_device_report() {
        let player = Arc::new(FakePlayer::with_devices(vec![device("dev-1", "Bot", Some(64))]));
        let session = session_on(player).await;

        assert_eq!(session.current_volume().await, 64);
        assert_eq!(session.status().await.current_volume, 64);
    }

    #[tokio::test]
    async fn test_stop_resets_session() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        let uris = vec!["spotify:track:1".to_string()];
        session
            .play_playlist_with_ramp(&uris, Some("Evening"), None)
            .await
            .unwrap();
        assert_eq!(
            session.status().await.current_playlist.as_deref(),
            Some("Evening")
        );

        session.stop().await.unwrap();
        let status = session.status().await;
        assert!(!status.is_playing);
        assert!(status.current_playlist.is_none());
        assert_eq!(status.track_count, 0);
        assert_eq!(player.calls().last().map(String::as_str), Some("pause dev-1"));
    }
}

// =============================================================================
// Volume ramp
// =============================================================================

mod ramp {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ramp_runs_to_end_volume() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        session
            .start_ramp(RampPlan::new(10, 80, Duration::from_secs(300), 2))
            .await
            .unwrap();
        assert!(session.is_ramping().await);
        assert_eq!(player.volumes(), vec![10]);

        tokio::time::sleep(Duration::from_secs(301)).await;

        assert!(!session.is_ramping().await);
        assert_eq!(session.status().await.current_volume, 80);

        let volumes = player.volumes();
        assert_eq!(volumes.len(), 36);
        assert_eq!(volumes.first(), Some(&10));
        assert_eq!(volumes.last(), Some(&80));
        assert!(volumes.windows(2).all(|w| w[1] == w[0] + 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_last_applied_step() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        session
            .start_ramp(RampPlan::new(10, 80, Duration::from_secs(300), 2))
            .await
            .unwrap();

        // three ticks at ~8.57s each
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(session.stop_ramp().await);

        assert!(!session.is_ramping().await);
        assert_eq!(session.status().await.current_volume, 16);
        assert_eq!(player.volumes(), vec![10, 12, 14, 16]);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(player.volumes(), vec![10, 12, 14, 16]);

        assert!(!session.stop_ramp().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_ramp_is_rejected_while_active() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        let plan = RampPlan::new(10, 50, Duration::from_secs(60), 5);
        session.start_ramp(plan).await.unwrap();

        let second = session.start_ramp(plan).await;
        assert!(matches!(second, Err(AppError::RampAlreadyActive)));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!session.is_ramping().await);
        session.start_ramp(plan).await.unwrap();
        assert!(session.is_ramping().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ramp_started_while_stopping_stays_active() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        let plan = RampPlan::new(10, 50, Duration::from_secs(60), 5);
        session.start_ramp(plan).await.unwrap();

        let (stopped, restarted) = tokio::join!(session.stop_ramp(), session.start_ramp(plan));
        assert!(stopped);
        restarted.unwrap();
        assert!(session.is_ramping().await);

        let second = session.start_ramp(plan).await;
        assert!(matches!(second, Err(AppError::RampAlreadyActive)));

        assert!(session.stop_ramp().await);
        assert!(!session.is_ramping().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_start_volume_aborts_ramp() {
        let player = Arc::new(FakePlayer {
            fail_volume: true,
            ..Default::default()
        });
        let session = session_on(player.clone()).await;

        // the start volume itself fails, so no ramp is started
        let result = session
            .start_ramp(RampPlan::new(10, 20, Duration::from_secs(10), 2))
            .await;
        assert!(result.is_err());
        assert!(!session.is_ramping().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_volume_during_ramp_is_overwritten_next_tick() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        session
            .start_ramp(RampPlan::new(10, 30, Duration::from_secs(100), 2))
            .await
            .unwrap();
        session.set_volume(90).await.unwrap();
        assert_eq!(session.status().await.current_volume, 90);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(session.status().await.current_volume, 12);

        session.stop_ramp().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_ramp_then_pauses() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        let uris = vec!["spotify:track:1".to_string()];
        session
            .play_playlist_with_ramp(
                &uris,
                Some("Wake Up"),
                Some(RampPlan::new(10, 50, Duration::from_secs(200), 2)),
            )
            .await
            .unwrap();
        assert!(session.status().await.volume_ramp_active);

        session.stop().await.unwrap();
        assert!(!session.is_ramping().await);

        let volumes_after_stop = player.volumes();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(player.volumes(), volumes_after_stop);
    }

    #[tokio::test]
    async fn test_invalid_plan_is_rejected() {
        let player = Arc::new(FakePlayer::default());
        let session = session_on(player.clone()).await;

        let result = session
            .start_ramp(RampPlan::new(10, 120, Duration::from_secs(10), 2))
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
        assert!(player.volumes().is_empty());
    }
}

// =============================================================================
// Web API request shapes
// =============================================================================

mod web_api {
    use super::*;

    fn client(server: &MockServer, tokens: TokenCache) -> Arc<SpotifyClient> {
        let credentials = SpotifyCredentials {
            client_id: "client".into(),
            client_secret: "secret".into(),
            ..Default::default()
        };
        Arc::new(
            SpotifyClient::new(credentials, Arc::new(RwLock::new(tokens)))
                .unwrap()
                .with_base_url(server.uri())
                .with_token_url(format!("{}/api/token", server.uri())),
        )
    }

    #[tokio::test]
    async fn test_start_playback_and_volume_requests() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/me/player/play"))
            .and(query_param("device_id", "dev-1"))
            .and(body_json(json!({ "uris": ["spotify:track:1", "spotify:track:2"] })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/me/player/volume"))
            .and(query_param("volume_percent", "40"))
            .and(query_param("device_id", "dev-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("PUT"))
            .and(path("/me/player/pause"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/me/player/next"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let session = PlaybackSession::new(client(&server, TokenCache::with_access_token("t")));
        session
            .select_device(DeviceSelector::Id("dev-1".into()))
            .await
            .unwrap();

        let uris = vec!["spotify:track:1".to_string(), "spotify:track:2".to_string()];
        session.start_playback(&uris).await.unwrap();
        session.set_volume(40).await.unwrap();
        session.next_track().await.unwrap();
        session.pause().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/me/player/pause"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Restriction violated"))
            .mount(&server)
            .await;

        let session = PlaybackSession::new(client(&server, TokenCache::with_access_token("t")));
        session
            .select_device(DeviceSelector::Id("dev-1".into()))
            .await
            .unwrap();

        match session.pause().await {
            Err(AppError::SpotifyApi { status, message }) => {
                assert_eq!(status, 403);
                assert!(message.contains("Restriction"));
            }
            other => panic!("expected SpotifyApi error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_nothing_playing_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/me/player"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let session = PlaybackSession::new(client(&server, TokenCache::with_access_token("t")));
        assert!(session.playback_state().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_playback_state_snapshot() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/me/player"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device": {
                    "id": "dev-1",
                    "name": "SpotifyBot",
                    "type": "Computer",
                    "volume_percent": 35
                },
                "is_playing": true,
                "progress_ms": 65000,
                "item": {
                    "name": "Holocene",
                    "artists": [{ "name": "Bon Iver" }],
                    "duration_ms": 337000,
                    "uri": "spotify:track:h"
                }
            })))
            .mount(&server)
            .await;

        let session = PlaybackSession::new(client(&server, TokenCache::with_access_token("t")));
        let state = session.playback_state().await.unwrap().unwrap();
        assert!(state.is_playing);
        assert_eq!(state.track_name, "Holocene");
        assert_eq!(state.artists, "Bon Iver");
        assert_eq!(state.progress_ms, 65000);
        assert_eq!(state.volume_percent, Some(35));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .and(header("authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/me/player/devices"))
            .and(header("authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "devices": [{ "id": "dev-1", "name": "SpotifyBot", "type": "Computer" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut tokens = TokenCache::with_access_token("stale");
        tokens.refresh_token = Some("refresh".into());
        let client = client(&server, tokens);

        let devices = client.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(
            client.tokens().read().await.access_token.as_deref(),
            Some("fresh")
        );
    }
}
