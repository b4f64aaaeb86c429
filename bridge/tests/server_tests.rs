//! HTTP surface tests
//!
//! Exercise the router with `tower::ServiceExt::oneshot`; no socket is bound.

mod fixtures;

use std::sync::Arc;

use axum::{Router, body::Body, http::Request, http::StatusCode, routing::get};
use serde_json::Value;
use tower::util::ServiceExt;

use fixtures::MockRoom;
use telephony_bridge::config::BridgeConfig;
use telephony_bridge::handlers::api::health_check;
use telephony_bridge::routes;
use telephony_bridge::state::AppState;

fn test_state(config: BridgeConfig) -> Arc<AppState> {
    AppState::with_room(config, Arc::new(MockRoom::new()), None, None)
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .merge(routes::telephony::create_telephony_router())
        .with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check_reports_settings() {
    let mut config = BridgeConfig::default();
    config.noise.decoder_path = "telephony-bridge-missing-decoder".to_string();
    config.noise.volume = 0.3;
    let state = test_state(config);

    let response = app(state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "telephony-bridge");
    assert_eq!(json["accept_incoming_calls"], true);
    assert_eq!(json["active_calls"], 0);
    assert_eq!(json["background_noise"]["decoder_available"], false);
    assert!((json["background_noise"]["volume"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    assert_eq!(json["vad"]["backend"], "energy");
    assert!(json["noise_cancellation"]["enabled"].is_boolean());
    assert!(json["interruption"]["cooldown_ms"].is_u64());
}

#[tokio::test]
async fn test_health_check_reports_rejection_mode() {
    let mut config = BridgeConfig::default();
    config.accept_incoming_calls = false;
    config.noise.decoder_path = "telephony-bridge-missing-decoder".to_string();

    let response = app(test_state(config))
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["accept_incoming_calls"], false);
}

#[tokio::test]
async fn test_telephony_route_requires_upgrade() {
    let response = app(test_state(BridgeConfig::default()))
        .oneshot(
            Request::builder()
                .uri("/telephony/room-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let response = app(test_state(BridgeConfig::default()))
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_active_call_guard() {
    let state = test_state(BridgeConfig::default());
    assert_eq!(state.active_calls(), 0);
    {
        let _first = state.track_call();
        let _second = state.track_call();
        assert_eq!(state.active_calls(), 2);
    }
    assert_eq!(state.active_calls(), 0);
}
