use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use rosterhub_server::{api::app_router, build_state, config::Config, AppState};
use serde_json::json;
use tower::ServiceExt;

const WAIT: Duration = Duration::from_secs(2);

async fn build_test_app() -> (Router, Arc<AppState>) {
    let config = Config::default();
    let state = build_state(&config).await.unwrap();
    (app_router(state.clone(), &config), state)
}

async fn publish(app: &Router, payload: serde_json::Value) -> StatusCode {
    app.clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/v1/events")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
        .status()
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn stream_delivers_filtered_events_as_sse_frames() {
    let (app, state) = build_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/events/stream?target=party:parties/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(state.dispatcher.connection_count(), 1);
    assert_eq!(state.event_bus.subscriber_count(), 1);

    let status = publish(
        &app,
        json!({"kind": "PARTY_CREATED", "target": "party:parties/2", "message": "not mine"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let status = publish(
        &app,
        json!({"kind": "PARTY_UPDATED", "target": "party:parties/1", "message": "mine"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut text = String::new();
    while !text.contains("\n\n") {
        let chunk = tokio::time::timeout(WAIT, body.next())
            .await
            .expect("no frame received in time")
            .expect("stream ended early")
            .unwrap();
        text.push_str(&String::from_utf8_lossy(&chunk));
    }

    assert!(text.contains("event: PARTY_UPDATED\n"));
    assert!(text.contains("\"message\":\"mine\""));
    assert!(text.contains("\"target\":\"party:parties/1\""));
    assert!(!text.contains("not mine"));
    assert!(text.starts_with("id: "));
}

#[tokio::test]
async fn dropping_the_stream_closes_the_connection() {
    let (app, state) = build_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/events/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(state.dispatcher.connection_count(), 1);

    drop(response);
    assert!(wait_until(|| state.dispatcher.connection_count() == 0).await);
    assert_eq!(state.event_bus.subscriber_count(), 0);

    // Later publishes reach nobody and do not fail.
    let status = publish(
        &app,
        json!({"kind": "SYSTEM_NOTIFICATION", "target": "system", "broadcast": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_stream_request_is_not_an_error_response() {
    let (app, state) = build_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/events/stream?target=a&target=b")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.dispatcher.connection_count(), 0);
}
