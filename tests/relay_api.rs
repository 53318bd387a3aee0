mod common;

use std::sync::atomic::Ordering;

use axum::http::{StatusCode, header};
use ritual_cards::application::relay::{RELAY_CACHE_CONTROL, relay_path};
use serde_json::Value;

use common::*;

#[tokio::test]
async fn allow_listed_image_is_relayed_with_cors_and_cache_headers() {
    let app = stub_app();
    let uri = relay_path("https://pbs.twimg.com/profile_images/1/avatar.gif");

    let response = send(&app.router, get(&uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_TYPE), "image/gif");
    assert_eq!(
        header_value(&response, header::CACHE_CONTROL),
        RELAY_CACHE_CONTROL
    );
    assert_eq!(
        header_value(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        "*"
    );
    assert_eq!(body_bytes(response).await, GIF_1X1);
}

#[tokio::test]
async fn subdomain_of_allowed_host_is_relayed() {
    let app = stub_app();

    let response = send(&app.router, get(&relay_path("https://sub.twimg.com/a.png"))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.images.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn foreign_host_is_forbidden_without_fetching() {
    let app = stub_app();

    for target in ["https://evil.com/a.png", "https://twimg.com.evil.com/a.png"] {
        let response = send(&app.router, get(&relay_path(target))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{target}");
    }
    assert_eq!(app.images.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_or_malformed_url_is_a_bad_request() {
    let app = stub_app();

    let response = send(&app.router, get("/api/img")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(&app.router, get(&relay_path("not a url"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(app.images.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upstream_failure_is_a_bad_gateway() {
    let app = stub_app();

    let response = send(
        &app.router,
        get(&relay_path("https://pbs.twimg.com/missing.jpg")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn transport_failure_is_a_server_error() {
    let app = stub_app();

    let response = send(
        &app.router,
        get(&relay_path("https://pbs.twimg.com/unreachable.jpg")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["error"]["code"], "relay_error");
    assert_eq!(app.images.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn profile_endpoint_returns_normalized_record() {
    let app = stub_app();

    let response = send(&app.router, get("/api/profile/@Example")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["handle"], "Example");
    assert_eq!(body["displayName"], "Example Person");
    assert_eq!(body["followingCount"], 3400);
    assert!(
        body["avatarUrl"]
            .as_str()
            .unwrap()
            .starts_with("/api/img?url=https%3A%2F%2Fpbs.twimg.com")
    );
}

#[tokio::test]
async fn roles_endpoint_lists_every_tier() {
    let app = stub_app();

    let body: Value =
        serde_json::from_str(&body_text(send(&app.router, get("/api/roles")).await).await)
            .unwrap();
    let roles = body["roles"].as_array().unwrap();

    assert_eq!(roles.len(), 6);
    let mage = roles.iter().find(|role| role["slug"] == "mage").unwrap();
    assert_eq!(mage["stars"], 3);
    assert_eq!(mage["rarity_label"], "MAGE");
}

#[tokio::test]
async fn health_is_no_content() {
    let app = stub_app();

    let response = send(&app.router, get("/_health")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
