//! Video client against a mock file-upload/generate API.

use std::sync::Arc;
use std::time::Duration;

use creative_extraction::testing::creative;
use creative_extraction::{
    Backoff, BrandProfile, ExtractionClient, KeyRotator, MediaType, RotatorConfig,
    VideoClientConfig, VideoExtractionClient,
};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "models/test-model";

fn config(server: &MockServer) -> VideoClientConfig {
    VideoClientConfig::default()
        .with_base_url(server.uri())
        .with_model(MODEL)
        .with_backoff(Backoff::new(2, Duration::from_millis(10)))
        .with_poll(Duration::from_millis(10), Duration::from_secs(2))
}

async fn mount_happy_path(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/assets/clip.mp4"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "video/mp4")
                .set_body_bytes(b"fake-video-bytes".to_vec()),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .and(header("X-Goog-Upload-Protocol", "raw"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": {
                "name": "files/abc123",
                "uri": format!("{}/v1beta/files/abc123", server.uri()),
                "mimeType": "video/mp4",
                "state": "PROCESSING"
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1beta/files/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "files/abc123",
            "uri": format!("{}/v1beta/files/abc123", server.uri()),
            "mimeType": "video/mp4",
            "state": "ACTIVE"
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/v1beta/{MODEL}:generateContent")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "{\"hook\": \"Wait for it\", \"keywords\": [\"shoes\"]}"}]}
            }]
        })))
        .mount(server)
        .await;
}

fn video(server: &MockServer) -> creative_extraction::Creative {
    creative(
        "ad-1",
        &format!("{}/assets/clip.mp4", server.uri()),
        MediaType::Video,
    )
}

#[tokio::test]
async fn test_upload_poll_generate() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let rotator = Arc::new(KeyRotator::from_keys(["key-a"], RotatorConfig::default()).unwrap());
    let client = VideoExtractionClient::new(rotator).with_config(config(&server));

    let record = client
        .extract(&video(&server), &BrandProfile::new("Acme"))
        .await
        .expect("video extracted");
    assert_eq!(record.get("hook"), Some(&json!("Wait for it")));
}

#[tokio::test]
async fn test_exhausted_key_switches_before_next_call() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    // Upload and generate each spend one use
    let rotator = Arc::new(
        KeyRotator::from_keys(
            ["key-a", "key-b"],
            RotatorConfig::default()
                .with_threshold(3)
                .with_cooldown(Duration::from_secs(600)),
        )
        .unwrap(),
    );
    let client = VideoExtractionClient::new(rotator.clone()).with_config(config(&server));
    let brand = BrandProfile::new("Acme");

    assert!(client.extract(&video(&server), &brand).await.is_some());
    assert!(client.extract(&video(&server), &brand).await.is_some());

    // key-a's third use was the second upload; generate ran on key-b
    let states = rotator.states().await;
    assert!(states[0].cooling_down);
    assert_eq!(states[0].used, 0);
    assert!(!states[1].cooling_down);
    assert_eq!(states[1].used, 1);
}

#[tokio::test]
async fn test_threshold_two_still_extracts() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let rotator = Arc::new(
        KeyRotator::from_keys(
            ["key-a", "key-b", "key-c"],
            RotatorConfig::default()
                .with_threshold(2)
                .with_cooldown(Duration::from_millis(50)),
        )
        .unwrap(),
    );
    let client = VideoExtractionClient::new(rotator.clone()).with_config(config(&server));
    let brand = BrandProfile::new("Acme");

    for _ in 0..3 {
        assert!(client.extract(&video(&server), &brand).await.is_some());
    }
}

#[tokio::test]
async fn test_threshold_one_waits_out_cooldown() {
    let server = MockServer::start().await;
    mount_happy_path(&server).await;

    let rotator = Arc::new(
        KeyRotator::from_keys(
            ["key-a"],
            RotatorConfig::default()
                .with_threshold(1)
                .with_cooldown(Duration::from_millis(20)),
        )
        .unwrap(),
    );
    let client = VideoExtractionClient::new(rotator).with_config(config(&server));

    let record = client
        .extract(&video(&server), &BrandProfile::new("Acme"))
        .await
        .expect("single key recovers after cooldown");
    assert_eq!(record.get("hook"), Some(&json!("Wait for it")));
}

#[tokio::test]
async fn test_failed_processing_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"bytes".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/v1beta/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file": {"name": "files/bad", "state": "FAILED"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let rotator = Arc::new(KeyRotator::from_keys(["key-a"], RotatorConfig::default()).unwrap());
    let client = VideoExtractionClient::new(rotator).with_config(config(&server));

    assert!(client
        .extract(&video(&server), &BrandProfile::new("Acme"))
        .await
        .is_none());
}
