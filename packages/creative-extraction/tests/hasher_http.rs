//! Content hashing over HTTP.

use creative_extraction::error::FetchError;
use creative_extraction::hasher::prefix_hash;
use creative_extraction::{ContentHash, ContentHasher, HasherConfig, HttpContentHasher, MediaType};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn serve(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_video_hash_covers_prefix_only() {
    let server = MockServer::start().await;
    serve(&server, "/one.mp4", b"SAMEPREFIX-tail-one").await;
    serve(&server, "/two.mp4", b"SAMEPREFIX-tail-two-longer").await;

    let hasher = HttpContentHasher::new()
        .with_config(HasherConfig::default().with_video_prefix_bytes(10));

    let one = hasher
        .hash(&format!("{}/one.mp4", server.uri()), MediaType::Video)
        .await
        .unwrap();
    let two = hasher
        .hash(&format!("{}/two.mp4", server.uri()), MediaType::Video)
        .await
        .unwrap();

    assert_eq!(one, two);
    assert_eq!(one, prefix_hash(b"SAMEPREFIX-tail-one", 10));
}

#[tokio::test]
async fn test_image_hash_covers_whole_body() {
    let server = MockServer::start().await;
    serve(&server, "/one.jpg", b"SAMEPREFIX-tail-one").await;
    serve(&server, "/two.jpg", b"SAMEPREFIX-tail-two").await;

    let hasher = HttpContentHasher::new()
        .with_config(HasherConfig::default().with_video_prefix_bytes(10));

    let one = hasher
        .hash(&format!("{}/one.jpg", server.uri()), MediaType::Image)
        .await
        .unwrap();
    let two = hasher
        .hash(&format!("{}/two.jpg", server.uri()), MediaType::Image)
        .await
        .unwrap();

    assert_ne!(one, two);
    assert_eq!(one, ContentHash::of_bytes(b"SAMEPREFIX-tail-one"));
    assert_eq!(one.as_str().len(), 64);
}

#[tokio::test]
async fn test_missing_asset_is_a_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = format!("{}/gone.jpg", server.uri());
    let err = HttpContentHasher::new()
        .hash(&url, MediaType::Image)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404, url: ref u } if *u == url));
}
