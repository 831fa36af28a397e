use super::helpers::*;
use crate::imagegen::interface::{AspectRatio, ErrorKind, GenerationRequest, ImageGenProvider};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .and(header("authorization", "Bearer test-key"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "image": png_b64(),
            "finish_reason": "SUCCESS",
            "seed": 42
        })))
        .mount(server)
        .await;
}

async fn mount_error(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn has_field(body: &str, name: &str) -> bool {
    body.contains(&format!("name=\"{}\"", name))
}

// ── Form Layout ─────────────────────────────────────────────

#[tokio::test]
async fn test_text_to_image_sends_aspect_ratio() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let tmp = tempfile::TempDir::new().unwrap();
    let provider = stability(&server.uri(), tmp.path());

    let request = GenerationRequest::text_to_image("a red fox", 2, AspectRatio::Landscape);
    let images = provider.generate(&request).await.unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].data, png_bytes());

    let bodies = request_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    let body = &bodies[0];
    assert!(has_field(body, "prompt"));
    assert!(body.contains("a red fox\nVariation 1."));
    assert!(has_field(body, "model") && body.contains("sd3.5-flash"));
    assert!(has_field(body, "output_format"));
    assert!(has_field(body, "aspect_ratio") && body.contains("16:9"));
    assert!(!has_field(body, "image"));
    assert!(!has_field(body, "strength"));
    assert!(bodies[1].contains("Variation 2."));
}

#[tokio::test]
async fn test_image_to_image_uploads_file_and_omits_aspect_ratio() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let tmp = tempfile::TempDir::new().unwrap();
    let source = tmp.path().join("input.jpg");
    std::fs::write(&source, png_bytes()).unwrap();
    let provider = stability(&server.uri(), tmp.path());

    let request = GenerationRequest::image_to_image(
        "watercolor",
        source.to_str().unwrap(),
        1,
        AspectRatio::Portrait,
        0.5,
    );
    let images = provider.generate(&request).await.unwrap();
    assert_eq!(images.len(), 1);

    let body = &request_bodies(&server).await[0];
    assert!(has_field(body, "mode") && body.contains("image-to-image"));
    assert!(has_field(body, "strength") && body.contains("0.5"));
    assert!(has_field(body, "image") && body.contains("filename=\"input.png\""));
    assert!(!has_field(body, "aspect_ratio"));
    assert!(source.exists(), "caller's file must be left alone");
}

#[tokio::test]
async fn test_data_uri_source_is_staged_and_removed() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let tmp = tempfile::TempDir::new().unwrap();
    let staging = tmp.path().join("staging");
    let provider = stability(&server.uri(), &staging);

    let data_uri = format!("data:image/png;base64,{}", png_b64());
    let request = GenerationRequest::image_to_image("sketch", data_uri, 1, AspectRatio::Square, 0.75);
    provider.generate(&request).await.unwrap();

    assert_eq!(request_count(&server).await, 1);
    let leftovers = std::fs::read_dir(&staging).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0, "staged temp files must be cleaned up");
}

// ── Pre-flight Failures ─────────────────────────────────────

#[tokio::test]
async fn test_missing_source_file_fails_without_request() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let tmp = tempfile::TempDir::new().unwrap();
    let provider = stability(&server.uri(), tmp.path());

    let missing = tmp.path().join("gone.png");
    let request = GenerationRequest::image_to_image(
        "a red fox",
        format!("file://{}", missing.display()),
        2,
        AspectRatio::Square,
        0.75,
    );
    let err = provider.generate(&request).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_oversize_source_fails_without_request() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let tmp = tempfile::TempDir::new().unwrap();
    let source = tmp.path().join("huge.png");
    std::fs::write(&source, vec![0u8; 4096]).unwrap();
    let provider = stability_with(&server.uri(), Some(TEST_KEY), tmp.path(), 1024);

    let request = GenerationRequest::image_to_image("x", source.to_str().unwrap(), 1, AspectRatio::Square, 0.75);
    let err = provider.generate(&request).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert!(err.message.contains("too large"));
    assert_eq!(request_count(&server).await, 0);
}

#[tokio::test]
async fn test_missing_key_is_config_error() {
    let server = MockServer::start().await;
    mount_ok(&server).await;
    let tmp = tempfile::TempDir::new().unwrap();
    let provider = stability_with(&server.uri(), None, tmp.path(), 1024);

    let request = GenerationRequest::text_to_image("a red fox", 1, AspectRatio::Square);
    let err = provider.generate(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ConfigError);
    assert_eq!(request_count(&server).await, 0);
}

// ── Error Mapping ───────────────────────────────────────────

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (401, "{\"name\":\"unauthorized\"}", ErrorKind::Unauthorized),
        (403, "{\"name\":\"forbidden\"}", ErrorKind::Unauthorized),
        (429, "{\"name\":\"too_many\"}", ErrorKind::RateLimited),
        (402, "{\"errors\":[\"quota exhausted for this account\"]}", ErrorKind::RateLimited),
        (400, "{\"errors\":[\"prompt: cannot be blank\"]}", ErrorKind::InvalidRequest),
        (500, "{\"name\":\"internal_error\"}", ErrorKind::Unknown),
    ];

    for (status, body, expected) in cases {
        let server = MockServer::start().await;
        mount_error(&server, status, body).await;
        let tmp = tempfile::TempDir::new().unwrap();
        let provider = stability(&server.uri(), tmp.path());
        let request = GenerationRequest::text_to_image("a red fox", 1, AspectRatio::Square);

        let err = provider.generate(&request).await.unwrap_err();
        assert_eq!(err.kind, expected, "status {} body {}", status, body);
    }
}

#[tokio::test]
async fn test_success_without_image_is_unknown() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STABILITY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "finish_reason": "CONTENT_FILTERED" })))
        .mount(&server)
        .await;
    let tmp = tempfile::TempDir::new().unwrap();
    let provider = stability(&server.uri(), tmp.path());

    let request = GenerationRequest::text_to_image("a red fox", 1, AspectRatio::Square);
    let err = provider.generate(&request).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unknown);
    assert_eq!(provider.guard().breaker().failure_count(), 1);
}
