//! Gemini backend against a mock HTTP server.

use std::time::Duration;

use aera_core::{BackoffPolicy, EmbeddingBackend, Error};
use aera_inference::{GeminiBackend, GeminiConfig, VisionBackend};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> GeminiConfig {
    GeminiConfig {
        base_url: server.uri(),
        api_key: Some("gem-key".to_string()),
        vision_model: "gemini-test".to_string(),
        vision_model_high: "gemini-test-pro".to_string(),
        embed_model: "embed-test".to_string(),
        embed_dimension: 3,
        timeout_seconds: 10,
        retry: BackoffPolicy::new(2, Duration::from_millis(5)),
    }
}

fn text_candidate(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn test_describe_image_sends_inline_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(query_param("key", "gem-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_candidate("A harbour at dawn")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(config_for(&server)).unwrap();
    let description = backend
        .describe_image(b"jpegbytes", "image/jpeg", Some("Describe"))
        .await
        .unwrap();
    assert_eq!(description, "A harbour at dawn");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], "Describe");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
}

#[tokio::test]
async fn test_high_quality_targets_high_model() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test-pro:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_candidate("detailed")))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(config_for(&server)).unwrap().high_quality();
    let description = backend.describe_image(b"x", "image/png", None).await.unwrap();
    assert_eq!(description, "detailed");
}

#[tokio::test]
async fn test_resource_exhausted_is_rate_limited_and_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}
        })))
        .expect(3)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(config_for(&server)).unwrap();
    let err = backend
        .describe_image(b"x", "image/png", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RateLimited(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_batch_embed_contents() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/embed-test:batchEmbedContents"))
        .and(query_param("key", "gem-key"))
        .and(body_partial_json(serde_json::json!({
            "requests": [
                {"model": "models/embed-test", "outputDimensionality": 3},
                {"model": "models/embed-test", "outputDimensionality": 3}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "embeddings": [
                {"values": [0.1, 0.2, 0.3]},
                {"values": [0.4, 0.5, 0.6]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(config_for(&server)).unwrap();
    let vectors = backend
        .embed_texts(&["a red coat".to_string(), "a beach".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[1].as_slice(), &[0.4, 0.5, 0.6]);
}

#[tokio::test]
async fn test_candidate_without_text_is_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"candidates": []})),
        )
        .mount(&server)
        .await;

    let backend = GeminiBackend::new(config_for(&server)).unwrap();
    let err = backend
        .describe_image(b"x", "image/png", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Inference(_)));
}
