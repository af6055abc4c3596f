//! Commentary and speech clients against a mock HTTP server.

use emocap_ml_client::{
    CommentaryClient, CommentaryConfig, CommentaryGenerator, MlClientError, SpeechClient,
    SpeechConfig, SpeechSynthesizer,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn commentary_config(server: &MockServer) -> CommentaryConfig {
    CommentaryConfig {
        api_url: format!("{}/v2/chat/completions", server.uri()),
        api_key: "test-key".to_string(),
        model: "vision-model".to_string(),
        timeout_secs: 5,
        ..CommentaryConfig::default()
    }
}

#[tokio::test]
async fn test_commentary_returns_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({ "model": "vision-model" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Nice hat. Worth 3 cents.  " } }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let photo = dir.path().join("happy_moment.jpg");
    std::fs::write(&photo, [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();

    let client = CommentaryClient::new(commentary_config(&server)).unwrap();
    let comment = client.generate(&photo).await.unwrap();
    assert_eq!(comment.as_deref(), Some("Nice hat. Worth 3 cents."));
}

#[tokio::test]
async fn test_commentary_without_choices_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error_code": 17 })))
        .mount(&server)
        .await;

    let client = CommentaryClient::new(commentary_config(&server)).unwrap();
    assert_eq!(client.comment_on(&[1, 2, 3]).await.unwrap(), None);
}

#[tokio::test]
async fn test_commentary_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let client = CommentaryClient::new(commentary_config(&server)).unwrap();
    let err = client.comment_on(&[1]).await.unwrap_err();
    assert!(matches!(err, MlClientError::Status { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_commentary_missing_image_is_io_error() {
    let server = MockServer::start().await;
    let client = CommentaryClient::new(commentary_config(&server)).unwrap();
    let err = client
        .generate(std::path::Path::new("/definitely/not/here.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, MlClientError::Io(_)));
}

#[tokio::test]
async fn test_speech_streams_to_voice_file() {
    let server = MockServer::start().await;
    let audio = vec![7u8; 20_000];
    Mock::given(method("POST"))
        .and(path("/synthesize"))
        .and(body_partial_json(json!({ "text": "hello" })))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(audio.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = SpeechClient::new(SpeechConfig {
        api_url: format!("{}/synthesize", server.uri()),
        timeout_secs: 5,
        output_dir: dir.path().join("output_voice"),
    })
    .unwrap();

    let written = client.synthesize("hello", "happy_moment.wav").await.unwrap();
    assert_eq!(written, dir.path().join("output_voice").join("voice_happy_moment.wav"));
    assert_eq!(std::fs::read(&written).unwrap(), audio);
}

#[tokio::test]
async fn test_speech_failure_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = SpeechClient::new(SpeechConfig {
        api_url: format!("{}/synthesize", server.uri()),
        timeout_secs: 5,
        output_dir: dir.path().to_path_buf(),
    })
    .unwrap();

    let err = client.synthesize("hello", "x.wav").await.unwrap_err();
    assert!(matches!(err, MlClientError::Status { status: 500, .. }));
    assert!(!dir.path().join("voice_x.wav").exists());
}
