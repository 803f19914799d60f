use super::*;
use crate::config::LlmConfig;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HuggingFaceClient {
    let config = Config {
        llm: LlmConfig {
            endpoint: format!("{}/models", server.uri()),
            model: "Qwen/Qwen2.5-7B-Instruct".to_string(),
            ..LlmConfig::default()
        },
        ..Config::default()
    };
    HuggingFaceClient::new(&config)
        .expect("client builds")
        .with_token(Some("hf_test_token".to_string()))
}

#[test]
fn model_url_appends_model_id() {
    let config = Config {
        llm: LlmConfig {
            endpoint: "https://inference.example.com/models/".to_string(),
            model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
            ..LlmConfig::default()
        },
        ..Config::default()
    };
    let client = HuggingFaceClient::new(&config).expect("client builds");

    assert_eq!(
        client.model_url().as_str(),
        "https://inference.example.com/models/mistralai/Mistral-7B-Instruct-v0.3"
    );
}

#[tokio::test]
async fn generate_posts_prompt_with_sampling_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/models/Qwen/Qwen2.5-7B-Instruct"))
        .and(header("Authorization", "Bearer hf_test_token"))
        .and(body_partial_json(json!({
            "inputs": "What is osmosis?",
            "parameters": {
                "max_new_tokens": 400,
                "return_full_text": false
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "generated_text": "\n Osmosis is the diffusion of water across a membrane. " }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let answer = tokio::task::spawn_blocking(move || client.generate("What is osmosis?"))
        .await
        .expect("task joins")
        .expect("generation succeeds");

    assert_eq!(answer, "Osmosis is the diffusion of water across a membrane.");
}

#[tokio::test]
async fn single_object_response_is_accepted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "generated_text": "Photosynthesis." })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let answer = tokio::task::spawn_blocking(move || client.generate("prompt"))
        .await
        .expect("task joins")
        .expect("generation succeeds");

    assert_eq!(answer, "Photosynthesis.");
}

#[tokio::test]
async fn rate_limited_backend_is_a_model_error_without_retry() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({ "error": "Rate limit reached" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate("prompt"))
        .await
        .expect("task joins");

    assert!(matches!(result, Err(RagError::Model(_))));
}

#[tokio::test]
async fn error_body_is_a_model_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "error": "Model is currently loading" })),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate("prompt"))
        .await
        .expect("task joins");

    match result {
        Err(RagError::Model(message)) => assert!(message.contains("currently loading")),
        other => panic!("expected a model error, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_generation_list_is_a_model_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = tokio::task::spawn_blocking(move || client.generate("prompt"))
        .await
        .expect("task joins");

    assert!(matches!(result, Err(RagError::Model(_))));
}

#[test]
#[serial_test::serial(token_env)]
fn token_is_read_from_environment() {
    // SAFETY: tests touching this variable are serialized
    unsafe { std::env::set_var(TOKEN_ENV_VAR, "hf_from_env") };
    let client = HuggingFaceClient::new(&Config::default()).expect("client builds");
    // SAFETY: as above
    unsafe { std::env::remove_var(TOKEN_ENV_VAR) };

    assert_eq!(client.token.as_deref(), Some("hf_from_env"));
}

#[test]
#[serial_test::serial(token_env)]
fn blank_token_is_treated_as_missing() {
    // SAFETY: tests touching this variable are serialized
    unsafe { std::env::set_var(TOKEN_ENV_VAR, "   ") };
    let client = HuggingFaceClient::new(&Config::default()).expect("client builds");
    // SAFETY: as above
    unsafe { std::env::remove_var(TOKEN_ENV_VAR) };

    assert_eq!(client.token, None);
}
