// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! OpenAI-compatible gateway against a local mock server

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use vlm_detect::detection::{BoxEncoding, CornerBox, Detection, DetectionPipeline};
use vlm_detect::gateway::{
    Backend, GatewayConfig, GatewayError, ImageInput, InferenceGateway, OpenAiCompatGateway,
};

/// A request the mock server received: bearer header and JSON body
type Captured = (Option<String>, Value);

#[derive(Clone)]
struct MockState {
    status: StatusCode,
    reply: Value,
    requests: Arc<Mutex<Vec<Captured>>>,
}

async fn chat_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push((auth, body));
    (state.status, Json(state.reply.clone()))
}

/// Starts a mock backend and returns its root URL plus the captured requests
async fn spawn_mock(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let state = MockState {
        status,
        reply,
        requests: requests.clone(),
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(chat_handler))
        .route("/v1/models", get(|| async { Json(json!({"data": []})) }))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), requests)
}

fn reply_with(content: Value) -> Value {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }],
        "usage": { "prompt_tokens": 300, "completion_tokens": 20, "total_tokens": 320 }
    })
}

fn vllm_config(root: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: Some(format!("{}/v1", root)),
        ..GatewayConfig::new(Backend::Vllm)
    }
}

fn tgi_config(root: &str) -> GatewayConfig {
    GatewayConfig {
        base_url: Some(root.to_string()),
        ..GatewayConfig::new(Backend::Tgi)
    }
}

fn street_image() -> ImageInput {
    ImageInput::from("https://example.com/street.jpg")
}

#[tokio::test]
async fn test_vllm_request_shape() {
    let (root, requests) = spawn_mock(StatusCode::OK, reply_with(json!("{\"targets\": []}"))).await;
    let gateway = OpenAiCompatGateway::new(&vllm_config(&root)).unwrap();

    let text = gateway.infer("Outline each car.", &street_image(), None).await.unwrap();
    assert_eq!(text, "{\"targets\": []}");

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (auth, body) = &requests[0];
    assert_eq!(auth.as_deref(), Some("Bearer token-abc123"));
    assert_eq!(body["model"], "Qwen/Qwen2.5-VL-7B-Instruct");
    assert_eq!(body["top_k"], 40);
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"][0]["text"], "Outline each car.");
    assert_eq!(
        body["messages"][0]["content"][1]["image_url"]["url"],
        "https://example.com/street.jpg"
    );
}

#[tokio::test]
async fn test_tgi_system_message_and_no_auth() {
    let (root, requests) = spawn_mock(StatusCode::OK, reply_with(json!("ok"))).await;
    let gateway = OpenAiCompatGateway::new(&tgi_config(&root)).unwrap();

    gateway
        .infer("p", &street_image(), Some("Answer with JSON only."))
        .await
        .unwrap();

    let requests = requests.lock().unwrap();
    let (auth, body) = &requests[0];
    assert!(auth.is_none());
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "Answer with JSON only.");
    assert!(body.get("temperature").is_none());
}

#[tokio::test]
async fn test_pixels_sent_as_png_data_url() {
    let (root, requests) = spawn_mock(StatusCode::OK, reply_with(json!("ok"))).await;
    let gateway = OpenAiCompatGateway::new(&tgi_config(&root)).unwrap();
    let pixels = image::DynamicImage::new_rgb8(4, 4);

    gateway.infer("p", &ImageInput::from(pixels), None).await.unwrap();

    let requests = requests.lock().unwrap();
    let url = requests[0].1["messages"][0]["content"][1]["image_url"]["url"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(url.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_unauthorized_status() {
    let (root, _) = spawn_mock(StatusCode::UNAUTHORIZED, json!({"error": "bad key"})).await;
    let gateway = OpenAiCompatGateway::new(&vllm_config(&root)).unwrap();

    let err = gateway.infer("p", &street_image(), None).await.unwrap_err();
    match err {
        GatewayError::Unauthorized { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("bad key"));
        }
        other => panic!("expected unauthorized, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_status() {
    let (root, _) = spawn_mock(StatusCode::INTERNAL_SERVER_ERROR, json!({"error": "oom"})).await;
    let gateway = OpenAiCompatGateway::new(&tgi_config(&root)).unwrap();

    let err = gateway.infer("p", &street_image(), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_null_content_is_empty_response() {
    let (root, _) = spawn_mock(StatusCode::OK, reply_with(Value::Null)).await;
    let gateway = OpenAiCompatGateway::new(&tgi_config(&root)).unwrap();

    let err = gateway.infer("p", &street_image(), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::EmptyResponse));
}

#[tokio::test]
async fn test_no_choices_is_empty_response() {
    let (root, _) = spawn_mock(StatusCode::OK, json!({"choices": []})).await;
    let gateway = OpenAiCompatGateway::new(&tgi_config(&root)).unwrap();

    let err = gateway.infer("p", &street_image(), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::EmptyResponse));
}

#[tokio::test]
async fn test_unreachable_backend_is_http_error() {
    let config = GatewayConfig {
        base_url: Some("http://127.0.0.1:1".to_string()),
        ..GatewayConfig::new(Backend::Tgi)
    };
    let gateway = OpenAiCompatGateway::new(&config).unwrap();

    let err = gateway.infer("p", &street_image(), None).await.unwrap_err();
    assert!(matches!(err, GatewayError::Http(_)));
}

#[tokio::test]
async fn test_health_check_paths() {
    let (root, _) = spawn_mock(StatusCode::OK, json!({})).await;

    let vllm = OpenAiCompatGateway::new(&vllm_config(&root)).unwrap();
    assert!(vllm.health_check().await);

    let tgi = OpenAiCompatGateway::new(&tgi_config(&root)).unwrap();
    assert!(tgi.health_check().await);
}

#[tokio::test]
async fn test_pipeline_over_http() {
    let content = "Here you go:\n```json\n{\"targets\": [{\"bbox_2d\": [12, 40, 220, 310], \"label\": \"car\"}]}\n```";
    let (root, requests) = spawn_mock(StatusCode::OK, reply_with(json!(content))).await;
    let gateway = Arc::new(OpenAiCompatGateway::new(&vllm_config(&root)).unwrap());
    let pipeline = DetectionPipeline::new(gateway, BoxEncoding::Corner)
        .with_system_message("You are a precise object detector.");

    let set = pipeline.detect(&street_image(), Some("car")).await.unwrap();
    assert_eq!(
        set.detections(),
        &[Detection::Corner(CornerBox::new(12, 40, 220, 310).with_label("car"))]
    );

    let requests = requests.lock().unwrap();
    let body = &requests[0].1;
    assert_eq!(body["messages"][0]["content"], "You are a precise object detector.");
    let prompt = body["messages"][1]["content"][0]["text"].as_str().unwrap();
    assert!(prompt.contains("car"));
    assert!(prompt.contains("bbox_2d"));
}

#[tokio::test]
async fn test_pipeline_keeps_transport_error() {
    let (root, _) = spawn_mock(StatusCode::SERVICE_UNAVAILABLE, json!("loading")).await;
    let gateway = Arc::new(OpenAiCompatGateway::new(&tgi_config(&root)).unwrap());
    let pipeline = DetectionPipeline::new(gateway, BoxEncoding::Corner);

    let err = pipeline.detect(&street_image(), None).await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("503"));
}
