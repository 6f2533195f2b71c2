// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! End-to-end pipeline tests with stub gateways

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Rgb};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use vlm_detect::detection::{
    BoxEncoding, Detection, DetectionError, DetectionPipeline, OriginSizeBox,
};
use vlm_detect::gateway::{GatewayError, ImageInput, InferenceGateway};

/// Returns a fixed reply and records every prompt it receives
struct StubGateway {
    reply: String,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubGateway {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl InferenceGateway for StubGateway {
    async fn infer(
        &self,
        prompt: &str,
        image: &ImageInput,
        _system_message: Option<&str>,
    ) -> Result<String, GatewayError> {
        // Exercise the same image preparation a real backend would
        image.to_url()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

/// Always fails like an unreachable backend
struct DownGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl InferenceGateway for DownGateway {
    async fn infer(
        &self,
        _prompt: &str,
        _image: &ImageInput,
        _system_message: Option<&str>,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(GatewayError::Status {
            status: 503,
            body: "model is loading".to_string(),
        })
    }

    fn name(&self) -> &str {
        "down"
    }
}

fn test_image() -> ImageInput {
    ImageInput::Pixels(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
        64,
        48,
        Rgb([200u8, 10, 10]),
    )))
}

#[tokio::test]
async fn test_detect_returns_validated_boxes() {
    let gateway = StubGateway::new(r#"{"targets": [{"x":10,"y":20,"width":30,"height":40}]}"#);
    let pipeline = DetectionPipeline::new(gateway.clone(), BoxEncoding::OriginSize);

    let set = pipeline.detect(&test_image(), Some("car")).await.unwrap();

    assert_eq!(set.len(), 1);
    assert_eq!(
        set.detections()[0],
        Detection::OriginSize(OriginSizeBox::new(10, 20, 30, 40))
    );
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_prompt_sent_to_gateway() {
    let gateway = StubGateway::new(r#"{"targets": []}"#);
    let pipeline = DetectionPipeline::new(gateway.clone(), BoxEncoding::Corner);

    pipeline.detect(&test_image(), Some("car")).await.unwrap();

    let prompts = gateway.prompts.lock().unwrap();
    assert!(prompts[0].contains("car"));
    assert!(prompts[0].contains(&pipeline.parser().validator().format_instructions()));
}

#[tokio::test]
async fn test_transport_error_propagates_unchanged() {
    let gateway = Arc::new(DownGateway {
        calls: AtomicUsize::new(0),
    });
    let pipeline = DetectionPipeline::new(gateway.clone(), BoxEncoding::Corner);

    let err = pipeline.detect(&test_image(), None).await.unwrap_err();
    match err {
        DetectionError::Transport(GatewayError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "model is loading");
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    // No retries
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wrong_encoding_reply_is_schema_error() {
    // Deployment fixed to origin+size; model answered in corner form
    let gateway = StubGateway::new(r#"{"targets": [{"bbox_2d": [1, 2, 3, 4], "label": "car"}]}"#);
    let pipeline = DetectionPipeline::new(gateway, BoxEncoding::OriginSize);

    let err = pipeline.detect(&test_image(), Some("car")).await.unwrap_err();
    match err {
        DetectionError::Schema(e) => assert_eq!(e.path, "targets[0].x"),
        other => panic!("expected schema error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refusal_is_parse_error() {
    let gateway = StubGateway::new("I cannot determine the objects.");
    let pipeline = DetectionPipeline::new(gateway, BoxEncoding::Corner);

    let err = pipeline.detect(&test_image(), None).await.unwrap_err();
    assert!(matches!(err, DetectionError::Parse(ref e) if e.raw == "I cannot determine the objects."));
}

#[tokio::test]
async fn test_concurrent_detect_calls() {
    let gateway = StubGateway::new(
        "```json\n{\"targets\": [{\"bbox_2d\": [0, 0, 5, 5], \"label\": \"cup\"}]}\n```",
    );
    let pipeline = Arc::new(DetectionPipeline::new(gateway.clone(), BoxEncoding::Corner));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline.detect(&test_image(), Some("cup")).await
        }));
    }
    for handle in handles {
        let set = handle.await.unwrap().unwrap();
        assert_eq!(set.detections()[0].label(), Some("cup"));
    }
    assert_eq!(gateway.calls.load(Ordering::SeqCst), 8);
}
