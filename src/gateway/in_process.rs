// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Gateway running a vision-language model inside this process
//!
//! The crate does not ship a model runtime. Callers plug one in through
//! [`LocalVisionModel`]; the gateway takes care of the chat template, image
//! resolution and keeping blocking generation off the async executor.

use async_trait::async_trait;
use image::DynamicImage;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::chat_template::QwenVlTemplate;
use super::{GatewayError, ImageInput, InferenceGateway};
use crate::vision::image_utils::{
    decode_data_url, decode_image_bytes, load_image_file, ImageError, MAX_IMAGE_SIZE,
};

const IMAGE_FETCH_TIMEOUT_SECS: u64 = 30;

/// A loaded model that can answer one templated prompt about one image
///
/// `generate` may block for a long time; it is always called from the
/// blocking thread pool.
pub trait LocalVisionModel: Send + Sync {
    fn generate(&self, prompt: &str, image: &DynamicImage) -> anyhow::Result<String>;

    fn model_id(&self) -> &str;
}

pub struct InProcessGateway {
    model: Arc<dyn LocalVisionModel>,
    template: QwenVlTemplate,
    http: Client,
    max_image_bytes: usize,
}

impl InProcessGateway {
    pub fn new(model: Arc<dyn LocalVisionModel>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(IMAGE_FETCH_TIMEOUT_SECS))
            .build()?;

        info!("In-process VLM gateway using model {}", model.model_id());
        Ok(Self {
            model,
            template: QwenVlTemplate,
            http,
            max_image_bytes: MAX_IMAGE_SIZE,
        })
    }

    /// Cap on the size of images fetched over HTTP
    pub fn with_max_image_bytes(mut self, max_image_bytes: usize) -> Self {
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// Turn any image input into pixels the model can consume
    async fn resolve_image(&self, image: &ImageInput) -> Result<DynamicImage, GatewayError> {
        let url = match image {
            ImageInput::Pixels(pixels) => return Ok(pixels.clone()),
            ImageInput::Url(url) => url,
        };

        if url.starts_with("data:") {
            return Ok(decode_data_url(url)?);
        }
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(load_image_file(path)?);
        }

        debug!("Fetching image for local model from {}", url);
        let mut response = self.http.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: format!("image fetch from {} failed", url),
            });
        }

        let limit = self.max_image_bytes;
        if let Some(len) = response.content_length() {
            if len > limit as u64 {
                return Err(ImageError::TooLarge(len as usize, limit).into());
            }
        }

        // Content-Length may be absent or wrong; enforce the cap while reading
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(ImageError::TooLarge(bytes.len() + chunk.len(), limit).into());
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(decode_image_bytes(&bytes)?)
    }
}

#[async_trait]
impl InferenceGateway for InProcessGateway {
    async fn infer(
        &self,
        prompt: &str,
        image: &ImageInput,
        system_message: Option<&str>,
    ) -> Result<String, GatewayError> {
        let start = Instant::now();
        let pixels = self.resolve_image(image).await?;
        let formatted = self.template.format(prompt, system_message);

        let model = Arc::clone(&self.model);
        let text = tokio::task::spawn_blocking(move || model.generate(&formatted, &pixels))
            .await
            .map_err(|e| GatewayError::Model(format!("generation task failed: {}", e)))?
            .map_err(|e| GatewayError::Model(format!("{:#}", e)))?;

        info!(
            "Local model {} answered in {}ms ({} chars)",
            self.model.model_id(),
            start.elapsed().as_millis(),
            text.len()
        );
        Ok(text)
    }

    fn name(&self) -> &str {
        self.model.model_id()
    }
}
