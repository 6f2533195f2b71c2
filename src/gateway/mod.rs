// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Inference gateways: anything that turns (prompt, image) into model text
//!
//! - `OpenAiCompatGateway`: hosted DashScope, self-hosted vLLM or TGI
//! - `InProcessGateway`: a model loaded in this process

pub mod chat_template;
pub mod in_process;
pub mod openai_compat;

use async_trait::async_trait;
use image::DynamicImage;
use std::borrow::Cow;
use thiserror::Error;

use crate::vision::image_utils::{self, ImageError};

pub use chat_template::QwenVlTemplate;
pub use in_process::{InProcessGateway, LocalVisionModel};
pub use openai_compat::{Backend, GatewayConfig, OpenAiCompatGateway};

/// Transport-level failures of an inference backend
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Request to inference backend failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference backend rejected credentials (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },

    #[error("Inference backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Inference backend returned no completion text")]
    EmptyResponse,

    #[error("Failed to prepare image: {0}")]
    Image(#[from] ImageError),

    #[error("Local model failed: {0}")]
    Model(String),

    #[error("Invalid gateway configuration: {0}")]
    Config(String),
}

/// Image handed to a gateway
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Already hosted (`https://...`) or already inlined (`data:...`)
    Url(String),
    /// Raw pixels that must be inlined before sending
    Pixels(DynamicImage),
}

impl ImageInput {
    /// URL form of the image; pixel buffers become PNG data URLs
    pub fn to_url(&self) -> Result<Cow<'_, str>, ImageError> {
        match self {
            ImageInput::Url(url) => Ok(Cow::Borrowed(url.as_str())),
            ImageInput::Pixels(image) => Ok(Cow::Owned(image_utils::to_png_data_url(image)?)),
        }
    }

    pub fn is_data_url(&self) -> bool {
        matches!(self, ImageInput::Url(url) if url.starts_with("data:"))
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        ImageInput::Pixels(image)
    }
}

impl From<String> for ImageInput {
    fn from(url: String) -> Self {
        ImageInput::Url(url)
    }
}

impl From<&str> for ImageInput {
    fn from(url: &str) -> Self {
        ImageInput::Url(url.to_string())
    }
}

/// One request, one free-text answer
///
/// Implementations must report transport problems as `Err` rather than as
/// text, so callers can tell a failed call from a bad answer.
#[async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn infer(
        &self,
        prompt: &str,
        image: &ImageInput,
        system_message: Option<&str>,
    ) -> Result<String, GatewayError>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}
