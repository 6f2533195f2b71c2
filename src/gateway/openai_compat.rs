// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Gateway for VLM backends speaking the OpenAI chat-completions protocol
//!
//! Covers the hosted DashScope compatible mode as well as self-hosted vLLM and
//! Text Generation Inference servers. The backends differ only in base URL,
//! default model, authentication and sampling parameters.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{GatewayError, ImageInput, InferenceGateway};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Supported backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Hosted DashScope API (OpenAI compatible mode)
    #[default]
    Dashscope,
    /// Self-hosted vLLM server
    Vllm,
    /// Self-hosted Text Generation Inference server
    Tgi,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dashscope => "dashscope",
            Self::Vllm => "vllm",
            Self::Tgi => "tgi",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Dashscope => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Self::Vllm => "http://localhost:8000/v1",
            Self::Tgi => "http://localhost:8080",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Dashscope => "qwen2.5-vl-7b-instruct",
            Self::Vllm => "Qwen/Qwen2.5-VL-7B-Instruct",
            // TGI serves a single model and ignores the name
            Self::Tgi => "tgi",
        }
    }

    /// Key sent when none is configured
    pub fn default_api_key(&self) -> Option<&'static str> {
        match self {
            Self::Vllm => Some("token-abc123"),
            Self::Dashscope | Self::Tgi => None,
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Dashscope)
    }

    fn chat_path(&self) -> &'static str {
        match self {
            Self::Dashscope | Self::Vllm => "/chat/completions",
            Self::Tgi => "/v1/chat/completions",
        }
    }

    fn health_path(&self) -> &'static str {
        match self {
            Self::Dashscope | Self::Vllm => "/models",
            Self::Tgi => "/health",
        }
    }

    fn sampling(&self) -> Option<SamplingParams> {
        match self {
            Self::Vllm => Some(SamplingParams {
                repetition_penalty: 1.1,
                temperature: 0.1,
                top_p: 0.9,
                top_k: 40,
            }),
            Self::Dashscope | Self::Tgi => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dashscope" | "hosted" => Ok(Self::Dashscope),
            "vllm" => Ok(Self::Vllm),
            "tgi" => Ok(Self::Tgi),
            other => Err(format!(
                "unknown backend '{}' (expected dashscope, vllm or tgi)",
                other
            )),
        }
    }
}

/// Connection settings for an OpenAI-compatible backend
///
/// Unset fields fall back to the backend's defaults.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub backend: Backend,
    pub base_url: Option<String>,
    pub model: Option<String>,
    /// Read from config but never written back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            base_url: None,
            model: None,
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GatewayConfig {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.backend.default_base_url())
    }

    pub fn model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend.default_model())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .or_else(|| self.backend.default_api_key())
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        url::Url::parse(self.base_url()).map_err(|e| {
            GatewayError::Config(format!("invalid base_url '{}': {}", self.base_url(), e))
        })?;

        if self.backend.requires_api_key() && self.api_key().is_none() {
            return Err(GatewayError::Config(format!(
                "backend '{}' requires an API key",
                self.backend
            )));
        }

        if self.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

// --- OpenAI-compatible serde structs ---

#[derive(Debug, Clone, Serialize)]
struct SamplingParams {
    repetition_penalty: f32,
    temperature: f32,
    top_p: f32,
    top_k: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(flatten)]
    sampling: Option<SamplingParams>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible VLM endpoint
pub struct OpenAiCompatGateway {
    client: Client,
    backend: Backend,
    base_url: String,
    model_name: String,
    api_key: Option<String>,
}

impl OpenAiCompatGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config.base_url().trim_end_matches('/').to_string();
        info!(
            "VLM gateway configured: backend={}, endpoint={}, model={}",
            config.backend,
            base_url,
            config.model()
        );

        Ok(Self {
            client,
            backend: config.backend,
            base_url,
            model_name: config.model().to_string(),
            api_key: config.api_key().map(str::to_string),
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn chat_url(&self) -> String {
        format!("{}{}", self.base_url, self.backend.chat_path())
    }

    /// Check whether the backend answers at all
    pub async fn health_check(&self) -> bool {
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, self.backend.health_path()));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("VLM health check failed: {}", e);
                false
            }
        }
    }

    fn build_request(
        &self,
        prompt: &str,
        image_url: &str,
        system_message: Option<&str>,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_message {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: serde_json::Value::String(system.to_string()),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: serde_json::json!([
                {"type": "text", "text": prompt},
                {"type": "image_url", "image_url": {"url": image_url}}
            ]),
        });

        ChatRequest {
            model: self.model_name.clone(),
            messages,
            sampling: self.backend.sampling(),
        }
    }
}

#[async_trait]
impl InferenceGateway for OpenAiCompatGateway {
    async fn infer(
        &self,
        prompt: &str,
        image: &ImageInput,
        system_message: Option<&str>,
    ) -> Result<String, GatewayError> {
        let start = Instant::now();
        let image_url = image.to_url()?;
        let request = self.build_request(prompt, &image_url, system_message);

        let mut http = self.client.post(self.chat_url()).json(&request);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthorized {
                    status: status.as_u16(),
                    body,
                },
                _ => GatewayError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        let tokens_used = chat_response
            .usage
            .as_ref()
            .map(|u| u.total_tokens)
            .unwrap_or(0);
        let text = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(GatewayError::EmptyResponse)?;

        info!(
            "VLM {} answered in {}ms ({} chars, {} tokens)",
            self.backend,
            start.elapsed().as_millis(),
            text.len(),
            tokens_used
        );
        Ok(text)
    }

    fn name(&self) -> &str {
        self.backend.as_str()
    }
}
