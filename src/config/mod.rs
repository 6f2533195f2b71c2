// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Deployment configuration
//!
//! Loaded from a TOML file, then overridden by environment variables:
//!
//! ```toml
//! encoding = "corner"            # or "origin_size"
//! system_message = "Reply with JSON only."
//!
//! [gateway]
//! backend = "vllm"               # dashscope | vllm | tgi
//! base_url = "http://10.0.0.5:8000/v1"
//! model = "Qwen/Qwen2.5-VL-7B-Instruct"
//! timeout_secs = 60
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::detection::{BoxEncoding, DetectionPipeline};
use crate::gateway::{Backend, GatewayConfig, GatewayError, OpenAiCompatGateway};

pub const ENV_BACKEND: &str = "VLM_BACKEND";
pub const ENV_BASE_URL: &str = "VLM_BASE_URL";
pub const ENV_MODEL: &str = "VLM_MODEL";
pub const ENV_API_KEY: &str = "VLM_API_KEY";
pub const ENV_DASHSCOPE_API_KEY: &str = "DASHSCOPE_API_KEY";
pub const ENV_TIMEOUT_SECS: &str = "VLM_TIMEOUT_SECS";
pub const ENV_BOX_ENCODING: &str = "VLM_BOX_ENCODING";
pub const ENV_SYSTEM_MESSAGE: &str = "VLM_SYSTEM_MESSAGE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Everything needed to build a detection pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Box encoding requested from and validated against the model
    pub encoding: BoxEncoding,
    pub system_message: Option<String>,
    pub gateway: GatewayConfig,
}

impl DetectorConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key/value source (the process env in production)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(val) = lookup(ENV_BACKEND) {
            self.gateway.backend = val.parse::<Backend>().map_err(|message| {
                ConfigError::InvalidValue {
                    key: ENV_BACKEND.to_string(),
                    message,
                }
            })?;
        }

        if let Some(val) = lookup(ENV_BASE_URL) {
            self.gateway.base_url = Some(val);
        }

        if let Some(val) = lookup(ENV_MODEL) {
            self.gateway.model = Some(val);
        }

        if let Some(val) = lookup(ENV_API_KEY) {
            self.gateway.api_key = Some(val);
        } else if self.gateway.api_key.is_none() && self.gateway.backend == Backend::Dashscope {
            self.gateway.api_key = lookup(ENV_DASHSCOPE_API_KEY);
        }

        if let Some(val) = lookup(ENV_TIMEOUT_SECS) {
            self.gateway.timeout_secs =
                val.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        key: ENV_TIMEOUT_SECS.to_string(),
                        message: e.to_string(),
                    })?;
        }

        if let Some(val) = lookup(ENV_BOX_ENCODING) {
            self.encoding = val.parse::<BoxEncoding>().map_err(|message| {
                ConfigError::InvalidValue {
                    key: ENV_BOX_ENCODING.to_string(),
                    message,
                }
            })?;
        }

        if let Some(val) = lookup(ENV_SYSTEM_MESSAGE) {
            self.system_message = Some(val);
        }

        Ok(())
    }

    pub fn build_gateway(&self) -> Result<OpenAiCompatGateway, GatewayError> {
        OpenAiCompatGateway::new(&self.gateway)
    }

    /// Pipeline over the configured HTTP backend
    pub fn build_pipeline(&self) -> Result<DetectionPipeline, GatewayError> {
        let gateway = Arc::new(self.build_gateway()?);
        let pipeline = DetectionPipeline::new(gateway, self.encoding);
        Ok(match &self.system_message {
            Some(system) => pipeline.with_system_message(system.clone()),
            None => pipeline,
        })
    }
}
