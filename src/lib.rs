// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object detection through vision-language models
//!
//! Sends an image plus a detection prompt to a VLM backend and turns the
//! free-text answer into validated bounding boxes.
//!
//! ```ignore
//! let config = DetectorConfig::from_env()?;
//! let pipeline = config.build_pipeline()?;
//! let cars = pipeline.detect(&ImageInput::from(url), Some("car")).await?;
//! ```

pub mod cli;
pub mod config;
pub mod detection;
pub mod gateway;
pub mod vision;

pub use config::{ConfigError, DetectorConfig};
pub use detection::{
    BoxEncoding, CornerBox, Detection, DetectionError, DetectionPipeline, DetectionSet,
    LenientParser, OriginSizeBox, ParseError, PromptBuilder, SchemaError, SchemaValidator,
};
pub use gateway::{
    Backend, GatewayConfig, GatewayError, ImageInput, InProcessGateway, InferenceGateway,
    LocalVisionModel, OpenAiCompatGateway,
};
