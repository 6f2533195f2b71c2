// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection pipeline: prompt → gateway → lenient parse → validated boxes

use std::sync::Arc;
use tracing::{debug, info};

use super::errors::DetectionError;
use super::parser::LenientParser;
use super::prompt::PromptBuilder;
use super::schema::{BoxEncoding, DetectionSet, SchemaValidator};
use crate::gateway::{ImageInput, InferenceGateway};

/// Single entry point for object detection through a VLM
///
/// Immutable after construction; one `detect` call is one gateway request.
/// No retries or caching.
pub struct DetectionPipeline {
    gateway: Arc<dyn InferenceGateway>,
    parser: LenientParser,
    prompts: PromptBuilder,
    system_message: Option<String>,
}

impl DetectionPipeline {
    pub fn new(gateway: Arc<dyn InferenceGateway>, encoding: BoxEncoding) -> Self {
        let validator = SchemaValidator::new(encoding);
        Self {
            gateway,
            parser: LenientParser::new(validator),
            prompts: PromptBuilder::for_validator(&validator),
            system_message: None,
        }
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn encoding(&self) -> BoxEncoding {
        self.parser.validator().encoding()
    }

    pub fn parser(&self) -> &LenientParser {
        &self.parser
    }

    /// Exact prompt `detect` sends for `target_type`
    pub fn prompt_for(&self, target_type: Option<&str>) -> String {
        self.prompts.build(target_type)
    }

    /// Detect objects of `target_type` (or any object when `None`) in `image`
    ///
    /// Gateway errors are returned unchanged as `DetectionError::Transport`.
    pub async fn detect(
        &self,
        image: &ImageInput,
        target_type: Option<&str>,
    ) -> Result<DetectionSet, DetectionError> {
        let prompt = self.prompt_for(target_type);
        debug!(
            "Sending detection prompt to {} ({} chars, target={:?})",
            self.gateway.name(),
            prompt.len(),
            target_type
        );

        let raw = self
            .gateway
            .infer(&prompt, image, self.system_message.as_deref())
            .await?;
        debug!("Raw model response: {}", raw);

        let detections = self.parser.parse(&raw)?;
        info!(
            "Detected {} objects (target={}, backend={})",
            detections.len(),
            target_type.unwrap_or("any"),
            self.gateway.name()
        );
        Ok(detections)
    }
}
