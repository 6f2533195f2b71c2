// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Chat template for in-process Qwen-VL style models
//!
//! Local models receive one flat prompt string instead of structured chat
//! messages. The image position is marked with the vision placeholder tokens
//! and the processor expands them into patch embeddings.

use serde::{Deserialize, Serialize};

pub const VISION_PLACEHOLDER: &str = "<|vision_start|><|image_pad|><|vision_end|>";

const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// ChatML formatting with an image slot in the user turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QwenVlTemplate;

impl QwenVlTemplate {
    /// Format a single-image request
    ///
    /// The image goes ahead of the text, matching the training layout. Without
    /// a system message the model's default one is used.
    pub fn format(&self, prompt: &str, system_message: Option<&str>) -> String {
        let system = system_message.unwrap_or(DEFAULT_SYSTEM_MESSAGE);
        let messages = vec![
            ("system".to_string(), system.to_string()),
            (
                "user".to_string(),
                format!("{}{}", VISION_PLACEHOLDER, prompt),
            ),
        ];
        self.format_messages(&messages)
    }

    /// ChatML format: "<|im_start|>user\n...<|im_end|>"
    pub fn format_messages(&self, messages: &[(String, String)]) -> String {
        let mut prompt = String::new();

        for (role, content) in messages {
            match role.as_str() {
                "system" | "user" | "assistant" => {
                    prompt.push_str(&format!("<|im_start|>{}\n{}<|im_end|>\n", role, content));
                }
                _ => {}
            }
        }

        // Add prompt for assistant response
        prompt.push_str("<|im_start|>assistant\n");
        prompt
    }
}
