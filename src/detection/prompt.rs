// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prompt construction for detection requests

use super::schema::SchemaValidator;

/// Builds the exact text sent to the inference gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptBuilder {
    format_instructions: String,
}

impl PromptBuilder {
    pub fn new(format_instructions: impl Into<String>) -> Self {
        Self {
            format_instructions: format_instructions.into(),
        }
    }

    pub fn for_validator(validator: &SchemaValidator) -> Self {
        Self::new(validator.format_instructions())
    }

    pub fn format_instructions(&self) -> &str {
        &self.format_instructions
    }

    /// Prompt for `target_type`, or for every visible object when unset or blank
    pub fn build(&self, target_type: Option<&str>) -> String {
        let task = match target_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(target) => format!(
                "Outline the position of each {} object and output all the coordinates in JSON format.",
                target
            ),
            None => "Outline the position of every visible object and output all the coordinates in JSON format."
                .to_string(),
        };

        format!("{}\n\n{}", task, self.format_instructions)
    }
}
