// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for the detection pipeline
//!
//! Each kind is raised by the layer that detects it:
//! - `GatewayError` by the inference backend (wrapped as `Transport`)
//! - `ParseError` by the lenient parser when no JSON can be recovered
//! - `SchemaError` by the validator when JSON has the wrong shape

use thiserror::Error;

use crate::gateway::GatewayError;

/// Number of characters of raw text shown in `ParseError`'s display message
const RAW_PREVIEW_CHARS: usize = 200;

/// The model response contained nothing that decodes as JSON
#[derive(Error, Debug, Clone, PartialEq)]
#[error("No JSON structure found in model response: {}", preview(.raw))]
pub struct ParseError {
    /// Full response text, kept for diagnostics
    pub raw: String,
}

impl ParseError {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }
}

/// Recovered JSON failed field or type validation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Schema validation failed at {path}: {reason}")]
pub struct SchemaError {
    /// Location of the offending value, e.g. `targets[2].height`
    pub path: String,
    pub reason: String,
}

impl SchemaError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Any failure of a single `detect` / `parse` invocation
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Inference gateway failed: {0}")]
    Transport(#[from] GatewayError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl DetectionError {
    pub fn is_transport(&self) -> bool {
        matches!(self, DetectionError::Transport(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, DetectionError::Parse(_))
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, DetectionError::Schema(_))
    }
}

fn preview(raw: &str) -> String {
    let mut chars = raw.chars();
    let head: String = chars.by_ref().take(RAW_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{:?}...", head)
    } else {
        format!("{:?}", head)
    }
}
