// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Structured detection pipeline
//!
//! Turns a free-text VLM answer into a validated list of bounding boxes:
//! prompt construction, lenient JSON recovery and schema validation.

pub mod errors;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod schema;

pub use errors::{DetectionError, ParseError, SchemaError};
pub use parser::{ExtractionStrategy, LenientParser};
pub use pipeline::DetectionPipeline;
pub use prompt::PromptBuilder;
pub use schema::{
    BoxEncoding, CornerBox, Detection, DetectionSet, OriginSizeBox, SchemaValidator, TARGETS_KEY,
};
