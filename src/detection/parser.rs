// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Lenient decoding of model responses
//!
//! Models asked for JSON often answer with almost-JSON: prose around the
//! payload, markdown code fences, trailing commas. The parser tries, in order:
//! 1. the whole (trimmed) response as strict JSON
//! 2. the contents of each markdown code fence
//! 3. the outermost balanced `{...}` or `[...]` spans, preferring an object
//!    over an array; nested spans are never tried on their own
//!
//! Every candidate gets one retry with trailing commas removed. If nothing
//! decodes the full raw text is returned in a [`ParseError`].

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use super::errors::{DetectionError, ParseError};
use super::schema::{DetectionSet, SchemaValidator};

fn code_fence() -> &'static Regex {
    static CODE_FENCE: OnceLock<Regex> = OnceLock::new();
    CODE_FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("code fence pattern is valid")
    })
}

/// Where a decoded JSON value was found in the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Strict,
    CodeFence,
    BalancedSpan,
}

/// Decodes model text into a validated `DetectionSet`
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientParser {
    validator: SchemaValidator,
}

impl LenientParser {
    pub fn new(validator: SchemaValidator) -> Self {
        Self { validator }
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    /// Decode and validate a raw model response
    ///
    /// Fails with `DetectionError::Parse` when no JSON can be recovered and
    /// with `DetectionError::Schema` when the recovered JSON has the wrong shape.
    pub fn parse(&self, raw: &str) -> Result<DetectionSet, DetectionError> {
        let value = self.extract_json(raw)?;
        let detections = self.validator.validate(&value)?;
        debug!(
            "Parsed {} detections ({} encoding)",
            detections.len(),
            detections.encoding()
        );
        Ok(detections)
    }

    /// Recover a JSON value from a raw model response without validating it
    pub fn extract_json(&self, raw: &str) -> Result<Value, ParseError> {
        self.extract_json_with_strategy(raw)
            .map(|(value, _)| value)
    }

    pub fn extract_json_with_strategy(
        &self,
        raw: &str,
    ) -> Result<(Value, ExtractionStrategy), ParseError> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(ParseError::new(raw));
        }

        if let Some(value) = decode(text) {
            return Ok((value, ExtractionStrategy::Strict));
        }

        for caps in code_fence().captures_iter(text) {
            if let Some(body) = caps.get(1) {
                if let Some(value) = decode(body.as_str().trim()) {
                    debug!("Recovered JSON from markdown code fence");
                    return Ok((value, ExtractionStrategy::CodeFence));
                }
            }
        }

        // Outermost spans only: a span that fails to decode is skipped whole,
        // never searched for nested brackets.
        let mut first_array = None;
        let mut cursor = 0;
        while let Some(offset) = text[cursor..].find(['{', '[']) {
            let start = cursor + offset;
            match scan_span(text, start) {
                Span::Closed(end) => {
                    if let Some(value) = decode(&text[start..end]) {
                        if value.is_object() {
                            debug!("Recovered JSON object from balanced span at byte {}", start);
                            return Ok((value, ExtractionStrategy::BalancedSpan));
                        }
                        if first_array.is_none() {
                            first_array = Some(value);
                        }
                    }
                    cursor = end;
                }
                Span::Mismatched(at) => cursor = at + 1,
                Span::Unclosed => break,
            }
        }

        if let Some(value) = first_array {
            debug!("Recovered JSON array from balanced span");
            return Ok((value, ExtractionStrategy::BalancedSpan));
        }

        Err(ParseError::new(raw))
    }
}

/// Strict decode, then one retry with trailing commas removed
fn decode(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }
    let repaired = strip_trailing_commas(text);
    if repaired != text {
        serde_json::from_str::<Value>(&repaired).ok()
    } else {
        None
    }
}

/// Extent of the bracketed span opening at `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    /// Byte index one past the matching closer
    Closed(usize),
    /// Byte index of a closer that does not match its opener
    Mismatched(usize),
    /// Text ended before the span closed
    Unclosed,
}

/// Find where the bracket at `start` closes, skipping string literals and escapes
fn scan_span(text: &str, start: usize) -> Span {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(byte) {
                    return Span::Mismatched(start + offset);
                }
                if stack.is_empty() {
                    return Span::Closed(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    Span::Unclosed
}

/// Drop commas that directly precede `}` or `]` outside string literals
fn strip_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied_to = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in bytes.iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b',' => {
                let next = bytes[i + 1..]
                    .iter()
                    .find(|b| !b.is_ascii_whitespace());
                if matches!(next, Some(b'}') | Some(b']')) {
                    out.push_str(&text[copied_to..i]);
                    copied_to = i + 1;
                }
            }
            _ => {}
        }
    }

    out.push_str(&text[copied_to..]);
    out
}
