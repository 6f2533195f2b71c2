// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Lenient parser tests against realistic model replies

use vlm_detect::detection::{
    BoxEncoding, DetectionError, ExtractionStrategy, LenientParser, SchemaValidator,
};

const EMBEDDED: &str = r#"{"targets": [{"bbox_2d": [12, 40, 220, 310], "label": "car"}, {"bbox_2d": [300, 42, 460, 330], "label": "car"}]}"#;

fn parser() -> LenientParser {
    LenientParser::new(SchemaValidator::new(BoxEncoding::Corner))
}

#[test]
fn test_fenced_reply_matches_embedded_json() {
    let raw = format!("Here are the results:\n```json\n{}\n```\nThanks!", EMBEDDED);

    let direct = parser().parse(EMBEDDED).unwrap();
    let wrapped = parser().parse(&raw).unwrap();
    assert_eq!(wrapped, direct);
    assert_eq!(wrapped.len(), 2);
}

#[test]
fn test_prose_wrapped_reply() {
    let raw = format!(
        "I found two cars in the image. The coordinates are {} as requested.",
        EMBEDDED
    );
    assert_eq!(parser().parse(&raw).unwrap(), parser().parse(EMBEDDED).unwrap());
}

#[test]
fn test_trailing_commas_in_fenced_reply() {
    let raw = "```json\n{\n  \"targets\": [\n    {\"bbox_2d\": [1, 2, 3, 4], \"label\": \"cat\"},\n  ],\n}\n```";
    let (value, strategy) = parser().extract_json_with_strategy(raw).unwrap();
    assert_eq!(strategy, ExtractionStrategy::CodeFence);
    assert_eq!(value["targets"][0]["label"], "cat");
}

#[test]
fn test_first_decodable_fence_wins() {
    let raw = "```python\nboxes = detect(img)\n```\nand the result:\n```json\n{\"targets\": []}\n```";
    let set = parser().parse(raw).unwrap();
    assert!(set.is_empty());
}

#[test]
fn test_refusal_is_parse_error_with_raw_text() {
    let raw = "I cannot determine the objects.";
    match parser().parse(raw) {
        Err(DetectionError::Parse(err)) => assert_eq!(err.raw, raw),
        other => panic!("expected ParseError, got {:?}", other),
    }
}

#[test]
fn test_truncated_reply_is_parse_error() {
    let raw = "```json\n{\"targets\": [{\"bbox_2d\": [12, 40, 220";
    assert!(matches!(parser().parse(raw), Err(DetectionError::Parse(_))));
}

#[test]
fn test_parse_and_schema_errors_are_distinct() {
    let not_json = parser().parse("no boxes here").unwrap_err();
    let wrong_shape = parser()
        .parse(r#"{"targets": [{"box": [1, 2, 3, 4]}]}"#)
        .unwrap_err();

    assert!(not_json.is_parse() && !not_json.is_schema());
    assert!(wrong_shape.is_schema() && !wrong_shape.is_parse());
}

#[test]
fn test_bare_array_is_schema_error() {
    // Qwen's native grounding output; only the `targets` object is accepted
    let raw = r#"[{"bbox_2d": [1, 2, 3, 4], "label": "car"}]"#;
    assert!(parser().parse(raw).unwrap_err().is_schema());
}

#[test]
fn test_origin_size_reply() {
    let parser = LenientParser::new(SchemaValidator::new(BoxEncoding::OriginSize));
    let set = parser
        .parse("Sure:\n```\n{\"targets\": [{\"x\": 1, \"y\": 2, \"width\": 3, \"height\": 4}]}\n```")
        .unwrap();
    assert_eq!(set.detections()[0].to_corners(), (1, 2, 4, 6));
}

#[test]
fn test_prose_brackets_before_payload() {
    let raw = "The image is [640, 480] pixels. {\"targets\": [{\"bbox_2d\": [1, 2, 3, 4], \"label\": \"car\"}]}";
    let (value, strategy) = parser().extract_json_with_strategy(raw).unwrap();
    assert_eq!(strategy, ExtractionStrategy::BalancedSpan);
    assert!(value.is_object());

    let set = parser().parse(raw).unwrap();
    assert_eq!(set.detections()[0].to_corners(), (1, 2, 3, 4));
    assert_eq!(set.detections()[0].label(), Some("car"));
}

#[test]
fn test_python_dict_reply_is_parse_error() {
    // Single-quoted keys: the outer object is not JSON even though the inner list is
    let raw = "Result: {'targets': [{'bbox_2d': [1, 2, 3, 4], 'label': 'car'}]}";
    match parser().parse(raw) {
        Err(DetectionError::Parse(err)) => assert_eq!(err.raw, raw),
        other => panic!("expected ParseError, got {:?}", other),
    }
}
