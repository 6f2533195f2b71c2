// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Detection data model and schema validation
//!
//! Two bounding-box encodings exist in the wild:
//! - corner form: `{"bbox_2d": [x1, y1, x2, y2], "label": "car"}`
//! - origin+size form: `{"x": 10, "y": 20, "width": 30, "height": 40}`
//!
//! A deployment picks one [`BoxEncoding`] up front. The validator only accepts
//! that shape, and the same choice drives the format instructions embedded in
//! prompts, so the model is asked for exactly what will be validated.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::errors::SchemaError;

/// Top-level key holding the list of detections
pub const TARGETS_KEY: &str = "targets";

/// Coordinate encoding requested from (and validated against) the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxEncoding {
    /// `bbox_2d: [x1, y1, x2, y2]` plus optional `label`
    #[default]
    Corner,
    /// `x`, `y`, `width`, `height` plus optional `label`
    #[serde(alias = "origin-size")]
    OriginSize,
}

impl BoxEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Corner => "corner",
            Self::OriginSize => "origin_size",
        }
    }
}

impl fmt::Display for BoxEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoxEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "corner" | "corners" | "xyxy" | "bbox_2d" => Ok(Self::Corner),
            "origin_size" | "origin-size" | "xywh" => Ok(Self::OriginSize),
            other => Err(format!(
                "unknown box encoding '{}' (expected 'corner' or 'origin_size')",
                other
            )),
        }
    }
}

/// Box given by its top-left and bottom-right corners
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CornerBox {
    pub bbox_2d: [i64; 4],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl CornerBox {
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self {
            bbox_2d: [x1, y1, x2, y2],
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn x1(&self) -> i64 {
        self.bbox_2d[0]
    }

    pub fn y1(&self) -> i64 {
        self.bbox_2d[1]
    }

    pub fn x2(&self) -> i64 {
        self.bbox_2d[2]
    }

    pub fn y2(&self) -> i64 {
        self.bbox_2d[3]
    }
}

/// Box given by its top-left corner and extent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OriginSizeBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl OriginSizeBox {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One recognized object instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Detection {
    Corner(CornerBox),
    OriginSize(OriginSizeBox),
}

impl Detection {
    pub fn encoding(&self) -> BoxEncoding {
        match self {
            Detection::Corner(_) => BoxEncoding::Corner,
            Detection::OriginSize(_) => BoxEncoding::OriginSize,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Detection::Corner(b) => b.label.as_deref(),
            Detection::OriginSize(b) => b.label.as_deref(),
        }
    }

    /// Box as `(x1, y1, x2, y2)` regardless of encoding
    pub fn to_corners(&self) -> (i64, i64, i64, i64) {
        match self {
            Detection::Corner(b) => (b.x1(), b.y1(), b.x2(), b.y2()),
            Detection::OriginSize(b) => (
                b.x,
                b.y,
                b.x.saturating_add(b.width),
                b.y.saturating_add(b.height),
            ),
        }
    }
}

impl From<CornerBox> for Detection {
    fn from(b: CornerBox) -> Self {
        Detection::Corner(b)
    }
}

impl From<OriginSizeBox> for Detection {
    fn from(b: OriginSizeBox) -> Self {
        Detection::OriginSize(b)
    }
}

/// All detections the model reported for one image, in response order
///
/// Serializes back to the `{"targets": [...]}` shape it was validated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectionSet {
    #[serde(skip)]
    encoding: BoxEncoding,
    targets: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(encoding: BoxEncoding, targets: Vec<Detection>) -> Self {
        Self { encoding, targets }
    }

    pub fn encoding(&self) -> BoxEncoding {
        self.encoding
    }

    pub fn detections(&self) -> &[Detection] {
        &self.targets
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn into_vec(self) -> Vec<Detection> {
        self.targets
    }

    pub fn to_json(&self) -> Value {
        json!({ TARGETS_KEY: self.targets })
    }
}

impl IntoIterator for DetectionSet {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

/// Validates decoded JSON against one fixed box encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchemaValidator {
    encoding: BoxEncoding,
}

impl SchemaValidator {
    pub fn new(encoding: BoxEncoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> BoxEncoding {
        self.encoding
    }

    /// Validate a decoded response into a `DetectionSet`
    ///
    /// The top level must be an object with a `targets` array. Each entry must
    /// match the configured encoding exactly; the other encoding is rejected
    /// with the name of the first missing field.
    pub fn validate(&self, value: &Value) -> Result<DetectionSet, SchemaError> {
        let root = value.as_object().ok_or_else(|| {
            SchemaError::new(
                "$",
                format!("expected a JSON object, got {}", type_name(value)),
            )
        })?;

        let targets = root
            .get(TARGETS_KEY)
            .ok_or_else(|| SchemaError::new(TARGETS_KEY, "missing required field"))?;
        let items = targets.as_array().ok_or_else(|| {
            SchemaError::new(
                TARGETS_KEY,
                format!("expected an array, got {}", type_name(targets)),
            )
        })?;

        let mut detections = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let path = format!("{}[{}]", TARGETS_KEY, index);
            let fields = item.as_object().ok_or_else(|| {
                SchemaError::new(
                    path.clone(),
                    format!("expected an object, got {}", type_name(item)),
                )
            })?;

            let detection = match self.encoding {
                BoxEncoding::Corner => Detection::Corner(corner_box(fields, &path)?),
                BoxEncoding::OriginSize => {
                    Detection::OriginSize(origin_size_box(fields, &path)?)
                }
            };
            detections.push(detection);
        }

        Ok(DetectionSet::new(self.encoding, detections))
    }

    /// JSON schema of the expected response for the active encoding
    pub fn json_schema(&self) -> Value {
        let bounding_box = match self.encoding {
            BoxEncoding::Corner => json!({
                "title": "BoundingBox",
                "type": "object",
                "properties": {
                    "bbox_2d": {
                        "title": "Bbox 2D",
                        "description": "[x1, y1, x2, y2]",
                        "type": "array",
                        "items": { "type": "integer" },
                        "minItems": 4,
                        "maxItems": 4
                    },
                    "label": {
                        "title": "Label",
                        "description": "type of object",
                        "type": "string"
                    }
                },
                "required": ["bbox_2d"]
            }),
            BoxEncoding::OriginSize => json!({
                "title": "BoundingBox",
                "type": "object",
                "properties": {
                    "x": { "title": "X", "description": "x coordinate of the top-left corner", "type": "integer" },
                    "y": { "title": "Y", "description": "y coordinate of the top-left corner", "type": "integer" },
                    "width": { "title": "Width", "description": "width of the box", "type": "integer", "minimum": 0 },
                    "height": { "title": "Height", "description": "height of the box", "type": "integer", "minimum": 0 },
                    "label": { "title": "Label", "description": "type of object", "type": "string" }
                },
                "required": ["x", "y", "width", "height"]
            }),
        };

        json!({
            "title": "DetectionResult",
            "type": "object",
            "properties": {
                TARGETS_KEY: {
                    "title": "Targets",
                    "description": "a list of target bounding boxes.",
                    "type": "array",
                    "items": { "$ref": "#/$defs/BoundingBox" }
                }
            },
            "required": [TARGETS_KEY],
            "$defs": { "BoundingBox": bounding_box }
        })
    }

    /// Instruction text steering the model toward the expected JSON shape
    ///
    /// Deterministic for a given encoding; prompt builders embed it verbatim.
    pub fn format_instructions(&self) -> String {
        let fields = match self.encoding {
            BoxEncoding::Corner => {
                "\"bbox_2d\" (an array of exactly 4 integers [x1, y1, x2, y2]: the pixel \
                 coordinates of the top-left and bottom-right corners, with x2 >= x1 and \
                 y2 >= y1) and optionally \"label\" (a string naming the type of object)"
            }
            BoxEncoding::OriginSize => {
                "\"x\" and \"y\" (integers: pixel coordinates of the top-left corner), \
                 \"width\" and \"height\" (non-negative integers: size of the box in pixels) \
                 and optionally \"label\" (a string naming the type of object)"
            }
        };

        format!(
            "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\
             \n\
             The top-level value must be an object with a single key \"{key}\" whose value is a \
             list of bounding boxes. Each bounding box is an object with {fields}. If no object \
             is found, return {{\"{key}\": []}}.\n\
             \n\
             Here is the output schema:\n\
             ```\n\
             {schema}\n\
             ```",
            key = TARGETS_KEY,
            fields = fields,
            schema = self.json_schema(),
        )
    }
}

fn corner_box(fields: &Map<String, Value>, path: &str) -> Result<CornerBox, SchemaError> {
    let bbox_path = format!("{}.bbox_2d", path);
    let bbox = fields
        .get("bbox_2d")
        .ok_or_else(|| SchemaError::new(bbox_path.clone(), "missing required field"))?;
    let coords = bbox.as_array().ok_or_else(|| {
        SchemaError::new(
            bbox_path.clone(),
            format!("expected an array of 4 integers, got {}", type_name(bbox)),
        )
    })?;
    if coords.len() != 4 {
        return Err(SchemaError::new(
            bbox_path,
            format!("expected exactly 4 coordinates, got {}", coords.len()),
        ));
    }

    let mut bbox_2d = [0i64; 4];
    for (slot, (i, coord)) in bbox_2d.iter_mut().zip(coords.iter().enumerate()) {
        *slot = integer(Some(coord), &format!("{}[{}]", bbox_path, i))?;
    }

    let [x1, y1, x2, y2] = bbox_2d;
    if x2 < x1 {
        return Err(SchemaError::new(
            bbox_path,
            format!("x2 ({}) must be >= x1 ({})", x2, x1),
        ));
    }
    if y2 < y1 {
        return Err(SchemaError::new(
            bbox_path,
            format!("y2 ({}) must be >= y1 ({})", y2, y1),
        ));
    }

    Ok(CornerBox {
        bbox_2d,
        label: label(fields, path)?,
    })
}

fn origin_size_box(fields: &Map<String, Value>, path: &str) -> Result<OriginSizeBox, SchemaError> {
    let field = |name: &str| integer(fields.get(name), &format!("{}.{}", path, name));

    let x = field("x")?;
    let y = field("y")?;
    let width = field("width")?;
    let height = field("height")?;

    if width < 0 {
        return Err(SchemaError::new(
            format!("{}.width", path),
            format!("must be non-negative, got {}", width),
        ));
    }
    if height < 0 {
        return Err(SchemaError::new(
            format!("{}.height", path),
            format!("must be non-negative, got {}", height),
        ));
    }

    Ok(OriginSizeBox {
        x,
        y,
        width,
        height,
        label: label(fields, path)?,
    })
}

fn label(fields: &Map<String, Value>, path: &str) -> Result<Option<String>, SchemaError> {
    match fields.get("label") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(SchemaError::new(
            format!("{}.label", path),
            format!("expected a string, got {}", type_name(other)),
        )),
    }
}

/// Integral JSON number; `10.0` counts, `10.5` and `"10"` do not
fn integer(value: Option<&Value>, path: &str) -> Result<i64, SchemaError> {
    let value = value.ok_or_else(|| SchemaError::new(path, "missing required field"))?;

    let not_integral = || {
        SchemaError::new(
            path,
            format!("expected an integer, got {}", value),
        )
    };

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(not_integral()),
            }
        }
        other => Err(SchemaError::new(
            path,
            format!("expected an integer, got {}", type_name(other)),
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
