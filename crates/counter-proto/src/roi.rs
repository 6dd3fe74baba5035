//! Region-of-interest polygons: parsing the textual `[[x,y],...]` form that
//! operators type into the camera config, and holding the last valid value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ROI_EXAMPLE: &str = "[[100,100],[500,100],[500,400],[100,400]]";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoiError {
    #[error("ROI is not valid JSON: {0}")]
    NotJson(String),
    #[error("ROI must be a JSON array of [x,y] points")]
    NotAnArray,
    #[error("ROI point {index} is invalid: {reason}")]
    BadPoint { index: usize, reason: String },
}

/// A pixel coordinate inside the camera frame.  Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon(pub Vec<Point>);

impl Polygon {
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compact JSON form, the same shape `parse_polygon` accepts.
    pub fn to_json(&self) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|p| format!("[{},{}]", fmt_coord(p.x), fmt_coord(p.y)))
            .collect();
        format!("[{}]", parts.join(","))
    }
}

fn fmt_coord(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// Parse operator- or server-supplied text into a polygon.
///
/// Blank text means "no ROI" and yields `Ok(None)`.  Anything else must be a
/// JSON array whose items are two-element numeric arrays.
pub fn parse_polygon(text: &str) -> Result<Option<Polygon>, RoiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| RoiError::NotJson(e.to_string()))?;
    polygon_from_value(&value).map(Some)
}

/// Validate an already-decoded JSON value (e.g. the `roi` field of a camera).
pub fn polygon_from_value(value: &Value) -> Result<Polygon, RoiError> {
    let items = value.as_array().ok_or(RoiError::NotAnArray)?;

    let mut points = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let pair = item.as_array().ok_or_else(|| RoiError::BadPoint {
            index,
            reason: "expected [x,y]".to_string(),
        })?;
        if pair.len() != 2 {
            return Err(RoiError::BadPoint {
                index,
                reason: format!("expected 2 coordinates, got {}", pair.len()),
            });
        }
        let coord = |v: &Value| {
            v.as_f64()
                .filter(|c| c.is_finite())
                .ok_or_else(|| RoiError::BadPoint {
                    index,
                    reason: format!("coordinate {} is not a number", v),
                })
        };
        points.push(Point {
            x: coord(&pair[0])?,
            y: coord(&pair[1])?,
        });
    }

    Ok(Polygon(points))
}

/// The ROI edit field: raw text plus the last successfully parsed value.
///
/// A failed `apply` leaves both untouched so the operator keeps seeing what
/// was there before.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiField {
    text: String,
    value: Option<Polygon>,
}

impl Default for RoiField {
    fn default() -> Self {
        Self {
            text: ROI_EXAMPLE.to_string(),
            value: parse_polygon(ROI_EXAMPLE).ok().flatten(),
        }
    }
}

impl RoiField {
    pub fn from_value(value: Option<Polygon>) -> Self {
        let text = value.as_ref().map(Polygon::to_json).unwrap_or_default();
        Self { text, value }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> Option<&Polygon> {
        self.value.as_ref()
    }

    pub fn apply(&mut self, text: &str) -> Result<Option<&Polygon>, RoiError> {
        let parsed = parse_polygon(text)?;
        self.text = text.to_string();
        self.value = parsed;
        Ok(self.value.as_ref())
    }
}
