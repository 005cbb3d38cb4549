//! Box geometry
//!
//! Detections carry axis-aligned boxes in center/width/height form, the layout
//! the hosted detectors return. Overlap between two boxes is Intersection over
//! Union (IoU).

use serde::{Deserialize, Serialize};

/// Axis-aligned box in center/width/height form
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(rename = "x")]
    pub center_x: f64,
    #[serde(rename = "y")]
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

/// Min/max corner form: `(x_min, y_min, x_max, y_max)`
pub type Corners = (f64, f64, f64, f64);

impl BoundingBox {
    pub fn new(center_x: f64, center_y: f64, width: f64, height: f64) -> Self {
        Self {
            center_x,
            center_y,
            width,
            height,
        }
    }

    pub fn corners(&self) -> Corners {
        (
            self.center_x - self.width / 2.0,
            self.center_y - self.height / 2.0,
            self.center_x + self.width / 2.0,
            self.center_y + self.height / 2.0,
        )
    }

    /// All four fields are finite numbers
    pub fn is_finite(&self) -> bool {
        self.center_x.is_finite()
            && self.center_y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    /// Area, or 0.0 for degenerate (non-finite, non-positive width or height) boxes
    pub fn area(&self) -> f64 {
        if !self.is_finite() || self.width <= 0.0 || self.height <= 0.0 {
            0.0
        } else {
            self.width * self.height
        }
    }
}

/// Intersection over Union of two boxes
///
/// Returns exactly 0.0 when either box is degenerate (including any non-finite
/// field) or the boxes do not intersect. Symmetric in its arguments.
pub fn overlap_ratio(a: &BoundingBox, b: &BoundingBox) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }
    let area_a = a.area();
    let area_b = b.area();
    if area_a <= 0.0 || area_b <= 0.0 {
        return 0.0;
    }

    let (ax_min, ay_min, ax_max, ay_max) = a.corners();
    let (bx_min, by_min, bx_max, by_max) = b.corners();

    let inter_w = (ax_max.min(bx_max) - ax_min.max(bx_min)).max(0.0);
    let inter_h = (ay_max.min(by_max) - ay_min.max(by_min)).max(0.0);
    let intersection = inter_w * inter_h;
    if intersection <= 0.0 {
        return 0.0;
    }

    intersection / (area_a + area_b - intersection)
}
