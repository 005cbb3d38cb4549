// Raw prediction normalization
//
// Hosted detectors return loosely typed JSON: numbers sometimes arrive as
// strings, optional fields go missing. Everything is coerced here so the rest of
// the engine works on typed `Detection` values.

use serde_json::Value;
use tracing::debug;

use crate::geometry::BoundingBox;
use crate::models::Detection;

/// Convert raw predictions to detections, dropping those below `min_confidence`
///
/// Missing or non-numeric confidence counts as 0.0. Missing box fields become
/// 0.0, which yields a degenerate box that overlaps nothing. A box with any
/// non-finite field ("NaN", "inf") is replaced by an empty box; a non-finite
/// confidence counts as 0.0. Entries that are not JSON objects are skipped.
pub fn normalize_predictions(predictions: &[Value], min_confidence: f64) -> Vec<Detection> {
    let mut normalized = Vec::with_capacity(predictions.len());

    for prediction in predictions {
        let Some(fields) = prediction.as_object() else {
            debug!("Skipping non-object prediction: {}", prediction);
            continue;
        };

        let confidence = coerce_f64(fields.get("confidence")).unwrap_or(0.0);
        if confidence < min_confidence {
            continue;
        }

        let bbox = BoundingBox::new(
            coerce_number(fields.get("x")).unwrap_or(0.0),
            coerce_number(fields.get("y")).unwrap_or(0.0),
            coerce_number(fields.get("width")).unwrap_or(0.0),
            coerce_number(fields.get("height")).unwrap_or(0.0),
        );
        let bbox = if bbox.is_finite() {
            bbox
        } else {
            BoundingBox::new(0.0, 0.0, 0.0, 0.0)
        };

        let class_name = coerce_string(fields.get("class"))
            .or_else(|| coerce_string(fields.get("class_name")))
            .unwrap_or_default();

        normalized.push(Detection::new(
            bbox,
            confidence,
            coerce_i64(fields.get("class_id")).unwrap_or(-1),
            class_name,
            coerce_string(fields.get("detection_id")).unwrap_or_default(),
        ));
    }

    normalized
}

/// Numeric value as sent, possibly non-finite when it arrived as a string
fn coerce_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    coerce_number(value).filter(|v| v.is_finite())
}

fn coerce_i64(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
