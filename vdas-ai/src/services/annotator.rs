//! Damage annotation rendering
//!
//! Draws the new damages of a side onto its return photo as labelled
//! rectangle outlines (`"<confidence>% <Class>"`) and stores the result next to
//! the source images.

use ab_glyph::{FontRef, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;

use super::object_storage::{ObjectStorage, StorageError};
use super::summary::class_label;
use crate::models::{Detection, Side};

const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_THICKNESS: u32 = 3;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const LABEL_SCALE: f32 = 16.0;
const LABEL_PADDING: u32 = 2;

/// DejaVu Sans, see `assets/DejaVuSans-LICENSE.txt`
const LABEL_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Label font error: {0}")]
    Font(String),

    #[error("Render task failed: {0}")]
    Task(String),
}

/// Storage key of a side's annotated return photo
pub fn annotated_key(job_id: &str, side: Side) -> String {
    format!("{}/{}-return-annotated.jpg", job_id, side)
}

/// Box label: rounded confidence percentage and class, e.g. `"87% Rear Bumper"`
pub fn annotation_label(detection: &Detection) -> String {
    format!(
        "{}% {}",
        (detection.confidence * 100.0).round() as i64,
        class_label(detection)
    )
}

pub fn label_font() -> Result<FontRef<'static>, AnnotationError> {
    FontRef::try_from_slice(LABEL_FONT).map_err(|e| AnnotationError::Font(e.to_string()))
}

/// Pixel bounds `(left, top, right, bottom)` of a detection clipped to the image
fn clipped_bounds(image: &RgbImage, detection: &Detection) -> Option<(u32, u32, u32, u32)> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || !detection.bbox.is_finite() {
        return None;
    }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;

    let (x_min, y_min, x_max, y_max) = detection.bbox.corners();
    if x_max < 0.0 || y_max < 0.0 || x_min > max_x || y_min > max_y {
        return None;
    }

    Some((
        x_min.clamp(0.0, max_x) as u32,
        y_min.clamp(0.0, max_y) as u32,
        x_max.clamp(0.0, max_x) as u32,
        y_max.clamp(0.0, max_y) as u32,
    ))
}

/// Draw a detection's outline, clipped to the image
pub fn draw_outline(image: &mut RgbImage, detection: &Detection) {
    let Some((left, top, right, bottom)) = clipped_bounds(image, detection) else {
        return;
    };

    for offset in 0..OUTLINE_THICKNESS {
        let inset = 2 * offset;
        let width = (right - left + 1).saturating_sub(inset);
        let height = (bottom - top + 1).saturating_sub(inset);
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((left + offset) as i32, (top + offset) as i32).of_size(width, height);
        draw_hollow_rect_mut(image, rect, OUTLINE_COLOR);
    }
}

/// Draw a detection's label on a filled tab above its outline
///
/// The tab moves inside the box when there is no room above it.
pub fn draw_label(image: &mut RgbImage, detection: &Detection, font: &FontRef<'_>) {
    let Some((left, top, _, _)) = clipped_bounds(image, detection) else {
        return;
    };

    let text = annotation_label(detection);
    let scale = PxScale::from(LABEL_SCALE);
    let (text_width, text_height) = text_size(scale, font, &text);
    let tab_width = text_width + 2 * LABEL_PADDING;
    let tab_height = text_height + 2 * LABEL_PADDING;
    let tab_top = top.checked_sub(tab_height).unwrap_or(top);

    draw_filled_rect_mut(
        image,
        Rect::at(left as i32, tab_top as i32).of_size(tab_width, tab_height),
        OUTLINE_COLOR,
    );
    draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        (left + LABEL_PADDING) as i32,
        (tab_top + LABEL_PADDING) as i32,
        scale,
        font,
        &text,
    );
}

/// Draw labelled outlines of every detection onto `image`
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection], font: &FontRef<'_>) {
    for detection in detections {
        draw_outline(image, detection);
        draw_label(image, detection, font);
    }
}

/// Decode `source`, draw `detections` and encode the result as JPEG
pub fn render_annotated(source: &[u8], detections: &[Detection]) -> Result<Vec<u8>, AnnotationError> {
    let font = label_font()?;
    let mut canvas = image::load_from_memory(source)?.to_rgb8();
    draw_detections(&mut canvas, detections, &font);

    let mut encoded = Vec::new();
    canvas.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;
    Ok(encoded)
}

/// Render a side's annotated return photo and store it
///
/// Returns the public URL of the stored image.
pub async fn annotate_side(
    storage: Arc<dyn ObjectStorage>,
    job_id: &str,
    side: Side,
    return_key: &str,
    new_damages: Vec<Detection>,
) -> Result<String, AnnotationError> {
    let source = storage.read(return_key).await?;

    let rendered = tokio::task::spawn_blocking(move || render_annotated(&source, &new_damages))
        .await
        .map_err(|e| AnnotationError::Task(e.to_string()))??;

    let url = storage
        .upload(rendered, &annotated_key(job_id, side), "image/jpeg")
        .await?;
    Ok(url)
}
