//! Upload intake
//!
//! Validates the images of one upload transaction and stores them for the
//! assessment run. Images are named by their multipart field: `<side>-<phase>`,
//! e.g. `front-pickup`. Every uploaded side needs both phases.

use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use super::object_storage::{ObjectStorage, StorageError};
use crate::models::{parse_side_phase, ImagePhase, Side};

/// Upload validation errors (reported as 422)
#[derive(Debug, Error, PartialEq)]
pub enum IntakeError {
    #[error("Invalid field name '{0}', expected <side>-<phase> with side in front|rear|left|right and phase in pickup|return")]
    InvalidFieldName(String),

    #[error("Duplicate image for '{0}'")]
    DuplicateField(String),

    #[error("No images uploaded")]
    NoImages,

    #[error("Incomplete sides, both pickup and return images required for: {}", join_sides(.0))]
    IncompleteSides(Vec<Side>),
}

fn join_sides(sides: &[Side]) -> String {
    sides.iter().map(Side::as_str).collect::<Vec<_>>().join(", ")
}

/// One uploaded file
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedImage {
    /// Multipart field name
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Both photos of one side
#[derive(Debug, Clone, PartialEq)]
pub struct SideUpload {
    pub side: Side,
    pub pickup: UploadedImage,
    pub return_image: UploadedImage,
}

/// Group uploaded images into complete sides, in side order
pub fn group_side_uploads(images: Vec<UploadedImage>) -> Result<Vec<SideUpload>, IntakeError> {
    if images.is_empty() {
        return Err(IntakeError::NoImages);
    }

    let mut by_side: BTreeMap<Side, (Option<UploadedImage>, Option<UploadedImage>)> =
        BTreeMap::new();

    for image in images {
        let (side, phase) = parse_side_phase(&image.field)
            .ok_or_else(|| IntakeError::InvalidFieldName(image.field.clone()))?;

        let slot = by_side.entry(side).or_default();
        let target = match phase {
            ImagePhase::Pickup => &mut slot.0,
            ImagePhase::Return => &mut slot.1,
        };
        if target.is_some() {
            return Err(IntakeError::DuplicateField(image.field));
        }
        *target = Some(image);
    }

    let incomplete: Vec<Side> = by_side
        .iter()
        .filter(|(_, (pickup, ret))| pickup.is_none() || ret.is_none())
        .map(|(side, _)| *side)
        .collect();
    if !incomplete.is_empty() {
        return Err(IntakeError::IncompleteSides(incomplete));
    }

    Ok(by_side
        .into_iter()
        .filter_map(|(side, (pickup, ret))| {
            Some(SideUpload {
                side,
                pickup: pickup?,
                return_image: ret?,
            })
        })
        .collect())
}

/// File extension (with leading dot) for a stored image
///
/// Taken from the uploaded file name, otherwise sniffed from the content.
/// Empty when neither yields one.
pub fn image_extension(file_name: Option<&str>, bytes: &[u8]) -> String {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    if let Some(ext) = from_name {
        return format!(".{}", ext.to_ascii_lowercase());
    }

    infer::get(bytes)
        .map(|kind| format!(".{}", kind.extension()))
        .unwrap_or_default()
}

/// Storage key of one side photo
pub fn image_key(upload_id: &str, side: Side, phase: ImagePhase, extension: &str) -> String {
    format!("{}/{}-{}{}", upload_id, side, phase, extension)
}

/// Store every side's photos under `upload_id`, returning the stored keys
pub async fn store_side_uploads(
    storage: &dyn ObjectStorage,
    upload_id: &str,
    sides: Vec<SideUpload>,
) -> Result<Vec<String>, StorageError> {
    let mut keys = Vec::with_capacity(sides.len() * 2);

    for upload in sides {
        for (phase, image) in [
            (ImagePhase::Pickup, upload.pickup),
            (ImagePhase::Return, upload.return_image),
        ] {
            let extension = image_extension(image.file_name.as_deref(), &image.bytes);
            let key = image_key(upload_id, upload.side, phase, &extension);
            let content_type = image
                .content_type
                .clone()
                .or_else(|| infer::get(&image.bytes).map(|kind| kind.mime_type().to_string()))
                .unwrap_or_else(|| "application/octet-stream".to_string());

            storage.upload(image.bytes, &key, &content_type).await?;
            keys.push(key);
        }
    }

    tracing::info!(upload_id, objects = keys.len(), "Stored upload images");
    Ok(keys)
}
