//! Reference encoder: still image in, exactly one face embedding out.

use crate::detector::{DetectorError, FaceLocator};
use crate::recognizer::{FaceEncoder, RecognizerError};
use crate::types::ReferenceEncoding;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("image not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to load image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no face detected in the reference image {0}")]
    NoFaceDetected(PathBuf),
    #[error("face detection failed: {0}")]
    Detector(#[from] DetectorError),
    #[error("face encoding failed: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Decode `path`, locate faces and keep the embedding of the first one the
/// detector reports.
pub fn encode_reference<L, E>(
    path: &Path,
    locator: &mut L,
    encoder: &mut E,
) -> Result<ReferenceEncoding, ReferenceError>
where
    L: FaceLocator + ?Sized,
    E: FaceEncoder + ?Sized,
{
    if !path.exists() {
        return Err(ReferenceError::NotFound(path.to_path_buf()));
    }

    let image = image::open(path)
        .map_err(|source| ReferenceError::Decode {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();

    tracing::info!(
        path = %path.display(),
        width = image.width(),
        height = image.height(),
        "loaded reference image"
    );

    let faces = locator.locate(&image)?;
    if faces.is_empty() {
        return Err(ReferenceError::NoFaceDetected(path.to_path_buf()));
    }
    if faces.len() > 1 {
        tracing::warn!(count = faces.len(), "reference image has several faces; using the first");
    }

    let embedding = encoder
        .encode(&image, &faces)?
        .into_iter()
        .next()
        .ok_or_else(|| RecognizerError::InferenceFailed("encoder returned no embeddings".into()))?;

    tracing::info!(
        dim = embedding.values.len(),
        confidence = faces[0].confidence,
        "reference encoding generated"
    );

    Ok(ReferenceEncoding::new(embedding))
}
