//! facecheck-core — Face detection, recognition and reference matching.
//!
//! Uses SCRFD for face detection and ArcFace for face recognition,
//! both running via ONNX Runtime for CPU inference.

use std::path::PathBuf;

pub mod alignment;
pub mod detector;
pub mod recognizer;
pub mod reference;
pub mod types;

pub use detector::{DetectorError, FaceDetector, FaceLocator};
pub use recognizer::{FaceEncoder, FaceRecognizer, RecognizerError};
pub use reference::{encode_reference, ReferenceError};
pub use types::{
    BoundingBox, CosineComparator, Embedding, EuclideanComparator, FaceComparator,
    ReferenceEncoding,
};

/// SCRFD detection model filename inside the model directory.
pub const DETECTOR_MODEL: &str = "det_10g.onnx";
/// ArcFace recognition model filename inside the model directory.
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/facecheck/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    let data_home = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        });
    data_home.join("facecheck/models")
}
