use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map the box (and its landmarks) into a frame that is `factor` times larger.
    ///
    /// Detections made on a working copy downscaled by `s` go back to the
    /// full-resolution frame with `scaled(1.0 / s)`.
    pub fn scaled(&self, factor: f32) -> BoundingBox {
        BoundingBox {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }

    /// Integer pixel corners `(left, top, right, bottom)`, rounded to nearest.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x.round() as i32,
            self.y.round() as i32,
            (self.x + self.width).round() as i32,
            (self.y + self.height).round() as i32,
        )
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// The one face every live frame is compared against.
///
/// Built once at startup by [`encode_reference`](crate::reference::encode_reference)
/// and only ever borrowed afterwards.
#[derive(Debug, Clone)]
pub struct ReferenceEncoding(Embedding);

impl ReferenceEncoding {
    pub fn new(embedding: Embedding) -> Self {
        Self(embedding)
    }

    pub fn embedding(&self) -> &Embedding {
        &self.0
    }
}

/// Boolean match predicate between the reference and a candidate embedding.
pub trait FaceComparator {
    fn matches(&self, reference: &Embedding, candidate: &Embedding) -> bool;
}

/// Matches when cosine similarity reaches `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct CosineComparator {
    pub threshold: f32,
}

impl FaceComparator for CosineComparator {
    fn matches(&self, reference: &Embedding, candidate: &Embedding) -> bool {
        let sim = reference.similarity(candidate);
        tracing::trace!(similarity = sim, threshold = self.threshold, "cosine compare");
        sim >= self.threshold
    }
}

/// Matches when Euclidean distance is at most `tolerance`.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanComparator {
    pub tolerance: f32,
}

impl FaceComparator for EuclideanComparator {
    fn matches(&self, reference: &Embedding, candidate: &Embedding) -> bool {
        let dist = reference.euclidean_distance(candidate);
        tracing::trace!(distance = dist, tolerance = self.tolerance, "euclidean compare");
        dist <= self.tolerance
    }
}

impl<C: FaceComparator + ?Sized> FaceComparator for Box<C> {
    fn matches(&self, reference: &Embedding, candidate: &Embedding) -> bool {
        (**self).matches(reference, candidate)
    }
}
