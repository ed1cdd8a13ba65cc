use crate::shared::frame::Frame;

/// One face found by the detector: a box in frame pixel coordinates and
/// the raw (unnormalized) identity embedding for that face.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceObservation {
    pub bbox: [f64; 4],
    pub embedding: Vec<f32>,
}

/// Domain interface for the face detection + embedding model.
///
/// Called once for the reference image and once per video frame.
/// Implementations may hold inference sessions, hence `&mut self`.
pub trait FaceEmbedder: Send {
    fn detect_and_embed(
        &mut self,
        frame: &Frame,
    ) -> Result<Vec<FaceObservation>, Box<dyn std::error::Error>>;
}
