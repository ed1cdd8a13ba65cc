/// Reference-identity filter for per-frame face detections.
///
/// Stateless across frames: each call compares that frame's faces against
/// the reference embedding and keeps only the ones similar enough to be
/// the target person.
use super::face_embedder::FaceObservation;

/// Unit-norm embedding of the person being searched for.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceEmbedding(Vec<f32>);

impl ReferenceEmbedding {
    /// Normalizes `raw`. Returns `None` for a zero-norm vector.
    pub fn new(raw: &[f32]) -> Option<Self> {
        l2_normalized(raw).map(Self)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// A face that passed the gate. `similarity` doubles as the detection
/// confidence for the tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: [f64; 4],
    pub embedding: Vec<f32>,
    pub similarity: f64,
}

pub struct EmbeddingGate {
    reference: ReferenceEmbedding,
    threshold: f64,
}

impl EmbeddingGate {
    pub fn new(reference: ReferenceEmbedding, threshold: f64) -> Self {
        Self {
            reference,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Keeps faces whose cosine similarity to the reference is strictly
    /// above the threshold. Zero-norm embeddings are dropped.
    pub fn filter(&self, faces: Vec<FaceObservation>) -> Vec<Detection> {
        faces
            .into_iter()
            .filter_map(|face| {
                let Some(embedding) = l2_normalized(&face.embedding) else {
                    log::debug!("Dropping face with zero-norm embedding at {:?}", face.bbox);
                    return None;
                };
                let similarity = cosine_similarity(self.reference.as_slice(), &embedding);
                (similarity > self.threshold).then_some(Detection {
                    bbox: face.bbox,
                    embedding,
                    similarity,
                })
            })
            .collect()
    }
}

/// L2-normalized copy of `v`, or `None` when the norm is zero or not finite.
pub fn l2_normalized(v: &[f32]) -> Option<Vec<f32>> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

/// Dot product of L2-normalized vectors equals cosine similarity.
///
/// Clamped to `[-1, 1]` to absorb rounding on near-parallel vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    dot.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn face(embedding: Vec<f32>) -> FaceObservation {
        FaceObservation {
            bbox: [10.0, 10.0, 60.0, 60.0],
            embedding,
        }
    }

    fn gate(threshold: f64) -> EmbeddingGate {
        EmbeddingGate::new(ReferenceEmbedding::new(&[1.0, 0.0, 0.0]).unwrap(), threshold)
    }

    #[rstest]
    #[case(vec![3.0, 4.0])]
    #[case(vec![0.001, 0.0, 0.0])]
    #[case(vec![-2.0, 7.5, 1e3, 0.25])]
    fn test_normalized_vector_has_unit_norm(#[case] v: Vec<f32>) {
        let n = l2_normalized(&v).unwrap();
        let norm: f32 = n.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_relative_eq!(norm, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normalize_values() {
        let n = l2_normalized(&[3.0, 4.0]).unwrap();
        assert_relative_eq!(n[0], 0.6, epsilon = 1e-6);
        assert_relative_eq!(n[1], 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_vector_is_rejected() {
        assert!(l2_normalized(&[0.0, 0.0, 0.0]).is_none());
        assert!(l2_normalized(&[]).is_none());
        assert!(ReferenceEmbedding::new(&[0.0; 4]).is_none());
    }

    #[test]
    fn test_non_finite_vector_is_rejected() {
        assert!(l2_normalized(&[f32::NAN, 1.0]).is_none());
    }

    #[test]
    fn test_cosine_similarity_symmetric_and_bounded() {
        let pairs = [
            (vec![0.6, 0.8], vec![0.8, 0.6]),
            (vec![1.0, 0.0], vec![-1.0, 0.0]),
            (vec![0.0, 1.0], vec![1.0, 0.0]),
        ];
        for (a, b) in pairs {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            assert_relative_eq!(ab, ba);
            assert!((-1.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn test_cosine_similarity_identical_is_one() {
        let a = l2_normalized(&[0.3, 0.3, 0.9]).unwrap();
        assert_relative_eq!(cosine_similarity(&a, &a), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_gate_keeps_similar_faces_with_similarity_as_confidence() {
        let kept = gate(0.5).filter(vec![face(vec![2.0, 0.0, 0.0])]);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].similarity, 1.0, epsilon = 1e-6);
        assert_relative_eq!(kept[0].embedding[0], 1.0, epsilon = 1e-6);
        assert_eq!(kept[0].bbox, [10.0, 10.0, 60.0, 60.0]);
    }

    #[test]
    fn test_gate_drops_dissimilar_faces() {
        let kept = gate(0.5).filter(vec![face(vec![0.0, 1.0, 0.0]), face(vec![-1.0, 0.0, 0.0])]);
        assert!(kept.is_empty());
    }

    #[test]
    fn test_gate_threshold_is_strict() {
        // cos = 1.0 exactly
        let kept = gate(1.0).filter(vec![face(vec![2.0, 0.0, 0.0])]);
        assert!(kept.is_empty());
        let kept = gate(0.999).filter(vec![face(vec![2.0, 0.0, 0.0])]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_gate_drops_zero_norm_without_error() {
        let kept = gate(-1.0).filter(vec![face(vec![0.0, 0.0, 0.0]), face(vec![1.0, 0.0, 0.0])]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_gate_empty_frame() {
        assert!(gate(0.5).filter(Vec::new()).is_empty());
    }
}
