//! Vector distance functions.

use serde::{Deserialize, Serialize};

/// Distance used by the vector index and by semantic scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    /// Distance between two vectors of equal dimension. Smaller is closer.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                let denom = norm(a) * norm(b);
                if denom <= f32::EPSILON {
                    1.0
                } else {
                    1.0 - (dot(a, b) / denom).clamp(-1.0, 1.0)
                }
            }
            Self::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// Map a distance to a similarity score. Larger is closer.
    ///
    /// Cosine similarity lies in `[-1, 1]`; L2 similarity in `(0, 1]`.
    #[must_use]
    pub fn similarity(self, distance: f32) -> f32 {
        match self {
            Self::Cosine => 1.0 - distance,
            Self::L2 => 1.0 / (1.0 + distance),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn norm(a: &[f32]) -> f32 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn cosine_of_parallel_vectors_is_zero() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 2.0], &[2.0, 4.0]);
        assert!(close(d, 0.0));
        assert!(close(DistanceMetric::Cosine.similarity(d), 1.0));
    }

    #[test]
    fn cosine_of_opposite_vectors_is_two() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!(close(d, 2.0));
        assert!(close(DistanceMetric::Cosine.similarity(d), -1.0));
    }

    #[test]
    fn zero_vector_is_orthogonal_to_everything() {
        let d = DistanceMetric::Cosine.distance(&[0.0, 0.0], &[1.0, 0.0]);
        assert!(close(d, 1.0));
    }

    #[test]
    fn l2_distance_and_similarity() {
        let d = DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!(close(d, 5.0));
        assert!(close(DistanceMetric::L2.similarity(d), 1.0 / 6.0));
    }
}
