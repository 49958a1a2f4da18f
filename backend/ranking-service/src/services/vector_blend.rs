//! Dense vector arithmetic shared by the user-vector pipeline.

/// Norms at or below this are treated as zero.
pub const NORM_EPSILON: f32 = 1e-8;

pub struct VectorBlender;

impl VectorBlender {
    pub fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// L2-normalize `v`; near-zero vectors are returned unchanged.
    pub fn normalize(v: &[f32]) -> Vec<f32> {
        let norm = Self::norm(v);
        if norm > NORM_EPSILON {
            v.iter().map(|x| x / norm).collect()
        } else {
            v.to_vec()
        }
    }

    /// `weight_a * a + weight_b * b`, right-padding the shorter input with zeros.
    ///
    /// An empty input yields the other input untouched, without weighting.
    pub fn combine(a: &[f32], b: &[f32], weight_a: f32, weight_b: f32) -> Vec<f32> {
        if a.is_empty() {
            return b.to_vec();
        }
        if b.is_empty() {
            return a.to_vec();
        }

        let dim = a.len().max(b.len());
        (0..dim)
            .map(|i| {
                let x = a.get(i).copied().unwrap_or(0.0);
                let y = b.get(i).copied().unwrap_or(0.0);
                weight_a * x + weight_b * y
            })
            .collect()
    }

    /// Dot product over the common prefix.
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    pub fn is_near_zero(v: &[f32]) -> bool {
        Self::norm(v) <= NORM_EPSILON
    }
}
