//! Cosine similarity over embeddings and skill vectors

/// Cosine similarity of two vectors, in [-1, 1].
///
/// Malformed input (dimension mismatch, empty or zero-norm vectors,
/// non-finite components) yields 0.0 rather than an error, so a bad
/// embedding is simply similar to nothing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() || !dot.is_finite() {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors() {
        let v = [0.3, -1.2, 4.0, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetric_and_bounded() {
        let pairs: Vec<(Vec<f32>, Vec<f32>)> = vec![
            (vec![1.0, 2.0, 3.0], vec![-3.0, 0.5, 2.0]),
            (vec![1.0, 0.0], vec![-1.0, 0.0]),
            (vec![1e-20, 1e-20], vec![1e-20, -1e-20]),
            (vec![5.0, 5.0, 5.0], vec![5.0, 5.0, 5.0001]),
        ];
        for (a, b) in &pairs {
            let ab = cosine_similarity(a, b);
            assert_eq!(ab, cosine_similarity(b, a));
            assert!((-1.0..=1.0).contains(&ab), "{ab} out of range");
        }
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_malformed_inputs_are_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_skill_score_example() {
        // Technical ticket against a tech-heavy agent
        let s = cosine_similarity(&[1.0, 0.0, 0.0], &[0.9, 0.1, 0.0]);
        assert!((s - 0.99388).abs() < 1e-4);
    }
}
