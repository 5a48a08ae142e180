//! Vector normalization and similarity functions.

/// Compute the L2 (Euclidean) norm of a vector.
#[must_use]
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// L2-normalize a vector in-place. Zero vectors remain zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two vectors (1 − cosine distance).
///
/// For L2-normalized vectors this reduces to the dot product. Mismatched
/// or zero-norm inputs score 0.0 rather than panicking — a similarity
/// query must never take the retrieval path down.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    #[test]
    fn l2_norm_known() {
        assert!(approx_eq(l2_norm(&[3.0, 4.0]), 5.0));
    }

    #[test]
    fn l2_norm_empty() {
        assert!(approx_eq(l2_norm(&[]), 0.0));
    }

    #[test]
    fn l2_normalize_known_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!(approx_eq(v[0], 0.6));
        assert!(approx_eq(v[1], 0.8));
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0), "zero vector stays zero");
        assert!(!v.iter().any(|x| x.is_nan()), "no NaN");
    }

    #[test]
    fn cosine_identical() {
        let v = vec![0.6, 0.8];
        assert!(approx_eq(cosine_similarity(&v, &v), 1.0));
    }

    #[test]
    fn cosine_orthogonal() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0));
    }

    #[test]
    fn cosine_opposite() {
        assert!(approx_eq(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), -1.0));
    }

    #[test]
    fn cosine_known_values() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![4.0, 5.0, 6.0];
        let dot = 4.0 + 10.0 + 18.0;
        let expected = dot / ((14.0_f32).sqrt() * (77.0_f32).sqrt());
        assert!(approx_eq(cosine_similarity(&a, &b), expected));
    }

    #[test]
    fn cosine_mismatched_lengths_score_zero() {
        assert!(approx_eq(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0));
    }

    #[test]
    fn cosine_zero_vector_scores_zero() {
        assert!(approx_eq(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_produces_unit(v in proptest::collection::vec(-100.0f32..100.0, 1..64)) {
                let has_nonzero = v.iter().any(|x| *x != 0.0);
                let mut v = v;
                l2_normalize(&mut v);
                if has_nonzero {
                    prop_assert!((l2_norm(&v) - 1.0).abs() < 1e-4);
                }
            }

            #[test]
            fn cosine_symmetry(
                a in proptest::collection::vec(-100.0f32..100.0, 4..16),
                b in proptest::collection::vec(-100.0f32..100.0, 4..16),
            ) {
                let len = a.len().min(b.len());
                let ab = cosine_similarity(&a[..len], &b[..len]);
                let ba = cosine_similarity(&b[..len], &a[..len]);
                prop_assert!((ab - ba).abs() < 1e-5);
            }

            #[test]
            fn cosine_bounded(
                a in proptest::collection::vec(-100.0f32..100.0, 4..16),
                b in proptest::collection::vec(-100.0f32..100.0, 4..16),
            ) {
                let len = a.len().min(b.len());
                let sim = cosine_similarity(&a[..len], &b[..len]);
                prop_assert!((-1.0 - 1e-4..=1.0 + 1e-4).contains(&sim));
            }
        }
    }
}
