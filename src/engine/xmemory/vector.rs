// ── xmemory: Vector Math ────────────────────────────────────────────────────
//
// Cosine similarity and centroids over fixed-length embeddings.
// Accumulation happens in f64 so long vectors of small f32 components do not
// lose precision; results are f64 scores.

/// Cosine similarity between two vectors.
///
/// Returns 0.0 when the lengths differ, either vector is empty, or either
/// vector has zero norm. Otherwise the result lies in [-1, 1].
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let (fx, fy) = (*x as f64, *y as f64);
        dot += fx * fy;
        na += fx * fx;
        nb += fy * fy;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Component-wise arithmetic mean of a set of vectors.
///
/// The dimension is taken from the first vector. An empty input yields an
/// empty centroid.
pub fn compute_centroid<V: AsRef<[f32]>>(vectors: &[V]) -> Vec<f32> {
    let Some(first) = vectors.first() else {
        return Vec::new();
    };
    let dim = first.as_ref().len();
    let mut sums = vec![0.0f64; dim];

    for v in vectors {
        for (sum, x) in sums.iter_mut().zip(v.as_ref().iter()) {
            *sum += *x as f64;
        }
    }

    let n = vectors.len() as f64;
    sums.into_iter().map(|s| (s / n) as f32).collect()
}

/// Running-mean update used when one vector joins a cluster of `n` members:
/// `c' = (c·n + v) / (n + 1)`.
pub fn incremental_mean(centroid: &[f32], n: usize, v: &[f32]) -> Vec<f32> {
    let n = n as f64;
    centroid
        .iter()
        .zip(v.iter())
        .map(|(c, x)| ((*c as f64 * n + *x as f64) / (n + 1.0)) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_ignores_magnitude() {
        let centroid = [0.5, -0.25, 2.0];
        let scaled = [5.0, -2.5, 20.0];
        assert!((cosine_sim(&centroid, &scaled) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_unrelated_and_reversed_embeddings() {
        let topic = [0.0, 3.0, 0.0, 4.0];
        assert!(cosine_sim(&topic, &[7.0, 0.0, -2.0, 0.0]).abs() < 1e-6);
        assert!((cosine_sim(&topic, &[0.0, -3.0, 0.0, -4.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_inputs_score_zero() {
        assert_eq!(cosine_sim(&[], &[]), 0.0);
        assert_eq!(cosine_sim(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_sim(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_stays_within_unit_range() {
        let samples = [
            (vec![0.3, -0.7, 2.5, 0.0], vec![-1.2, 0.4, 0.9, 3.3]),
            (vec![1e-3, 1e-3, 1e-3, 1e-3], vec![5.0, -5.0, 5.0, -5.0]),
            (vec![100.0, 0.1, -50.0, 7.0], vec![99.0, 0.2, -49.0, 6.5]),
        ];
        for (a, b) in &samples {
            let s = cosine_sim(a, b);
            assert!((-1.0..=1.0 + 1e-9).contains(&s), "out of bounds: {}", s);
        }
    }

    #[test]
    fn centroid_of_empty_and_single_input() {
        let empty: Vec<Vec<f32>> = vec![];
        assert!(compute_centroid(&empty).is_empty());
        assert_eq!(compute_centroid(&[vec![1.0, 2.0, 3.0]]), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn centroid_is_componentwise_mean() {
        let c = compute_centroid(&[vec![2.0, 4.0, 6.0], vec![4.0, 6.0, 8.0]]);
        assert_eq!(c, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn incremental_mean_matches_full_mean_for_sequential_adds() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let c = vec![1.0, 1.0];
        let step = incremental_mean(&incremental_mean(&a, 1, &b), 2, &c);
        let full = compute_centroid(&[a, b, c]);
        for (x, y) in step.iter().zip(full.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }
}
