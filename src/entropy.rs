//! Prediction confidence from class probability distributions.
//!
//! ```text
//! p = softmax(logits)
//! H(p) = -Σ p_i · ln(p_i),   with 0 · ln(0) = 0
//! ```
//!
//! Lower entropy means a more confident prediction. Entropy feeds the
//! entropy partitioner only; it is never a classification output.

use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Row-wise softmax with max subtraction for numerical stability.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut result = logits.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_val).exp());

        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    result
}

/// Shannon entropy (natural log) of one probability distribution.
pub fn shannon_entropy(probs: ArrayView1<'_, f32>) -> f32 {
    let h: f32 = probs
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| -p * p.ln())
        .sum();
    // rounding can push a one-hot distribution to -0.0 or a tiny negative
    h.max(0.0)
}

/// Entropy of every row of a probability matrix.
pub fn row_entropies(probs: &Array2<f32>) -> Array1<f32> {
    probs.axis_iter(Axis(0)).map(shannon_entropy).collect()
}

/// Index of the largest probability in each row. Ties resolve to the lowest index.
pub fn argmax_rows(probs: &Array2<f32>) -> Vec<usize> {
    probs
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (i, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use proptest::prelude::*;

    #[test]
    fn test_softmax_sums_to_one() {
        let x = array![[1.0, 2.0, 3.0], [1000.0, 999.0, 998.0]];
        let probs = softmax_rows(&x);
        for row in probs.axis_iter(Axis(0)) {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-6);
            assert!(row.iter().all(|p| p.is_finite()));
        }
    }

    #[test]
    fn test_entropy_of_one_hot_is_zero() {
        let p = array![0.0_f32, 1.0, 0.0];
        assert_eq!(shannon_entropy(p.view()), 0.0);
    }

    #[test]
    fn test_entropy_of_uniform_is_ln_k() {
        let p = array![0.25_f32, 0.25, 0.25, 0.25];
        assert_relative_eq!(shannon_entropy(p.view()), 4.0_f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_zero_probabilities_do_not_produce_nan() {
        let p = array![0.5_f32, 0.5, 0.0, 0.0];
        let h = shannon_entropy(p.view());
        assert!(h.is_finite());
        assert_relative_eq!(h, 2.0_f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_row_entropies_orders_confidence() {
        let probs = array![[0.98, 0.01, 0.01], [0.4, 0.3, 0.3]];
        let h = row_entropies(&probs);
        assert!(h[0] < h[1]);
    }

    #[test]
    fn test_argmax_rows_prefers_first_on_tie() {
        let probs = array![[0.1, 0.7, 0.2], [0.5, 0.5, 0.0]];
        assert_eq!(argmax_rows(&probs), vec![1, 0]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn prop_entropy_non_negative_and_bounded(
            logits in proptest::collection::vec(-30.0_f32..30.0, 2..16),
        ) {
            let k = logits.len();
            let arr = Array2::from_shape_vec((1, k), logits).unwrap();
            let probs = softmax_rows(&arr);
            let h = shannon_entropy(probs.row(0));
            prop_assert!(h >= 0.0);
            prop_assert!(h <= (k as f32).ln() + 1e-4);
        }

        #[test]
        fn prop_entropy_zero_only_for_certain_predictions(
            weights in proptest::collection::vec(0.05_f32..1.0, 2..8),
        ) {
            let total: f32 = weights.iter().sum();
            let probs = Array1::from_iter(weights.iter().map(|w| w / total));
            prop_assert!(shannon_entropy(probs.view()) > 0.0);
        }
    }
}
