//! Categorical cross-entropy on raw logits

use ndarray::{Array2, Axis};

use crate::entropy::softmax_rows;

/// Row-wise log-softmax: `x_i - max - ln Σ exp(x_j - max)`.
pub fn log_softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut result = logits.clone();
    for mut row in result.axis_iter_mut(Axis(0)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f32>().ln();
        row.mapv_inplace(|v| v - max_val - log_sum);
    }
    result
}

/// Mean cross-entropy against one-hot (or soft) targets and its gradient
/// with respect to the logits.
///
/// ```text
/// L = -1/B Σ_b Σ_k y_bk · log softmax(z)_bk
/// ∂L/∂z = (softmax(z) - y) / B
/// ```
pub fn cross_entropy_with_logits(logits: &Array2<f32>, targets: &Array2<f32>) -> (f32, Array2<f32>) {
    assert_eq!(logits.shape(), targets.shape(), "logits and targets must have the same shape");
    let batch = logits.nrows().max(1) as f32;

    let loss = -(targets * &log_softmax_rows(logits)).sum() / batch;
    let grad = (softmax_rows(logits) - targets) / batch;
    (loss, grad)
}
