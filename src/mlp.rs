//! Multi-layer perceptron classifier with hand-written gradients.
//!
//! # Architecture
//!
//! ```text
//! x [batch, n_features]
//!   → dense → relu → … → dense   (one dense layer per hidden dim + output)
//!   → logits [batch, n_classes]
//! ```
//!
//! The same architecture serves as the first-round reference model and as
//! the second-round teacher and student.

use celldistill_common::{CellDistillError, Result};
use ndarray::{Array1, Array2, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entropy::softmax_rows;
use crate::optim::{Optimizer, ParamMut};

/// Anything that maps a cells × features matrix to class scores.
pub trait Classifier {
    /// Expected input width.
    fn n_features(&self) -> usize;

    /// Output width.
    fn n_classes(&self) -> usize;

    /// Unnormalized class scores [cells, classes].
    fn logits(&self, x: &Array2<f32>) -> Result<Array2<f32>>;

    /// Class probability distributions [cells, classes].
    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        Ok(softmax_rows(&self.logits(x)?))
    }
}

/// Layer widths of an [`Mlp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlpConfig {
    pub input_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub n_classes: usize,
}

impl MlpConfig {
    pub fn new(input_dim: usize, hidden_dims: &[usize], n_classes: usize) -> Self {
        Self { input_dim, hidden_dims: hidden_dims.to_vec(), n_classes }
    }

    /// (fan_in, fan_out) of every dense layer, input to output.
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        let mut dims = Vec::with_capacity(self.hidden_dims.len() + 2);
        dims.push(self.input_dim);
        dims.extend(&self.hidden_dims);
        dims.push(self.n_classes);
        dims.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

/// Fully connected layer: `y = x · weight + bias`.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    /// [fan_in, fan_out]
    pub weight: Array2<f32>,
    /// [fan_out]
    pub bias: Array1<f32>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    fn glorot<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let weight = Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit));
        Self { weight, bias: Array1::zeros(fan_out) }
    }
}

/// Activations kept from a forward pass for backpropagation.
pub struct ForwardTrace {
    /// Input of every layer (post-activation of the previous one)
    inputs: Vec<Array2<f32>>,
    pub logits: Array2<f32>,
}

/// Parameter gradients, one [`Dense`] per layer.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub layers: Vec<Dense>,
}

/// ReLU multi-layer perceptron.
#[derive(Debug, Clone, PartialEq)]
pub struct Mlp {
    config: MlpConfig,
    layers: Vec<Dense>,
}

impl Mlp {
    /// Randomly initialized network.
    pub fn new<R: Rng + ?Sized>(config: MlpConfig, rng: &mut R) -> Self {
        let layers = config
            .layer_shapes()
            .into_iter()
            .map(|(fan_in, fan_out)| Dense::glorot(fan_in, fan_out, &mut *rng))
            .collect();
        Self { config, layers }
    }

    /// Rebuild from stored layers, checking every shape against `config`.
    pub fn from_layers(config: MlpConfig, layers: Vec<Dense>) -> Result<Self> {
        let shapes = config.layer_shapes();
        if shapes.len() != layers.len() {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![shapes.len()],
                actual: vec![layers.len()],
            });
        }
        for (&(fan_in, fan_out), layer) in shapes.iter().zip(&layers) {
            if layer.weight.dim() != (fan_in, fan_out) || layer.bias.len() != fan_out {
                return Err(CellDistillError::ShapeMismatch {
                    expected: vec![fan_in, fan_out],
                    actual: layer.weight.shape().to_vec(),
                });
            }
        }
        Ok(Self { config, layers })
    }

    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    /// Total trainable parameter count.
    #[must_use]
    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.weight.len() + l.bias.len()).sum()
    }

    fn check_input(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.config.input_dim {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![x.nrows(), self.config.input_dim],
                actual: x.shape().to_vec(),
            });
        }
        Ok(())
    }

    /// Forward pass keeping every layer input.
    pub fn forward_trace(&self, x: &Array2<f32>) -> Result<ForwardTrace> {
        self.check_input(x)?;

        let last = self.layers.len() - 1;
        let mut inputs = Vec::with_capacity(self.layers.len());
        let mut h = x.to_owned();
        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = h.dot(&layer.weight) + &layer.bias;
            if i < last {
                z.mapv_inplace(|v| v.max(0.0));
            }
            inputs.push(h);
            h = z;
        }
        Ok(ForwardTrace { inputs, logits: h })
    }

    /// Backpropagate `grad_logits` (∂loss/∂logits) through the network.
    pub fn backward(&self, trace: &ForwardTrace, grad_logits: &Array2<f32>) -> Gradients {
        let mut grads = Vec::with_capacity(self.layers.len());
        let mut grad = grad_logits.clone();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let input = &trace.inputs[i];
            grads.push(Dense {
                weight: input.t().dot(&grad),
                bias: grad.sum_axis(Axis(0)),
            });

            if i > 0 {
                let mut upstream = grad.dot(&layer.weight.t());
                // relu'(z) = 0 where the activation was clamped
                Zip::from(&mut upstream).and(input).for_each(|g, &a| {
                    if a <= 0.0 {
                        *g = 0.0;
                    }
                });
                grad = upstream;
            }
        }

        grads.reverse();
        Gradients { layers: grads }
    }

    /// Apply one optimizer step with the given gradients.
    pub fn apply_gradients(&mut self, grads: &Gradients, optimizer: &mut dyn Optimizer) {
        let mut params = Vec::with_capacity(self.layers.len() * 2);
        for (layer, grad) in self.layers.iter_mut().zip(&grads.layers) {
            let Dense { weight, bias } = layer;
            params.push(ParamMut { value: weight.view_mut().into_dyn(), grad: grad.weight.view().into_dyn() });
            params.push(ParamMut { value: bias.view_mut().into_dyn(), grad: grad.bias.view().into_dyn() });
        }
        optimizer.step(&mut params);
    }
}

impl Classifier for Mlp {
    fn n_features(&self) -> usize {
        self.config.input_dim
    }

    fn n_classes(&self) -> usize {
        self.config.n_classes
    }

    fn logits(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        Ok(self.forward_trace(x)?.logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Adam;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_mlp(seed: u64) -> Mlp {
        let mut rng = StdRng::seed_from_u64(seed);
        Mlp::new(MlpConfig::new(3, &[4], 2), &mut rng)
    }

    /// ½ Σ logits² makes ∂loss/∂logits = logits
    fn half_sq(mlp: &Mlp, x: &Array2<f32>) -> f32 {
        0.5 * mlp.logits(x).unwrap().mapv(|v| v * v).sum()
    }

    #[test]
    fn test_layer_shapes() {
        let config = MlpConfig::new(100, &[64, 16], 5);
        assert_eq!(config.layer_shapes(), vec![(100, 64), (64, 16), (16, 5)]);
    }

    #[test]
    fn test_forward_shape_and_proba() {
        let mlp = small_mlp(7);
        let x = array![[0.1, -0.2, 0.3], [1.0, 0.0, -1.0]];
        let probs = mlp.predict_proba(&x).unwrap();
        assert_eq!(probs.dim(), (2, 2));
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_wrong_input_width_rejected() {
        let mlp = small_mlp(7);
        let x = array![[0.1, 0.2]];
        assert!(matches!(mlp.logits(&x), Err(CellDistillError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_same_seed_same_weights() {
        assert_eq!(small_mlp(42), small_mlp(42));
        assert_ne!(small_mlp(42), small_mlp(43));
    }

    #[test]
    fn test_backward_matches_finite_differences() {
        let mlp = small_mlp(3);
        let x = array![[0.5, -1.0, 2.0], [1.5, 0.3, -0.7]];

        let trace = mlp.forward_trace(&x).unwrap();
        let grads = mlp.backward(&trace, &trace.logits.clone());

        let eps = 1e-2;
        for layer_idx in 0..mlp.layers.len() {
            for ((r, c), &analytic) in grads.layers[layer_idx].weight.indexed_iter() {
                let mut plus = mlp.clone();
                plus.layers[layer_idx].weight[[r, c]] += eps;
                let mut minus = mlp.clone();
                minus.layers[layer_idx].weight[[r, c]] -= eps;
                let numeric = (half_sq(&plus, &x) - half_sq(&minus, &x)) / (2.0 * eps);
                assert!(
                    (numeric - analytic).abs() < 5e-2 * (1.0 + analytic.abs()),
                    "layer {layer_idx} [{r},{c}]: numeric {numeric} vs analytic {analytic}"
                );
            }
        }
    }

    #[test]
    fn test_apply_gradients_reduces_loss() {
        let mut mlp = small_mlp(11);
        let x = array![[0.5, -1.0, 2.0], [1.5, 0.3, -0.7]];
        let mut opt = Adam::default_params(0.01);

        let before = half_sq(&mlp, &x);
        for _ in 0..50 {
            let trace = mlp.forward_trace(&x).unwrap();
            let grads = mlp.backward(&trace, &trace.logits.clone());
            mlp.apply_gradients(&grads, &mut opt);
        }
        assert!(half_sq(&mlp, &x) < before);
    }

    #[test]
    fn test_from_layers_validates_shapes() {
        let mlp = small_mlp(1);
        let config = mlp.config().clone();
        assert!(Mlp::from_layers(config.clone(), mlp.layers().to_vec()).is_ok());

        let mut bad = mlp.layers().to_vec();
        bad[0].bias = Array1::zeros(9);
        assert!(Mlp::from_layers(config.clone(), bad).is_err());
        assert!(Mlp::from_layers(config, vec![]).is_err());
    }

    #[test]
    fn test_num_parameters() {
        let mlp = small_mlp(1);
        assert_eq!(mlp.num_parameters(), 3 * 4 + 4 + 4 * 2 + 2);
    }
}
