//! Adam optimizer

use super::{Optimizer, ParamMut};
use ndarray::{ArrayD, Zip};

/// Adam optimizer
///
/// m_t = β1 * m_{t-1} + (1 - β1) * g
/// v_t = β2 * v_{t-1} + (1 - β2) * g²
/// θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε),  lr_t = lr * √(1 - β2^t) / (1 - β1^t)
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: u64,
    m: Vec<Option<ArrayD<f32>>>, // First moment
    v: Vec<Option<ArrayD<f32>>>, // Second moment
}

impl Adam {
    /// Create a new Adam optimizer
    pub fn new(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self { lr, beta1, beta2, epsilon, t: 0, m: Vec::new(), v: Vec::new() }
    }

    /// Adam with β1 = 0.9, β2 = 0.999, ε = 1e-7
    pub fn default_params(lr: f32) -> Self {
        Self::new(lr, 0.9, 0.999, 1e-7)
    }

    /// Number of steps taken so far.
    #[must_use]
    pub fn step_count(&self) -> u64 {
        self.t
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [ParamMut<'_>]) {
        if self.m.len() < params.len() {
            self.m.resize(params.len(), None);
            self.v.resize(params.len(), None);
        }
        self.t += 1;

        // Bias correction folded into the step size
        let lr_t = self.lr
            * ((1.0 - self.beta2.powi(self.t as i32)).sqrt()
                / (1.0 - self.beta1.powi(self.t as i32)));
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for (i, param) in params.iter_mut().enumerate() {
            let m = self.m[i].get_or_insert_with(|| ArrayD::zeros(param.grad.raw_dim()));
            let v = self.v[i].get_or_insert_with(|| ArrayD::zeros(param.grad.raw_dim()));

            Zip::from(&mut param.value).and(m).and(v).and(&param.grad).for_each(
                |theta, m, v, &g| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *theta -= lr_t * *m / (v.sqrt() + epsilon);
                },
            );
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array1};

    fn step_quadratic(opt: &mut Adam, x: &mut Array1<f32>) {
        // f(x) = Σ x², ∇f = 2x
        let grad = x.mapv(|v| 2.0 * v);
        opt.step(&mut [ParamMut { value: x.view_mut().into_dyn(), grad: grad.view().into_dyn() }]);
    }

    #[test]
    fn test_adam_converges_on_quadratic() {
        let mut opt = Adam::default_params(0.1);
        let mut x = arr1(&[3.0_f32, -2.0]);
        for _ in 0..500 {
            step_quadratic(&mut opt, &mut x);
        }
        assert!(x.iter().all(|v| v.abs() < 0.1), "x = {x:?}");
        assert_eq!(opt.step_count(), 500);
    }

    #[test]
    fn test_first_step_moves_by_lr() {
        // bias correction makes the first update ≈ lr * sign(g)
        let mut opt = Adam::default_params(0.01);
        let mut x = arr1(&[1.0_f32]);
        step_quadratic(&mut opt, &mut x);
        assert!((x[0] - 0.99).abs() < 1e-4);
    }

    #[test]
    fn test_zero_gradient_leaves_params() {
        let mut opt = Adam::default_params(0.1);
        let mut x = arr1(&[1.5_f32]);
        let grad = Array1::<f32>::zeros(1);
        opt.step(&mut [ParamMut { value: x.view_mut().into_dyn(), grad: grad.view().into_dyn() }]);
        assert_eq!(x[0], 1.5);
    }
}
