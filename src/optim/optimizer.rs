//! Optimizer trait

use ndarray::{ArrayViewD, ArrayViewMutD};

/// A trainable tensor paired with its gradient for one update.
pub struct ParamMut<'a> {
    pub value: ArrayViewMutD<'a, f32>,
    pub grad: ArrayViewD<'a, f32>,
}

/// Trait for optimization algorithms
///
/// Parameters are identified by their position in `params`; callers must
/// pass them in the same order on every step.
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [ParamMut<'_>]);

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
