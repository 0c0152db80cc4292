//! Optimizers for training the cell-type classifiers

mod adam;
mod optimizer;

pub use adam::Adam;
pub use optimizer::{Optimizer, ParamMut};
