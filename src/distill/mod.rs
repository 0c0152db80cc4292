//! Knowledge Distillation
//!
//! Second-round refinement of uncertain predictions: a teacher is fitted on
//! the confident cells of the target itself, then a student is trained
//! against both the hard first-round labels and the teacher's softened
//! outputs, and finally scores the uncertain cells.
//!
//! ## Example
//!
//! ```no_run
//! use celldistill::distill::DistillationLoss;
//! # use ndarray::array;
//! # let student_logits = array![[2.0, 1.0]];
//! # let teacher_logits = array![[1.5, 1.2]];
//! # let targets = array![[1.0, 0.0]];
//!
//! let loss_fn = DistillationLoss::new(3.0, 0.1);
//! let loss = loss_fn.forward(&student_logits, &teacher_logits, &targets);
//! ```

mod distiller;
mod loss;
mod second_round;

pub use distiller::Distiller;
pub use loss::DistillationLoss;
pub use second_round::{RoundState, SecondRound, SecondRoundConfig, SecondRoundOutput};
