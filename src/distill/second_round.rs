//! Second-round self-distillation on the target data.
//!
//! ```text
//! Idle ──fit teacher on confident cells──▶ TeacherTrained
//!      ──fresh student, same shape──────▶ StudentInitialized
//!      ──distill student from teacher───▶ Distilled
//!      ──score uncertain cells──────────▶ Scored
//! ```
//!
//! Confident cells are trained on with their first-round labels as ground
//! truth. Only uncertain cells are scored.

use std::collections::BTreeSet;
use std::fmt;

use celldistill_common::{CellDistillError, Result};
use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::distiller::Distiller;
use super::loss::DistillationLoss;
use crate::encoder::LabelEncoder;
use crate::mlp::{Classifier, Mlp, MlpConfig};
use crate::train::{fit_supervised, TrainingConfig, TrainingMetrics};

/// Progress of a second-round run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundState {
    Idle,
    TeacherTrained,
    StudentInitialized,
    Distilled,
    Scored,
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::TeacherTrained => "teacher_trained",
            Self::StudentInitialized => "student_initialized",
            Self::Distilled => "distilled",
            Self::Scored => "scored",
        };
        f.write_str(name)
    }
}

/// Architecture and schedules of the second-round models.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondRoundConfig {
    pub hidden_dims: Vec<usize>,
    pub teacher: TrainingConfig,
    pub student: TrainingConfig,
    pub loss: DistillationLoss,
    /// Distinct first-round classes the confident set must contain
    pub min_confident_classes: usize,
}

impl Default for SecondRoundConfig {
    fn default() -> Self {
        Self {
            hidden_dims: vec![64, 16],
            teacher: TrainingConfig::default(),
            student: TrainingConfig::default(),
            loss: DistillationLoss::default(),
            min_confident_classes: 2,
        }
    }
}

/// Student probabilities for the uncertain cells, plus training summaries.
#[derive(Debug, Clone)]
pub struct SecondRoundOutput {
    /// [uncertain cells, classes], rows in the order they were passed in
    pub probabilities: Array2<f32>,
    pub teacher: TrainingMetrics,
    pub student: TrainingMetrics,
}

/// Teacher → student distillation restricted to the confident cells.
#[derive(Debug, Clone)]
pub struct SecondRound {
    config: SecondRoundConfig,
    state: RoundState,
}

impl SecondRound {
    pub fn new(config: SecondRoundConfig) -> Self {
        Self { config, state: RoundState::Idle }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    fn advance(&mut self, next: RoundState) {
        info!(from = %self.state, to = %next, "second round");
        self.state = next;
    }

    /// Check that the confident set can support teacher training.
    ///
    /// The required class count is capped at the encoder size, so a
    /// two-class requirement does not reject a single-class reference.
    pub fn check_confident_set(&self, labels: &[String], encoder: &LabelEncoder) -> Result<()> {
        let classes = labels.iter().collect::<BTreeSet<_>>().len();
        let required = self.config.min_confident_classes.min(encoder.len()).max(1);
        if labels.is_empty() || classes < required {
            return Err(CellDistillError::InsufficientConfidentCells {
                confident_cells: labels.len(),
                classes,
                required,
            });
        }
        Ok(())
    }

    /// Run all stages and return student probabilities for `uncertain`.
    pub fn run<R: Rng + ?Sized>(
        &mut self,
        confident: &Array2<f32>,
        confident_labels: &[String],
        uncertain: &Array2<f32>,
        encoder: &LabelEncoder,
        rng: &mut R,
    ) -> Result<SecondRoundOutput> {
        self.state = RoundState::Idle;

        if confident.nrows() != confident_labels.len() {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![confident_labels.len(), confident.ncols()],
                actual: confident.shape().to_vec(),
            });
        }
        if uncertain.ncols() != confident.ncols() {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![uncertain.nrows(), confident.ncols()],
                actual: uncertain.shape().to_vec(),
            });
        }
        self.check_confident_set(confident_labels, encoder)?;

        let targets = encoder.one_hot(confident_labels)?;
        let shape = MlpConfig::new(confident.ncols(), &self.config.hidden_dims, encoder.len());

        let mut teacher = Mlp::new(shape.clone(), &mut *rng);
        let teacher_metrics =
            fit_supervised(&mut teacher, confident, &targets, &self.config.teacher, &mut *rng)?;
        info!(
            cells = confident.nrows(),
            initial_loss = teacher_metrics.initial_loss,
            final_loss = teacher_metrics.final_loss,
            "teacher fitted on confident cells"
        );
        self.advance(RoundState::TeacherTrained);

        let mut student = Mlp::new(shape, &mut *rng);
        self.advance(RoundState::StudentInitialized);

        let distiller = Distiller::new(self.config.loss, self.config.student.clone());
        let student_metrics = distiller.distill(&mut student, &teacher, confident, &targets, &mut *rng)?;
        self.advance(RoundState::Distilled);

        let probabilities = student.predict_proba(uncertain)?;
        self.advance(RoundState::Scored);

        Ok(SecondRoundOutput { probabilities, teacher: teacher_metrics, student: student_metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::argmax_rows;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn encoder() -> LabelEncoder {
        LabelEncoder::new(vec!["B".into(), "T".into()]).unwrap()
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn small_config() -> SecondRoundConfig {
        let schedule = TrainingConfig { epochs: 80, batch_size: 4, learning_rate: 0.01 };
        SecondRoundConfig {
            hidden_dims: vec![8],
            teacher: schedule.clone(),
            student: schedule,
            ..SecondRoundConfig::default()
        }
    }

    #[test]
    fn test_run_reaches_scored_and_labels_uncertain_cells() {
        let confident = array![[2.0, 0.0], [1.8, 0.2], [2.2, -0.1], [0.0, 2.0], [0.1, 1.9], [-0.2, 2.1]];
        let confident_labels = labels(&["B", "B", "B", "T", "T", "T"]);
        let uncertain = array![[1.5, 0.3], [0.2, 1.4]];

        let mut round = SecondRound::new(small_config());
        assert_eq!(round.state(), RoundState::Idle);

        let mut rng = StdRng::seed_from_u64(1993);
        let out = round.run(&confident, &confident_labels, &uncertain, &encoder(), &mut rng).unwrap();

        assert_eq!(round.state(), RoundState::Scored);
        assert_eq!(out.probabilities.dim(), (2, 2));
        assert_eq!(argmax_rows(&out.probabilities), vec![0, 1]);
        assert!(out.teacher.improved());
    }

    #[test]
    fn test_empty_confident_set_is_training_error() {
        let mut round = SecondRound::new(small_config());
        let mut rng = StdRng::seed_from_u64(0);
        let err = round
            .run(&Array2::zeros((0, 2)), &[], &Array2::zeros((3, 2)), &encoder(), &mut rng)
            .unwrap_err();

        assert!(matches!(err, CellDistillError::InsufficientConfidentCells { confident_cells: 0, .. }));
        assert_eq!(round.state(), RoundState::Idle);
    }

    #[test]
    fn test_single_class_confident_set_is_training_error() {
        let round = SecondRound::new(small_config());
        let err = round.check_confident_set(&labels(&["T", "T", "T"]), &encoder()).unwrap_err();
        assert!(matches!(
            err,
            CellDistillError::InsufficientConfidentCells { classes: 1, required: 2, .. }
        ));
    }

    #[test]
    fn test_required_classes_capped_by_encoder() {
        let round = SecondRound::new(small_config());
        let single = LabelEncoder::new(vec!["T".into()]).unwrap();
        assert!(round.check_confident_set(&labels(&["T"]), &single).is_ok());
    }

    #[test]
    fn test_label_row_mismatch_rejected() {
        let mut round = SecondRound::new(small_config());
        let mut rng = StdRng::seed_from_u64(0);
        let err = round.run(
            &Array2::zeros((2, 2)),
            &labels(&["B"]),
            &Array2::zeros((1, 2)),
            &encoder(),
            &mut rng,
        );
        assert!(matches!(err, Err(CellDistillError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_same_seed_same_probabilities() {
        let confident = array![[1.0, 0.0], [0.9, 0.2], [0.0, 1.0], [0.1, 0.8]];
        let confident_labels = labels(&["B", "B", "T", "T"]);
        let uncertain = array![[0.6, 0.4]];
        let config = SecondRoundConfig {
            teacher: TrainingConfig { epochs: 3, batch_size: 2, learning_rate: 0.01 },
            student: TrainingConfig { epochs: 3, batch_size: 2, learning_rate: 0.01 },
            ..small_config()
        };

        let run = || {
            let mut rng = StdRng::seed_from_u64(42);
            SecondRound::new(config.clone())
                .run(&confident, &confident_labels, &uncertain, &encoder(), &mut rng)
                .unwrap()
                .probabilities
        };
        assert_eq!(run(), run());
    }
}
