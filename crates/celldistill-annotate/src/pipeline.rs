//! Prediction pipeline execution.
//!
//! ```text
//! model dir ─┐
//! target  ───┴▶ preprocess ─▶ align ─▶ scale ─▶ first round ─▶ entropy
//!             ─▶ [two-round: partition ─▶ teacher ─▶ student ─▶ rescore]
//!             ─▶ reconcile ─▶ <prefix>celltypes.csv
//! ```

use std::path::PathBuf;

use celldistill::align::{AlignmentIndex, CoverageStatus};
use celldistill::cells::CellTable;
use celldistill::distill::SecondRound;
use celldistill::entropy::row_entropies;
use celldistill::io::{load_dense_csv, write_cell_table};
use celldistill::mlp::Classifier;
use celldistill::partition::EntropyPartitioner;
use celldistill::reconcile::reconcile;
use celldistill::reference::ReferenceModel;
use celldistill::train::TrainingMetrics;
use celldistill_common::{CellDistillError, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::config::{AnnotateConfig, PredictType};

/// How final labels are obtained, fixed once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictPlan {
    /// First-round labels are final
    Direct,
    /// Uncertain cells are relabelled by a distilled student
    TwoRound,
}

impl From<PredictType> for PredictPlan {
    fn from(value: PredictType) -> Self {
        match value {
            PredictType::DirectPredict => Self::Direct,
            PredictType::TworoundPredict => Self::TwoRound,
        }
    }
}

/// Pipeline execution result.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Final per-cell table, as written
    pub cells: CellTable,
    /// Where the table was written
    pub output_path: PathBuf,
    pub plan: PredictPlan,
    /// Fraction of reference features found in the target
    pub coverage: f64,
    pub coverage_status: CoverageStatus,
    /// Cells kept at their first-round label by the partition
    pub low_entropy_cells: usize,
    /// Cells sent to the second round
    pub high_entropy_cells: usize,
    /// Cells whose final label differs from the first round
    pub changed_labels: usize,
    /// Teacher and student summaries when a second round ran
    pub second_round: Option<(TrainingMetrics, TrainingMetrics)>,
}

/// First-round output shared by both plans.
struct FirstRound {
    table: CellTable,
    features: Array2<f32>,
    coverage: f64,
    coverage_status: CoverageStatus,
}

/// Prediction pipeline orchestrator.
pub struct Pipeline<'a> {
    config: &'a AnnotateConfig,
}

impl<'a> Pipeline<'a> {
    /// Create a new pipeline with the given configuration.
    pub fn new(config: &'a AnnotateConfig) -> Self {
        Self { config }
    }

    /// Execute the complete prediction pipeline.
    pub fn execute(&self) -> Result<PipelineResult> {
        let plan = PredictPlan::from(self.config.prediction.predict_type);
        let model = ReferenceModel::load(&self.config.model.dir)?;

        // Stage 1: first-round labels and entropies
        let first = self.first_round(&model)?;

        // Stage 2: final labels
        let (cells, low, high, second_round) = match plan {
            PredictPlan::Direct => {
                let labels = first.table.first_round_labels()?;
                (first.table.with_final_labels(&labels)?, 0, 0, None)
            }
            PredictPlan::TwoRound => self.second_round(&model, &first)?,
        };

        // Stage 3: write the table
        let output_path = self.export(&cells)?;
        let changed_labels = cells.records().iter().filter(|r| r.final_label != r.first_round).count();
        info!(cells = cells.len(), changed = changed_labels, output = %output_path.display(), "prediction finished");

        Ok(PipelineResult {
            cells,
            output_path,
            plan,
            coverage: first.coverage,
            coverage_status: first.coverage_status,
            low_entropy_cells: low,
            high_entropy_cells: high,
            changed_labels,
            second_round,
        })
    }

    fn first_round(&self, model: &ReferenceModel) -> Result<FirstRound> {
        let target = self.config.preprocess.run(load_dense_csv(&self.config.input.path)?)?;

        let index = AlignmentIndex::build(&model.features, &target.features);
        let coverage_status = self.config.coverage_check().evaluate(&index)?;
        let projected = index.project(&target.values, &model.features, self.config.coverage.impute)?;
        let features = self.config.preprocess.scale(&projected);

        let probabilities = model.predict_proba(&features)?;
        let labels = model.encoder.decode(&probabilities)?;
        let entropy = row_entropies(&probabilities).to_vec();
        info!(cells = labels.len(), classes = model.encoder.len(), "first-round prediction");

        let table = CellTable::from_ids(target.cells).with_first_round(&labels, &entropy)?;
        Ok(FirstRound { table, features, coverage: index.coverage(), coverage_status })
    }

    fn second_round(
        &self,
        model: &ReferenceModel,
        first: &FirstRound,
    ) -> Result<(CellTable, usize, usize, Option<(TrainingMetrics, TrainingMetrics)>)> {
        let mut rng = StdRng::seed_from_u64(self.config.prediction.seed);
        let labels = first.table.first_round_labels()?;
        let entropy = first.table.entropies()?;

        let partition =
            EntropyPartitioner::new(self.config.prediction.confidence_fraction)?.partition(&labels, &entropy, &mut rng)?;
        let table = first.table.with_tiers(&partition.tiers)?;
        let low = partition.low_indices();
        let high = partition.high_indices();
        info!(low = low.len(), high = high.len(), "partitioned cells by entropy");

        if high.is_empty() {
            info!("no high-entropy cells; second round skipped");
            return Ok((reconcile(&table, &[], &[])?, low.len(), 0, None));
        }

        let confident = first.features.select(Axis(0), &low);
        let confident_labels: Vec<String> = low.iter().map(|&i| labels[i].clone()).collect();
        let uncertain = first.features.select(Axis(0), &high);

        let mut round = SecondRound::new(self.config.second_round());
        let output = round.run(&confident, &confident_labels, &uncertain, &model.encoder, &mut rng)?;
        let relabels = model.encoder.decode(&output.probabilities)?;
        if relabels.len() != high.len() {
            return Err(CellDistillError::Internal {
                message: format!("second round scored {} of {} uncertain cells", relabels.len(), high.len()),
            });
        }

        let cells = reconcile(&table, &high, &relabels)?;
        Ok((cells, low.len(), high.len(), Some((output.teacher, output.student))))
    }

    fn export(&self, cells: &CellTable) -> Result<PathBuf> {
        let dir = &self.config.output.dir;
        std::fs::create_dir_all(dir).map_err(|e| CellDistillError::io(format!("creating {}", dir.display()), e))?;
        let path = self.config.output_path();
        write_cell_table(&path, cells)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_predict_type() {
        assert_eq!(PredictPlan::from(PredictType::DirectPredict), PredictPlan::Direct);
        assert_eq!(PredictPlan::from(PredictType::TworoundPredict), PredictPlan::TwoRound);
    }

    #[test]
    fn test_missing_model_dir_fails_before_reading_input() {
        let config = AnnotateConfig::minimal("/nonexistent/model", "/nonexistent/input.csv");
        let err = Pipeline::new(&config).execute().unwrap_err();
        assert!(matches!(err, CellDistillError::ModelFileMissing { .. }));
    }
}
