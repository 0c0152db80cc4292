//! Two-round cell-type annotation.
//!
//! A reference-trained classifier labels every target cell; cells whose
//! prediction entropy is low within their predicted class become the
//! training set of a teacher/student distillation on the target itself,
//! and the distilled student relabels the remaining uncertain cells.
//!
//! # Stages
//!
//! - [`align`]: reference feature order → target columns, coverage check
//! - [`entropy`]: softmax and Shannon entropy of class distributions
//! - [`partition`]: per-class low/high entropy tiers
//! - [`distill`]: teacher fit, student distillation, uncertain-cell scoring
//! - [`reconcile`]: one final label per cell
//!
//! Supporting modules cover preprocessing, feature selection, the MLP
//! classifier and its optimizer, and file formats.

pub mod align;
pub mod cells;
pub mod distill;
pub mod encoder;
pub mod entropy;
pub mod io;
pub mod mlp;
pub mod optim;
pub mod partition;
pub mod preprocess;
pub mod reconcile;
pub mod reference;
pub mod select;
pub mod train;

pub use align::{AlignmentIndex, CoverageCheck, CoverageStatus, FeatureSpace, ImputePolicy};
pub use cells::{CellRecord, CellTable};
pub use encoder::LabelEncoder;
pub use mlp::{Classifier, Mlp, MlpConfig};
pub use partition::{ConfidenceTier, EntropyPartitioner, Partition};
pub use preprocess::{ExpressionMatrix, Preprocessor};
pub use reference::{ModelMetadata, ReferenceModel};
