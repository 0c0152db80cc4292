//! Per-class confidence partitioning by prediction entropy.
//!
//! Within each predicted class independently:
//!
//! 1. `cutoff` = q-quantile of the class's entropies (linear interpolation)
//! 2. candidates = cells with entropy ≤ `cutoff` (ties included)
//! 3. `target` = ⌈q · class size⌉
//! 4. if there are more candidates than `target`, draw `target` of them
//!    uniformly with the run RNG; otherwise keep every candidate
//! 5. kept cells are [`ConfidenceTier::Low`], the rest of the class is
//!    [`ConfidenceTier::High`]
//!
//! Tiers are relative to the class: two cells with equal entropy in
//! different classes can land in different tiers.

use std::collections::BTreeMap;
use std::fmt;

use celldistill_common::{CellDistillError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fraction of each class treated as confident by default.
pub const DEFAULT_CONFIDENCE_FRACTION: f64 = 0.4;

/// Guards `ceil` against products like `0.7 * 10 = 7.000000000000001`.
const CEIL_TOLERANCE: f64 = 1e-9;

/// Confidence tier of a cell within its predicted class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    /// Low entropy: first-round label is trusted
    Low,
    /// High entropy: relabelled by the second round
    High,
}

impl ConfidenceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class bookkeeping of one partitioning run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPartition {
    pub label: String,
    pub size: usize,
    pub cutoff: f64,
    pub candidates: usize,
    pub target: usize,
    pub low: usize,
}

/// Tier for every cell, in input order, plus per-class statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub tiers: Vec<ConfidenceTier>,
    pub classes: Vec<ClassPartition>,
}

impl Partition {
    /// Positions of low-tier cells, ascending.
    pub fn low_indices(&self) -> Vec<usize> {
        self.indices_of(ConfidenceTier::Low)
    }

    /// Positions of high-tier cells, ascending.
    pub fn high_indices(&self) -> Vec<usize> {
        self.indices_of(ConfidenceTier::High)
    }

    fn indices_of(&self, tier: ConfidenceTier) -> Vec<usize> {
        self.tiers.iter().enumerate().filter_map(|(i, t)| (*t == tier).then_some(i)).collect()
    }
}

/// Partitions cells into confidence tiers within each predicted class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntropyPartitioner {
    fraction: f64,
}

impl Default for EntropyPartitioner {
    fn default() -> Self {
        Self { fraction: DEFAULT_CONFIDENCE_FRACTION }
    }
}

impl EntropyPartitioner {
    /// `fraction` is the entropy quantile q, strictly inside `(0, 1)`.
    ///
    /// At 0 no class keeps a confident cell, at 1 no cell is left to relabel.
    pub fn new(fraction: f64) -> Result<Self> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(CellDistillError::ConfigValue {
                field: "prediction.confidence_fraction".into(),
                message: format!("must be within (0, 1), got {fraction}"),
                suggestion: "Use 0.4 to keep the 40% most confident cells of each class".into(),
            });
        }
        Ok(Self { fraction })
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    /// Assign a tier to every cell.
    ///
    /// Classes are visited in sorted label order and candidates in input
    /// order, so the same inputs and RNG state always give the same tiers.
    pub fn partition<R: Rng + ?Sized>(
        &self,
        predicted: &[String],
        entropy: &[f32],
        rng: &mut R,
    ) -> Result<Partition> {
        if predicted.len() != entropy.len() {
            return Err(CellDistillError::ShapeMismatch {
                expected: vec![predicted.len()],
                actual: vec![entropy.len()],
            });
        }

        let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, label) in predicted.iter().enumerate() {
            by_class.entry(label.as_str()).or_default().push(i);
        }

        let mut tiers = vec![ConfidenceTier::High; predicted.len()];
        let mut classes = Vec::with_capacity(by_class.len());

        for (label, members) in by_class {
            let values: Vec<f64> = members.iter().map(|&i| f64::from(entropy[i])).collect();
            let cutoff = quantile(&values, self.fraction);

            let candidates: Vec<usize> = members
                .iter()
                .zip(&values)
                .filter(|(_, &h)| h <= cutoff)
                .map(|(&i, _)| i)
                .collect();
            let target = target_count(self.fraction, members.len());

            let kept: Vec<usize> = if candidates.len() > target {
                rand::seq::index::sample(&mut *rng, candidates.len(), target)
                    .into_iter()
                    .map(|k| candidates[k])
                    .collect()
            } else {
                candidates.clone()
            };

            for &i in &kept {
                tiers[i] = ConfidenceTier::Low;
            }

            debug!(
                class = label,
                size = members.len(),
                cutoff,
                candidates = candidates.len(),
                target,
                low = kept.len(),
                "partitioned class by entropy"
            );
            classes.push(ClassPartition {
                label: label.to_string(),
                size: members.len(),
                cutoff,
                candidates: candidates.len(),
                target,
                low: kept.len(),
            });
        }

        Ok(Partition { tiers, classes })
    }
}

/// ⌈q · n⌉ with a small tolerance for floating-point overshoot.
pub fn target_count(fraction: f64, n: usize) -> usize {
    let raw = fraction * n as f64 - CEIL_TOLERANCE;
    raw.ceil().max(0.0) as usize
}

/// q-quantile with linear interpolation between order statistics.
///
/// `values` must be non-empty; classes only exist when they have members.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quantile_linear_interpolation() {
        let v = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&v, 0.5) - 2.0).abs() < 1e-12);
        assert!((quantile(&v, 0.4) - 1.6).abs() < 1e-12);
        assert!((quantile(&[7.0], 0.4) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_target_count() {
        assert_eq!(target_count(0.4, 10), 4);
        assert_eq!(target_count(0.7, 10), 7);
        assert_eq!(target_count(0.4, 3), 2);
        assert_eq!(target_count(0.4, 1), 1);
        assert_eq!(target_count(0.0, 5), 0);
    }

    #[test]
    fn test_ties_are_subsampled_to_target() {
        // 6 cells tie at the boundary of a 10-cell class
        let predicted = labels(&["T-cell"; 10]);
        let entropy = [0.1, 0.1, 0.1, 0.1, 0.1, 0.1, 0.9, 0.9, 0.9, 0.9];
        let mut rng = StdRng::seed_from_u64(1993);

        let part = EntropyPartitioner::default().partition(&predicted, &entropy, &mut rng).unwrap();

        assert_eq!(part.classes[0].candidates, 6);
        assert_eq!(part.classes[0].target, 4);
        assert_eq!(part.low_indices().len(), 4);
        assert_eq!(part.high_indices().len(), 6);
        assert!(part.low_indices().iter().all(|&i| i < 6));
    }

    #[test]
    fn test_tiers_are_relative_to_class() {
        let predicted = labels(&["A", "A", "A", "B", "B", "B"]);
        let entropy = [0.5, 0.6, 0.7, 0.1, 0.2, 0.5];
        let mut rng = StdRng::seed_from_u64(1);

        let part = EntropyPartitioner::new(0.34).unwrap().partition(&predicted, &entropy, &mut rng).unwrap();

        // entropy 0.5 is the most confident "A" but the least confident "B"
        assert_eq!(part.tiers[0], ConfidenceTier::Low);
        assert_eq!(part.tiers[5], ConfidenceTier::High);
    }

    #[test]
    fn test_small_class_keeps_candidates() {
        let predicted = labels(&["NK", "NK", "NK"]);
        let entropy = [0.3, 0.2, 0.9];
        let mut rng = StdRng::seed_from_u64(0);

        let part = EntropyPartitioner::default().partition(&predicted, &entropy, &mut rng).unwrap();

        // cutoff interpolates between 0.2 and 0.3, so only one candidate
        assert_eq!(part.classes[0].target, 2);
        assert_eq!(part.low_indices(), vec![1]);
    }

    #[test]
    fn test_empty_input_produces_no_classes() {
        let mut rng = StdRng::seed_from_u64(0);
        let part = EntropyPartitioner::default().partition(&[], &[], &mut rng).unwrap();
        assert!(part.tiers.is_empty());
        assert!(part.classes.is_empty());
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = EntropyPartitioner::default().partition(&labels(&["A"]), &[], &mut rng);
        assert!(matches!(result, Err(CellDistillError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(EntropyPartitioner::new(1.5).is_err());
        assert!(EntropyPartitioner::new(-0.1).is_err());
        assert!(EntropyPartitioner::new(0.0).is_err());
        assert!(EntropyPartitioner::new(1.0).is_err());
        assert!(EntropyPartitioner::new(f64::NAN).is_err());
        assert!(EntropyPartitioner::new(0.999).is_ok());
    }

    mod partition_properties {
        use super::*;
        use proptest::prelude::*;

        fn cells() -> impl Strategy<Value = (Vec<String>, Vec<f32>)> {
            (1usize..80).prop_flat_map(|n| {
                (
                    proptest::collection::vec(
                        prop_oneof![Just("B".to_string()), Just("NK".to_string()), Just("T".to_string())],
                        n,
                    ),
                    // few distinct values so ties are common
                    proptest::collection::vec((0u8..6).prop_map(|v| f32::from(v) * 0.2), n),
                )
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(300))]

            #[test]
            fn prop_low_count_is_min_of_candidates_and_target(
                (predicted, entropy) in cells(),
                q in 0.05f64..0.95,
                seed in any::<u64>(),
            ) {
                let mut rng = StdRng::seed_from_u64(seed);
                let part = EntropyPartitioner::new(q).unwrap()
                    .partition(&predicted, &entropy, &mut rng).unwrap();

                prop_assert_eq!(part.tiers.len(), predicted.len());

                let mut low_per_class: HashMap<&str, usize> = HashMap::new();
                for (label, tier) in predicted.iter().zip(&part.tiers) {
                    if *tier == ConfidenceTier::Low {
                        *low_per_class.entry(label.as_str()).or_default() += 1;
                    }
                }
                let total_size: usize = part.classes.iter().map(|c| c.size).sum();
                prop_assert_eq!(total_size, predicted.len());

                for class in &part.classes {
                    prop_assert!(class.size > 0);
                    let observed = low_per_class.get(class.label.as_str()).copied().unwrap_or(0);
                    prop_assert_eq!(observed, class.candidates.min(class.target));
                    prop_assert_eq!(observed, class.low);
                }
            }

            #[test]
            fn prop_partition_is_deterministic(
                (predicted, entropy) in cells(),
                seed in any::<u64>(),
            ) {
                let partitioner = EntropyPartitioner::default();
                let a = partitioner
                    .partition(&predicted, &entropy, &mut StdRng::seed_from_u64(seed))
                    .unwrap();
                let b = partitioner
                    .partition(&predicted, &entropy, &mut StdRng::seed_from_u64(seed))
                    .unwrap();
                prop_assert_eq!(a, b);
            }

            #[test]
            fn prop_low_cells_never_exceed_cutoff(
                (predicted, entropy) in cells(),
                seed in any::<u64>(),
            ) {
                let mut rng = StdRng::seed_from_u64(seed);
                let part = EntropyPartitioner::default()
                    .partition(&predicted, &entropy, &mut rng).unwrap();
                let cutoffs: HashMap<&str, f64> =
                    part.classes.iter().map(|c| (c.label.as_str(), c.cutoff)).collect();
                for i in part.low_indices() {
                    prop_assert!(f64::from(entropy[i]) <= cutoffs[predicted[i].as_str()]);
                }
            }
        }
    }
}
