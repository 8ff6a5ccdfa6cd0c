//! Conformal Prediction
//!
//! Predictors read a ranked calibration set and derive, for every new
//! record, either a p-value per candidate class or a prediction interval.
//!
//! # Submodules
//!
//! * `classification`: p-values per class via the smoothed rank formula.
//! * `regression`: alpha-quantile prediction intervals.
use crate::frame::Frame;
use crate::utils::descending_rank_bounds;
use serde::{Deserialize, Serialize};

pub mod classification;
pub mod regression;
#[cfg(test)]
mod tests;

/// How one output column is combined across folds of a repeated run.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum AggregationKind {
    /// Median across the folds containing the record.
    Median,
    /// Value from the lowest-indexed fold containing the record.
    First,
}

/// Per-column aggregation kinds of an output table, aligned with its
/// column order. Built by the predictor that produces the table, so the
/// aggregator never infers behavior from column names.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResultSchema {
    kinds: Vec<AggregationKind>,
}

impl ResultSchema {
    /// Schema with `passthrough` leading columns aggregated by first value
    /// and `scored` trailing columns aggregated by median.
    pub fn new(passthrough: usize, scored: usize) -> Self {
        let mut kinds = vec![AggregationKind::First; passthrough];
        kinds.extend(vec![AggregationKind::Median; scored]);
        ResultSchema { kinds }
    }

    /// Aggregation kind of the column at `index`.
    pub fn kind(&self, index: usize) -> AggregationKind {
        self.kinds[index]
    }

    /// Number of columns covered by the schema.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether the schema covers no columns.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// A prediction table together with its aggregation schema.
#[derive(Debug)]
pub struct PredictionOutput {
    /// The prediction rows.
    pub table: Frame,
    /// Per-column aggregation kinds, aligned with the table columns.
    pub schema: ResultSchema,
}

/// A smoothed p-value plus the rank the record would be inserted at.
pub(crate) struct PValue {
    pub value: f64,
    pub rank: usize,
}

/// The smoothed conformal p-value of probability `p` against a descending
/// calibration score list.
///
/// With `rank0`/`rank1` the first and last position of scores tied with
/// `p`, the p-value is `((n − rank1) + u·(rank1 − rank0)) / (n + 1)`. The
/// uniform draw `u` interpolates between the optimistic and the pessimistic
/// rank; without ties the two coincide and the formula reduces to
/// `(n − rank) / (n + 1)`.
///
/// * `scores` - Calibration scores sorted in descending order.
/// * `p` - Probability of the candidate class for the record.
/// * `u` - Draw from `Uniform(0, 1)`.
pub(crate) fn smoothed_p_value(scores: &[f64], p: f64, u: f64) -> PValue {
    let n = scores.len();
    let (rank0, rank1) = descending_rank_bounds(scores, p);
    let value = ((n - rank1) as f64 + u * (rank1 - rank0) as f64) / (n as f64 + 1.0);
    PValue { value, rank: rank0 }
}
