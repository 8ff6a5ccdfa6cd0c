//! Cross-conformal folds
//!
//! A repeated run executes the partition/calibrate/predict pipeline once
//! per fold and merges the results. [`FoldPlan`] hands out the folds;
//! [`FoldAggregator`] collects each fold's tables, tags them with the fold
//! index, and on termination aggregates predictions per original record:
//! score columns by median, passthrough columns by the first-seen value.
//! Which column gets which treatment comes from the [`ResultSchema`] the
//! predictor attached, never from matching column names.
use crate::columns;
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use crate::predictor::{AggregationKind, PredictionOutput, ResultSchema};
use crate::utils::median;
use hashbrown::HashMap;

/// One iteration of a repeated run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fold {
    index: usize,
    count: usize,
}

impl Fold {
    /// Zero-based fold index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Total number of folds in the plan.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether this is the final fold of the plan.
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.count
    }
}

/// A fixed number of folds, handed out in order.
#[derive(Clone, Copy, Debug)]
pub struct FoldPlan {
    count: usize,
}

impl FoldPlan {
    /// Create a plan of `count` folds.
    pub fn new(count: usize) -> Result<Self, ConformalError> {
        if count == 0 {
            return Err(ConformalError::InvalidParameter(
                "iterations".to_string(),
                "at least one fold".to_string(),
                "0".to_string(),
            ));
        }
        Ok(FoldPlan { count })
    }

    /// Number of folds in the plan.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The folds of the plan, in index order.
    pub fn folds(&self) -> impl Iterator<Item = Fold> {
        let count = self.count;
        (0..count).map(move |index| Fold { index, count })
    }
}

/// Terminal output of a repeated run.
#[derive(Debug)]
pub struct AggregatedOutput {
    /// One row per original record, score columns combined by median.
    pub predictions: Frame,
    /// All calibration rows, concatenated and tagged with their fold index.
    pub calibration: Frame,
    /// All model rows if the run supplied them, concatenated and tagged.
    pub models: Option<Frame>,
}

/// Collects per-fold tables and aggregates them on termination.
///
/// Folds must arrive in plan order and carry tables of a stable shape;
/// anything else is a protocol violation. Termination is expressed by
/// consuming the aggregator through [`FoldAggregator::finish`], so rows
/// cannot be appended to a terminated collection.
pub struct FoldAggregator {
    expected: usize,
    next_fold: usize,
    calibration: Option<Frame>,
    predictions: Option<Frame>,
    models: Option<Frame>,
    schema: Option<ResultSchema>,
}

impl FoldAggregator {
    /// Create an aggregator for the folds of `plan`.
    pub fn new(plan: &FoldPlan) -> Self {
        FoldAggregator {
            expected: plan.count(),
            next_fold: 0,
            calibration: None,
            predictions: None,
            models: None,
            schema: None,
        }
    }

    /// Append one fold's calibration, prediction and optional model table.
    ///
    /// * `fold` - The fold the tables belong to.
    /// * `calibration` - The fold's calibration output table.
    /// * `prediction` - The fold's prediction output and schema.
    /// * `model` - The fold's model table, when the run carries one.
    pub fn push_fold(
        &mut self,
        fold: &Fold,
        calibration: &Frame,
        prediction: &PredictionOutput,
        model: Option<&Frame>,
    ) -> Result<(), ConformalError> {
        if fold.count() != self.expected {
            return Err(ConformalError::Protocol(format!(
                "fold belongs to a plan of {} folds, aggregator expects {}",
                fold.count(),
                self.expected
            )));
        }
        if fold.index() != self.next_fold {
            return Err(ConformalError::Protocol(format!(
                "fold {} arrived out of order, expected fold {}",
                fold.index(),
                self.next_fold
            )));
        }
        if prediction.schema.len() != prediction.table.columns().len() {
            return Err(ConformalError::Protocol(
                "prediction schema does not cover the prediction columns".to_string(),
            ));
        }

        if self.calibration.is_none() {
            let mut columns = calibration.columns().to_vec();
            columns.push(columns::ITERATION.to_string());
            self.calibration = Some(Frame::new(columns)?);
        }
        if let Some(container) = &mut self.calibration {
            let width = container.columns().len() - 1;
            if &container.columns()[..width] != calibration.columns() {
                return Err(ConformalError::Protocol(format!(
                    "calibration columns changed at fold {}",
                    fold.index()
                )));
            }
            append_tagged(container, calibration, fold.index(), false);
        }

        if self.predictions.is_none() {
            let mut columns = prediction.table.columns().to_vec();
            columns.push(columns::ITERATION.to_string());
            columns.push(columns::ORIGINAL_ROW_ID.to_string());
            self.predictions = Some(Frame::new(columns)?);
            self.schema = Some(prediction.schema.clone());
        }
        if let Some(container) = &mut self.predictions {
            let width = container.columns().len() - 2;
            if &container.columns()[..width] != prediction.table.columns() {
                return Err(ConformalError::Protocol(format!(
                    "prediction columns changed at fold {}",
                    fold.index()
                )));
            }
            append_tagged(container, &prediction.table, fold.index(), true);
        }

        match model {
            Some(table) => {
                if self.next_fold == 0 {
                    let mut columns = table.columns().to_vec();
                    columns.push(columns::ITERATION.to_string());
                    self.models = Some(Frame::new(columns)?);
                }
                match &mut self.models {
                    Some(container) => {
                        let width = container.columns().len() - 1;
                        if &container.columns()[..width] != table.columns() {
                            return Err(ConformalError::Protocol(format!(
                                "model columns changed at fold {}",
                                fold.index()
                            )));
                        }
                        append_tagged(container, table, fold.index(), false);
                    }
                    None => {
                        return Err(ConformalError::Protocol(format!(
                            "model table appeared first at fold {}",
                            fold.index()
                        )));
                    }
                }
            }
            None => {
                if self.models.is_some() {
                    return Err(ConformalError::Protocol(format!(
                        "model table missing for fold {}",
                        fold.index()
                    )));
                }
            }
        }

        self.next_fold += 1;
        Ok(())
    }

    /// Terminate the collection and aggregate the prediction rows per
    /// original record id.
    pub fn finish(self, monitor: &ExecutionMonitor) -> Result<AggregatedOutput, ConformalError> {
        let (predictions, calibration) = match (self.predictions, self.calibration) {
            (Some(predictions), Some(calibration)) => (predictions, calibration),
            _ => {
                return Err(ConformalError::Protocol(
                    "loop end not paired with loop start".to_string(),
                ))
            }
        };
        if self.next_fold != self.expected {
            return Err(ConformalError::Protocol(format!(
                "terminated after {} of {} folds",
                self.next_fold, self.expected
            )));
        }
        let schema = match self.schema {
            Some(schema) => schema,
            None => {
                return Err(ConformalError::Protocol(
                    "loop end not paired with loop start".to_string(),
                ))
            }
        };

        // Group collected prediction rows by original id, keeping the order
        // ids were first seen in. Folds arrived in index order, so the
        // first row of each group is from the lowest fold holding the id.
        let value_columns = predictions.columns().len() - 2;
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in predictions.rows().iter().enumerate() {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, 2 * predictions.len());
            }
            groups
                .entry_ref(row.id.as_str())
                .or_insert_with(|| {
                    order.push(row.id.clone());
                    Vec::new()
                })
                .push(i);
        }

        let mut aggregated = Frame::new(predictions.columns()[..value_columns].to_vec())?;
        for (g, id) in order.iter().enumerate() {
            if g % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(predictions.len() + g, 2 * predictions.len());
            }
            let positions = &groups[id];
            let mut values = Vec::with_capacity(value_columns);
            for col in 0..value_columns {
                let value = match schema.kind(col) {
                    AggregationKind::First => predictions.value(positions[0], col).clone(),
                    AggregationKind::Median => {
                        let numeric: Vec<f64> = positions
                            .iter()
                            .filter_map(|&i| predictions.value(i, col).as_f64())
                            .collect();
                        if numeric.is_empty() {
                            Value::Missing
                        } else {
                            Value::Double(median(&numeric))
                        }
                    }
                };
                values.push(value);
            }
            aggregated.append_row(Row::new(id.clone(), values));
        }
        monitor.progress(1.0);

        Ok(AggregatedOutput {
            predictions: aggregated,
            calibration,
            models: self.models,
        })
    }
}

fn append_tagged(container: &mut Frame, table: &Frame, fold_index: usize, with_id: bool) {
    for row in table.rows() {
        let mut values = row.values.clone();
        values.push(Value::Int(fold_index as i64));
        if with_id {
            values.push(Value::Str(row.id.clone()));
        }
        container.append_row(Row::new(row.id.clone(), values));
    }
}

/// Re-split a fold-tagged container into per-fold tables, dropping the
/// fold index column.
pub fn split_by_iteration(container: &Frame) -> Result<Vec<Frame>, ConformalError> {
    let iteration_col = container.require_column(columns::ITERATION)?;
    let columns: Vec<String> = container
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != iteration_col)
        .map(|(_, c)| c.clone())
        .collect();

    let mut folds: Vec<Frame> = Vec::new();
    for row in container.rows() {
        let index = row.values[iteration_col].numeric(columns::ITERATION, &row.id)? as usize;
        while folds.len() <= index {
            folds.push(Frame::new(columns.clone())?);
        }
        let values: Vec<Value> = row
            .values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != iteration_col)
            .map(|(_, v)| v.clone())
            .collect();
        folds[index].append_row(Row::new(row.id.clone(), values));
    }
    Ok(folds)
}
