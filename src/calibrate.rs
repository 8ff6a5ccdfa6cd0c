//! Calibration ranking
//!
//! Builds the immutable calibration structures the predictors read from. A
//! calibration run scores every row, sorts by score descending and assigns
//! ranks: classification ranks reset per class and collapse ties onto the
//! earliest tied position, regression ranks are a plain positional counter.
//! The ranked rows are also materialized as an output table in the fixed
//! column layout, from which a calibration can be rebuilt later.
use crate::columns;
use crate::config::{ClassificationConfig, RegressionConfig};
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use crate::scorer::{ClassProbabilityScorer, ResidualScorer};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

fn sort_scored_descending(scored: &mut [(usize, f64)]) {
    // Stable, so tied rows keep their table order.
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
}

/// Tie-collapsed ranks for a descending score run: every row tied on a
/// score gets the position of the earliest tied row.
fn collapsed_ranks(scores: &[f64]) -> Vec<usize> {
    let mut ranks = Vec::with_capacity(scores.len());
    let mut run_start = 0;
    for (j, score) in scores.iter().enumerate() {
        if j > 0 && *score != scores[j - 1] {
            run_start = j;
        }
        ranks.push(run_start);
    }
    ranks
}

/// A ranked classification calibration set.
///
/// Holds one descending score list per class plus the calibration output
/// table. Immutable once built; cross-conformal runs build one per fold.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClassCalibration {
    target: String,
    classes: Vec<String>,
    scores: HashMap<String, Vec<f64>>,
    table: Frame,
}

impl ClassCalibration {
    /// Score and rank a calibration table.
    ///
    /// * `frame` - Calibration rows with target and probability columns.
    /// * `config` - Classification configuration.
    /// * `monitor` - Cancellation and progress sink.
    pub fn calibrate(
        frame: &Frame,
        config: &ClassificationConfig,
        monitor: &ExecutionMonitor,
    ) -> Result<Self, ConformalError> {
        let scorer = ClassProbabilityScorer::new(&config.target_column, frame)?;
        let total = frame.len();

        let mut groups: HashMap<String, Vec<(usize, f64)>> = HashMap::new();
        for (i, row) in frame.rows().iter().enumerate() {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, total);
            }
            let (label, score) = scorer.score(row)?;
            groups.entry(label).or_default().push((i, score));
        }

        let target_col = frame.require_column(&config.target_column)?;
        let mut table = Frame::new(output_columns(
            frame,
            config.keep_all_columns,
            &[&config.target_column],
            &[columns::CALIBRATION_P, columns::CALIBRATION_RANK],
        ))?;

        let mut classes = Vec::new();
        let mut scores = HashMap::new();
        for label in scorer.classes() {
            let mut group = match groups.remove(label) {
                Some(group) => group,
                None => continue,
            };
            monitor.check()?;
            sort_scored_descending(&mut group);
            let group_scores: Vec<f64> = group.iter().map(|(_, s)| *s).collect();
            let ranks = collapsed_ranks(&group_scores);
            for ((i, score), rank) in group.into_iter().zip(ranks) {
                let row = frame.row(i);
                let mut values = if config.keep_all_columns {
                    row.values.clone()
                } else {
                    vec![row.values[target_col].clone()]
                };
                values.push(Value::Double(score));
                values.push(Value::Int(rank as i64));
                table.append_row(Row::new(row.id.clone(), values));
            }
            classes.push(label.clone());
            scores.insert(label.clone(), group_scores);
        }

        Ok(ClassCalibration {
            target: config.target_column.clone(),
            classes,
            scores,
            table,
        })
    }

    /// Rebuild a calibration from a previously produced calibration table.
    ///
    /// * `table` - Table carrying the target column and the `P` column.
    /// * `target` - Name of the target column.
    pub fn from_table(table: &Frame, target: &str) -> Result<Self, ConformalError> {
        let target_col = table.require_column(target)?;
        let p_col = table.require_column(columns::CALIBRATION_P)?;

        let mut classes = Vec::new();
        let mut scores: HashMap<String, Vec<f64>> = HashMap::new();
        for row in table.rows() {
            let label = match &row.values[target_col] {
                Value::Missing => {
                    return Err(ConformalError::MissingValue(
                        target.to_string(),
                        format!("row {}", row.id),
                    ))
                }
                value => value.to_string(),
            };
            let score = row.values[p_col].numeric(columns::CALIBRATION_P, &row.id)?;
            scores
                .entry_ref(label.as_str())
                .or_insert_with(|| {
                    classes.push(label.clone());
                    Vec::new()
                })
                .push(score);
        }
        for class_scores in scores.values_mut() {
            class_scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        }
        Ok(ClassCalibration {
            target: target.to_string(),
            classes,
            scores,
            table: table.clone(),
        })
    }

    /// Name of the target column.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Classes with at least one calibration row, in class domain order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Descending score list of a class.
    pub fn scores_for(&self, label: &str) -> Option<&[f64]> {
        self.scores.get(label).map(|v| v.as_slice())
    }

    /// The calibration output table.
    pub fn table(&self) -> &Frame {
        &self.table
    }

    /// Consume the calibration, yielding the output table.
    pub fn into_table(self) -> Frame {
        self.table
    }
}

/// A ranked regression calibration set: one descending alpha list plus the
/// calibration output table.
#[derive(Clone, Serialize, Deserialize)]
pub struct AlphaCalibration {
    scores: Vec<f64>,
    table: Frame,
}

impl AlphaCalibration {
    /// Score and rank a calibration table.
    ///
    /// * `frame` - Calibration rows with target and prediction columns.
    /// * `config` - Regression configuration.
    /// * `monitor` - Cancellation and progress sink.
    pub fn calibrate(
        frame: &Frame,
        config: &RegressionConfig,
        monitor: &ExecutionMonitor,
    ) -> Result<Self, ConformalError> {
        let scorer = ResidualScorer::new(config, frame)?;
        let total = frame.len();

        let mut scored: Vec<(usize, f64)> = Vec::with_capacity(total);
        for (i, row) in frame.rows().iter().enumerate() {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, total);
            }
            scored.push((i, scorer.score(row)?));
        }
        sort_scored_descending(&mut scored);

        let mut table = Frame::new(output_columns(
            frame,
            config.keep_all_columns,
            &[],
            &[columns::CALIBRATION_ALPHA, columns::CALIBRATION_RANK],
        ))?;
        let mut scores = Vec::with_capacity(scored.len());
        for (rank, (i, score)) in scored.into_iter().enumerate() {
            let row = frame.row(i);
            let mut values = if config.keep_all_columns {
                row.values.clone()
            } else {
                Vec::new()
            };
            values.push(Value::Double(score));
            values.push(Value::Int(rank as i64));
            table.append_row(Row::new(row.id.clone(), values));
            scores.push(score);
        }

        Ok(AlphaCalibration { scores, table })
    }

    /// Rebuild a calibration from a previously produced calibration table.
    pub fn from_table(table: &Frame) -> Result<Self, ConformalError> {
        let alpha_col = table.require_column(columns::CALIBRATION_ALPHA)?;
        let mut scores = Vec::with_capacity(table.len());
        for row in table.rows() {
            scores.push(row.values[alpha_col].numeric(columns::CALIBRATION_ALPHA, &row.id)?);
        }
        scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        Ok(AlphaCalibration {
            scores,
            table: table.clone(),
        })
    }

    /// Descending alpha list.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    /// The alpha threshold for an accepted error rate: the score at
    /// position `⌊n · error_rate⌋` of the descending list.
    pub fn alpha_for(&self, error_rate: f64) -> Result<f64, ConformalError> {
        let n = self.scores.len();
        let error_index = (n as f64 * error_rate).floor() as usize;
        if error_index >= n {
            return Err(ConformalError::IndexOutOfRange(error_index, n));
        }
        Ok(self.scores[error_index])
    }

    /// The calibration output table.
    pub fn table(&self) -> &Frame {
        &self.table
    }

    /// Consume the calibration, yielding the output table.
    pub fn into_table(self) -> Frame {
        self.table
    }
}

/// Column list of a calibration or prediction output table: the input
/// columns when everything is kept, otherwise just `minimal`, followed by
/// the appended engine columns.
pub(crate) fn output_columns(
    frame: &Frame,
    keep_all_columns: bool,
    minimal: &[&str],
    appended: &[&str],
) -> Vec<String> {
    let mut names: Vec<String> = if keep_all_columns {
        frame.columns().to_vec()
    } else {
        minimal.iter().map(|c| c.to_string()).collect()
    };
    names.extend(appended.iter().map(|c| c.to_string()));
    names
}
