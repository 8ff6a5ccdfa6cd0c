//! Coverage and interval-size statistics for regression predictions.
use crate::columns;
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use crate::utils::{mean, median};
use serde::{Deserialize, Serialize};

/// Coverage and interval-size statistics of a regression prediction table.
///
/// Bounds are inclusive: a target sitting exactly on a bound counts as
/// covered. The statistics are NaN when no record was evaluated.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RegressionEvaluation {
    /// Share of records whose target fell outside its interval.
    pub error_rate: f64,
    /// Mean interval size.
    pub mean_size: f64,
    /// Median interval size.
    pub median_size: f64,
    /// Smallest interval size.
    pub min_size: f64,
    /// Largest interval size.
    pub max_size: f64,
    /// Number of evaluated records.
    pub records: usize,
}

impl RegressionEvaluation {
    /// Evaluate interval predictions against the known target column.
    ///
    /// * `frame` - Prediction table holding the target and its bound
    ///   columns.
    /// * `target` - Name of the target column.
    /// * `monitor` - Cancellation and progress channel.
    pub fn evaluate(
        frame: &Frame,
        target: &str,
        monitor: &ExecutionMonitor,
    ) -> Result<Self, ConformalError> {
        let target_col = frame.require_column(target)?;
        let lower_name = columns::lower_bound(target);
        let upper_name = columns::upper_bound(target);
        let lower_col = frame.require_column(&lower_name)?;
        let upper_col = frame.require_column(&upper_name)?;

        let mut sizes = Vec::with_capacity(frame.len());
        let mut covered = 0usize;
        for (i, row) in frame.rows().iter().enumerate() {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, frame.len());
            }
            let truth = row.values[target_col].numeric(target, &row.id)?;
            let lower = row.values[lower_col].numeric(&lower_name, &row.id)?;
            let upper = row.values[upper_col].numeric(&upper_name, &row.id)?;
            sizes.push(upper - lower);
            if truth >= lower && truth <= upper {
                covered += 1;
            }
        }
        monitor.progress(1.0);

        let min_size = sizes.iter().fold(f64::NAN, |a, &b| a.min(b));
        let max_size = sizes.iter().fold(f64::NAN, |a, &b| a.max(b));
        Ok(RegressionEvaluation {
            error_rate: 1.0 - covered as f64 / sizes.len() as f64,
            mean_size: mean(&sizes),
            median_size: median(&sizes),
            min_size,
            max_size,
            records: sizes.len(),
        })
    }

    /// Render the statistics as a single-row table.
    pub fn to_table(&self) -> Result<Frame, ConformalError> {
        let mut table = Frame::new(vec![
            "Error rate".to_string(),
            "Mean interval size".to_string(),
            "Median interval size".to_string(),
            "Min interval size".to_string(),
            "Max interval size".to_string(),
        ])?;
        table.append_row(Row::new(
            "statistics",
            vec![
                Value::Double(self.error_rate),
                Value::Double(self.mean_size),
                Value::Double(self.median_size),
                Value::Double(self.min_size),
                Value::Double(self.max_size),
            ],
        ));
        Ok(table)
    }
}
