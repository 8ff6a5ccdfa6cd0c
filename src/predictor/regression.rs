//! Regression predictor
//!
//! Derives a prediction interval per record from the alpha threshold at the
//! configured error rate of a ranked calibration set.
use super::{PredictionOutput, ResultSchema};
use crate::calibrate::{output_columns, AlphaCalibration};
use crate::columns;
use crate::config::RegressionConfig;
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use crate::scorer::ResidualScorer;
use rayon::prelude::*;

/// Predicts intervals from an immutable, ranked calibration set.
///
/// The alpha threshold is resolved once at construction, so an error rate
/// the calibration set cannot support surfaces before any row is scored.
pub struct RegressionPredictor {
    config: RegressionConfig,
    calibration: AlphaCalibration,
    alpha: f64,
}

impl RegressionPredictor {
    /// Build a predictor over a ranked calibration.
    ///
    /// * `calibration` - Ranked calibration set.
    /// * `config` - Regression configuration.
    pub fn new(
        calibration: AlphaCalibration,
        config: RegressionConfig,
    ) -> Result<Self, ConformalError> {
        config.validate()?;
        let alpha = calibration.alpha_for(config.error_rate)?;
        Ok(RegressionPredictor {
            config,
            calibration,
            alpha,
        })
    }

    /// The alpha threshold backing the intervals.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// The calibration backing this predictor.
    pub fn calibration(&self) -> &AlphaCalibration {
        &self.calibration
    }

    /// Predict an interval for every row of `frame`.
    ///
    /// * `frame` - Rows to predict, carrying the model prediction column.
    /// * `parallel` - If `true`, rows are scored in parallel.
    /// * `monitor` - Cancellation and progress sink.
    pub fn predict(
        &self,
        frame: &Frame,
        parallel: bool,
        monitor: &ExecutionMonitor,
    ) -> Result<PredictionOutput, ConformalError> {
        monitor.check()?;
        let scorer = ResidualScorer::new(&self.config, frame)?;

        let lower_name = columns::lower_bound(&self.config.target_column);
        let upper_name = columns::upper_bound(&self.config.target_column);
        let column_names = output_columns(
            frame,
            self.config.keep_all_columns,
            &[],
            &[&lower_name, &upper_name],
        );
        let passthrough = column_names.len() - 2;
        let schema = ResultSchema::new(passthrough, 2);

        let alpha = self.alpha;
        let total = frame.len();
        let build_row = |i: usize| -> Result<Row, ConformalError> {
            let row = frame.row(i);
            let prediction = scorer.prediction(row)?;
            let margin = alpha * scorer.scale(row)?;
            let mut values = if self.config.keep_all_columns {
                row.values.clone()
            } else {
                Vec::new()
            };
            values.push(Value::Double(prediction - margin));
            values.push(Value::Double(prediction + margin));
            Ok(Row::new(row.id.clone(), values))
        };

        let rows: Vec<Row> = if parallel {
            (0..total)
                .into_par_iter()
                .map(build_row)
                .collect::<Result<_, _>>()?
        } else {
            let mut rows = Vec::with_capacity(total);
            for i in 0..total {
                if i % PROGRESS_STEP == 0 {
                    monitor.check()?;
                    monitor.progress_of(i, total);
                }
                rows.push(build_row(i)?);
            }
            rows
        };

        let mut table = Frame::new(column_names)?;
        for row in rows {
            table.append_row(row);
        }
        monitor.progress(1.0);
        Ok(PredictionOutput { table, schema })
    }
}
