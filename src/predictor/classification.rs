//! Classification predictor
//!
//! Derives a smoothed p-value per candidate class for every record, against
//! the per-class descending score lists of a ranked calibration set.
use super::{smoothed_p_value, PredictionOutput, ResultSchema};
use crate::calibrate::{output_columns, ClassCalibration};
use crate::columns;
use crate::config::ClassificationConfig;
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use crate::scorer::ClassProbabilityScorer;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;

/// Predicts class p-values from an immutable, ranked calibration set.
///
/// The calibration is fully built and sorted before the predictor exists,
/// so prediction can fan out across rows safely.
pub struct ClassificationPredictor {
    config: ClassificationConfig,
    calibration: ClassCalibration,
}

impl ClassificationPredictor {
    /// Build a predictor over a ranked calibration.
    ///
    /// * `calibration` - Ranked calibration set.
    /// * `config` - Classification configuration.
    pub fn new(
        calibration: ClassCalibration,
        config: ClassificationConfig,
    ) -> Result<Self, ConformalError> {
        if calibration.classes().is_empty() {
            return Err(ConformalError::InsufficientCalibrationData(
                "the calibration set holds no ranked classes".to_string(),
            ));
        }
        Ok(ClassificationPredictor {
            config,
            calibration,
        })
    }

    /// The calibration backing this predictor.
    pub fn calibration(&self) -> &ClassCalibration {
        &self.calibration
    }

    /// Predict p-values for every row of `frame`.
    ///
    /// The uniform draws for tie smoothing come from `rng` and are taken
    /// up front in row order, so the output is identical whether or not
    /// prediction runs in parallel.
    ///
    /// * `frame` - Rows to predict, carrying the model probability columns.
    /// * `rng` - Source of the tie-smoothing uniform draws.
    /// * `parallel` - If `true`, rows are scored in parallel.
    /// * `monitor` - Cancellation and progress sink.
    pub fn predict(
        &self,
        frame: &Frame,
        rng: &mut StdRng,
        parallel: bool,
        monitor: &ExecutionMonitor,
    ) -> Result<PredictionOutput, ConformalError> {
        monitor.check()?;
        let scorer = ClassProbabilityScorer::new(self.calibration.target(), frame)?;

        // Every class of the prediction domain needs calibration rows.
        let class_scores: Vec<&[f64]> = scorer
            .classes()
            .iter()
            .map(|label| {
                self.calibration.scores_for(label).ok_or_else(|| {
                    ConformalError::InsufficientCalibrationData(format!(
                        "no calibration records for class {}",
                        label
                    ))
                })
            })
            .collect::<Result<_, _>>()?;

        let mut appended = Vec::new();
        for label in scorer.classes() {
            appended.push(columns::p_value(label));
            if self.config.include_ranks {
                appended.push(columns::rank(label));
            }
        }
        let appended_refs: Vec<&str> = appended.iter().map(String::as_str).collect();
        let column_names = output_columns(frame, self.config.keep_all_columns, &[], &appended_refs);
        let passthrough = column_names.len() - appended.len();
        let schema = ResultSchema::new(passthrough, appended.len());

        let total = frame.len();
        let class_count = class_scores.len();
        let uniforms: Vec<f64> = (0..total * class_count).map(|_| rng.gen::<f64>()).collect();

        let build_row = |i: usize| -> Result<Row, ConformalError> {
            let row = frame.row(i);
            let mut values = if self.config.keep_all_columns {
                row.values.clone()
            } else {
                Vec::new()
            };
            for (j, scores) in class_scores.iter().enumerate() {
                let p = scorer.class_score(row, j)?;
                let result = smoothed_p_value(scores, p, uniforms[i * class_count + j]);
                values.push(Value::Double(result.value));
                if self.config.include_ranks {
                    values.push(Value::Int(result.rank as i64));
                }
            }
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
