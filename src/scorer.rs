//! Nonconformity scoring
//!
//! Turns model output into nonconformity scores. Classification reads the
//! per-class probability columns an external model appended to the table;
//! regression measures the residual between target and prediction, with
//! optional per-record difficulty normalization. Both scorers resolve their
//! columns once against a table schema and then score rows cheaply.
use crate::columns;
use crate::config::{NormalizationConfig, RegressionConfig};
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use hashbrown::HashMap;

/// Classification scorer: score(record, class) = P(class | record).
///
/// The class domain is taken from the probability columns present in the
/// table, in column order.
#[derive(Debug)]
pub struct ClassProbabilityScorer {
    target_name: String,
    target_col: Option<usize>,
    classes: Vec<String>,
    probability_cols: Vec<usize>,
    probability_names: Vec<String>,
    by_label: HashMap<String, usize>,
}

impl ClassProbabilityScorer {
    /// Resolve the target column and its probability columns against a
    /// table schema. The target column itself may be absent, as it is for
    /// unlabeled prediction rows; only [`Self::label`] and [`Self::score`]
    /// need it.
    ///
    /// * `target` - Name of the target column.
    /// * `frame` - Table carrying the model's probability columns.
    pub fn new(target: &str, frame: &Frame) -> Result<Self, ConformalError> {
        let target_col = frame.column_index(target);
        let mut classes = Vec::new();
        let mut probability_cols = Vec::new();
        let mut probability_names = Vec::new();
        let mut by_label = HashMap::new();
        for (i, name) in frame.columns().iter().enumerate() {
            if let Some(label) = columns::probability_class(name, target) {
                by_label.insert(label.to_string(), classes.len());
                classes.push(label.to_string());
                probability_cols.push(i);
                probability_names.push(name.clone());
            }
        }
        if classes.is_empty() {
            return Err(ConformalError::MissingValue(
                format!("{}<class>)", columns::probability_prefix(target)),
                "not in the table".to_string(),
            ));
        }
        Ok(ClassProbabilityScorer {
            target_name: target.to_string(),
            target_col,
            classes,
            probability_cols,
            probability_names,
            by_label,
        })
    }

    /// Class labels with a probability column, in column order.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Name of the target column.
    pub fn target(&self) -> &str {
        &self.target_name
    }

    /// Target label of a row, as text.
    pub fn label(&self, row: &Row) -> Result<String, ConformalError> {
        let target_col = match self.target_col {
            Some(col) => col,
            None => {
                return Err(ConformalError::MissingValue(
                    self.target_name.clone(),
                    "not in the table".to_string(),
                ))
            }
        };
        match &row.values[target_col] {
            Value::Missing => Err(ConformalError::MissingValue(
                self.target_name.clone(),
                format!("row {}", row.id),
            )),
            value => Ok(value.to_string()),
        }
    }

    /// Score a calibration row against its own target label, returning the
    /// label and the model probability for it.
    pub fn score(&self, row: &Row) -> Result<(String, f64), ConformalError> {
        let label = self.label(row)?;
        let position = *self.by_label.get(&label).ok_or_else(|| {
            ConformalError::MissingValue(
                columns::probability(&self.target_name, &label),
                "not in the table".to_string(),
            )
        })?;
        let score = self.class_score(row, position)?;
        Ok((label, score))
    }

    /// Score a row against the candidate class at `position` within
    /// [`Self::classes`].
    pub fn class_score(&self, row: &Row, position: usize) -> Result<f64, ConformalError> {
        row.values[self.probability_cols[position]]
            .numeric(&self.probability_names[position], &row.id)
    }
}

/// Regression scorer: score(record) = |target − prediction|, kept signed
/// when configured, divided by `(difficulty + β)` when normalized.
pub struct ResidualScorer {
    target_name: String,
    target_col: Option<usize>,
    prediction_name: String,
    prediction_col: usize,
    signed: bool,
    normalization: Option<ResolvedNormalization>,
}

struct ResolvedNormalization {
    difficulty_name: String,
    difficulty_col: usize,
    beta: f64,
}

impl ResidualScorer {
    /// Resolve the configured columns against a table schema. The target
    /// column may be absent, as it is for unlabeled prediction rows; only
    /// [`Self::score`] needs it.
    ///
    /// * `config` - Regression configuration.
    /// * `frame` - Table carrying the model prediction column.
    pub fn new(config: &RegressionConfig, frame: &Frame) -> Result<Self, ConformalError> {
        config.validate()?;
        let target_col = frame.column_index(&config.target_column);
        let prediction_col = frame.require_column(&config.prediction_column)?;
        let normalization = match &config.normalization {
            Some(NormalizationConfig {
                difficulty_column,
                beta,
            }) => Some(ResolvedNormalization {
                difficulty_name: difficulty_column.clone(),
                difficulty_col: frame.require_column(difficulty_column)?,
                beta: *beta,
            }),
            None => None,
        };
        Ok(ResidualScorer {
            target_name: config.target_column.clone(),
            target_col,
            prediction_name: config.prediction_column.clone(),
            prediction_col,
            signed: config.signed,
            normalization,
        })
    }

    /// Nonconformity score of a row.
    pub fn score(&self, row: &Row) -> Result<f64, ConformalError> {
        let target_col = match self.target_col {
            Some(col) => col,
            None => {
                return Err(ConformalError::MissingValue(
                    self.target_name.clone(),
                    "not in the table".to_string(),
                ))
            }
        };
        let target = row.values[target_col].numeric(&self.target_name, &row.id)?;
        let prediction = self.prediction(row)?;
        let residual = if self.signed {
            target - prediction
        } else {
            (target - prediction).abs()
        };
        Ok(residual / self.scale(row)?)
    }

    /// Model prediction of a row.
    pub fn prediction(&self, row: &Row) -> Result<f64, ConformalError> {
        row.values[self.prediction_col].numeric(&self.prediction_name, &row.id)
    }

    /// Interval half-width factor of a row: `difficulty + β` when
    /// normalized, 1 otherwise.
    pub fn scale(&self, row: &Row) -> Result<f64, ConformalError> {
        match &self.normalization {
            Some(normalization) => {
                let difficulty = row.values[normalization.difficulty_col]
                    .numeric(&normalization.difficulty_name, &row.id)?;
                Ok(difficulty + normalization.beta)
            }
            None => Ok(1.0),
        }
    }
}
