//! Per-class accuracy of p-value prediction sets.
use crate::columns;
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Outcome counts for the records of one target class.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassCounts {
    /// The class label.
    pub label: String,
    /// Records predicted as exactly this class.
    pub exclusive_tp: usize,
    /// Records whose prediction set held this class among others.
    pub inclusive_tp: usize,
    /// Records whose prediction set missed this class.
    pub false_negative: usize,
}

impl ClassCounts {
    fn new(label: &str) -> Self {
        ClassCounts {
            label: label.to_string(),
            exclusive_tp: 0,
            inclusive_tp: 0,
            false_negative: 0,
        }
    }

    fn absorb(&mut self, other: &ClassCounts) {
        self.exclusive_tp += other.exclusive_tp;
        self.inclusive_tp += other.inclusive_tp;
        self.false_negative += other.false_negative;
    }

    /// Number of evaluated records of this class.
    pub fn total(&self) -> usize {
        self.exclusive_tp + self.inclusive_tp + self.false_negative
    }

    /// Accuracy over the decisive predictions,
    /// `exclusive_tp / (exclusive_tp + false_negative)`.
    ///
    /// NaN when the class saw no decisive prediction.
    pub fn accuracy_simple(&self) -> f64 {
        self.exclusive_tp as f64 / (self.exclusive_tp + self.false_negative) as f64
    }

    /// Share of records whose prediction set held the class,
    /// `(exclusive_tp + inclusive_tp) / total`.
    ///
    /// NaN when the class saw no record.
    pub fn accuracy_advanced(&self) -> f64 {
        (self.exclusive_tp + self.inclusive_tp) as f64 / self.total() as f64
    }
}

/// Per-class evaluation of a classification prediction table.
///
/// A record's prediction set holds every class whose p-value strictly
/// exceeds the significance level. Records are counted under their true
/// class: exclusive true positive when the set is exactly that class,
/// inclusive true positive when the set holds it among others, false
/// negative when the set misses it.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClassificationEvaluation {
    significance: f64,
    classes: Vec<ClassCounts>,
}

impl ClassificationEvaluation {
    /// Evaluate a prediction table against its known target column.
    ///
    /// * `frame` - Prediction table holding the target and one p-value
    ///   column per class.
    /// * `target` - Name of the target column.
    /// * `significance` - Significance level the prediction sets are read
    ///   at, within 0 and 1.
    /// * `monitor` - Cancellation and progress channel.
    pub fn evaluate(
        frame: &Frame,
        target: &str,
        significance: f64,
        monitor: &ExecutionMonitor,
    ) -> Result<Self, ConformalError> {
        if !(0.0..=1.0).contains(&significance) {
            return Err(ConformalError::InvalidParameter(
                "significance".to_string(),
                "a level within 0 and 1".to_string(),
                significance.to_string(),
            ));
        }
        let target_col = frame.require_column(target)?;
        let mut p_value_cols: Vec<(String, usize)> = Vec::new();
        for (i, column) in frame.columns().iter().enumerate() {
            if let Some(label) = columns::p_value_class(column) {
                p_value_cols.push((label.to_string(), i));
            }
        }
        if p_value_cols.is_empty() {
            return Err(ConformalError::MissingValue(
                columns::p_value("<class>"),
                "not in the table".to_string(),
            ));
        }

        let mut classes: Vec<ClassCounts> = p_value_cols
            .iter()
            .map(|(label, _)| ClassCounts::new(label))
            .collect();
        let mut by_label: HashMap<String, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, counts)| (counts.label.clone(), i))
            .collect();

        for (i, row) in frame.rows().iter().enumerate() {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, frame.len());
            }
            let truth = match &row.values[target_col] {
                Value::Missing => {
                    return Err(ConformalError::MissingValue(
                        target.to_string(),
                        format!("row {}", row.id),
                    ))
                }
                value => value.to_string(),
            };
            let mut in_set = false;
            let mut set_size = 0usize;
            for (label, col) in &p_value_cols {
                let p = row.values[*col].numeric(&frame.columns()[*col], &row.id)?;
                if p > significance {
                    set_size += 1;
                    if *label == truth {
                        in_set = true;
                    }
                }
            }
            let index = match by_label.get(truth.as_str()) {
                Some(&index) => index,
                None => {
                    // A label without a p-value column can only be missed.
                    classes.push(ClassCounts::new(&truth));
                    by_label.insert(truth, classes.len() - 1);
                    classes.len() - 1
                }
            };
            if in_set && set_size == 1 {
                classes[index].exclusive_tp += 1;
            } else if in_set {
                classes[index].inclusive_tp += 1;
            } else {
                classes[index].false_negative += 1;
            }
        }
        monitor.progress(1.0);

        Ok(ClassificationEvaluation {
            significance,
            classes,
        })
    }

    /// The significance level the prediction sets were read at.
    pub fn significance(&self) -> f64 {
        self.significance
    }

    /// Counts per class: prediction columns first, then labels seen only
    /// in the target column.
    pub fn classes(&self) -> &[ClassCounts] {
        &self.classes
    }

    /// Counts summed across all classes.
    pub fn overall(&self) -> ClassCounts {
        let mut overall = ClassCounts::new("Overall");
        for counts in &self.classes {
            overall.absorb(counts);
        }
        overall
    }

    /// Render the evaluation as a table with one row per class and a
    /// trailing overall row.
    pub fn to_table(&self) -> Result<Frame, ConformalError> {
        let mut table = Frame::new(vec![
            "Class".to_string(),
            "Exclusive TP".to_string(),
            "Inclusive TP".to_string(),
            "False negative".to_string(),
            "Accuracy (simple)".to_string(),
            "Accuracy (advanced)".to_string(),
        ])?;
        for counts in &self.classes {
            table.append_row(counts_row(counts));
        }
        table.append_row(counts_row(&self.overall()));
        Ok(table)
    }
}

fn counts_row(counts: &ClassCounts) -> Row {
    Row::new(
        counts.label.clone(),
        vec![
            Value::Str(counts.label.clone()),
            Value::Int(counts.exclusive_tp as i64),
            Value::Int(counts.inclusive_tp as i64),
            Value::Int(counts.false_negative as i64),
            Value::Double(counts.accuracy_simple()),
            Value::Double(counts.accuracy_advanced()),
        ],
    )
}
