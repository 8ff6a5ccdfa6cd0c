//! Engine configuration
//!
//! Defines the configuration structures and enums consumed by the
//! partitioner, scorers and predictors, including sampling method, sample
//! size, error rate and score normalization settings.
use crate::errors::ConformalError;
use crate::frame::{Frame, Value};
use crate::scorer::ClassProbabilityScorer;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the partitioner picks the matched subset.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum SamplingMethod {
    /// The first `k` rows in table order.
    First,
    /// `k` rows evenly spaced over the table.
    Linear,
    /// A uniform draw of `k` rows without replacement.
    Random,
    /// A per-class proportional draw; requires a class column.
    Stratified,
}

impl FromStr for SamplingMethod {
    type Err = ConformalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "First" => Ok(SamplingMethod::First),
            "Linear" => Ok(SamplingMethod::Linear),
            "Random" => Ok(SamplingMethod::Random),
            "Stratified" => Ok(SamplingMethod::Stratified),
            _ => Err(ConformalError::ParseString(
                s.to_string(),
                "SamplingMethod".to_string(),
                items_to_strings(&["First", "Linear", "Random", "Stratified"]),
            )),
        }
    }
}

/// Requested size of the matched subset.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub enum SampleSize {
    /// Absolute row count, capped at the table size.
    Count(usize),
    /// Fraction of the table size in `[0, 1]`, rounded to the nearest row.
    Fraction(f64),
}

impl SampleSize {
    /// Number of rows this size selects out of `total`.
    pub fn resolve(&self, total: usize) -> usize {
        match self {
            SampleSize::Count(k) => (*k).min(total),
            SampleSize::Fraction(f) => ((total as f64 * f).round() as usize).min(total),
        }
    }

    fn validate(&self) -> Result<(), ConformalError> {
        if let SampleSize::Fraction(f) = self {
            if !(0.0..=1.0).contains(f) {
                return Err(ConformalError::InvalidParameter(
                    "sample_size".to_string(),
                    "fraction within 0 and 1".to_string(),
                    f.to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn default_seed() -> Option<u64> {
    None
}
fn default_iteration_dependent() -> bool {
    false
}
fn default_class_column() -> Option<String> {
    None
}
fn default_include_ranks() -> bool {
    false
}
fn default_keep_all_columns() -> bool {
    true
}
fn default_error_rate() -> f64 {
    0.1
}
fn default_beta() -> f64 {
    0.25
}

/// Row sampling configuration for train/calibration splits.
#[derive(Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sampling method for the matched subset.
    pub method: SamplingMethod,
    /// Requested size of the matched subset.
    pub size: SampleSize,
    /// Seed for random draws. When unset, a seed captured at partitioner
    /// construction time is used instead.
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
    /// Whether the fold index is added to the seed, so each fold of a
    /// repeated run draws an independent but reproducible sample.
    #[serde(default = "default_iteration_dependent")]
    pub iteration_dependent: bool,
    /// Class column for stratified sampling.
    #[serde(default = "default_class_column")]
    pub class_column: Option<String>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            method: SamplingMethod::Random,
            size: SampleSize::Fraction(0.25),
            seed: None,
            iteration_dependent: false,
            class_column: None,
        }
    }
}

impl SamplingConfig {
    /// Set the sampling method.
    /// * `method` - Sampling method for the matched subset.
    pub fn set_method(mut self, method: SamplingMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the requested sample size.
    /// * `size` - Absolute count or fraction of the table.
    pub fn set_size(mut self, size: SampleSize) -> Self {
        self.size = size;
        self
    }

    /// Set the seed for random draws.
    /// * `seed` - Seed value, or None to derive one at construction time.
    pub fn set_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Set whether the fold index perturbs the seed.
    /// * `iteration_dependent` - True to give each fold its own draw.
    pub fn set_iteration_dependent(mut self, iteration_dependent: bool) -> Self {
        self.iteration_dependent = iteration_dependent;
        self
    }

    /// Set the class column used by stratified sampling.
    /// * `class_column` - Name of the class column.
    pub fn set_class_column(mut self, class_column: Option<String>) -> Self {
        self.class_column = class_column;
        self
    }

    /// Check the configuration for out-of-range or inconsistent settings.
    pub fn validate(&self) -> Result<(), ConformalError> {
        self.size.validate()?;
        if self.method == SamplingMethod::Stratified && self.class_column.is_none() {
            return Err(ConformalError::InvalidParameter(
                "class_column".to_string(),
                "a class column when sampling is stratified".to_string(),
                "None".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the classification calibrator and predictor.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClassificationConfig {
    /// Name of the target column.
    pub target_column: String,
    /// Whether prediction output carries a rank column per class.
    #[serde(default = "default_include_ranks")]
    pub include_ranks: bool,
    /// Whether input columns are carried into the output table.
    #[serde(default = "default_keep_all_columns")]
    pub keep_all_columns: bool,
}

impl ClassificationConfig {
    /// Create a configuration for the given target column.
    pub fn new(target_column: impl Into<String>) -> Self {
        ClassificationConfig {
            target_column: target_column.into(),
            include_ranks: false,
            keep_all_columns: true,
        }
    }

    /// Set whether prediction output carries a rank column per class.
    /// * `include_ranks` - True to emit `Rank (<class>)` columns.
    pub fn set_include_ranks(mut self, include_ranks: bool) -> Self {
        self.include_ranks = include_ranks;
        self
    }

    /// Set whether input columns are carried into the output table.
    /// * `keep_all_columns` - False to emit only id and score columns.
    pub fn set_keep_all_columns(mut self, keep_all_columns: bool) -> Self {
        self.keep_all_columns = keep_all_columns;
        self
    }
}

/// Difficulty-based normalization of regression scores.
#[derive(Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    /// Column holding the per-record difficulty estimate.
    pub difficulty_column: String,
    /// Smoothing constant added to the difficulty, guarding against
    /// division by near-zero difficulty.
    #[serde(default = "default_beta")]
    pub beta: f64,
}

impl NormalizationConfig {
    /// Create a normalization configuration with the default beta.
    pub fn new(difficulty_column: impl Into<String>) -> Self {
        NormalizationConfig {
            difficulty_column: difficulty_column.into(),
            beta: default_beta(),
        }
    }

    /// Set the beta smoothing constant.
    /// * `beta` - Value within 0 and 1.
    pub fn set_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    fn validate(&self) -> Result<(), ConformalError> {
        if !(0.0..=1.0).contains(&self.beta) || self.beta.is_nan() {
            return Err(ConformalError::InvalidParameter(
                "beta".to_string(),
                "real value within 0 and 1".to_string(),
                self.beta.to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the regression calibrator and predictor.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Name of the target column.
    pub target_column: String,
    /// Name of the model prediction column.
    pub prediction_column: String,
    /// Accepted error rate for intervals, within 0 and 1.
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    /// Whether the nonconformity score keeps the residual sign.
    #[serde(default)]
    pub signed: bool,
    /// Difficulty normalization, when enabled.
    #[serde(default)]
    pub normalization: Option<NormalizationConfig>,
    /// Whether input columns are carried into the output table.
    #[serde(default = "default_keep_all_columns")]
    pub keep_all_columns: bool,
}

impl RegressionConfig {
    /// Create a configuration for the given target and prediction columns.
    pub fn new(target_column: impl Into<String>, prediction_column: impl Into<String>) -> Self {
        RegressionConfig {
            target_column: target_column.into(),
            prediction_column: prediction_column.into(),
            error_rate: default_error_rate(),
            signed: false,
            normalization: None,
            keep_all_columns: true,
        }
    }

    /// Set the accepted error rate.
    /// * `error_rate` - Value within 0 and 1.
    pub fn set_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// Set whether the nonconformity score keeps the residual sign.
    /// * `signed` - True for signed residuals.
    pub fn set_signed(mut self, signed: bool) -> Self {
        self.signed = signed;
        self
    }

    /// Set difficulty normalization.
    /// * `normalization` - Normalization settings, or None to disable.
    pub fn set_normalization(mut self, normalization: Option<NormalizationConfig>) -> Self {
        self.normalization = normalization;
        self
    }

    /// Set whether input columns are carried into the output table.
    /// * `keep_all_columns` - False to emit only id and score columns.
    pub fn set_keep_all_columns(mut self, keep_all_columns: bool) -> Self {
        self.keep_all_columns = keep_all_columns;
        self
    }

    /// Check the configuration for out-of-range settings.
    pub fn validate(&self) -> Result<(), ConformalError> {
        if !(0.0..=1.0).contains(&self.error_rate) || self.error_rate.is_nan() {
            return Err(ConformalError::InvalidParameter(
                "error_rate".to_string(),
                "real value within 0 and 1".to_string(),
                self.error_rate.to_string(),
            ));
        }
        if let Some(normalization) = &self.normalization {
            normalization.validate()?;
        }
        Ok(())
    }
}

/// Pick a target column for classification when none is configured.
///
/// Scans string-valued columns right to left, mirroring the convention of
/// placing the target last, and accepts the first candidate a probability
/// scorer can be built for. Failing candidates are skipped; the error
/// surfaces only when every candidate failed.
pub fn autoconfigure_target(frame: &Frame) -> Result<String, ConformalError> {
    let mut tried: Vec<String> = Vec::new();
    for (index, candidate) in frame.columns().iter().enumerate().rev() {
        if !string_valued(frame, index) {
            continue;
        }
        tried.push(candidate.clone());
        if ClassProbabilityScorer::new(candidate, frame).is_ok() {
            return Ok(candidate.clone());
        }
    }
    let tried: Vec<&str> = tried.iter().map(|name| name.as_str()).collect();
    Err(ConformalError::UnsupportedOperation(format!(
        "no target column with matching probability columns, tried {}",
        items_to_strings(&tried)
    )))
}

fn string_valued(frame: &Frame, column: usize) -> bool {
    for row in frame.rows() {
        match &row.values[column] {
            Value::Missing => continue,
            Value::Str(_) => return true,
            _ => return false,
        }
    }
    // No rows or only missing cells, let the scorer decide.
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, Row};

    #[test]
    fn test_sampling_method_from_str() {
        assert_eq!(
            SamplingMethod::from_str("Stratified").unwrap(),
            SamplingMethod::Stratified
        );
        assert!(matches!(
            SamplingMethod::from_str("Bootstrap"),
            Err(ConformalError::ParseString(_, _, _))
        ));
    }

    #[test]
    fn test_sample_size_resolve() {
        assert_eq!(SampleSize::Count(30).resolve(100), 30);
        assert_eq!(SampleSize::Count(300).resolve(100), 100);
        assert_eq!(SampleSize::Fraction(0.25).resolve(100), 25);
        assert_eq!(SampleSize::Fraction(0.5).resolve(5), 3);
        assert_eq!(SampleSize::Fraction(1.0).resolve(7), 7);
        assert_eq!(SampleSize::Fraction(0.0).resolve(7), 0);
    }

    #[test]
    fn test_sampling_config_validate() {
        let config = SamplingConfig::default().set_size(SampleSize::Fraction(1.5));
        assert!(config.validate().is_err());

        let config = SamplingConfig::default().set_method(SamplingMethod::Stratified);
        assert!(config.validate().is_err());

        let config = SamplingConfig::default()
            .set_method(SamplingMethod::Stratified)
            .set_class_column(Some("class".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_regression_config_validate() {
        let config = RegressionConfig::new("target", "prediction");
        assert!(config.validate().is_ok());
        assert_eq!(config.error_rate, 0.1);

        let config = RegressionConfig::new("target", "prediction").set_error_rate(1.2);
        assert!(config.validate().is_err());

        let config = RegressionConfig::new("target", "prediction")
            .set_normalization(Some(NormalizationConfig::new("difficulty").set_beta(2.0)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_regression_config_roundtrip() {
        let config = RegressionConfig::new("y", "yhat")
            .set_error_rate(0.2)
            .set_signed(true)
            .set_normalization(Some(NormalizationConfig::new("sigma")));
        let json = serde_json::to_string(&config).unwrap();
        let back: RegressionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.target_column, "y");
        assert_eq!(back.error_rate, 0.2);
        assert!(back.signed);
        assert_eq!(back.normalization.unwrap().beta, 0.25);
    }

    #[test]
    fn test_autoconfigure_target() {
        let mut frame = Frame::new(vec![
            "feature".to_string(),
            "Species".to_string(),
            "P (Species=setosa)".to_string(),
            "P (Species=virginica)".to_string(),
        ])
        .unwrap();
        frame.append_row(Row::new(
            "r0",
            vec![1.5.into(), "setosa".into(), 0.9.into(), 0.1.into()],
        ));
        assert_eq!(autoconfigure_target(&frame).unwrap(), "Species");

        let frame = Frame::new(vec!["feature".to_string(), "Species".to_string()]).unwrap();
        assert!(matches!(
            autoconfigure_target(&frame),
            Err(ConformalError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_autoconfigure_target_prefers_rightmost() {
        let mut frame = Frame::new(vec![
            "first".to_string(),
            "second".to_string(),
            "P (first=x)".to_string(),
            "P (second=y)".to_string(),
        ])
        .unwrap();
        frame.append_row(Row::new(
            "r0",
            vec!["x".into(), "y".into(), 0.5.into(), 0.5.into()],
        ));
        assert_eq!(autoconfigure_target(&frame).unwrap(), "second");
    }
}
