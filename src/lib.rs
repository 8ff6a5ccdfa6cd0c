// Modules
pub mod calibrate;
pub mod columns;
pub mod config;
pub mod errors;
pub mod fold;
pub mod frame;
pub mod metrics;
pub mod monitor;
pub mod partition;
pub mod predictor;
pub mod scorer;
pub mod utils;
pub mod workflow;

// Individual classes, and functions
pub use calibrate::{AlphaCalibration, ClassCalibration};
pub use config::{
    ClassificationConfig, NormalizationConfig, RegressionConfig, SampleSize, SamplingConfig,
    SamplingMethod,
};
pub use errors::ConformalError;
pub use fold::{AggregatedOutput, Fold, FoldAggregator, FoldPlan};
pub use frame::{Frame, Row, Value};
pub use metrics::classification::{ClassCounts, ClassificationEvaluation};
pub use metrics::regression::RegressionEvaluation;
pub use monitor::{CancellationHandle, ExecutionMonitor};
pub use partition::Partitioner;
pub use predictor::classification::ClassificationPredictor;
pub use predictor::regression::RegressionPredictor;
pub use predictor::{AggregationKind, PredictionOutput, ResultSchema};
pub use workflow::{CrossConformal, TaskConfig};
