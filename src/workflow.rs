//! Cross-conformal driver
//!
//! Runs the full partition/train/calibrate/predict pipeline over every
//! fold of a plan and aggregates the folds. The underlying model stays
//! external: a caller-supplied closure trains on the training split and
//! appends its probability or prediction columns to the calibration and
//! test tables of the fold.
use crate::calibrate::{AlphaCalibration, ClassCalibration};
use crate::config::{ClassificationConfig, RegressionConfig, SampleSize, SamplingConfig};
use crate::errors::ConformalError;
use crate::fold::{AggregatedOutput, FoldAggregator, FoldPlan};
use crate::frame::Frame;
use crate::monitor::ExecutionMonitor;
use crate::partition::{round_calibration_size, Partitioner};
use crate::predictor::classification::ClassificationPredictor;
use crate::predictor::regression::RegressionPredictor;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Which conformal task a run performs.
#[derive(Clone)]
pub enum TaskConfig {
    /// Class p-values per record.
    Classification(ClassificationConfig),
    /// Prediction intervals per record.
    Regression(RegressionConfig),
}

/// Cross-conformal run over one or more folds.
///
/// Each fold splits the labeled table into a training and a calibration
/// part, has the external model score both the calibration and the test
/// table, calibrates, predicts, and feeds the fold into a
/// [`FoldAggregator`]. With a single fold this reduces to the plain
/// inductive flow.
pub struct CrossConformal {
    sampling: SamplingConfig,
    task: TaskConfig,
    iterations: usize,
    parallel: bool,
}

impl CrossConformal {
    /// Driver for the given task, with default sampling and a single fold.
    pub fn new(task: TaskConfig) -> Self {
        CrossConformal {
            sampling: SamplingConfig::default(),
            task,
            iterations: 1,
            parallel: false,
        }
    }

    /// Set the sampling configuration for the per-fold split.
    /// * `sampling` - Sampling method, size and seed settings.
    pub fn set_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the number of folds.
    /// * `iterations` - Fold count, at least 1.
    pub fn set_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set whether prediction fans out across rows.
    /// * `parallel` - True to score prediction rows in parallel.
    pub fn set_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run the pipeline over every fold and aggregate the results.
    ///
    /// The per-fold prediction RNG is seeded with the partitioner seed of
    /// the fold plus the fold index, so a seeded run reproduces in full.
    ///
    /// * `frame` - Labeled table, split into training and calibration rows
    ///   each fold.
    /// * `test` - Table the run predicts.
    /// * `model` - Called once per fold with the training, calibration and
    ///   test tables; returns the calibration and test tables with the
    ///   model columns appended.
    /// * `monitor` - Cancellation and fold-level progress channel. Inner
    ///   stages share its cancellation flag.
    pub fn run<M>(
        &self,
        frame: &Frame,
        test: &Frame,
        mut model: M,
        monitor: &ExecutionMonitor,
    ) -> Result<AggregatedOutput, ConformalError>
    where
        M: FnMut(&Frame, &Frame, &Frame) -> Result<(Frame, Frame), ConformalError>,
    {
        let sampling = self.effective_sampling(frame.len())?;
        let partitioner = Partitioner::new(sampling)?;
        let plan = FoldPlan::new(self.iterations)?;
        let mut aggregator = FoldAggregator::new(&plan);
        let stage = monitor.child();

        for fold in plan.folds() {
            monitor.check()?;
            let (calibration_rows, train) = partitioner.partition(frame, fold.index(), &stage)?;
            let (calibration_scored, test_scored) = model(&train, &calibration_rows, test)?;
            let seed = partitioner
                .effective_seed(fold.index())
                .wrapping_add(fold.index() as u64);

            match &self.task {
                TaskConfig::Classification(config) => {
                    let calibration =
                        ClassCalibration::calibrate(&calibration_scored, config, &stage)?;
                    let predictor = ClassificationPredictor::new(calibration, config.clone())?;
                    let mut rng = StdRng::seed_from_u64(seed);
                    let prediction =
                        predictor.predict(&test_scored, &mut rng, self.parallel, &stage)?;
                    info!(
                        "fold {}/{}: {} calibration rows, {} predicted rows",
                        fold.index() + 1,
                        plan.count(),
                        predictor.calibration().table().len(),
                        prediction.table.len()
                    );
                    aggregator.push_fold(
                        &fold,
                        predictor.calibration().table(),
                        &prediction,
                        None,
                    )?;
                }
                TaskConfig::Regression(config) => {
                    let calibration =
                        AlphaCalibration::calibrate(&calibration_scored, config, &stage)?;
                    let predictor = RegressionPredictor::new(calibration, config.clone())?;
                    let prediction = predictor.predict(&test_scored, self.parallel, &stage)?;
                    info!(
                        "fold {}/{}: alpha {} from {} calibration rows",
                        fold.index() + 1,
                        plan.count(),
                        predictor.alpha(),
                        predictor.calibration().table().len()
                    );
                    aggregator.push_fold(
                        &fold,
                        predictor.calibration().table(),
                        &prediction,
                        None,
                    )?;
                }
            }
            monitor.progress_of(fold.index() + 1, plan.count());
        }

        aggregator.finish(&stage)
    }

    /// Sampling configuration actually used for the split. Regression
    /// rounds the calibration size to a clean quantile boundary first.
    fn effective_sampling(&self, total: usize) -> Result<SamplingConfig, ConformalError> {
        let sampling = self.sampling.clone();
        match &self.task {
            TaskConfig::Classification(_) => Ok(sampling),
            TaskConfig::Regression(_) => {
                let requested = sampling.size.resolve(total);
                let rounded = round_calibration_size(requested)?;
                if rounded != requested {
                    warn!(
                        "calibration size rounded from {} to {} rows",
                        requested, rounded
                    );
                }
                Ok(sampling.set_size(SampleSize::Count(rounded)))
            }
        }
    }
}
