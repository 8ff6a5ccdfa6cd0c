//! Partitioner
//!
//! Splits an ordered table into a matched and an unmatched subset ahead of
//! model training, so calibration rows never leak into the training set.
//! Supports taking the first rows, evenly spaced rows, a seeded uniform
//! draw, or a seeded per-class proportional draw.
use crate::config::{SamplingConfig, SamplingMethod};
use crate::errors::ConformalError;
use crate::frame::Frame;
use crate::monitor::{ExecutionMonitor, PROGRESS_STEP};
use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Splits tables into (matched, unmatched) row subsets.
///
/// A partitioner is built once and may be invoked once per fold. Seeded
/// methods draw from `seed + fold` when the configuration is iteration
/// dependent, and from the plain seed otherwise, so repeated calls with the
/// same fold are idempotent. When no seed is configured one is captured at
/// construction time.
pub struct Partitioner {
    config: SamplingConfig,
    fallback_seed: u64,
}

impl Partitioner {
    /// Create a partitioner from a validated sampling configuration.
    pub fn new(config: SamplingConfig) -> Result<Self, ConformalError> {
        config.validate()?;
        let fallback_seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(Partitioner {
            config,
            fallback_seed,
        })
    }

    /// The seed a given fold draws from.
    pub fn effective_seed(&self, fold: usize) -> u64 {
        let base = self.config.seed.unwrap_or(self.fallback_seed);
        if self.config.iteration_dependent {
            base.wrapping_add(fold as u64)
        } else {
            base
        }
    }

    /// Split row positions of `frame` into (matched, unmatched), both in
    /// table order.
    ///
    /// * `frame` - Table to split.
    /// * `fold` - Fold index; perturbs the seed when iteration dependent.
    /// * `monitor` - Cancellation and progress sink.
    pub fn split(
        &self,
        frame: &Frame,
        fold: usize,
        monitor: &ExecutionMonitor,
    ) -> Result<(Vec<usize>, Vec<usize>), ConformalError> {
        monitor.check()?;
        let total = frame.len();
        let k = self.config.size.resolve(total);
        let split = match self.config.method {
            SamplingMethod::First => self.split_first(total, k),
            SamplingMethod::Linear => self.split_linear(total, k, monitor)?,
            SamplingMethod::Random => self.split_random(total, k, fold, monitor)?,
            SamplingMethod::Stratified => self.split_stratified(frame, k, fold, monitor)?,
        };
        monitor.progress(1.0);
        Ok(split)
    }

    /// Split `frame` into (matched, unmatched) tables.
    pub fn partition(
        &self,
        frame: &Frame,
        fold: usize,
        monitor: &ExecutionMonitor,
    ) -> Result<(Frame, Frame), ConformalError> {
        let (matched, unmatched) = self.split(frame, fold, monitor)?;
        let mut first = Frame::new(frame.columns().to_vec())?;
        let mut second = Frame::new(frame.columns().to_vec())?;
        for i in matched {
            first.append_row(frame.row(i).clone());
        }
        for i in unmatched {
            second.append_row(frame.row(i).clone());
        }
        Ok((first, second))
    }

    fn split_first(&self, total: usize, k: usize) -> (Vec<usize>, Vec<usize>) {
        // Everything past the quota is excluded wholesale.
        ((0..k).collect(), (k..total).collect())
    }

    fn split_linear(
        &self,
        total: usize,
        k: usize,
        monitor: &ExecutionMonitor,
    ) -> Result<(Vec<usize>, Vec<usize>), ConformalError> {
        let mut matched = Vec::with_capacity(k);
        let mut unmatched = Vec::with_capacity(total - k);
        for i in 0..total {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, total);
            }
            // One row out of every run of total/k, spaced evenly and
            // yielding exactly k rows.
            if (i + 1) * k / total > i * k / total {
                matched.push(i);
            } else {
                unmatched.push(i);
            }
        }
        Ok((matched, unmatched))
    }

    fn split_random(
        &self,
        total: usize,
        k: usize,
        fold: usize,
        monitor: &ExecutionMonitor,
    ) -> Result<(Vec<usize>, Vec<usize>), ConformalError> {
        let mut rng = StdRng::seed_from_u64(self.effective_seed(fold));
        let chosen = rand::seq::index::sample(&mut rng, total, k);
        self.collect_membership(total, chosen.iter(), monitor)
    }

    fn split_stratified(
        &self,
        frame: &Frame,
        k: usize,
        fold: usize,
        monitor: &ExecutionMonitor,
    ) -> Result<(Vec<usize>, Vec<usize>), ConformalError> {
        let class_column = self.config.class_column.as_deref().unwrap_or_default();
        let col = frame.require_column(class_column)?;
        let total = frame.len();

        // Strata in first-appearance order so the draw is deterministic.
        let mut order: Vec<String> = Vec::new();
        let mut strata: HashMap<String, Vec<usize>> = HashMap::new();
        for i in 0..total {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
                monitor.progress_of(i, 2 * total);
            }
            let label = frame.value(i, col).to_string();
            strata
                .entry_ref(label.as_str())
                .or_insert_with(|| {
                    order.push(label.clone());
                    Vec::new()
                })
                .push(i);
        }

        let quotas = largest_remainder_quotas(
            &order.iter().map(|label| strata[label].len()).collect::<Vec<_>>(),
            k,
        );

        let mut rng = StdRng::seed_from_u64(self.effective_seed(fold));
        let mut chosen = Vec::with_capacity(k);
        for (label, quota) in order.iter().zip(quotas) {
            let positions = &strata[label];
            for picked in rand::seq::index::sample(&mut rng, positions.len(), quota).iter() {
                chosen.push(positions[picked]);
            }
        }
        self.collect_membership(total, chosen.into_iter(), monitor)
    }

    fn collect_membership(
        &self,
        total: usize,
        chosen: impl Iterator<Item = usize>,
        monitor: &ExecutionMonitor,
    ) -> Result<(Vec<usize>, Vec<usize>), ConformalError> {
        let mut is_matched = vec![false; total];
        for i in chosen {
            is_matched[i] = true;
        }
        let mut matched = Vec::new();
        let mut unmatched = Vec::new();
        for (i, picked) in is_matched.iter().enumerate() {
            if i % PROGRESS_STEP == 0 {
                monitor.check()?;
            }
            if *picked {
                matched.push(i);
            } else {
                unmatched.push(i);
            }
        }
        Ok((matched, unmatched))
    }
}

/// Allocate `k` slots across strata proportionally to their sizes.
///
/// Each stratum gets the floor of its proportional share; leftover slots go
/// to the strata with the largest fractional remainders, earlier strata
/// winning ties. The result always sums to `k` and never exceeds a
/// stratum's size.
fn largest_remainder_quotas(sizes: &[usize], k: usize) -> Vec<usize> {
    let total: usize = sizes.iter().sum();
    if total == 0 {
        return vec![0; sizes.len()];
    }
    let mut quotas: Vec<usize> = sizes.iter().map(|s| k * s / total).collect();
    let assigned: usize = quotas.iter().sum();

    let mut remainders: Vec<(usize, usize)> = sizes
        .iter()
        .enumerate()
        .map(|(i, s)| (i, k * s % total))
        .collect();
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (i, _) in remainders.into_iter().take(k - assigned) {
        quotas[i] += 1;
    }
    quotas
}

/// Round a requested calibration size down to a clean decile boundary, or a
/// percentile boundary for sizes of 100 and above, so later quantile lookups
/// land on exact positions.
///
/// Returns `⌊(k+1)/d⌋·d − 1` with `d = 10` below 100 and `d = 100`
/// otherwise. Fails when the rounded size drops below 10 rows; the smallest
/// workable input is 19.
pub fn round_calibration_size(k: usize) -> Result<usize, ConformalError> {
    let d = if k < 100 { 10 } else { 100 };
    let rounded = (k + 1) / d * d;
    if rounded < 11 {
        return Err(ConformalError::UnsupportedOperation(format!(
            "calibration size {} rounds below the minimum of 10 rows",
            k
        )));
    }
    Ok(rounded - 1)
}
