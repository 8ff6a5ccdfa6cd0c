//! Metrics
//!
//! Evaluation of finished prediction tables against known targets.
//! Validation only, prediction correctness never depends on this module.
//!
//! * `classification`: per-class accuracy of p-value prediction sets.
//! * `regression`: coverage and interval-size statistics.
pub mod classification;
pub mod regression;
