use super::classification::ClassificationPredictor;
use super::regression::RegressionPredictor;
use super::smoothed_p_value;
use crate::calibrate::{AlphaCalibration, ClassCalibration};
use crate::config::{ClassificationConfig, NormalizationConfig, RegressionConfig};
use crate::errors::ConformalError;
use crate::frame::{Frame, Row, Value};
use crate::monitor::ExecutionMonitor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn single_class_frame(scores: &[f64]) -> Frame {
    let mut frame = Frame::new(vec![
        "Species".to_string(),
        "P (Species=A)".to_string(),
    ])
    .unwrap();
    for (i, score) in scores.iter().enumerate() {
        frame.append_row(Row::new(
            format!("cal{}", i),
            vec!["A".into(), (*score).into()],
        ));
    }
    frame
}

fn single_class_calibration(scores: &[f64]) -> ClassCalibration {
    let frame = single_class_frame(scores);
    let config = ClassificationConfig::new("Species");
    ClassCalibration::calibrate(&frame, &config, &ExecutionMonitor::new()).unwrap()
}

fn prediction_frame(probabilities: &[f64]) -> Frame {
    let mut frame = Frame::new(vec!["P (Species=A)".to_string()]).unwrap();
    for (i, p) in probabilities.iter().enumerate() {
        frame.append_row(Row::new(format!("t{}", i), vec![(*p).into()]));
    }
    frame
}

fn regression_calibration(residuals: &[f64], config: &RegressionConfig) -> AlphaCalibration {
    let mut frame = Frame::new(vec!["y".to_string(), "yhat".to_string()]).unwrap();
    for (i, r) in residuals.iter().enumerate() {
        frame.append_row(Row::new(
            format!("cal{}", i),
            vec![(*r).into(), 0.0.into()],
        ));
    }
    AlphaCalibration::calibrate(&frame, config, &ExecutionMonitor::new()).unwrap()
}

#[test]
fn test_smoothed_p_value_tie_interpolation() {
    let scores = vec![0.9, 0.7, 0.7, 0.5];
    // Ties on 0.7 span ranks 1..=2, so the p-value interpolates (2+u)/5.
    let low = smoothed_p_value(&scores, 0.7, 0.0);
    let high = smoothed_p_value(&scores, 0.7, 0.999);
    assert_eq!(low.value, 0.4);
    assert_eq!(low.rank, 1);
    assert!(high.value < 0.6);
    assert!(high.value > 0.59);
}

#[test]
fn test_smoothed_p_value_without_ties() {
    let scores = vec![0.9, 0.7, 0.7, 0.5];
    // No tie: the draw has no effect and the classical formula applies.
    let a = smoothed_p_value(&scores, 0.8, 0.0);
    let b = smoothed_p_value(&scores, 0.8, 0.99);
    assert_eq!(a.value, 0.6);
    assert_eq!(b.value, 0.6);
    assert_eq!(a.rank, 1);

    assert_eq!(smoothed_p_value(&scores, 0.95, 0.5).value, 0.8);
    assert_eq!(smoothed_p_value(&scores, 0.5, 0.0).value, 0.2);
    assert_eq!(smoothed_p_value(&scores, 0.1, 0.9).value, 0.0);
}

#[test]
fn test_smoothed_p_value_stays_in_unit_interval() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut scores: Vec<f64> = (0..50).map(|_| rng.gen::<f64>()).collect();
    crate::utils::sort_descending(&mut scores);
    for _ in 0..200 {
        let p = rng.gen::<f64>();
        let u = rng.gen::<f64>();
        let result = smoothed_p_value(&scores, p, u);
        assert!(result.value >= 0.0);
        assert!(result.value <= 1.0);
    }
}

#[test]
fn test_classification_predict_tie_interval() {
    let calibration = single_class_calibration(&[0.9, 0.7, 0.7, 0.5]);
    let predictor =
        ClassificationPredictor::new(calibration, ClassificationConfig::new("Species")).unwrap();
    let frame = prediction_frame(&[0.7; 20]);

    for seed in 0..5 {
        let mut rng = StdRng::seed_from_u64(seed);
        let output = predictor
            .predict(&frame, &mut rng, false, &ExecutionMonitor::new())
            .unwrap();
        let col = output.table.column_index("p-value (A)").unwrap();
        for i in 0..output.table.len() {
            let p = output.table.value(i, col).as_f64().unwrap();
            assert!((0.4..0.6).contains(&p), "p-value {} outside tie band", p);
        }
    }
}

#[test]
fn test_classification_predict_deterministic_and_parallel() {
    let calibration = single_class_calibration(&[0.9, 0.7, 0.7, 0.5]);
    let predictor =
        ClassificationPredictor::new(calibration, ClassificationConfig::new("Species")).unwrap();
    let frame = prediction_frame(&[0.72, 0.7, 0.55, 0.91]);

    let mut rng = StdRng::seed_from_u64(42);
    let sequential = predictor
        .predict(&frame, &mut rng, false, &ExecutionMonitor::new())
        .unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    let parallel = predictor
        .predict(&frame, &mut rng, true, &ExecutionMonitor::new())
        .unwrap();
    assert_eq!(sequential.table, parallel.table);
}

#[test]
fn test_classification_include_ranks() {
    let calibration = single_class_calibration(&[0.9, 0.7, 0.7, 0.5]);
    let config = ClassificationConfig::new("Species").set_include_ranks(true);
    let predictor = ClassificationPredictor::new(calibration, config).unwrap();
    let frame = prediction_frame(&[0.7]);

    let mut rng = StdRng::seed_from_u64(1);
    let output = predictor
        .predict(&frame, &mut rng, false, &ExecutionMonitor::new())
        .unwrap();
    assert_eq!(
        output.table.columns(),
        &["P (Species=A)", "p-value (A)", "Rank (A)"]
    );
    let rank = output.table.column_index("Rank (A)").unwrap();
    assert_eq!(output.table.value(0, rank), &Value::Int(1));
}

#[test]
fn test_classification_keep_all_columns_off() {
    let calibration = single_class_calibration(&[0.9, 0.7, 0.5]);
    let config = ClassificationConfig::new("Species").set_keep_all_columns(false);
    let predictor = ClassificationPredictor::new(calibration, config).unwrap();
    let frame = prediction_frame(&[0.9]);

    let mut rng = StdRng::seed_from_u64(1);
    let output = predictor
        .predict(&frame, &mut rng, false, &ExecutionMonitor::new())
        .unwrap();
    assert_eq!(output.table.columns(), &["p-value (A)"]);
    assert_eq!(output.table.row(0).id, "t0");
    assert_eq!(output.schema.len(), 1);
}

#[test]
fn test_classification_missing_class_rejected() {
    let calibration = single_class_calibration(&[0.9, 0.7, 0.5]);
    let predictor =
        ClassificationPredictor::new(calibration, ClassificationConfig::new("Species")).unwrap();

    // The prediction domain carries a class the calibration never saw.
    let mut frame = Frame::new(vec![
        "P (Species=A)".to_string(),
        "P (Species=B)".to_string(),
    ])
    .unwrap();
    frame.append_row(Row::new("t0", vec![0.6.into(), 0.4.into()]));

    let mut rng = StdRng::seed_from_u64(1);
    let err = predictor
        .predict(&frame, &mut rng, false, &ExecutionMonitor::new())
        .unwrap_err();
    assert!(matches!(
        err,
        ConformalError::InsufficientCalibrationData(_)
    ));
}

#[test]
fn test_classification_empty_calibration_rejected() {
    let frame = single_class_frame(&[]);
    let config = ClassificationConfig::new("Species");
    let calibration = ClassCalibration::calibrate(&frame, &config, &ExecutionMonitor::new()).unwrap();
    assert!(matches!(
        ClassificationPredictor::new(calibration, config),
        Err(ConformalError::InsufficientCalibrationData(_))
    ));
}

#[test]
fn test_classification_p_value_guarantee_empirical() {
    // For the true class over exchangeable data, P(p-value <= a) stays
    // close to a. Checked empirically on a seeded draw.
    let mut rng = StdRng::seed_from_u64(7);
    let calibration_scores: Vec<f64> = (0..99).map(|_| rng.gen::<f64>()).collect();
    let calibration = single_class_calibration(&calibration_scores);
    let predictor =
        ClassificationPredictor::new(calibration, ClassificationConfig::new("Species")).unwrap();

    let test_scores: Vec<f64> = (0..1000).map(|_| rng.gen::<f64>()).collect();
    let frame = prediction_frame(&test_scores);
    let output = predictor
        .predict(&frame, &mut rng, false, &ExecutionMonitor::new())
        .unwrap();
    let col = output.table.column_index("p-value (A)").unwrap();
    for alpha in [0.05, 0.1, 0.2] {
        let rejected = (0..output.table.len())
            .filter(|&i| output.table.value(i, col).as_f64().unwrap() <= alpha)
            .count();
        let rate = rejected as f64 / output.table.len() as f64;
        assert!(
            (rate - alpha).abs() < 0.05,
            "rejection rate {} too far from {}",
            rate,
            alpha
        );
    }
}

#[test]
fn test_regression_concrete_quantile() {
    let config = RegressionConfig::new("y", "yhat").set_error_rate(0.4);
    let calibration = regression_calibration(&[5.0, 4.0, 3.0, 2.0, 1.0], &config);
    let predictor = RegressionPredictor::new(calibration, config).unwrap();
    assert_eq!(predictor.alpha(), 3.0);

    let mut frame = Frame::new(vec!["yhat".to_string()]).unwrap();
    frame.append_row(Row::new("t0", vec![10.0.into()]));
    let output = predictor
        .predict(&frame, false, &ExecutionMonitor::new())
        .unwrap();
    let lower = output.table.column_index("Lower bound (y)").unwrap();
    let upper = output.table.column_index("Upper bound (y)").unwrap();
    assert_eq!(output.table.value(0, lower), &Value::Double(7.0));
    assert_eq!(output.table.value(0, upper), &Value::Double(13.0));
}

#[test]
fn test_regression_bounds_contain_prediction() {
    let config = RegressionConfig::new("y", "yhat").set_error_rate(0.25);
    let calibration = regression_calibration(&[2.5, 1.0, 0.5, 0.25], &config);
    let predictor = RegressionPredictor::new(calibration, config).unwrap();

    let mut frame = Frame::new(vec!["yhat".to_string()]).unwrap();
    for (i, yhat) in [-4.0, 0.0, 3.5, 100.0].iter().enumerate() {
        frame.append_row(Row::new(format!("t{}", i), vec![(*yhat).into()]));
    }
    let output = predictor
        .predict(&frame, false, &ExecutionMonitor::new())
        .unwrap();
    let lower = output.table.column_index("Lower bound (y)").unwrap();
    let upper = output.table.column_index("Upper bound (y)").unwrap();
    for i in 0..output.table.len() {
        let yhat = frame.value(i, 0).as_f64().unwrap();
        assert!(output.table.value(i, lower).as_f64().unwrap() <= yhat);
        assert!(output.table.value(i, upper).as_f64().unwrap() >= yhat);
    }
}

#[test]
fn test_regression_normalized_bounds() {
    let config = RegressionConfig::new("y", "yhat")
        .set_error_rate(0.4)
        .set_normalization(Some(NormalizationConfig::new("sigma")));

    // Difficulty 0.75 on every calibration row scales residuals by 1.0.
    let mut frame = Frame::new(vec![
        "y".to_string(),
        "yhat".to_string(),
        "sigma".to_string(),
    ])
    .unwrap();
    for (i, r) in [5.0, 4.0, 3.0, 2.0, 1.0].iter().enumerate() {
        frame.append_row(Row::new(
            format!("cal{}", i),
            vec![(*r).into(), 0.0.into(), 0.75.into()],
        ));
    }
    let calibration = AlphaCalibration::calibrate(&frame, &config, &ExecutionMonitor::new()).unwrap();
    let predictor = RegressionPredictor::new(calibration, config).unwrap();
    assert_eq!(predictor.alpha(), 3.0);

    // An easier test row halves the margin: 3 * (0.25 + 0.25) = 1.5.
    let mut test = Frame::new(vec!["yhat".to_string(), "sigma".to_string()]).unwrap();
    test.append_row(Row::new("t0", vec![10.0.into(), 0.25.into()]));
    let output = predictor
        .predict(&test, false, &ExecutionMonitor::new())
        .unwrap();
    let lower = output.table.column_index("Lower bound (y)").unwrap();
    let upper = output.table.column_index("Upper bound (y)").unwrap();
    assert_eq!(output.table.value(0, lower), &Value::Double(8.5));
    assert_eq!(output.table.value(0, upper), &Value::Double(11.5));
}

#[test]
fn test_regression_unsupported_error_rate() {
    let config = RegressionConfig::new("y", "yhat").set_error_rate(1.0);
    let calibration = regression_calibration(&[3.0, 2.0, 1.0], &config);
    assert!(matches!(
        RegressionPredictor::new(calibration, config),
        Err(ConformalError::IndexOutOfRange(3, 3))
    ));
}

#[test]
fn test_regression_parallel_matches_sequential() {
    let config = RegressionConfig::new("y", "yhat").set_error_rate(0.2);
    let calibration = regression_calibration(&[5.0, 4.0, 3.0, 2.0, 1.0], &config);
    let predictor = RegressionPredictor::new(calibration, config).unwrap();

    let mut frame = Frame::new(vec!["yhat".to_string()]).unwrap();
    for i in 0..500 {
        frame.append_row(Row::new(format!("t{}", i), vec![(i as f64).into()]));
    }
    let sequential = predictor
        .predict(&frame, false, &ExecutionMonitor::new())
        .unwrap();
    let parallel = predictor
        .predict(&frame, true, &ExecutionMonitor::new())
        .unwrap();
    assert_eq!(sequential.table, parallel.table);
}

#[test]
fn test_regression_empirical_coverage() {
    // Exchangeable residuals, error rate 0.1: empirical coverage over 1000
    // fresh records should sit near 0.9.
    let mut rng = StdRng::seed_from_u64(13);
    let error_rate = 0.1;

    let mut calibration_frame = Frame::new(vec!["y".to_string(), "yhat".to_string()]).unwrap();
    for i in 0..99 {
        let yhat = 10.0 * rng.gen::<f64>();
        let y = yhat + 2.0 * (rng.gen::<f64>() - 0.5);
        calibration_frame.append_row(Row::new(format!("cal{}", i), vec![y.into(), yhat.into()]));
    }
    let config = RegressionConfig::new("y", "yhat").set_error_rate(error_rate);
    let calibration =
        AlphaCalibration::calibrate(&calibration_frame, &config, &ExecutionMonitor::new()).unwrap();
    let predictor = RegressionPredictor::new(calibration, config).unwrap();

    let mut test_frame = Frame::new(vec!["yhat".to_string()]).unwrap();
    let mut targets = Vec::new();
    for i in 0..1000 {
        let yhat = 10.0 * rng.gen::<f64>();
        let y = yhat + 2.0 * (rng.gen::<f64>() - 0.5);
        targets.push(y);
        test_frame.append_row(Row::new(format!("t{}", i), vec![yhat.into()]));
    }
    let output = predictor
        .predict(&test_frame, false, &ExecutionMonitor::new())
        .unwrap();
    let lower = output.table.column_index("Lower bound (y)").unwrap();
    let upper = output.table.column_index("Upper bound (y)").unwrap();
    let covered = (0..output.table.len())
        .filter(|&i| {
            let y = targets[i];
            output.table.value(i, lower).as_f64().unwrap() <= y
                && y <= output.table.value(i, upper).as_f64().unwrap()
        })
        .count();
    let coverage = covered as f64 / targets.len() as f64;
    assert!(
        (0.85..0.95).contains(&coverage),
        "coverage {} too far from 0.9",
        coverage
    );
}
