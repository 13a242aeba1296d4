use serde::Serialize;

use crate::calibration::CalibrationPoint;
use crate::steinhart::{evaluate_temperature, ModelCoefficients};

/// Comparison of a calibration point with the fitted model
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DeviationRow {
    pub resistance: f64,
    pub temperature_reference: f64,
    pub temperature_model: f64,
    /// Reference minus model, in Kelvin
    pub deviation: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviationReport {
    pub rows: Vec<DeviationRow>,
    pub max_abs_deviation: f64,
    pub avg_abs_deviation: f64,
}

/// Evaluate the model at every calibration point
///
/// # Panics
/// If `points` is empty, as the mean deviation is undefined. Fitting already requires at least
/// three points.
#[allow(clippy::cast_precision_loss)]
pub fn analyze(points: &[CalibrationPoint], coefficients: &ModelCoefficients) -> DeviationReport {
    assert!(
        !points.is_empty(),
        "deviation analysis needs at least one calibration point"
    );

    let rows = points
        .iter()
        .map(|point| {
            let temperature_model = evaluate_temperature(point.resistance, coefficients);
            DeviationRow {
                resistance: point.resistance,
                temperature_reference: point.temperature,
                temperature_model,
                deviation: point.temperature - temperature_model,
            }
        })
        .collect::<Vec<_>>();

    let (max_abs_deviation, sum_abs_deviation) =
        rows.iter().fold((0.0_f64, 0.0_f64), |(max, sum), row| {
            (max.max(row.deviation.abs()), sum + row.deviation.abs())
        });

    DeviationReport {
        max_abs_deviation,
        avg_abs_deviation: sum_abs_deviation / rows.len() as f64,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::analyze;
    use crate::calibration::CalibrationPoint;
    use crate::steinhart::{fit, ModelCoefficients};

    fn scenario_points() -> Vec<CalibrationPoint> {
        vec![
            CalibrationPoint::new(0., 27219.),
            CalibrationPoint::new(25., 10000.),
            CalibrationPoint::new(50., 4161.),
        ]
    }

    #[test]
    fn consistent_data_has_no_deviation() {
        let points = scenario_points();
        let coefficients = fit(&points).unwrap();

        let report = analyze(&points, &coefficients);

        assert_eq!(report.rows.len(), 3);
        approx::assert_abs_diff_eq!(report.max_abs_deviation, 0., epsilon = 0.01);
        approx::assert_abs_diff_eq!(report.avg_abs_deviation, 0., epsilon = 0.01);
    }

    #[test]
    fn deviation_is_reference_minus_model() {
        let points = scenario_points();
        let coefficients = fit(&points).unwrap();
        let shifted = points
            .iter()
            .map(|point| CalibrationPoint::new(point.temperature + 0.5, point.resistance))
            .collect::<Vec<_>>();

        let report = analyze(&shifted, &coefficients);

        for (row, point) in report.rows.iter().zip(&shifted) {
            approx::assert_relative_eq!(row.resistance, point.resistance);
            approx::assert_relative_eq!(row.temperature_reference, point.temperature);
            approx::assert_abs_diff_eq!(row.deviation, 0.5, epsilon = 1e-6);
        }
        approx::assert_abs_diff_eq!(report.max_abs_deviation, 0.5, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(report.avg_abs_deviation, 0.5, epsilon = 1e-6);
    }

    #[test]
    fn aggregates_use_absolute_deviation() {
        let coefficients = ModelCoefficients::new(298.15_f64.recip(), 0., 0.);
        let points = vec![
            CalibrationPoint::new(26., 1000.),
            CalibrationPoint::new(23., 2000.),
        ];

        let report = analyze(&points, &coefficients);

        approx::assert_abs_diff_eq!(report.rows[0].deviation, 1., epsilon = 1e-9);
        approx::assert_abs_diff_eq!(report.rows[1].deviation, -2., epsilon = 1e-9);
        approx::assert_abs_diff_eq!(report.max_abs_deviation, 2., epsilon = 1e-9);
        approx::assert_abs_diff_eq!(report.avg_abs_deviation, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn analysis_is_deterministic() {
        let points = scenario_points();
        let coefficients = fit(&points).unwrap();

        assert_eq!(
            analyze(&points, &coefficients),
            analyze(&points, &coefficients)
        );
    }
}
