use log::info;

use crate::calibration::CalibrationPoint;
use crate::deviation::{analyze, DeviationReport};
use crate::error::ModelError;
use crate::lut::{synthesize, LutGeometry, LutTable};
use crate::steinhart::{fit, ModelCoefficients};

/// Everything derived from one set of calibration points
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub coefficients: ModelCoefficients,
    pub deviation: DeviationReport,
    /// Only present when a table geometry was supplied
    pub lut: Option<LutTable>,
}

/// Fit the model, check it against the calibration points and optionally build a table
///
/// # Errors
/// The first failure of [`fit`] or [`synthesize`]; no partial report is returned.
pub fn run(
    points: &[CalibrationPoint],
    geometry: Option<&LutGeometry>,
) -> Result<Report, ModelError> {
    let coefficients = fit(points)?;
    info!(
        "Steinhart-Hart coefficients: a = {:.3e}, b = {:.3e}, c = {:.3e}",
        coefficients.a, coefficients.b, coefficients.c
    );

    let deviation = analyze(points, &coefficients);
    info!(
        "deviation from calibration data: max {:.3} K, mean {:.3} K",
        deviation.max_abs_deviation, deviation.avg_abs_deviation
    );

    let lut = geometry
        .map(|geometry| synthesize(&coefficients, geometry))
        .transpose()?;

    Ok(Report {
        coefficients,
        deviation,
        lut,
    })
}
