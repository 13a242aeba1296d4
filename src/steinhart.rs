//! The Steinhart-Hart model of an NTC thermistor
//!
//! The model relates the natural logarithm of the thermistor resistance to the inverse of the
//! absolute temperature
//! $$
//!     \frac{1}{T} = a + b \ln R + c \left(\ln R\right)^3
//! $$
//! which is linear in the coefficients, so they can be found from calibration data by linear
//! least squares.

use log::debug;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationPoint;
use crate::error::ModelError;
use crate::math::{power_basis, LinearSolver, QrSolver};

/// Offset between the Celsius and Kelvin scales
pub const KELVIN_OFFSET: f64 = 273.15;

/// The model has three free coefficients, so needs at least three points
pub const MIN_POINTS: usize = 3;

/// Powers of `ln(R)` appearing in the model
const BASIS_POWERS: [i32; 3] = [0, 1, 3];

/// Fitted coefficients `(a, b, c)` of the Steinhart-Hart equation
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct ModelCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ModelCoefficients {
    pub const fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    /// Temperature in degrees Celsius of a thermistor with `resistance` in Ohm
    pub fn temperature(&self, resistance: f64) -> f64 {
        evaluate_temperature(resistance, self)
    }
}

/// Evaluate the model at `resistance` (Ohm, positive), returning degrees Celsius
///
/// # Examples
///
/// ```
/// use thermistor_lut::steinhart::{evaluate_temperature, ModelCoefficients};
///
/// let coefficients = ModelCoefficients::new(9.0327e-4, 2.4877e-4, 2.0411e-7);
/// let temperature = evaluate_temperature(10_000., &coefficients);
/// assert!((temperature - 25.).abs() < 0.1);
/// ```
pub fn evaluate_temperature(resistance: f64, coefficients: &ModelCoefficients) -> f64 {
    let ln_r = resistance.ln();
    let inverse_kelvin = coefficients
        .c
        .mul_add(ln_r.powi(3), coefficients.b.mul_add(ln_r, coefficients.a));
    inverse_kelvin.recip() - KELVIN_OFFSET
}

/// Fit the model coefficients to `points` with the default QR least squares solver
///
/// # Errors
/// - [`ModelError::InsufficientData`] if fewer than [`MIN_POINTS`] points are supplied
/// - [`ModelError::SingularSystem`] if the resistances cannot determine all three coefficients,
///   for example when they are duplicated
pub fn fit(points: &[CalibrationPoint]) -> Result<ModelCoefficients, ModelError> {
    fit_with(points, &QrSolver::default())
}

/// Fit the model coefficients to `points` using `solver` for the least squares step
///
/// # Errors
/// As [`fit`]
pub fn fit_with<S: LinearSolver>(
    points: &[CalibrationPoint],
    solver: &S,
) -> Result<ModelCoefficients, ModelError> {
    if points.len() < MIN_POINTS {
        return Err(ModelError::InsufficientData {
            found: points.len(),
            required: MIN_POINTS,
        });
    }

    let ln_resistance = points
        .iter()
        .map(|point| point.resistance.ln())
        .collect::<Vec<_>>();
    let design = power_basis(&ln_resistance, &BASIS_POWERS);
    let target = points
        .iter()
        .map(|point| (point.temperature + KELVIN_OFFSET).recip())
        .collect::<Array1<f64>>();

    let solution = solver.factorize_and_solve(&design, &target)?;
    let coefficients = ModelCoefficients::new(solution[0], solution[1], solution[2]);
    debug!(
        "fitted {} points: a = {:e}, b = {:e}, c = {:e}",
        points.len(),
        coefficients.a,
        coefficients.b,
        coefficients.c
    );

    Ok(coefficients)
}
