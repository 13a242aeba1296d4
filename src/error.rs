//! Failures of the numeric pipeline
//!
//! Every fitting, analysis and synthesis step either returns its result or exactly one of
//! these variants. None of them are transient, so callers report them and stop.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("not enough calibration points to fit the model: found {found}, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("least squares system is rank deficient at column {column} (|r_ii| / max |r_jj| = {ratio:e}); check for duplicate or degenerate resistance values")]
    SingularSystem { column: usize, ratio: f64 },

    #[error("LUT size {lut_size} must be a power of two between 2 and the ADC range of {adc_codes} codes")]
    LutSizeExceedsAdcRange { lut_size: usize, adc_codes: u64 },
}
