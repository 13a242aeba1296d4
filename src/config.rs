use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ModelError;
use crate::lut::LutGeometry;
use crate::Result;

/// Generated runtime code reads the ADC into a `uint32_t`
pub const MAX_ADC_RESOLUTION_BITS: u32 = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("ADC resolution must be between 1 and {max} bits, found {0}", max = MAX_ADC_RESOLUTION_BITS)]
    AdcResolution(u32),

    #[error("{name} must be {requirement}, found {value}")]
    OutOfRange {
        name: &'static str,
        requirement: &'static str,
        value: f64,
    },

    #[error("lower temperature limit {lower} is above the upper limit {upper}")]
    CrossedLimits { lower: f64, upper: f64 },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Options controlling a generator run
///
/// Circuit resistances are given in kilo-Ohm, as printed on schematics. A `lut_size` of zero
/// skips table generation and only the closed-form model is emitted.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub output_dir: PathBuf,
    pub base_name: Option<String>,
    pub lut_size: usize,
    pub adc_resolution_bits: u32,
    pub reference_voltage: f64,
    pub series_resistance_kohm: f64,
    pub parallel_resistance_kohm: f64,
    pub upper_temperature_limit: f64,
    pub lower_temperature_limit: f64,
    /// Decimal places kept in the integer table, which stores `temperature * 10^fixed_point`
    pub fixed_point: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            base_name: None,
            lut_size: 0,
            adc_resolution_bits: 12,
            reference_voltage: 3.3,
            series_resistance_kohm: 10.,
            parallel_resistance_kohm: 0.,
            upper_temperature_limit: 125.,
            lower_temperature_limit: -40.,
            fixed_point: 0,
        }
    }
}

impl GeneratorConfig {
    /// Read a configuration from a TOML file, missing keys take their default value
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// The table geometry in Ohm, or `None` when no table was requested
    ///
    /// # Errors
    /// - [`ConfigError::AdcResolution`] for an ADC wider than the generated code can read
    /// - [`ConfigError::Model`] if the table size fails [`LutGeometry::validate`]
    /// - [`ConfigError::OutOfRange`] or [`ConfigError::CrossedLimits`] for unphysical circuit
    ///   values or limits
    pub fn geometry(&self) -> std::result::Result<Option<LutGeometry>, ConfigError> {
        if self.lut_size == 0 {
            return Ok(None);
        }
        if !(1..=MAX_ADC_RESOLUTION_BITS).contains(&self.adc_resolution_bits) {
            return Err(ConfigError::AdcResolution(self.adc_resolution_bits));
        }
        let geometry = LutGeometry {
            lut_size: self.lut_size,
            adc_resolution_bits: self.adc_resolution_bits,
            reference_voltage: self.reference_voltage,
            series_resistance: self.series_resistance_kohm * 1000.,
            parallel_resistance: self.parallel_resistance_kohm * 1000.,
            upper_temperature_limit: self.upper_temperature_limit,
            lower_temperature_limit: self.lower_temperature_limit,
        };
        geometry.validate()?;

        check_range("reference voltage", "positive", self.reference_voltage, |v| v > 0.)?;
        check_range("series resistance", "positive", self.series_resistance_kohm, |r| r > 0.)?;
        check_range(
            "parallel resistance",
            "zero or positive",
            self.parallel_resistance_kohm,
            |r| r >= 0.,
        )?;
        if !(self.lower_temperature_limit <= self.upper_temperature_limit) {
            return Err(ConfigError::CrossedLimits {
                lower: self.lower_temperature_limit,
                upper: self.upper_temperature_limit,
            });
        }

        Ok(Some(geometry))
    }
}

fn check_range(
    name: &'static str,
    requirement: &'static str,
    value: f64,
    accept: impl Fn(f64) -> bool,
) -> std::result::Result<(), ConfigError> {
    if value.is_finite() && accept(value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            requirement,
            value,
        })
    }
}
