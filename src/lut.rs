//! Lookup tables mapping ADC codes to thermistor temperature
//!
//! The thermistor forms the lower leg of a voltage divider fed from the ADC reference through a
//! series resistor, optionally shunted by a fixed parallel resistor:
//!
//! ```text
//!     Vref
//!      |
//!   [Rseries]
//!      |
//!      +--------------+------ Vadc
//!      |              |
//! [Thermistor]   [Rparallel] (optional)
//!      |              |
//!      +--------------+
//!      |
//!     GND
//! ```
//!
//! A table of `lut_size` entries samples every `2^bits / lut_size`th code, so a reader can index
//! it by shifting the raw ADC code right.

use itertools::izip;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::steinhart::{evaluate_temperature, ModelCoefficients, KELVIN_OFFSET};

/// Resistance assigned to a saturated (open circuit) divider reading
pub const RESISTANCE_MAX: f64 = 1e9;
/// Smallest resistance reported by generated runtime code, avoiding `ln(0)`
pub const RESISTANCE_MIN: f64 = 0.1;

/// The ADC and divider circuit a table is generated for
///
/// Resistances are in Ohm, voltages in Volt and temperatures in degrees Celsius. A
/// `parallel_resistance` of zero means no parallel resistor is fitted.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LutGeometry {
    pub lut_size: usize,
    pub adc_resolution_bits: u32,
    pub reference_voltage: f64,
    pub series_resistance: f64,
    pub parallel_resistance: f64,
    pub upper_temperature_limit: f64,
    pub lower_temperature_limit: f64,
}

impl LutGeometry {
    /// Number of distinct ADC codes, `2^bits`, saturating at `u64::MAX` for 64 bits or more
    pub const fn adc_codes(&self) -> u64 {
        match 1_u64.checked_shl(self.adc_resolution_bits) {
            Some(codes) => codes,
            None => u64::MAX,
        }
    }

    /// Largest ADC code, `2^bits - 1`
    pub const fn adc_max(&self) -> u64 {
        self.adc_codes().saturating_sub(1)
    }

    pub fn has_parallel_resistor(&self) -> bool {
        self.parallel_resistance != 0.
    }

    /// Check the table can be indexed by shifting a raw ADC code
    ///
    /// The size must be a power of two of at least two and no larger than the number of ADC
    /// codes. Circuit values are not checked here, see [`crate::config::GeneratorConfig::geometry`].
    ///
    /// # Errors
    /// Returns [`ModelError::LutSizeExceedsAdcRange`] for any other size.
    pub fn validate(&self) -> Result<(), ModelError> {
        let adc_codes = self.adc_codes();
        if self.lut_size < 2 || !self.lut_size.is_power_of_two() || self.lut_size as u64 > adc_codes
        {
            return Err(ModelError::LutSizeExceedsAdcRange {
                lut_size: self.lut_size,
                adc_codes,
            });
        }
        Ok(())
    }
}

/// Recover the thermistor resistance from an ADC reading
///
/// The series leg is inverted first, giving the resistance of the lower leg, then the parallel
/// resistor (if any) is removed. Readings at the rails map to `0` and [`RESISTANCE_MAX`], as
/// does any reading implying a lower leg at least as large as the parallel resistor.
#[allow(clippy::cast_precision_loss)]
pub fn resistance_from_adc(adc_code: u64, geometry: &LutGeometry) -> f64 {
    if adc_code == 0 {
        return 0.;
    }
    if adc_code >= geometry.adc_max() {
        return RESISTANCE_MAX;
    }

    let v_ref = geometry.reference_voltage;
    let v_adc = v_ref * adc_code as f64 / geometry.adc_codes() as f64;
    let lower_leg = geometry.series_resistance * v_adc / (v_ref - v_adc);

    if !geometry.has_parallel_resistor() {
        return lower_leg.min(RESISTANCE_MAX);
    }
    if lower_leg >= geometry.parallel_resistance {
        return RESISTANCE_MAX;
    }
    (lower_leg.recip() - geometry.parallel_resistance.recip())
        .recip()
        .min(RESISTANCE_MAX)
}

/// Three parallel columns describing each table entry
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LutTable {
    pub adc_codes: Vec<u64>,
    pub resistances: Vec<f64>,
    pub temperatures: Vec<f64>,
    /// Right shift taking a raw ADC code to its table index
    pub index_shift: u32,
}

/// A single row of a [`LutTable`]
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LutEntry {
    pub adc_code: u64,
    pub resistance: f64,
    pub temperature: f64,
}

impl LutTable {
    pub fn len(&self) -> usize {
        self.adc_codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adc_codes.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = LutEntry> + '_ {
        izip!(&self.adc_codes, &self.resistances, &self.temperatures).map(
            |(&adc_code, &resistance, &temperature)| LutEntry {
                adc_code,
                resistance,
                temperature,
            },
        )
    }
}

/// Model temperature clamped to the table limits
///
/// Below the model's low resistance pole `1/T` goes negative; those readings are past the hot
/// end of any physical range so take the upper limit.
fn table_temperature(
    resistance: f64,
    coefficients: &ModelCoefficients,
    geometry: &LutGeometry,
) -> f64 {
    let temperature = evaluate_temperature(resistance, coefficients);
    if !(temperature > -KELVIN_OFFSET) {
        return geometry.upper_temperature_limit;
    }
    // Not `f64::clamp`, which panics on crossed limits
    temperature
        .max(geometry.lower_temperature_limit)
        .min(geometry.upper_temperature_limit)
}

/// Build the lookup table for `geometry` from the fitted model
///
/// The first entry (ADC code `0`, a shorted thermistor) is pinned to the upper temperature limit
/// and the last entry (an open circuit) to the lower limit. Every other entry is the model
/// temperature at the divider resistance for its ADC code, clamped to the limits.
///
/// # Errors
/// Returns [`ModelError::LutSizeExceedsAdcRange`] if the size fails [`LutGeometry::validate`].
pub fn synthesize(
    coefficients: &ModelCoefficients,
    geometry: &LutGeometry,
) -> Result<LutTable, ModelError> {
    geometry.validate()?;

    let lut_size = geometry.lut_size;
    // Exact as both are powers of two, below 64 bits
    let step = geometry.adc_codes() / lut_size as u64;
    let last = lut_size - 1;

    let mut adc_codes = Vec::with_capacity(lut_size);
    let mut resistances = Vec::with_capacity(lut_size);
    let mut temperatures = Vec::with_capacity(lut_size);

    for index in 0..lut_size {
        let code = index as u64 * step;
        let (resistance, temperature) = match index {
            0 => (0., geometry.upper_temperature_limit),
            ii if ii == last => (RESISTANCE_MAX, geometry.lower_temperature_limit),
            _ => {
                let resistance = resistance_from_adc(code, geometry);
                (resistance, table_temperature(resistance, coefficients, geometry))
            }
        };
        adc_codes.push(code);
        resistances.push(resistance);
        temperatures.push(temperature);
    }

    let index_shift = geometry
        .adc_resolution_bits
        .saturating_sub(lut_size.trailing_zeros());
    debug!(
        "synthesized {lut_size} entry table, step {step} codes, index shift {index_shift}"
    );

    Ok(LutTable {
        adc_codes,
        resistances,
        temperatures,
        index_shift,
    })
}
