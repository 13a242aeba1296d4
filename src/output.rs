//! Rendering of fitted models and tables into C headers and CSV files
//!
//! Generated headers carry no timestamp, so regenerating from the same inputs leaves them
//! byte-identical.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, info};

use crate::config::GeneratorConfig;
use crate::deviation::DeviationReport;
use crate::lut::{LutTable, RESISTANCE_MAX, RESISTANCE_MIN};
use crate::pipeline::Report;
use crate::steinhart::{ModelCoefficients, KELVIN_OFFSET};
use crate::Result;

/// Table values per line in generated arrays
const ARRAY_LINE_LENGTH: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Artifact {
    SteinhartHeader,
    LutHeader,
    LutCsv,
    DeviationCsv,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SteinhartHeader => "Steinhart-Hart header",
            Self::LutHeader => "LUT header",
            Self::LutCsv => "LUT CSV",
            Self::DeviationCsv => "deviation CSV",
        };
        f.write_str(name)
    }
}

/// Writes the artifacts for one calibrated thermistor
pub struct Emitter<'a> {
    config: &'a GeneratorConfig,
    base_name: String,
    input_name: String,
    metadata: &'a [(String, String)],
}

impl<'a> Emitter<'a> {
    pub fn new(
        config: &'a GeneratorConfig,
        base_name: &str,
        input_file: &Path,
        metadata: &'a [(String, String)],
    ) -> Self {
        let input_name = input_file
            .file_name()
            .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
        Self {
            config,
            base_name: c_identifier(base_name),
            input_name,
            metadata,
        }
    }

    /// Write every artifact for `report` into the configured output directory
    ///
    /// # Errors
    /// Returns an error if the output directory cannot be created or any file cannot be written.
    pub fn emit(&self, report: &Report) -> Result<BTreeMap<Artifact, PathBuf>> {
        let output_dir = &self.config.output_dir;
        ensure_output_dir(output_dir)?;

        let lower = self.base_name.to_lowercase();
        let mut files = BTreeMap::new();

        let path = output_dir.join(format!("{lower}_steinhart.h"));
        fs::write(&path, self.steinhart_header(&file_stem(&path), &report.coefficients)?)?;
        files.insert(Artifact::SteinhartHeader, path);

        if let Some(lut) = &report.lut {
            let path = output_dir.join(format!("{lower}_lut.h"));
            fs::write(&path, self.lut_header(&file_stem(&path), lut)?)?;
            files.insert(Artifact::LutHeader, path);

            let path = output_dir.join(format!("{}_LUT.csv", self.base_name));
            write_lut_csv(&path, lut)?;
            files.insert(Artifact::LutCsv, path);
        }

        let path = output_dir.join(format!("{}_Variance.csv", self.base_name));
        write_deviation_csv(&path, &report.deviation)?;
        files.insert(Artifact::DeviationCsv, path);

        for (artifact, path) in &files {
            debug!("wrote {artifact} to {path:?}");
        }
        info!("wrote {} files to {output_dir:?}", files.len());

        Ok(files)
    }

    fn banner(&self, out: &mut String, file_name: &str) -> fmt::Result {
        let config = self.config;
        let rule = "\t******************************************************************************";

        writeln!(out, "/**")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "\t* @file {file_name}.h")?;
        writeln!(out, "\t* Generated by thermistor-lut")?;
        writeln!(out, "\t*")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "\t* Thermistor CSV metadata")?;
        for (key, value) in self.metadata {
            writeln!(out, "\t*\t{key} - {value}")?;
        }
        writeln!(out, "\t*")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "\t* Configuration of generation")?;
        writeln!(out, "\t*\tInput File - {}", self.input_name)?;
        writeln!(out, "\t*\tLUT Size - {}", config.lut_size)?;
        writeln!(out, "\t*\tADC Resolution - {}", config.adc_resolution_bits)?;
        writeln!(out, "\t*\tReference voltage - {:.2}", config.reference_voltage)?;
        writeln!(out, "\t*\tSeries Resistor - {:.0}", config.series_resistance_kohm * 1000.)?;
        writeln!(out, "\t*\tParallel Resistor - {:.0}", config.parallel_resistance_kohm * 1000.)?;
        writeln!(out, "\t*\tFixed Point - {}dp", config.fixed_point)?;
        writeln!(out, "\t*\tUpper temperature limit - {:.1}", config.upper_temperature_limit)?;
        writeln!(out, "\t*\tLower temperature limit - {:.1}", config.lower_temperature_limit)?;
        writeln!(out, "\t*")?;
        writeln!(out, "{rule}")?;
        writeln!(out, "\t*/")?;
        writeln!(out)
    }

    /// C header evaluating the model at runtime from a raw ADC reading
    ///
    /// # Errors
    /// Only if formatting fails.
    pub fn steinhart_header(&self, name: &str, coefficients: &ModelCoefficients) -> Result<String> {
        let config = self.config;
        let upper = name.to_uppercase();
        let lower = name.to_lowercase();
        let use_parallel = config.parallel_resistance_kohm != 0.;
        let adc_type = match config.adc_resolution_bits {
            17.. => "uint32_t",
            9..=16 => "uint16_t",
            _ => "uint8_t",
        };

        let mut out = String::new();
        self.banner(&mut out, name)?;

        writeln!(out, "#ifndef {upper}_H")?;
        writeln!(out, "#define {upper}_H\n")?;
        writeln!(out, "#include \"stdint.h\"\n#include \"math.h\"\n")?;
        writeln!(out, "#define {upper}_USE_PARALLEL {}\n", u8::from(use_parallel))?;
        writeln!(out, "#define {upper}_COEFF_A {}f", c_exponent(coefficients.a, 6, 'e'))?;
        writeln!(out, "#define {upper}_COEFF_B {}f", c_exponent(coefficients.b, 6, 'e'))?;
        writeln!(out, "#define {upper}_COEFF_C {}f\n", c_exponent(coefficients.c, 6, 'e'))?;
        writeln!(out, "#define KELVIN_TO_CELSIUS {KELVIN_OFFSET}f\n")?;
        writeln!(out, "#define {upper}_VREF {:.6}f\n", config.reference_voltage)?;
        writeln!(out, "#define {upper}_ADC_RESOLUTION {}", config.adc_resolution_bits)?;
        writeln!(out, "#define {upper}_ADC_MAX ((1UL << {upper}_ADC_RESOLUTION) - 1)\n")?;
        writeln!(out, "#define {upper}_RSERIES {:.6}f", config.series_resistance_kohm * 1000.)?;
        if use_parallel {
            writeln!(
                out,
                "#define {upper}_RPARALLEL {:.6}f",
                config.parallel_resistance_kohm * 1000.
            )?;
        }
        writeln!(out)?;
        writeln!(out, "#define {upper}_RMAX {}f", c_exponent(RESISTANCE_MAX, 3, 'E'))?;
        writeln!(out, "#define {upper}_RMIN {}f\n", c_exponent(RESISTANCE_MIN, 3, 'E'))?;

        writeln!(
            out,
            "__attribute__((always_inline)) static inline float {lower}_get_resistance({adc_type} adcValue)"
        )?;
        writeln!(out, "{{\n\tfloat r, v;\n")?;
        writeln!(out, "\tif(adcValue == 0)\n\t\treturn {upper}_RMIN;")?;
        writeln!(out, "\tif(adcValue >= {upper}_ADC_MAX)\n\t\treturn {upper}_RMAX;\n")?;
        writeln!(out, "\tv = {upper}_VREF * (float) adcValue / ((float) {upper}_ADC_MAX + 1.0f);")?;
        writeln!(out, "\tr = {upper}_RSERIES * v / ({upper}_VREF - v);\n")?;
        writeln!(out, "#if {upper}_USE_PARALLEL")?;
        writeln!(out, "\tif(r >= {upper}_RPARALLEL)\n\t\treturn {upper}_RMAX;")?;
        writeln!(out, "\tr = 1.0f / ((1.0f / r) - (1.0f / {upper}_RPARALLEL));")?;
        writeln!(out, "#endif\n")?;
        writeln!(out, "\treturn r;\n}}\n")?;

        writeln!(
            out,
            "__attribute__((always_inline)) static inline float {lower}_get_temp({adc_type} adcValue)"
        )?;
        writeln!(out, "{{")?;
        writeln!(out, "\tfloat lnR = logf({lower}_get_resistance(adcValue));")?;
        writeln!(
            out,
            "\treturn 1.0f / ({upper}_COEFF_A + {upper}_COEFF_B * lnR + {upper}_COEFF_C * lnR * lnR * lnR) - KELVIN_TO_CELSIUS;"
        )?;
        writeln!(out, "}}\n")?;
        write!(out, "#endif")?;

        Ok(out)
    }

    /// C header holding the table as float and fixed point integer arrays
    ///
    /// # Errors
    /// Only if formatting fails.
    pub fn lut_header(&self, name: &str, lut: &LutTable) -> Result<String> {
        let config = self.config;
        let upper = name.to_uppercase();
        let size_bits = lut.len().trailing_zeros();
        let scale = 10_f64.powi(i32::try_from(config.fixed_point)?);
        #[allow(clippy::cast_possible_truncation)]
        let scaled = lut
            .temperatures
            .iter()
            .map(|temperature| (temperature * scale).round() as i64)
            .collect::<Vec<_>>();
        let int_type = integer_type(&scaled);

        let mut out = String::new();
        self.banner(&mut out, name)?;

        writeln!(out, "#ifndef {upper}_H")?;
        writeln!(out, "#define {upper}_H\n")?;
        writeln!(out, "#include \"stdint.h\"\n")?;
        writeln!(out, "#define {upper}_USE_FLOAT 1")?;
        writeln!(out, "#define {upper}_USE_INT 0\n")?;
        writeln!(out, "#define {upper}_SIZE {}U", lut.len())?;
        writeln!(out, "#define {upper}_SIZE_BITS {size_bits}U")?;
        writeln!(out, "#define {upper}_ADC_RESOLUTION {}U", config.adc_resolution_bits)?;
        writeln!(out, "#define {upper}_INDEX_SHIFT {}U", lut.index_shift)?;
        writeln!(out, "#define {upper}_FIXED_POINT {}U\n\n", config.fixed_point)?;

        writeln!(out, "#if {upper}_USE_FLOAT\n")?;
        write!(out, "static const float {name}_float[{upper}_SIZE] = {{")?;
        write_array(&mut out, lut.temperatures.iter().map(|t| format!("{t:.2}f")))?;
        writeln!(
            out,
            "__attribute__((always_inline)) static inline float {name}_get_temp_float(uint32_t adcValue)"
        )?;
        writeln!(
            out,
            "{{\n\tuint32_t index = adcValue >> {upper}_INDEX_SHIFT;\n\treturn {name}_float[index];\n}}\n"
        )?;
        writeln!(out, "#endif\n")?;

        writeln!(out, "#if {upper}_USE_INT\n")?;
        write!(out, "static const {int_type} {name}_int[{upper}_SIZE] = {{")?;
        write_array(&mut out, scaled.iter().map(ToString::to_string))?;
        writeln!(
            out,
            "__attribute__((always_inline)) static inline {int_type} {name}_get_temp_int(uint32_t adcValue)"
        )?;
        writeln!(
            out,
            "{{\n\tuint32_t index = adcValue >> {upper}_INDEX_SHIFT;\n\treturn {name}_int[index];\n}}\n"
        )?;
        writeln!(out, "#endif\n")?;
        write!(out, "#endif")?;

        Ok(out)
    }
}

/// Creates `path` if missing, refusing anything that is not a directory
///
/// # Errors
/// Returns an error if `path` exists but is not a directory, or cannot be created.
pub fn ensure_output_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(format!("output path exists but is not a directory: {path:?}").into());
        }
        return Ok(());
    }
    fs::create_dir_all(path)?;
    Ok(())
}

fn write_lut_csv(path: &Path, lut: &LutTable) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["Resistance (Ω)", "Table Temp (°C)", "ADC Value"])?;
    for entry in lut.entries() {
        wtr.write_record([
            format!("{:.3}", entry.resistance),
            format!("{:.3}", entry.temperature),
            entry.adc_code.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_deviation_csv(path: &Path, deviation: &DeviationReport) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "Resistance (Ω)",
        "Table Temp (°C)",
        "Fitted Temp (°C)",
        "Deviation (K)",
    ])?;
    for row in &deviation.rows {
        wtr.write_record([
            format!("{:.3}", row.resistance),
            format!("{:.3}", row.temperature_reference),
            format!("{:.3}", row.temperature_model),
            format!("{:.3}", row.deviation),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes `values` as the body of a C array initialiser, closing the brace
fn write_array(out: &mut String, values: impl Iterator<Item = String>) -> fmt::Result {
    for chunk in &values.chunks(ARRAY_LINE_LENGTH) {
        write!(out, "\n\t{}", chunk.format(", "))?;
        out.push(',');
    }
    // Drop the trailing comma of the last line
    out.pop();
    writeln!(out, " }};\n")
}

/// Smallest signed C type holding every value
fn integer_type(values: &[i64]) -> &'static str {
    let fits = |min: i64, max: i64| values.iter().all(|value| (min..=max).contains(value));
    if fits(i8::MIN.into(), i8::MAX.into()) {
        "int8_t"
    } else if fits(i16::MIN.into(), i16::MAX.into()) {
        "int16_t"
    } else {
        "int32_t"
    }
}

/// Formats like C's `%.<precision>e`, with a sign and at least two exponent digits
fn c_exponent(value: f64, precision: usize, marker: char) -> String {
    let formatted = format!("{value:.precision$e}");
    let Some((mantissa, exponent)) = formatted.split_once('e') else {
        return formatted;
    };
    let (sign, digits) = exponent
        .strip_prefix('-')
        .map_or(('+', exponent), |digits| ('-', digits));
    format!("{mantissa}{marker}{sign}{digits:0>2}")
}

/// Replaces anything that cannot appear in a C identifier with an underscore
fn c_identifier(name: &str) -> String {
    let identifier: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if identifier.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{identifier}")
    } else {
        identifier
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{c_exponent, c_identifier, integer_type, Emitter};
    use crate::config::GeneratorConfig;
    use crate::lut::{synthesize, LutGeometry};
    use crate::steinhart::ModelCoefficients;

    const COEFFICIENTS: ModelCoefficients = ModelCoefficients {
        a: 8.574_782e-4,
        b: 2.568_106e-4,
        c: 1.688_598e-7,
    };

    fn metadata() -> Vec<(String, String)> {
        vec![("Name".to_owned(), "NCP18XH".to_owned())]
    }

    #[test]
    fn exponents_are_formatted_like_c() {
        assert_eq!(c_exponent(8.574_782e-4, 6, 'e'), "8.574782e-04");
        assert_eq!(c_exponent(1e9, 3, 'E'), "1.000E+09");
        assert_eq!(c_exponent(0.1, 3, 'E'), "1.000E-01");
        assert_eq!(c_exponent(-2.5e-120, 1, 'e'), "-2.5e-120");
    }

    #[test]
    fn identifiers_are_sanitised() {
        assert_eq!(c_identifier("NCP18XH"), "NCP18XH");
        assert_eq!(c_identifier("10k ntc-3380"), "_10k_ntc_3380");
    }

    #[test]
    fn integer_tables_use_the_narrowest_type() {
        assert_eq!(integer_type(&[125, -40]), "int8_t");
        assert_eq!(integer_type(&[1250, -400]), "int16_t");
        assert_eq!(integer_type(&[125_000, -40_000]), "int32_t");
    }

    #[test]
    fn steinhart_header_defines_model_and_circuit() {
        let config = GeneratorConfig {
            parallel_resistance_kohm: 100.,
            ..GeneratorConfig::default()
        };
        let metadata = metadata();
        let emitter = Emitter::new(&config, "NCP18XH", Path::new("data/ncp18.csv"), &metadata);

        let header = emitter
            .steinhart_header("ncp18xh_steinhart", &COEFFICIENTS)
            .unwrap();

        assert!(header.contains("\t*\tName - NCP18XH"));
        assert!(header.contains("\t*\tInput File - ncp18.csv"));
        assert!(header.contains("#ifndef NCP18XH_STEINHART_H"));
        assert!(header.contains("#define NCP18XH_STEINHART_USE_PARALLEL 1"));
        assert!(header.contains("#define NCP18XH_STEINHART_COEFF_A 8.574782e-04f"));
        assert!(header.contains("#define NCP18XH_STEINHART_RPARALLEL 100000.000000f"));
        assert!(header.contains("#define NCP18XH_STEINHART_RMAX 1.000E+09f"));
        assert!(header.contains("static inline float ncp18xh_steinhart_get_temp(uint16_t adcValue)"));
        assert!(header.ends_with("#endif"));
    }

    #[test]
    fn steinhart_header_omits_absent_parallel_resistor() {
        let config = GeneratorConfig {
            adc_resolution_bits: 8,
            ..GeneratorConfig::default()
        };
        let metadata = metadata();
        let emitter = Emitter::new(&config, "NCP18XH", Path::new("ncp18.csv"), &metadata);

        let header = emitter
            .steinhart_header("ncp18xh_steinhart", &COEFFICIENTS)
            .unwrap();

        assert!(header.contains("USE_PARALLEL 0"));
        assert!(!header.contains("#define NCP18XH_STEINHART_RPARALLEL"));
        assert!(header.contains("get_resistance(uint8_t adcValue)"));
    }

    #[test]
    fn lut_header_holds_every_entry() {
        let config = GeneratorConfig {
            lut_size: 32,
            fixed_point: 1,
            ..GeneratorConfig::default()
        };
        let geometry: LutGeometry = config.geometry().unwrap().unwrap();
        let lut = synthesize(&COEFFICIENTS, &geometry).unwrap();
        let metadata = metadata();
        let emitter = Emitter::new(&config, "NCP18XH", Path::new("ncp18.csv"), &metadata);

        let header = emitter.lut_header("ncp18xh_lut", &lut).unwrap();

        assert!(header.contains("#define NCP18XH_LUT_SIZE 32U"));
        assert!(header.contains("#define NCP18XH_LUT_SIZE_BITS 5U"));
        // 12 bit readings, 32 entries
        assert!(header.contains("#define NCP18XH_LUT_INDEX_SHIFT 7U"));
        assert!(header.contains("uint32_t index = adcValue >> NCP18XH_LUT_INDEX_SHIFT;"));
        assert!(header.contains("static const float ncp18xh_lut_float[NCP18XH_LUT_SIZE] = {\n\t125.00f, "));
        assert!(header.contains(", -40.00f };"));
        // Scaled by ten, 1250 needs 16 bits
        assert!(header.contains("static const int16_t ncp18xh_lut_int[NCP18XH_LUT_SIZE] = {\n\t1250, "));
        assert!(header.contains(", -400 };"));
        let start = header.find("ncp18xh_lut_float[NCP18XH_LUT_SIZE] = {").unwrap();
        let body = &header[start..];
        let body = &body[..body.find("};").unwrap()];
        assert_eq!(body.matches('\n').count(), 2);
        assert_eq!(body.matches("f,").count() + 1, 32);
    }
}
