//! thermistor-lut: fit NTC calibration data and generate C lookup tables.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use thermistor_lut::calibration::CalibrationData;
use thermistor_lut::config::GeneratorConfig;
use thermistor_lut::output::Emitter;
use thermistor_lut::{pipeline, Result};

const SCHEMATIC: &str = "\
Voltage divider (series resistor from Vref, thermistor with optional parallel resistor to GND):

    Vref
     |
  [Rseries]
     |
     +--------------+------ Vadc
     |              |
[Thermistor]   [Rparallel] (optional)
     |              |
     +--------------+
     |
    GND";

#[derive(Parser, Debug)]
#[command(name = "thermistor-lut")]
#[command(about = "Fit Steinhart-Hart coefficients to NTC calibration data and generate C lookup tables")]
#[command(version, after_help = SCHEMATIC)]
struct Cli {
    /// Calibration CSV with a Temperature,Resistance table
    #[arg(short, long)]
    input: PathBuf,

    /// TOML file with generator options, overridden by any flags given
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Base name for generated files, defaults to the Name/Model metadata
    #[arg(short, long)]
    name: Option<String>,

    /// LUT size (power of two), or 0 for the Steinhart-Hart header only
    #[arg(long)]
    lut: Option<usize>,

    /// ADC resolution in bits
    #[arg(short, long)]
    adc_bits: Option<u32>,

    /// ADC reference voltage (V)
    #[arg(short, long)]
    vref: Option<f64>,

    /// Series resistance (kOhm)
    #[arg(long)]
    rs: Option<f64>,

    /// Parallel resistance (kOhm), 0 for none
    #[arg(long)]
    rp: Option<f64>,

    /// Upper temperature limit (C)
    #[arg(long, allow_negative_numbers = true)]
    upper: Option<f64>,

    /// Lower temperature limit (C)
    #[arg(long, allow_negative_numbers = true)]
    lower: Option<f64>,

    /// Decimal places kept in the integer LUT
    #[arg(long)]
    fixed_point: Option<u32>,
}

impl Cli {
    fn generator_config(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.config {
            Some(path) => GeneratorConfig::from_file(path)?,
            None => GeneratorConfig::default(),
        };

        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(name) = &self.name {
            config.base_name = Some(name.clone());
        }
        if let Some(lut) = self.lut {
            config.lut_size = lut;
        }
        if let Some(bits) = self.adc_bits {
            config.adc_resolution_bits = bits;
        }
        if let Some(vref) = self.vref {
            config.reference_voltage = vref;
        }
        if let Some(rs) = self.rs {
            config.series_resistance_kohm = rs;
        }
        if let Some(rp) = self.rp {
            config.parallel_resistance_kohm = rp;
        }
        if let Some(upper) = self.upper {
            config.upper_temperature_limit = upper;
        }
        if let Some(lower) = self.lower {
            config.lower_temperature_limit = lower;
        }
        if let Some(fixed_point) = self.fixed_point {
            config.fixed_point = fixed_point;
        }

        Ok(config)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.generator_config()?;
    // Reject a bad geometry before doing any work
    let geometry = config.geometry()?;
    info!(
        "LUT size {}, {} bit ADC, Vref {:.2} V, Rseries {:.2}k, Rparallel {:.2}k",
        config.lut_size,
        config.adc_resolution_bits,
        config.reference_voltage,
        config.series_resistance_kohm,
        config.parallel_resistance_kohm
    );

    let data = CalibrationData::from_file(&cli.input)?;
    for (key, value) in &data.metadata {
        info!("metadata: {key} - {value}");
    }
    for warning in data.validate()? {
        warn!("{warning}");
    }
    info!("number of points = {}", data.points.len());

    let report = pipeline::run(&data.points, geometry.as_ref())?;

    let base_name = data.base_name(config.base_name.as_deref());
    let emitter = Emitter::new(&config, &base_name, &cli.input, &data.metadata);
    let files = emitter.emit(&report)?;

    println!("C headers and CSV files:");
    for (artifact, path) in &files {
        println!("  {artifact}: {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
