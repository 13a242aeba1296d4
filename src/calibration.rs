use std::fs;
use std::io::Read;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ModelError;
use crate::steinhart::MIN_POINTS;

/// Calibration files larger than this are refused without being read
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// More metadata rows than this usually means the data header was not recognised
pub const MAX_METADATA_ENTRIES: usize = 20;
/// Below this many points the fit is determined but poorly constrained
pub const LOW_POINT_COUNT: usize = 6;
pub const HIGH_POINT_COUNT: usize = 1000;

/// A single measured temperature (Celsius) and thermistor resistance (Ohm)
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
pub struct CalibrationPoint {
    pub temperature: f64,
    pub resistance: f64,
}

impl CalibrationPoint {
    pub const fn new(temperature: f64, resistance: f64) -> Self {
        Self {
            temperature,
            resistance,
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("calibration file is too large: {size} bytes, the limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("failed to parse line {line}: {content:?}")]
    InvalidRow { line: u64, content: Vec<String> },

    #[error("resistance on line {line} must be positive, found {resistance}")]
    NonPositiveResistance { line: u64, resistance: f64 },

    #[error("no Temperature/Resistance data found in calibration file")]
    NoData,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The contents of a thermistor calibration file
///
/// The file is a two column CSV. Rows above the `Temperature,Resistance` header are free-form
/// `key,value` metadata which is passed through to the generated artifacts untouched. Rows below
/// it are the calibration points.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationData {
    pub metadata: Vec<(String, String)>,
    pub points: Vec<CalibrationPoint>,
}

impl CalibrationData {
    /// Create a `CalibrationData` from an on-disk representation
    ///
    /// # Errors
    /// Returns an error if the file is missing or too large, or if [`Self::from_reader`] fails.
    pub fn from_file(filepath: &Path) -> Result<Self, IngestError> {
        let size = fs::metadata(filepath)?.len();
        if size > MAX_FILE_SIZE {
            return Err(IngestError::FileTooLarge {
                size,
                limit: MAX_FILE_SIZE,
            });
        }

        info!("reading calibration data from {filepath:?}");
        let file = fs::read(filepath)?;
        Self::from_reader(&file[..])
    }

    /// Parse calibration data from any CSV source
    ///
    /// # Errors
    /// - [`IngestError::InvalidRow`] if a data row is not numeric
    /// - [`IngestError::NonPositiveResistance`] if a resistance is not a positive number
    /// - [`IngestError::NoData`] if there is no header row or no points follow it
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, IngestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut data = Self::default();
        let mut in_table = false;

        for result in rdr.records() {
            let record = result?;
            if record.len() != 2 || (record[0].is_empty() && record[1].is_empty()) {
                continue;
            }
            let line = record.position().map_or(0, csv::Position::line);

            if is_table_header(&record[0], &record[1]) {
                in_table = true;
                continue;
            }

            if !in_table {
                data.metadata
                    .push((record[0].to_owned(), record[1].to_owned()));
                continue;
            }

            data.points.push(parse_point(&record, line)?);
        }

        if data.points.is_empty() {
            return Err(IngestError::NoData);
        }
        debug!(
            "parsed {} metadata entries and {} points",
            data.metadata.len(),
            data.points.len()
        );

        Ok(data)
    }

    /// Check the data is usable for fitting, returning any warnings
    ///
    /// # Errors
    /// Returns [`ModelError::InsufficientData`] if there are too few points to fit the model.
    pub fn validate(&self) -> Result<Vec<String>, ModelError> {
        let mut warnings = vec![];
        if self.metadata.len() > MAX_METADATA_ENTRIES {
            warnings.push(format!(
                "too much metadata ({} entries, max {MAX_METADATA_ENTRIES}), check the calibration file",
                self.metadata.len()
            ));
        }

        let num_points = self.points.len();
        if num_points < MIN_POINTS {
            return Err(ModelError::InsufficientData {
                found: num_points,
                required: MIN_POINTS,
            });
        } else if num_points < LOW_POINT_COUNT {
            warnings.push(format!(
                "low point count ({num_points}), results may be unstable"
            ));
        } else if num_points > HIGH_POINT_COUNT {
            warnings.push(format!(
                "large number of points ({num_points}), calculation may take a while"
            ));
        }

        Ok(warnings)
    }

    /// Name used for generated files and symbols
    ///
    /// An explicit `name_override` wins, then the first non-empty `Name`, `Model` or
    /// `Thermistor` metadata value, then `"thermistor"`.
    pub fn base_name(&self, name_override: Option<&str>) -> String {
        if let Some(name) = name_override.filter(|name| !name.is_empty()) {
            return name.to_owned();
        }
        self.metadata
            .iter()
            .find(|(key, value)| {
                !value.is_empty() && matches!(key.as_str(), "Name" | "Model" | "Thermistor")
            })
            .map_or_else(|| "thermistor".to_owned(), |(_, value)| value.clone())
    }
}

fn parse_point(record: &csv::StringRecord, line: u64) -> Result<CalibrationPoint, IngestError> {
    let temperature = record[0].parse::<f64>().ok().filter(|t| t.is_finite());
    let resistance = record[1].parse::<f64>().ok();
    let (Some(temperature), Some(resistance)) = (temperature, resistance) else {
        return Err(IngestError::InvalidRow {
            line,
            content: record.iter().map(str::to_owned).collect(),
        });
    };
    if !(resistance.is_finite() && resistance > 0.) {
        return Err(IngestError::NonPositiveResistance { line, resistance });
    }
    Ok(CalibrationPoint::new(temperature, resistance))
}

fn is_table_header(first: &str, second: &str) -> bool {
    first.eq_ignore_ascii_case("temperature") && second.eq_ignore_ascii_case("resistance")
}
