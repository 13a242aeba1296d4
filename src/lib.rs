#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

extern crate blas_src;

pub mod calibration;
pub mod config;
pub mod deviation;
pub mod error;
pub mod lut;
pub mod math;
pub mod output;
pub mod pipeline;
pub mod steinhart;

pub use error::ModelError;

pub type Result<T> = ::std::result::Result<T, Box<dyn ::std::error::Error>>;
