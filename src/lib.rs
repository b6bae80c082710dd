pub mod config;
pub mod convert;
pub mod data_io;
pub mod error;
pub mod fields;
pub mod math;
pub mod projection;
pub mod sampler;
pub mod time_utils;
pub mod tools;

pub use error::ConvertError;
pub use time_utils::*;
