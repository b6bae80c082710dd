use crate::data_io::reader::ReaderError;
use crate::data_io::writer::WriteError;
use crate::math::MathError;
use thiserror::Error;

/// Top level error of a conversion run.
///
/// Every variant is fatal. The kinds map onto distinct process exit codes so that
/// batch drivers can tell bad arguments from bad input data.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Source data error: {0}")]
    SourceData(String),

    #[error("Unsupported aggregation mode: {0}")]
    UnsupportedMode(String),

    #[error("Projection error: {0}")]
    Projection(#[from] proj4rs::errors::Error),

    #[error(transparent)]
    Reader(#[from] ReaderError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        ConvertError::Configuration(msg.into())
    }

    pub fn source_data(msg: impl Into<String>) -> Self {
        ConvertError::SourceData(msg.into())
    }

    /// Process exit code for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::Configuration(_) | ConvertError::Projection(_) => 2,
            ConvertError::SourceData(_)
            | ConvertError::Reader(_)
            | ConvertError::Write(_)
            | ConvertError::Io(_) => 3,
            ConvertError::UnsupportedMode(_) => 4,
        }
    }
}

impl From<MathError> for ConvertError {
    fn from(err: MathError) -> Self {
        ConvertError::SourceData(err.to_string())
    }
}
