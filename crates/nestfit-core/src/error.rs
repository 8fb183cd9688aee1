//! Error types for nestfit-core.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NestfitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configurator needs at least one datafile")]
    NoDataFiles,

    #[error("Input file invalid format/extension: {} (valid formats: `.csv` and `.tsv`)", .0.display())]
    UnsupportedExtension(PathBuf),

    #[error("Column layout `{specstr}` has no `{column}` column")]
    MissingColumn { specstr: String, column: String },

    #[error("{}: row {row}: {message}", .path.display())]
    InvalidValue {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("Data file has no rows: {}", .0.display())]
    EmptyData(PathBuf),

    #[error("{0} does not support multiple datafiles")]
    MultiFileUnsupported(&'static str),

    #[error("No data block for slot {0}")]
    UnknownSlot(usize),

    #[error("Failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Run directory not found: {}", .0.display())]
    RunDirNotFound(PathBuf),

    #[error("Process was already started")]
    AlreadyStarted,

    #[error("Process is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, NestfitError>;
