use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot read folder {}: {message}", path.display())]
    Discovery { path: PathBuf, message: String },

    #[error("Cannot parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid field path '{path}': {message}")]
    FieldPath { path: String, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn discovery(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Discovery {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Error::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
