use std::path::PathBuf;

use thiserror::Error;
use xsom_core::{QNameError, SchemaError};
use xsom_loader::LoaderError;

use crate::state::Diagnostic;

pub type Result<T> = std::result::Result<T, CompileError>;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Frontend failed on {file}: {message}")]
    Frontend { file: String, message: String },

    #[error("Compilation failed with {} error(s)", error_count(.0))]
    Diagnostics(Vec<Diagnostic>),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<QNameError> for CompileError {
    fn from(e: QNameError) -> Self {
        Self::Schema(e.into())
    }
}

impl From<toml::de::Error> for CompileError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.is_error()).count()
}
