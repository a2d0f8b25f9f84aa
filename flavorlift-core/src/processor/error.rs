use std::path::PathBuf;

use thiserror::Error;

use crate::media::TranscodeError;
use crate::source::ResolveError;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("download failed: {0}")]
    Download(String),
    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("transcoder produced no output at {0}")]
    MissingOutput(PathBuf),
    #[error("composition image unusable: {0}")]
    Composition(String),
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("network error: {0}")]
    Network(String),
}

impl ProcessorError {
    /// Stable label used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessorError::Resolve(ResolveError::NotFound { .. }) => "not_found",
            ProcessorError::Resolve(ResolveError::NoDerivative { .. }) => "no_derivative",
            ProcessorError::Resolve(_) => "resolve",
            ProcessorError::Download(_) => "download",
            ProcessorError::Transcode(_) | ProcessorError::MissingOutput(_) => "transcode",
            ProcessorError::Composition(_) => "composition",
            ProcessorError::Io { .. } => "io",
            ProcessorError::Network(_) => "network",
        }
    }
}

impl From<reqwest::Error> for ProcessorError {
    fn from(error: reqwest::Error) -> Self {
        ProcessorError::Download(error.to_string())
    }
}

pub type ProcessorResult<T> = Result<T, ProcessorError>;
