// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! The variants follow the layers of the pipeline: the artifact store, the
//! tasks themselves, graph construction and run configuration.

use std::fmt;

use thiserror::Error;

use crate::store::ArtifactHandle;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to write artifact ({context}): {source}")]
    StoreWrite {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown artifact handle: {0}")]
    UnknownHandle(ArtifactHandle),

    #[error("external command '{program}' {reason}")]
    ExternalCommand {
        program: String,
        reason: String,
        stdout: String,
        stderr: String,
    },

    #[error("malformed input: {0}")]
    DataFormat(String),

    #[error("cycle detected in task graph: {0}")]
    Cycle(String),

    #[error("unsatisfied dependency: {0}")]
    UnsatisfiedDependency(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`PipelineError`], used in run reports where
/// the error itself has already been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StoreWrite,
    UnknownHandle,
    ExternalCommand,
    DataFormat,
    Cycle,
    UnsatisfiedDependency,
    Configuration,
    Io,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::StoreWrite => "StoreWriteError",
            ErrorKind::UnknownHandle => "UnknownHandleError",
            ErrorKind::ExternalCommand => "ExternalCommandError",
            ErrorKind::DataFormat => "DataFormatError",
            ErrorKind::Cycle => "CycleError",
            ErrorKind::UnsatisfiedDependency => "UnsatisfiedDependencyError",
            ErrorKind::Configuration => "ConfigurationError",
            ErrorKind::Io => "IoError",
            ErrorKind::Other => "Error",
        };
        f.write_str(s)
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::StoreWrite { .. } => ErrorKind::StoreWrite,
            PipelineError::UnknownHandle(_) => ErrorKind::UnknownHandle,
            PipelineError::ExternalCommand { .. } => ErrorKind::ExternalCommand,
            PipelineError::DataFormat(_) => ErrorKind::DataFormat,
            PipelineError::Cycle(_) => ErrorKind::Cycle,
            PipelineError::UnsatisfiedDependency(_) => ErrorKind::UnsatisfiedDependency,
            PipelineError::Configuration(_) => ErrorKind::Configuration,
            PipelineError::Io(_) | PipelineError::Toml(_) => ErrorKind::Io,
            PipelineError::Other(_) => ErrorKind::Other,
        }
    }

    /// Build a `StoreWrite` error from an IO error and a short description of
    /// what was being written.
    pub fn store_write(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::StoreWrite {
            context: context.into(),
            source,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipelineError>;
