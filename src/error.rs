// ============================================================
// Error Taxonomy
// ============================================================
// Every failure the pipeline can report, with enough context
// (path, line, byte offset) to diagnose it from the log alone.
//
// Two classes exist:
//   FatalInput — the corpus or configuration is unusable
//   FatalIo    — a cache / snapshot / export write failed
//
// A missing snapshot or export file is NOT an error: the
// checkpoint controller treats it as a regeneration trigger.

use std::{io, path::PathBuf};

use thiserror::Error;

/// How a [`PipelineError`] should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad corpus or bad configuration. Abort, never retry.
    FatalInput,
    /// A write failed. Abort; the previously valid file must survive.
    FatalIo,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("corpus directory '{path}' is unavailable: {source}")]
    CorpusUnavailable {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no .{extension} files found in corpus directory '{path}'")]
    EmptyCorpus { path: PathBuf, extension: String },

    #[error("corpus file '{path}' contains no records")]
    EmptyFile { path: PathBuf },

    #[error("{path}:{line}: no \"word\" label could be extracted")]
    MissingLabel { path: PathBuf, line: usize },

    #[error("{path} @ byte {offset}: malformed record: {source}")]
    MalformedRecord {
        path:   PathBuf,
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("label '{0}' is not present in the frozen vocabulary")]
    UnknownLabel(String),

    #[error("sample index {index} is out of range (dataset length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read '{path}': {source}")]
    Read {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode index cache '{path}': {reason}")]
    CacheEncode { path: PathBuf, reason: String },

    #[error("failed to persist model artifact '{path}': {reason}")]
    Artifact { path: PathBuf, reason: String },

    #[error("sample prefetch worker stopped unexpectedly")]
    PrefetchStopped,
}

impl PipelineError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Creates a model artifact persistence error.
    pub fn artifact(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Artifact { path: path.into(), reason: reason.to_string() }
    }

    /// Classify this error into the fatal-input / fatal-io taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CorpusUnavailable { .. }
            | Self::EmptyCorpus { .. }
            | Self::EmptyFile { .. }
            | Self::MissingLabel { .. }
            | Self::MalformedRecord { .. }
            | Self::UnknownLabel(_)
            | Self::IndexOutOfRange { .. }
            | Self::InvalidConfig(_)
            | Self::Read { .. }
            | Self::PrefetchStopped => ErrorKind::FatalInput,
            Self::Write { .. }
            | Self::CacheEncode { .. }
            | Self::Artifact { .. } => ErrorKind::FatalIo,
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_fatal_input() {
        let err = PipelineError::MissingLabel { path: "cat.ndjson".into(), line: 1 };
        assert_eq!(err.kind(), ErrorKind::FatalInput);
        assert!(err.to_string().contains("cat.ndjson:1"));
    }

    #[test]
    fn test_write_errors_are_fatal_io() {
        let err = PipelineError::Write {
            path:   "cnn_model.bin".into(),
            source: io::Error::new(io::ErrorKind::Other, "disk full"),
        };
        assert_eq!(err.kind(), ErrorKind::FatalIo);
        assert_eq!(PipelineError::artifact("x.json", "boom").kind(), ErrorKind::FatalIo);
    }
}
