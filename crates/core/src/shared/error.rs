use std::path::PathBuf;

use thiserror::Error;

/// Failures that end a tracking run.
///
/// Conditions the pipeline absorbs (truncated decode, clips cut short by
/// the end of the source, zero-norm embeddings) are not represented here.
#[derive(Error, Debug)]
pub enum SpotlightError {
    #[error("cannot read reference image {path}: {reason}")]
    ReferenceImageUnreadable { path: PathBuf, reason: String },

    #[error("no face found in reference image {path}")]
    ReferenceFaceNotFound { path: PathBuf },

    #[error("cannot read source video {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },

    #[error("cannot create output directory {path}: {source}")]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cancelled")]
    Cancelled,
}

impl SpotlightError {
    pub(crate) fn source_unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SourceUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
