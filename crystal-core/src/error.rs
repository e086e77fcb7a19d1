use thiserror::Error;

/// Error kinds surfaced by the archive pipeline.
///
/// Anything touching pipeline parameters or manifest integrity is fatal;
/// per-block LDPC failures are demoted to shard erasures by the orchestrator
/// and never reach callers directly.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("malformed blob: {0}")]
    MalformedBlob(String),

    #[error("unsupported compression codec {0:?}")]
    UnsupportedCodec(String),

    #[error("uncorrectable {stage} block {index}: {detail}")]
    UncorrectableBlock { stage: &'static str, index: usize, detail: String },

    #[error("uncorrectable archive at {stage}: {detail}")]
    UncorrectableArchive { stage: &'static str, detail: String },

    #[error("manifest integrity check failed")]
    ManifestTampered,

    #[error("checksum mismatch for {path}")]
    ChecksumMismatch { path: String },

    #[error("unknown profile {0:?}")]
    UnknownProfile(String),

    #[error("i/o failure ({context}): {source}")]
    IoFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ArchiveError {
    /// Adapter for `map_err`: attach a context string to an `io::Error`.
    pub fn io<C: Into<String>>(context: C) -> impl FnOnce(std::io::Error) -> ArchiveError {
        let context = context.into();
        move |source| ArchiveError::IoFailure { context, source }
    }
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
