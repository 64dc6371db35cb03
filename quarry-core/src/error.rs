use thiserror::Error;

/// Failure of a single chunked download.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("response did not declare a content length")]
    MissingLength,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("range of {want} bytes answered with {got} bytes")]
    BadChunk { want: u64, got: u64 },
    #[error("{failed} of {total} chunk downloads failed")]
    ChunkFailure { failed: usize, total: usize },
    #[error("staging file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pipeline-level failure, one variant per stage that can reject a job.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source is not a reachable pdf")]
    Validation,
    #[error("download failed: {0}")]
    Download(#[from] FetchError),
    #[error("document exceeds extraction limits")]
    GuardRejected,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ExtractError {
    /// Stable identifier surfaced to API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Validation => "validation",
            ExtractError::Download(_) => "download",
            ExtractError::GuardRejected => "guard",
            ExtractError::Internal(_) => "internal",
        }
    }
}
