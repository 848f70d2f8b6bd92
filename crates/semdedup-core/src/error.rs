//! Error taxonomy shared by the engine and its adapters.

use thiserror::Error;

/// Errors raised by the lifecycle manager, the clustering engine, and the
/// [`Embedder`](crate::embedding::Embedder) / [`VectorIndex`](crate::index::VectorIndex)
/// contracts.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown mode, missing input, or an invalid parameter. Reported before
    /// any index mutation happens.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connectivity or backend fault talking to the vector index.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// The target index does not exist.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// The embedding provider failed or returned an unusable batch.
    #[error("embedding failed: {0}")]
    Encoding(String),

    /// A neighbor hit could not be turned into a record.
    #[error("malformed neighbor: {0}")]
    MalformedNeighbor(String),

    /// A vector did not have the engine's fixed dimension.
    #[error("vector has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl Error {
    /// True for errors that mean "the index is not there", which index
    /// deletion treats as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::IndexNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
