use storage::BufferPoolError;
use thiserror::Error;

/// Errors returned by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The underlying buffer pool failed.
    #[error("buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),
    /// The buffer pool has no frame left to pin a page into.
    #[error("buffer pool has no available frame")]
    PoolExhausted,
    /// Scan operators outside {GT, GTE} for the lower bound or {LT, LTE}
    /// for the upper bound.
    #[error("scan lower bound requires GT or GTE and upper bound requires LT or LTE")]
    BadOpcodes,
    /// The scan's lower bound exceeds its upper bound.
    #[error("scan range is reversed: lower bound exceeds upper bound")]
    BadScanRange,
    /// A scan start found no key satisfying its predicate.
    #[error("no key in the index satisfies the scan predicate")]
    NoSuchKeyFound,
    /// A scan operation was issued with no scan in progress.
    #[error("no scan is in progress")]
    ScanNotInitialized,
    /// The scan has moved past the last matching entry.
    #[error("the scan has no further matching entries")]
    IndexScanCompleted,
    /// The on-disk metadata does not describe the requested attribute.
    #[error("index metadata mismatch: {0}")]
    BadIndexInfo(String),
    /// An on-disk page violates the node format.
    #[error("corrupt index page: {0}")]
    Corrupted(String),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
