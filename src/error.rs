use thiserror::Error;

/// Errors that can cross the [`crate::storage::Storage`] boundary.
///
/// These are the only conditions the log core treats as recoverable by a caller;
/// everything else is a programmer or storage-corruption error and goes through
/// [`crate::logger::Logger::fatal`] instead of this enum (see the crate's module docs).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested index lies below the snapshot horizon (`< first_index`).
    #[error("requested index below the snapshot horizon")]
    Compacted,

    /// The requested index lies above `last_index`, or the range exceeds it.
    #[error("requested index not yet available")]
    Unavailable,

    /// A snapshot older than the one currently held was offered.
    #[error("snapshot is out of date")]
    SnapOutOfDate,

    /// The current snapshot is still being built.
    #[error("snapshot temporarily unavailable")]
    SnapshotTemporarilyUnavailable,
}

pub type Result<T> = std::result::Result<T, Error>;
