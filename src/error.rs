use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, McdbError>;

/// Errors surfaced by the mcdb reader and maker.
///
/// A missing key is not an error: lookups return `Ok(None)` and iterators
/// simply end. Staleness of a mapped file is likewise not an error; it is
/// reported by [`McdbMap::refresh_check`](crate::McdbMap::refresh_check).
#[derive(Debug, Error)]
pub enum McdbError {
    /// `open`/`fstat` on the database file failed.
    #[error("failed to open database file '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    /// `mmap` of the database file failed.
    #[error("failed to memory-map database file '{name}': {source}")]
    Mmap {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A structural read fell outside the mapped region, or a record header
    /// is impossible. Non-retriable.
    #[error("structurally corrupt database: bad read at byte offset {offset}")]
    Corrupt { offset: u64 },

    /// A key or value handed to the maker exceeds the format limit.
    #[error("record component of {len} bytes exceeds the format limit")]
    RecordTooLarge { len: usize },

    /// The maker was handed more records than the 32-bit hash keyspace
    /// supports.
    #[error("record count exceeds the format limit")]
    TooManyRecords,

    /// IO failure while writing a database file.
    #[error("IO: {0}")]
    Io(#[from] io::Error),
}
