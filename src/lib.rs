//! Constant, memory-mapped key→value databases.
//!
//! The `mcdb` crate reads and writes read-optimized on-disk hash maps: a
//! database is built once with [`McdbBuilder`], published by renaming it over
//! the old file, and served to any number of readers through a single shared
//! memory map. Lookups are pointer arithmetic into the mapping: a probe
//! touches the 4096-byte directory, one hash table entry, and the record, so
//! a hit costs at most three cache misses and never a syscall.
//!
//! Long-lived readers pick up replacement files through a lock-light refresh
//! protocol: [`Mcdb::refresh`] stats the file by name, maps a replacement
//! when the identity changed, and publishes it as the current version shared
//! by every registration. Readers mid-lookup keep the version they started
//! on; a superseded version is unmapped when its last registration goes
//! away, and holding an old version never pins newer ones.
//!
//! All on-disk integers are big-endian, so files round-trip across hosts;
//! the byte swap on little-endian hardware is noise next to the memory-load
//! latency the format is built around.
//!
//! ```
//! use mcdb::{Mcdb, McdbBuilder};
//!
//! # fn main() -> mcdb::Result<()> {
//! let dir = tempfile::tempdir()?;
//! let file = std::fs::File::create(dir.path().join("fruits.mcdb"))?;
//! let pairs = [
//!     (b"apple".as_slice(), b"1".as_slice()),
//!     (b"banana".as_slice(), b"2".as_slice()),
//! ];
//! McdbBuilder::default().build(file, pairs.iter())?;
//!
//! let db = Mcdb::open(dir.path(), "fruits.mcdb")?;
//! assert_eq!(db.get(b"banana")?, Some(&b"2"[..]));
//! assert_eq!(db.get(b"cherry")?, None);
//! # Ok(())
//! # }
//! ```

/// Width of the directory index: the low 8 bits of a key's hash pick the
/// slot.
pub const SLOT_BITS: u32 = 8;

/// Number of directory slots.
pub const SLOTS: usize = 1 << SLOT_BITS;

/// Size of the directory in bytes: 256 slots of (offset, entries) pairs.
pub const HEADER_SZ: usize = SLOTS * 16;

/// Size of one hash table entry: 4-byte hash plus 8-byte record position.
pub const ENTRY_SZ: usize = 12;

/// Size of a record header: 4-byte key length plus 4-byte value length.
pub const RECORD_HDR_SZ: usize = 8;

/// Read-ahead window requested when a database is mapped; must exceed
/// [`HEADER_SZ`] so the directory is resident before the first probe.
pub const READAHEAD_SZ: usize = 512 << 10;

mod error;
pub use error::{McdbError, Result};

mod hasher;
pub use hasher::{hash, HASH_INIT};

mod format;

mod map;
pub use map::{McdbIter, McdbMap};

mod mcdb;
pub use mcdb::{Mcdb, McdbValues};

mod writer;
pub use writer::McdbWriter;

mod builder;
pub use builder::{McdbBuilder, McdbInfo, McdbMake, MAX_DATA_SZ, MAX_RECORDS};

mod codec;
pub use codec::{McdbCodec, McdbWriteInfo};
