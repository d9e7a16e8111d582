//! Seam between the core and dataset-specific record encodings.
//!
//! The core stores opaque byte records; what those bytes mean belongs to the
//! dataset (user accounts, groups, hosts, services, …). Each dataset supplies
//! the two halves of a [`McdbCodec`]: `encode` serialises an in-memory record
//! into the scratch buffer of a [`McdbWriteInfo`] and files it under one or
//! more computed keys, and `parse` inverts the encoding on the way back out.
//! Codecs are identified by [`NAME`](McdbCodec::NAME), not by inheritance.

use crate::builder::McdbMake;
use crate::error::Result;
use crate::writer::McdbWriter;

/// Write-side state handed to a dataset encoder during a build.
///
/// Holds the scratch buffer the encoder serialises into and the insertion
/// callback into the running maker. One encoded record is commonly filed
/// under several keys (a user by name and by uid, say); each
/// [`insert_key`](Self::insert_key) call stores the current scratch contents
/// under another key.
pub struct McdbWriteInfo<'a, W: McdbWriter> {
    make: &'a mut McdbMake<W>,
    /// Serialised record bytes; cleared by the caller between records.
    pub scratch: Vec<u8>,
}

impl<'a, W: McdbWriter> McdbWriteInfo<'a, W> {
    pub fn new(make: &'a mut McdbMake<W>) -> Self {
        McdbWriteInfo {
            make,
            scratch: Vec::new(),
        }
    }

    /// Files the current scratch contents under `key`.
    pub fn insert_key(&mut self, key: &[u8]) -> Result<()> {
        self.make.insert(key, &self.scratch)
    }
}

/// Capability pair a dataset implements to move its records through an mcdb.
///
/// The core never interprets record bytes; round-tripping is entirely the
/// codec's contract: `parse(encoded) == record` for every record `encode`
/// accepts.
pub trait McdbCodec {
    /// Dataset identity this codec serves.
    const NAME: &'static str;

    /// In-memory record type.
    type Record;

    /// Serialises `record` into `w.scratch` and files it under its keys.
    fn encode<W: McdbWriter>(
        &self,
        w: &mut McdbWriteInfo<'_, W>,
        record: &Self::Record,
    ) -> Result<()>;

    /// Reconstructs a record from its stored bytes.
    fn parse(&self, data: &[u8]) -> Result<Self::Record>;
}
