use std::borrow::Borrow;
use std::io::{BufWriter, Write};

use crate::error::{McdbError, Result};
use crate::writer::McdbWriter;
use crate::{format, hasher, ENTRY_SZ, HEADER_SZ, SLOTS};

/// Largest key or value the format accepts, in bytes.
pub const MAX_DATA_SZ: usize = i32::MAX as usize - 8;

/// Largest number of records one database can hold.
///
/// The hash is 32 bits wide; past two billion keys the keyspace is dense
/// enough that the format stops being useful, so the maker refuses.
pub const MAX_RECORDS: u64 = i32::MAX as u64;

/// Builder type for emitting mcdb files.
///
/// The builder owns IO configuration and is consumed either by
/// [`build`](Self::build), which drains a key-value iterator in one call, or
/// by [`start`](Self::start), which hands back an [`McdbMake`] for streaming
/// insertion (the shape dataset encoders feed through
/// [`McdbWriteInfo`](crate::McdbWriteInfo)).
///
/// Output is deterministic: the same sequence of insertions produces a
/// byte-identical file.
pub struct McdbBuilder {
    writer_buffer_size: usize,
    capacity_hint: usize,
}

impl Default for McdbBuilder {
    fn default() -> Self {
        Self {
            writer_buffer_size: 16 << 20, // 16 MiB
            capacity_hint: 0,
        }
    }
}

impl McdbBuilder {
    /// Sets how many record and table bytes accumulate in memory before
    /// each positional write to the sink.
    ///
    /// Purely an IO batching knob; the emitted bytes are identical at any
    /// size.
    pub fn with_writer_buffer_size(mut self, size: usize) -> Self {
        self.writer_buffer_size = size;
        self
    }

    /// Pre-sizes the in-memory slot lists for roughly `count` insertions.
    pub fn with_capacity_hint(mut self, count: usize) -> Self {
        self.capacity_hint = count;
        self
    }

    /// Consumes the builder and writes a database to `writer` from `entries`.
    ///
    /// Keys may repeat; duplicates are retrievable in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if any key or value exceeds [`MAX_DATA_SZ`], the
    /// record count exceeds [`MAX_RECORDS`], or the underlying writer reports
    /// an IO failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcdb::McdbBuilder;
    ///
    /// # fn main() -> mcdb::Result<()> {
    /// let dir = tempfile::tempdir()?;
    /// let file = std::fs::File::create(dir.path().join("example.mcdb"))?;
    /// let pairs = [(b"it".as_slice(), b"works".as_slice())];
    /// let info = McdbBuilder::default().build(file, pairs.iter())?;
    /// assert_eq!(info.entry_count, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub fn build<W, K, V>(
        self,
        writer: W,
        entries: impl Iterator<Item = impl Borrow<(K, V)>>,
    ) -> Result<McdbInfo>
    where
        W: McdbWriter,
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut make = self.start(writer);
        for entry in entries {
            let (key, value) = entry.borrow();
            make.insert(key.as_ref(), value.as_ref())?;
        }
        make.finish()
    }

    /// Consumes the builder and starts a streaming maker over `writer`.
    pub fn start<W: McdbWriter>(self, writer: W) -> McdbMake<W> {
        let mut slots = Vec::with_capacity(SLOTS);
        let per_slot = self.capacity_hint.div_ceil(SLOTS);
        for _ in 0..SLOTS {
            slots.push(Vec::with_capacity(per_slot));
        }
        McdbMake {
            out: BufWriter::with_capacity(
                self.writer_buffer_size,
                McdbWriterWrapper {
                    inner: writer,
                    offset: HEADER_SZ as u64,
                },
            ),
            slots,
            count: 0,
        }
    }
}

/// Streaming mcdb maker: records go out as they are inserted, the hash
/// tables and directory are laid out by [`finish`](Self::finish).
///
/// Nothing is durable until `finish` returns; callers publishing a
/// replacement database should build into a temporary file and `rename` it
/// over the target name.
pub struct McdbMake<W: McdbWriter> {
    out: BufWriter<McdbWriterWrapper<W>>,
    /// Per-slot `(hash, record position)` lists in insertion order.
    slots: Vec<Vec<(u32, u64)>>,
    count: u64,
}

impl<W: McdbWriter> McdbMake<W> {
    /// Appends one record and files it under its key's hash.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_DATA_SZ {
            return Err(McdbError::RecordTooLarge { len: key.len() });
        }
        if value.len() > MAX_DATA_SZ {
            return Err(McdbError::RecordTooLarge { len: value.len() });
        }
        if self.count >= MAX_RECORDS {
            return Err(McdbError::TooManyRecords);
        }

        let pos = self.position();
        self.out
            .write_all(&format::pack_record_header(key.len() as u32, value.len() as u32))?;
        self.out.write_all(key)?;
        self.out.write_all(value)?;

        let hash = hasher::hash(key);
        self.slots[hasher::slot_index(hash)].push((hash, pos));
        self.count += 1;
        Ok(())
    }

    /// Number of records inserted so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Pads the record region, lays out the 256 hash tables, writes the
    /// directory at offset 0, and returns a summary of the file.
    ///
    /// Each table holds twice as many entries as the slot has records, so at
    /// least half its entries stay empty and probes terminate early. Entries
    /// are placed by linear probing from `(hash >> 8) % tlen`; an entry
    /// position of zero marks an empty slot, which record positions can never
    /// collide with since records start after the directory.
    pub fn finish(mut self) -> Result<McdbInfo> {
        const ZEROS: [u8; 8] = [0u8; 8];
        let unpadded = self.position();
        let pad = unpadded.next_multiple_of(8) - unpadded;
        if pad > 0 {
            self.out.write_all(&ZEROS[..pad as usize])?;
        }
        let data_end = self.position();

        let slots = std::mem::take(&mut self.slots);
        let mut directory = [0u8; HEADER_SZ];
        let mut toff = data_end;
        let mut table: Vec<(u32, u64)> = Vec::new();
        let mut table_entries = 0u64;
        for (index, filed) in slots.iter().enumerate() {
            let tlen = filed.len() as u64 * 2;
            directory[index * format::SLOT_SZ..(index + 1) * format::SLOT_SZ]
                .copy_from_slice(&format::pack_slot(toff, tlen));
            if tlen == 0 {
                continue;
            }

            table.clear();
            table.resize(tlen as usize, (0u32, 0u64));
            for &(hash, pos) in filed {
                let mut i = hasher::probe_start(hash, tlen);
                while table[i as usize].1 != 0 {
                    i += 1;
                    if i == tlen {
                        i = 0;
                    }
                }
                table[i as usize] = (hash, pos);
            }
            for &(hash, pos) in &table {
                self.out.write_all(&format::pack_entry(hash, pos))?;
            }
            toff += tlen * ENTRY_SZ as u64;
            table_entries += tlen;
        }

        self.out.flush()?;
        let wrapper = self
            .out
            .into_inner()
            .map_err(|e| McdbError::Io(e.into_error()))?;
        wrapper.inner.write_at(&directory, 0)?;

        Ok(McdbInfo {
            file_length: toff,
            entry_count: self.count,
            data_end,
            table_entries,
            empty_slots: slots.iter().filter(|filed| filed.is_empty()).count(),
        })
    }

    /// Current logical write position: bytes handed to the wrapper plus
    /// bytes still sitting in the buffer.
    fn position(&self) -> u64 {
        self.out.get_ref().offset + self.out.buffer().len() as u64
    }
}

/// Summary returned by [`McdbMake::finish`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct McdbInfo {
    /// Final size of the generated file in bytes.
    pub file_length: u64,
    /// Number of records written.
    pub entry_count: u64,
    /// End of the record region (including padding); also slot 0's table
    /// offset.
    pub data_end: u64,
    /// Total hash table entries across all 256 slots.
    pub table_entries: u64,
    /// Number of directory slots with no records.
    pub empty_slots: usize,
}

/// Thin adapter implementing [`std::io::Write`] in terms of [`McdbWriter`],
/// tracking the next sequential offset. Record and table bytes stream through
/// it; the directory bypasses it with a positional write once offsets are
/// final.
struct McdbWriterWrapper<W: McdbWriter> {
    inner: W,
    offset: u64,
}

impl<W: McdbWriter> Write for McdbWriterWrapper<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write_at(buf, self.offset)?;
        self.offset += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
