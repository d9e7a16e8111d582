use std::fs::{self, File, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use memmap2::Mmap;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

use crate::error::{McdbError, Result};
use crate::{format, HEADER_SZ, READAHEAD_SZ, RECORD_HDR_SZ};

/// One live version of a memory-mapped database file.
///
/// A version owns the read-only shared mapping plus the identity of the file
/// it was mapped from, and remembers where the file lives so readers can
/// detect a replacement ([`refresh_check`](Self::refresh_check)) and map it
/// ([`reopen`](Self::reopen)) without any coordination with the process that
/// wrote it.
///
/// A version knows nothing about its successors; which version is current is
/// tracked by the registration layer ([`Mcdb`](crate::Mcdb)), so a version is
/// unmapped as soon as the last `Arc` pointing at it is dropped; holding an
/// old version alive never pins newer ones and vice versa. Lookups against an
/// existing reference are unaffected by replacement throughout; they keep
/// reading the immutable image they started on.
#[derive(Debug)]
pub struct McdbMap {
    mmap: Mmap,
    ident: FileIdent,
    dir: PathBuf,
    name: String,
}

/// Identity of the file backing a mapping, used for staleness checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdent {
    modified: SystemTime,
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl FileIdent {
    fn of(md: &Metadata) -> io::Result<Self> {
        Ok(FileIdent {
            modified: md.modified()?,
            #[cfg(unix)]
            dev: md.dev(),
            #[cfg(unix)]
            ino: md.ino(),
        })
    }
}

impl McdbMap {
    /// Opens and memory-maps the database file `name` inside `dir`.
    ///
    /// The file descriptor is closed before returning; only the directory
    /// path and basename are retained, for stat-by-name staleness checks and
    /// for reopening a replacement under the same name.
    ///
    /// # Errors
    ///
    /// [`McdbError::Open`] if the file cannot be opened or stat'd,
    /// [`McdbError::Mmap`] if mapping fails, and [`McdbError::Corrupt`] if
    /// the file is smaller than the 4096-byte directory.
    pub fn open(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Arc<Self>> {
        let dir = dir.as_ref();
        let name = name.into();
        let file = File::open(dir.join(&name)).map_err(|source| McdbError::Open {
            name: name.clone(),
            source,
        })?;
        Ok(Arc::new(Self::with_file(dir, name, &file)?))
    }

    /// Memory-maps an already-open database file.
    ///
    /// Splitting the filesystem step from the mapping step lets callers (and
    /// tests) pre-open files; `dir` and `name` are recorded for the refresh
    /// machinery exactly as in [`open`](Self::open).
    pub fn with_file(dir: impl AsRef<Path>, name: impl Into<String>, file: &File) -> Result<Self> {
        let name = name.into();
        let md = file.metadata().map_err(|source| McdbError::Open {
            name: name.clone(),
            source,
        })?;
        if md.len() < HEADER_SZ as u64 {
            return Err(McdbError::Corrupt { offset: md.len() });
        }
        let ident = FileIdent::of(&md).map_err(|source| McdbError::Open {
            name: name.clone(),
            source,
        })?;

        // SAFETY: Mmap::map is unsafe because the file could be truncated or
        // rewritten underneath the mapping. Database files are published by
        // renaming a fully-written replacement over the old name, so the
        // mapped inode itself is never modified; readers that want the
        // replacement pick it up through refresh_check/reopen.
        let mmap = unsafe { Mmap::map(file) }.map_err(|source| McdbError::Mmap {
            name: name.clone(),
            source,
        })?;
        advise_readahead(&mmap);
        log::debug!("mapped database '{}' ({} bytes)", name, mmap.len());

        Ok(McdbMap {
            mmap,
            ident,
            dir: dir.as_ref().to_path_buf(),
            name,
        })
    }

    /// Length of the mapped file in bytes.
    pub fn size(&self) -> usize {
        self.mmap.len()
    }

    /// Basename of the mapped file within its directory.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whole mapped image.
    pub(crate) fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Bounds-checked zero-copy view of `len` bytes at `pos`.
    pub fn slice(&self, pos: u64, len: usize) -> Result<&[u8]> {
        format::bytes_at(&self.mmap, pos, len)
    }

    /// Copies `out.len()` bytes at `pos` into `out`.
    ///
    /// Same bounds checking as [`slice`](Self::slice); useful when the caller
    /// wants an owned copy rather than a borrow of the mapping.
    pub fn read(&self, pos: u64, out: &mut [u8]) -> Result<()> {
        out.copy_from_slice(self.slice(pos, out.len())?);
        Ok(())
    }

    /// Returns true iff the file on disk is no longer the one this node
    /// mapped.
    ///
    /// Compares modification time and (on Unix) device/inode identity via a
    /// fresh stat by name. A failed stat (the file momentarily absent in the
    /// middle of a rename, say) is reported as "no change" so readers keep
    /// serving the current map instead of churning.
    pub fn refresh_check(&self) -> bool {
        let md = match fs::metadata(self.dir.join(&self.name)) {
            Ok(md) => md,
            Err(err) => {
                log::debug!("stat '{}' failed, treating as unchanged: {err}", self.name);
                return false;
            }
        };
        match FileIdent::of(&md) {
            Ok(ident) => ident != self.ident,
            Err(_) => false,
        }
    }

    /// Maps the file's current on-disk contents into a fresh, unpublished
    /// version.
    ///
    /// Call after a positive [`refresh_check`](Self::refresh_check). The new
    /// version is not visible to anyone until a registration publishes it;
    /// [`Mcdb::refresh`](crate::Mcdb::refresh) does both steps.
    pub fn reopen(&self) -> Result<Arc<Self>> {
        Self::open(&self.dir, self.name.clone())
    }

    /// Iterates all records in file order.
    ///
    /// Walks the record region sequentially from the end of the directory to
    /// the first hash table, yielding borrowed `(key, value)` pairs. Used by
    /// consistency checks and dumps; lookups never touch it.
    pub fn iter(&self) -> McdbIter<'_> {
        McdbIter {
            map: self,
            pos: HEADER_SZ as u64,
            end: None,
            done: false,
        }
    }
}

/// Asks the kernel to fault in the front of the mapping ahead of first use.
///
/// The window must exceed the directory so the first probe after open does
/// not stall on two page faults.
#[cfg(unix)]
fn advise_readahead(mmap: &Mmap) {
    let len = mmap.len().min(READAHEAD_SZ);
    // SAFETY: the range starts at the mapping base and is clamped to the
    // mapping length; MADV_WILLNEED is advisory and leaves the mapping
    // unchanged.
    unsafe {
        libc::madvise(mmap.as_ptr() as *mut libc::c_void, len, libc::MADV_WILLNEED);
    }
}

#[cfg(not(unix))]
fn advise_readahead(_mmap: &Mmap) {}

/// Sequential iterator over the records of one map version.
///
/// Yields `Err` once and then ends if the file is structurally corrupt.
pub struct McdbIter<'a> {
    map: &'a McdbMap,
    pos: u64,
    /// Offset of the first hash table (slot 0's table offset), read lazily.
    end: Option<u64>,
    done: bool,
}

impl<'a> McdbIter<'a> {
    fn read_record(&mut self, end: u64) -> Result<(&'a [u8], &'a [u8])> {
        let (klen, vlen) = format::record_header(self.map.bytes(), self.pos)?;
        let kpos = self.pos + RECORD_HDR_SZ as u64;
        let key = self.map.slice(kpos, klen as usize)?;
        let value = self.map.slice(kpos + u64::from(klen), vlen as usize)?;
        let next = kpos + u64::from(klen) + u64::from(vlen);
        if next > end {
            return Err(McdbError::Corrupt { offset: self.pos });
        }
        self.pos = next;
        Ok((key, value))
    }
}

impl<'a> Iterator for McdbIter<'a> {
    type Item = Result<(&'a [u8], &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let end = match self.end {
            Some(end) => end,
            None => match format::slot(self.map.bytes(), 0) {
                Ok(slot) => {
                    self.end = Some(slot.toff);
                    slot.toff
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            },
        };

        // Less than a full header before the first table is the padding run.
        if self.pos + RECORD_HDR_SZ as u64 > end {
            self.done = true;
            return None;
        }
        match self.read_record(end) {
            Ok(record) => Some(Ok(record)),
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
