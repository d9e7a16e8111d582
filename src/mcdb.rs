use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{McdbError, Result};
use crate::map::{McdbIter, McdbMap};
use crate::{format, hasher, ENTRY_SZ, RECORD_HDR_SZ};

/// Shared cell naming the current version of one database.
///
/// Every registration holds the cell and the cell holds the current head, so
/// the head stays mapped while any reader exists anywhere, while a
/// superseded version lives only as long as the registrations still on it.
/// Versions themselves carry no links, so holding an old version pins
/// nothing newer. The lock guards publication and the head read at
/// registration only; lookups never touch it.
#[derive(Debug)]
struct McdbChain {
    head: Mutex<Arc<McdbMap>>,
}

impl McdbChain {
    fn newest(&self) -> Arc<McdbMap> {
        Arc::clone(&self.head.lock())
    }

    /// Compare-and-swap publication: installs `replacement` iff the head is
    /// still the version the caller observed staleness on. A loser's
    /// speculative version is dropped (unmapped) here and the winner's
    /// adopted. Returns the head to register on either way.
    fn publish(&self, observed: &Arc<McdbMap>, replacement: Arc<McdbMap>) -> Arc<McdbMap> {
        let mut head = self.head.lock();
        if Arc::ptr_eq(&head, observed) {
            log::debug!(
                "published replacement for database '{}'",
                replacement.name()
            );
            *head = Arc::clone(&replacement);
            replacement
        } else {
            log::debug!(
                "lost publish race for database '{}', adopting winner",
                replacement.name()
            );
            Arc::clone(&head)
        }
    }
}

/// A reader's registration against a live database.
///
/// An `Mcdb` holds a reference to one map version and keeps it mapped for as
/// long as the handle lives. Handles are cheap (two `Arc`s), so a thread
/// that wants its own registration clones one off any existing handle with
/// [`register`](Self::register); the natural home for such a handle is
/// thread-local storage.
///
/// Lookups never touch the filesystem. A long-lived handle opts into picking
/// up replacement files by calling [`refresh`](Self::refresh) between
/// lookups at whatever cadence suits the caller; readers that skip it simply
/// keep serving the version they registered on.
///
/// ```
/// use mcdb::{Mcdb, McdbBuilder};
///
/// # fn main() -> mcdb::Result<()> {
/// let dir = tempfile::tempdir()?;
/// let file = std::fs::File::create(dir.path().join("hosts.mcdb"))?;
/// let pairs = [
///     (b"alpha".as_slice(), b"10.0.0.1".as_slice()),
///     (b"beta".as_slice(), b"10.0.0.2".as_slice()),
/// ];
/// McdbBuilder::default().build(file, pairs.iter())?;
///
/// let db = Mcdb::open(dir.path(), "hosts.mcdb")?;
/// assert_eq!(db.get(b"alpha")?, Some(&b"10.0.0.1"[..]));
/// assert_eq!(db.get(b"gamma")?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Mcdb {
    chain: Arc<McdbChain>,
    map: Arc<McdbMap>,
}

impl Mcdb {
    /// Opens the database file `name` inside `dir` and registers on it.
    pub fn open(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        Ok(Self::from_map(McdbMap::open(dir, name)?))
    }

    /// Starts a registration chain on an already-mapped version.
    ///
    /// Pairs with [`McdbMap::with_file`] when the caller pre-opens files.
    pub fn from_map(map: Arc<McdbMap>) -> Self {
        Mcdb {
            chain: Arc::new(McdbChain {
                head: Mutex::new(Arc::clone(&map)),
            }),
            map,
        }
    }

    /// Registers a new reader on the current version of this database.
    ///
    /// The new handle shares the version chain, so a refresh performed
    /// through either handle is visible to the other via
    /// [`refresh_self`](Self::refresh_self).
    pub fn register(&self) -> Mcdb {
        Mcdb {
            chain: Arc::clone(&self.chain),
            map: self.chain.newest(),
        }
    }

    /// The map version this handle is registered on.
    pub fn map(&self) -> &Arc<McdbMap> {
        &self.map
    }

    /// Releases the registration.
    ///
    /// Dropping the handle does the same; a superseded map version is
    /// unmapped when its last registration goes away.
    pub fn unregister(self) {}

    /// Releases the registration without ever unmapping the region.
    ///
    /// For shutdown paths that may still hold raw pointers into the mapping:
    /// the registration is leaked and the OS reclaims the mapping at
    /// process exit.
    pub fn forget(self) {
        std::mem::forget(self);
    }

    /// Checks the on-disk file and switches this handle to a replacement.
    ///
    /// Returns `true` when the handle is current (nothing changed, or the
    /// switch succeeded). Returns `false` when a replacement exists but
    /// could not be mapped; the handle then keeps serving its present
    /// version, and a later call retries. Transient stat failures count as
    /// "nothing changed".
    ///
    /// Many handles may race here; exactly one installs its freshly mapped
    /// version as the new head and the others adopt it, dropping their own.
    pub fn refresh(&mut self) -> bool {
        self.refresh_self();
        if !self.map.refresh_check() {
            return true;
        }
        match self.map.reopen() {
            Ok(replacement) => {
                self.map = self.chain.publish(&self.map, replacement);
                true
            }
            Err(err) => {
                log::warn!(
                    "refresh of database '{}' failed, retaining current map: {err}",
                    self.map.name()
                );
                false
            }
        }
    }

    /// Re-registers onto the current version if this handle fell behind.
    ///
    /// Purely in-memory: a head read and a reference count, no stat. Use
    /// after another reader is known to have performed the refresh.
    pub fn refresh_self(&mut self) {
        let newest = self.chain.newest();
        if !Arc::ptr_eq(&self.map, &newest) {
            self.map = newest;
        }
    }

    /// Returns the value of the first record stored under `key`.
    pub fn get<'m>(&'m self, key: &[u8]) -> Result<Option<&'m [u8]>> {
        self.values(key).next().transpose()
    }

    /// Cursor over every value stored under `key`, in insertion order.
    ///
    /// The cursor stays bound to the map version it started on; a refresh
    /// performed meanwhile does not disturb it.
    pub fn values<'m, 'k>(&'m self, key: &'k [u8]) -> McdbValues<'m, 'k> {
        McdbValues::new(&self.map, key)
    }

    /// Iterates all records of the registered version in file order.
    pub fn iter(&self) -> McdbIter<'_> {
        self.map.iter()
    }
}

/// Lookup cursor: an iterator over the values stored under one key.
///
/// Construction performs the directory read; each `next` call probes the
/// slot's hash table from where the previous call left off, wrapping at the
/// table end. Probing stops at the first empty entry or after every entry
/// has been examined; the builder keeps tables at most half full, so the
/// typical miss costs one or two probes.
///
/// A structural fault yields one `Err` and exhausts the cursor.
pub struct McdbValues<'m, 'k> {
    map: &'m McdbMap,
    key: &'k [u8],
    khash: u32,
    /// Entries in the slot's table.
    hslots: u64,
    toff: u64,
    tend: u64,
    hpos: u64,
    probes: u64,
    done: bool,
    err: Option<McdbError>,
}

impl<'m, 'k> McdbValues<'m, 'k> {
    fn new(map: &'m McdbMap, key: &'k [u8]) -> Self {
        let khash = hasher::hash(key);
        let mut values = McdbValues {
            map,
            key,
            khash,
            hslots: 0,
            toff: 0,
            tend: 0,
            hpos: 0,
            probes: 0,
            done: true,
            err: None,
        };
        match Self::locate(map, khash) {
            Ok(Some((slot, tend))) => {
                values.hslots = slot.tlen;
                values.toff = slot.toff;
                values.tend = tend;
                values.hpos = slot.toff + hasher::probe_start(khash, slot.tlen) * ENTRY_SZ as u64;
                values.done = false;
            }
            Ok(None) => {} // empty slot, nothing under this hash
            Err(err) => values.err = Some(err),
        }
        values
    }

    /// Reads the key's directory slot and validates that its table lies
    /// inside the mapping, so the probe loop itself cannot run out of
    /// bounds. Returns the slot and its table's end offset.
    fn locate(map: &McdbMap, khash: u32) -> Result<Option<(format::Slot, u64)>> {
        let slot = format::slot(map.bytes(), hasher::slot_index(khash))?;
        if slot.tlen == 0 {
            return Ok(None);
        }
        let table_bytes = slot
            .tlen
            .checked_mul(ENTRY_SZ as u64)
            .ok_or(McdbError::Corrupt { offset: slot.toff })?;
        let tend = slot
            .toff
            .checked_add(table_bytes)
            .filter(|&tend| tend <= map.size() as u64)
            .ok_or(McdbError::Corrupt { offset: slot.toff })?;
        Ok(Some((slot, tend)))
    }

    /// Number of table entries examined so far.
    pub fn probes(&self) -> u64 {
        self.probes
    }

    /// Compares the record at `pos` against the cursor's key; on a match
    /// returns its value.
    fn match_record(&self, pos: u64) -> Result<Option<&'m [u8]>> {
        let (klen, vlen) = format::record_header(self.map.bytes(), pos)?;
        if klen as usize != self.key.len() {
            return Ok(None);
        }
        let kpos = pos
            .checked_add(RECORD_HDR_SZ as u64)
            .ok_or(McdbError::Corrupt { offset: pos })?;
        let stored = self.map.slice(kpos, klen as usize)?;
        if stored != self.key {
            return Ok(None);
        }
        let dpos = kpos + u64::from(klen);
        let value = self.map.slice(dpos, vlen as usize)?;
        Ok(Some(value))
    }

    fn fail(&mut self, err: McdbError) -> Option<Result<&'m [u8]>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'m, 'k> Iterator for McdbValues<'m, 'k> {
    type Item = Result<&'m [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.err.take() {
            self.done = true;
            return Some(Err(err));
        }
        if self.done {
            return None;
        }

        while self.probes < self.hslots {
            let entry = match format::entry(self.map.bytes(), self.hpos) {
                Ok(entry) => entry,
                Err(err) => return self.fail(err),
            };
            self.hpos += ENTRY_SZ as u64;
            if self.hpos == self.tend {
                self.hpos = self.toff;
            }
            self.probes += 1;

            if entry.pos == 0 {
                break; // first empty entry ends the probe sequence
            }
            if entry.hash != self.khash {
                continue;
            }
            match self.match_record(entry.pos) {
                Ok(Some(value)) => return Some(Ok(value)),
                Ok(None) => continue,
                Err(err) => return self.fail(err),
            }
        }
        self.done = true;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::McdbBuilder;
    use std::fs::{self, File};
    use std::path::PathBuf;

    fn build(path: &Path, pairs: &[(&[u8], &[u8])]) {
        let file = File::create(path).unwrap();
        McdbBuilder::default().build(file, pairs.iter()).unwrap();
    }

    fn replace(dir: &Path, name: &str, pairs: &[(&[u8], &[u8])]) -> PathBuf {
        let target = dir.join(name);
        let staging = dir.join(format!("{name}.new"));
        build(&staging, pairs);
        fs::rename(&staging, &target).unwrap();
        target
    }

    #[test]
    fn missing_key_in_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        build(&dir.path().join("empty.mcdb"), &[]);
        let db = Mcdb::open(dir.path(), "empty.mcdb").unwrap();
        assert_eq!(db.get(b"x").unwrap(), None);
    }

    #[test]
    fn single_entry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        build(&dir.path().join("one.mcdb"), &[(b"key", b"value")]);
        let db = Mcdb::open(dir.path(), "one.mcdb").unwrap();

        let value = db.get(b"key").unwrap().unwrap();
        assert_eq!(value, b"value");
        assert_eq!(value.len(), 5);
        assert_eq!(db.get(b"kez").unwrap(), None);
    }

    #[test]
    fn duplicate_keys_come_back_in_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        build(
            &dir.path().join("dup.mcdb"),
            &[(b"k", b"a"), (b"k", b"b"), (b"k", b"c")],
        );
        let db = Mcdb::open(dir.path(), "dup.mcdb").unwrap();

        let mut values = db.values(b"k");
        assert_eq!(values.next().unwrap().unwrap(), b"a");
        assert_eq!(values.next().unwrap().unwrap(), b"b");
        assert_eq!(values.next().unwrap().unwrap(), b"c");
        assert!(values.next().is_none());
        assert!(values.next().is_none());
    }

    #[test]
    fn slot_collisions_do_not_shadow_each_other() {
        // "ai" and "ia" hash differently but share directory slot 45.
        let dir = tempfile::tempdir().unwrap();
        build(
            &dir.path().join("slots.mcdb"),
            &[(b"ai", b"first"), (b"ia", b"second")],
        );
        let db = Mcdb::open(dir.path(), "slots.mcdb").unwrap();
        assert_eq!(db.get(b"ai").unwrap().unwrap(), b"first");
        assert_eq!(db.get(b"ia").unwrap().unwrap(), b"second");
    }

    #[test]
    fn full_hash_collisions_fall_back_to_key_compare() {
        // Identical 32-bit hashes; the probe must skip the other key and the
        // later-placed record costs an extra probe.
        let dir = tempfile::tempdir().unwrap();
        build(
            &dir.path().join("hash.mcdb"),
            &[(b"aaaaa2", b"first"), (b"aaaacp", b"second")],
        );
        let db = Mcdb::open(dir.path(), "hash.mcdb").unwrap();
        assert_eq!(db.get(b"aaaaa2").unwrap().unwrap(), b"first");
        assert_eq!(db.get(b"aaaacp").unwrap().unwrap(), b"second");

        let mut values = db.values(b"aaaacp");
        assert_eq!(values.next().unwrap().unwrap(), b"second");
        assert_eq!(values.probes(), 2);
    }

    #[test]
    fn probes_are_bounded_by_the_table_length() {
        let dir = tempfile::tempdir().unwrap();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..512u32)
            .map(|i| (format!("key-{i}").into_bytes(), vec![b'v']))
            .collect();
        let file = File::create(dir.path().join("many.mcdb")).unwrap();
        McdbBuilder::default().build(file, pairs.iter()).unwrap();
        let db = Mcdb::open(dir.path(), "many.mcdb").unwrap();

        for probe in ["key-0", "key-511", "no-such-key", "also-missing"] {
            let mut values = db.values(probe.as_bytes());
            while let Some(result) = values.next() {
                result.unwrap();
            }
            assert!(values.probes() <= values.hslots.max(1));
        }
    }

    #[test]
    fn megabyte_value_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let big = vec![0xABu8; 1 << 20];
        build(&dir.path().join("big.mcdb"), &[(b"big", big.as_slice())]);
        let db = Mcdb::open(dir.path(), "big.mcdb").unwrap();

        let value = db.get(b"big").unwrap().unwrap();
        assert_eq!(value.len(), 1_048_576);
        assert_eq!(value, big.as_slice());
    }

    #[test]
    fn randomized_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..1000)
            .map(|i: u32| {
                let key = format!("{i:04}-{:08x}", rand::random::<u32>()).into_bytes();
                let value = vec![i as u8; (i % 64) as usize];
                (key, value)
            })
            .collect();
        let file = File::create(dir.path().join("rand.mcdb")).unwrap();
        McdbBuilder::default().build(file, pairs.iter()).unwrap();
        let db = Mcdb::open(dir.path(), "rand.mcdb").unwrap();

        for (key, value) in &pairs {
            assert_eq!(db.get(key).unwrap().unwrap(), value.as_slice());
        }
    }

    #[test]
    fn wild_entry_position_is_corrupt_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wild.mcdb");
        build(&path, &[(b"key", b"value")]);

        // Point the key's table entry far outside the file.
        let bytes = fs::read(&path).unwrap();
        let slot = format::slot(&bytes, hasher::slot_index(hasher::hash(b"key"))).unwrap();
        let mut found = None;
        for i in 0..slot.tlen {
            let off = slot.toff + i * ENTRY_SZ as u64;
            if format::entry(&bytes, off).unwrap().pos != 0 {
                found = Some(off);
            }
        }
        let entry_off = found.unwrap();
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        use std::os::unix::fs::FileExt as _;
        file.write_all_at(&u64::MAX.to_be_bytes(), entry_off + 4).unwrap();
        drop(file);

        let db = Mcdb::open(dir.path(), "wild.mcdb").unwrap();
        let mut values = db.values(b"key");
        assert!(matches!(values.next(), Some(Err(McdbError::Corrupt { .. }))));
        assert!(values.next().is_none());
    }

    #[test]
    fn truncated_table_region_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trunc.mcdb");
        build(&path, &[(b"key", b"value")]);

        // Chop the hash tables off; the directory still points past the end.
        let len = fs::metadata(&path).unwrap().len();
        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - ENTRY_SZ as u64).unwrap();
        drop(file);

        let db = Mcdb::open(dir.path(), "trunc.mcdb").unwrap();
        assert!(matches!(
            db.get(b"key"),
            Err(McdbError::Corrupt { .. })
        ));
    }

    #[test]
    fn hand_crafted_big_endian_file_parses() {
        // One record ("key" -> "value") laid out by hand, independent of the
        // maker, so the reader's byte-order handling is pinned to the format
        // and not to whatever the maker happens to emit.
        let khash = hasher::hash(b"key"); // 0x0b876d32, slot 50, probe start 1 of 2
        let record_start = crate::HEADER_SZ as u64;
        let table_start = record_start + 16; // 8-byte header + "key" + "value"

        let mut image = Vec::new();
        for index in 0..crate::SLOTS as u64 {
            let (toff, tlen): (u64, u64) = match index.cmp(&50) {
                std::cmp::Ordering::Less => (table_start, 0),
                std::cmp::Ordering::Equal => (table_start, 2),
                std::cmp::Ordering::Greater => (table_start + 2 * ENTRY_SZ as u64, 0),
            };
            image.extend_from_slice(&toff.to_be_bytes());
            image.extend_from_slice(&tlen.to_be_bytes());
        }
        image.extend_from_slice(&3u32.to_be_bytes());
        image.extend_from_slice(&5u32.to_be_bytes());
        image.extend_from_slice(b"keyvalue");
        image.extend_from_slice(&format::pack_entry(0, 0)); // probe start is index 1
        image.extend_from_slice(&format::pack_entry(khash, record_start));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fixture.mcdb"), &image).unwrap();
        let db = Mcdb::open(dir.path(), "fixture.mcdb").unwrap();
        assert_eq!(db.get(b"key").unwrap().unwrap(), b"value");
        assert_eq!(db.get(b"x").unwrap(), None);

        let records: Vec<_> = db.iter().collect::<Result<_>>().unwrap();
        assert_eq!(records, vec![(&b"key"[..], &b"value"[..])]);
    }

    #[test]
    fn refresh_switches_while_a_cursor_stays_on_its_version() {
        let dir = tempfile::tempdir().unwrap();
        replace(dir.path(), "live.mcdb", &[(b"k", b"v1")]);

        let mut reader_a = Mcdb::open(dir.path(), "live.mcdb").unwrap();
        let mut reader_b = reader_a.register();
        let v1 = Arc::downgrade(reader_a.map());

        // A starts a lookup, then B notices the replacement and refreshes.
        let mut in_flight = reader_a.values(b"k");
        replace(dir.path(), "live.mcdb", &[(b"k", b"v2")]);
        assert!(reader_b.refresh());
        assert_eq!(reader_b.get(b"k").unwrap().unwrap(), b"v2");

        // A's cursor still observes the version it started on.
        assert_eq!(in_flight.next().unwrap().unwrap(), b"v1");
        drop(in_flight);
        assert!(v1.upgrade().is_some()); // A still holds v1

        reader_a.refresh_self();
        assert_eq!(reader_a.get(b"k").unwrap().unwrap(), b"v2");
        assert!(v1.upgrade().is_none()); // last registration gone, unmapped
    }

    #[test]
    fn stale_reader_does_not_pin_intermediate_versions() {
        // One reader sits on v1 without ever refreshing while another walks
        // the database through v2 to v3. The stale registration must keep
        // only v1 alive; v2 has no registrations left and the head v3 is
        // held by the chain, so at most stale + head versions stay mapped.
        let dir = tempfile::tempdir().unwrap();
        replace(dir.path(), "deep.mcdb", &[(b"k", b"v1")]);

        let stale = Mcdb::open(dir.path(), "deep.mcdb").unwrap();
        let mut walker = stale.register();
        let v1 = Arc::downgrade(stale.map());

        replace(dir.path(), "deep.mcdb", &[(b"k", b"v2")]);
        assert!(walker.refresh());
        let v2 = Arc::downgrade(walker.map());

        replace(dir.path(), "deep.mcdb", &[(b"k", b"v3")]);
        assert!(walker.refresh());
        let v3 = Arc::downgrade(walker.map());

        assert!(v1.upgrade().is_some()); // pinned by the stale registration
        assert!(v2.upgrade().is_none()); // nobody registered, unmapped
        assert!(v3.upgrade().is_some()); // current head
        assert_eq!(stale.get(b"k").unwrap().unwrap(), b"v1");
        assert_eq!(walker.get(b"k").unwrap().unwrap(), b"v3");

        // The walker leaving does not unmap the head; the stale reader's
        // chain still names it.
        drop(walker);
        assert!(v3.upgrade().is_some());

        drop(stale);
        assert!(v1.upgrade().is_none());
        assert!(v3.upgrade().is_none());
    }

    #[test]
    fn racing_refreshes_publish_exactly_one_head() {
        let dir = tempfile::tempdir().unwrap();
        replace(dir.path(), "race.mcdb", &[(b"k", b"v1")]);

        let db = Mcdb::open(dir.path(), "race.mcdb").unwrap();
        let mut racers: Vec<Mcdb> = (0..2).map(|_| db.register()).collect();
        replace(dir.path(), "race.mcdb", &[(b"k", b"v2")]);

        let barrier = std::sync::Barrier::new(2);
        std::thread::scope(|scope| {
            for racer in &mut racers {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    assert!(racer.refresh());
                });
            }
        });

        // Both racers end registered on the same published head; the loser's
        // speculative mapping was dropped.
        assert!(Arc::ptr_eq(racers[0].map(), racers[1].map()));
        assert!(!Arc::ptr_eq(db.map(), racers[0].map()));
        assert_eq!(racers[0].get(b"k").unwrap().unwrap(), b"v2");
    }

    #[test]
    fn failed_refresh_retains_the_current_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = replace(dir.path(), "keep.mcdb", &[(b"k", b"v1")]);
        let mut db = Mcdb::open(dir.path(), "keep.mcdb").unwrap();

        // Replace with something unmappable: stat identity changes but the
        // reopen fails, so the old version keeps serving.
        fs::remove_file(&path).unwrap();
        fs::write(&path, b"garbage").unwrap();
        assert!(!db.refresh());
        assert_eq!(db.get(b"k").unwrap().unwrap(), b"v1");

        // File gone entirely: treated as unchanged.
        fs::remove_file(&path).unwrap();
        assert!(db.refresh());
        assert_eq!(db.get(b"k").unwrap().unwrap(), b"v1");
    }

    #[test]
    fn concurrent_readers_survive_a_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        replace(root, "shared.mcdb", &[(b"k", b"v1")]);
        let db = Mcdb::open(root, "shared.mcdb").unwrap();

        let barrier = std::sync::Barrier::new(4);
        std::thread::scope(|scope| {
            for _ in 0..3 {
                let mut reader = db.register();
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    for _ in 0..200 {
                        reader.refresh();
                        let value = reader.get(b"k").unwrap().unwrap();
                        assert!(value == b"v1" || value == b"v2");
                    }
                });
            }
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                replace(root, "shared.mcdb", &[(b"k", b"v2")]);
            });
        });

        let mut reader = db.register();
        assert!(reader.refresh());
        assert_eq!(reader.get(b"k").unwrap().unwrap(), b"v2");
    }
}
