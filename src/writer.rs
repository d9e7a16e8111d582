use std::io::Result;

/// Trait representing positional writers suitable for emitting mcdb files.
///
/// The maker streams records and tables sequentially but must rewrite the
/// 4096-byte directory at offset 0 once every table position is known, so the
/// sink has to support writes at arbitrary offsets without shared state. This
/// is satisfied by `FileExt` handles on both Unix and Windows.
pub trait McdbWriter {
    /// Writes `data` at the given absolute `offset`.
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()>;
}

#[cfg(unix)]
impl<T: std::os::unix::fs::FileExt> McdbWriter for T {
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()> {
        self.write_all_at(data, offset)
    }
}

#[cfg(windows)]
impl<T: std::os::windows::fs::FileExt> McdbWriter for T {
    fn write_at(&self, data: &[u8], offset: u64) -> Result<()> {
        self.seek_write(data, offset)?;
        Ok(())
    }
}
