use crate::error::{DbError, DbResult};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Positional page I/O on one backing file.
///
/// The file is a raw concatenation of fixed-size pages with no header, so the
/// page count is derived from the file length alone.
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    /// Open `path` for reading and writing, creating it if missing.
    pub fn open(path: &Path, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self { file, page_size })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read page `page_number` into `buf`.
    ///
    /// A read that hits end of file leaves the rest of `buf` zeroed. Returns
    /// the number of bytes actually read from the file.
    pub fn read_page(&mut self, page_number: u32, buf: &mut [u8]) -> DbResult<usize> {
        self.check_len(buf.len())?;

        self.file.seek(SeekFrom::Start(self.page_offset(page_number)))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        buf[filled..].fill(0);
        Ok(filled)
    }

    /// Write a full page image at page `page_number`, extending the file if
    /// needed.
    pub fn write_page(&mut self, page_number: u32, data: &[u8]) -> DbResult<()> {
        self.check_len(data.len())?;

        self.file.seek(SeekFrom::Start(self.page_offset(page_number)))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }

    pub fn file_len(&self) -> DbResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// `ceil(file_len / page_size)`: a trailing partial page counts.
    pub fn num_pages(&self) -> DbResult<u32> {
        let len = self.file_len()?;
        Ok(len.div_ceil(self.page_size as u64) as u32)
    }

    fn page_offset(&self, page_number: u32) -> u64 {
        page_number as u64 * self.page_size as u64
    }

    fn check_len(&self, len: usize) -> DbResult<()> {
        if len != self.page_size {
            return Err(DbError::Format(format!(
                "page buffer must be {} bytes, got {}",
                self.page_size, len
            )));
        }
        Ok(())
    }
}
