//! Memory-mapped store file that grows by doubling

use crate::{Error, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A store file mapped into memory
///
/// Slots are read in place; writes beyond the current size grow the file to
/// at least twice its size before the copy.
pub(crate) struct PagedFile {
    file: File,
    mmap: MmapMut,
    path: PathBuf,
    current_size: usize,
}

impl PagedFile {
    /// Create or open a store file, sizing new files to `initial_size`
    pub(crate) fn open<P: AsRef<Path>>(path: P, initial_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let existing = file.metadata()?.len() as usize;
        let current_size = if existing == 0 {
            file.set_len(initial_size as u64)?;
            initial_size
        } else {
            existing
        };

        // SAFETY: the file is owned by this handle for the life of the mapping
        let mmap = unsafe { MmapOptions::new().len(current_size).map_mut(&file)? };

        tracing::debug!(path = %path.display(), size = current_size, "opened store file");

        Ok(Self {
            file,
            mmap,
            path,
            current_size,
        })
    }

    /// Current file size in bytes
    pub(crate) fn size(&self) -> usize {
        self.current_size
    }

    /// Grow so that `required` bytes fit, doubling at least
    pub(crate) fn ensure_capacity(&mut self, required: usize) -> Result<()> {
        if required <= self.current_size {
            return Ok(());
        }
        let new_size = (self.current_size * 2).max(required);
        self.resize(new_size)
    }

    fn resize(&mut self, new_size: usize) -> Result<()> {
        self.mmap.flush()?;
        self.file.set_len(new_size as u64)?;
        tracing::debug!(
            path = %self.path.display(),
            old_size = self.current_size,
            new_size,
            "grew store file"
        );
        self.current_size = new_size;

        // SAFETY: see `open`; the old mapping is dropped on assignment
        self.mmap = unsafe { MmapOptions::new().len(new_size).map_mut(&self.file)? };
        Ok(())
    }

    /// Bytes at `offset`; `None` when the range lies past the end of the file
    pub(crate) fn slice(&self, offset: usize, size: usize) -> Option<&[u8]> {
        let end = offset.checked_add(size)?;
        if end > self.current_size {
            return None;
        }
        Some(&self.mmap[offset..end])
    }

    /// Mutable bytes at `offset`; the caller grows the file first
    pub(crate) fn slice_mut(&mut self, offset: usize, size: usize) -> Result<&mut [u8]> {
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= self.current_size)
            .ok_or_else(|| {
                Error::storage(format!(
                    "Write beyond file size: offset={}, size={}, file_size={}",
                    offset, size, self.current_size
                ))
            })?;
        Ok(&mut self.mmap[offset..end])
    }

    /// Flush to disk
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_file_gets_initial_size() {
        let dir = TempDir::new().unwrap();
        let file = PagedFile::open(dir.path().join("a.store"), 4096).unwrap();
        assert_eq!(file.size(), 4096);
        assert!(file.slice(4090, 6).is_some());
        assert!(file.slice(4090, 7).is_none());
    }

    #[test]
    fn test_growth_doubles() {
        let dir = TempDir::new().unwrap();
        let mut file = PagedFile::open(dir.path().join("b.store"), 1024).unwrap();
        file.ensure_capacity(1025).unwrap();
        assert_eq!(file.size(), 2048);
        file.ensure_capacity(10_000).unwrap();
        assert_eq!(file.size(), 10_000);
    }

    #[test]
    fn test_contents_survive_growth_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.store");
        {
            let mut file = PagedFile::open(&path, 64).unwrap();
            file.slice_mut(0, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
            file.ensure_capacity(256).unwrap();
            file.slice_mut(200, 2).unwrap().copy_from_slice(&[9, 9]);
            file.flush().unwrap();
        }
        let file = PagedFile::open(&path, 64).unwrap();
        assert_eq!(file.size(), 256);
        assert_eq!(file.slice(0, 4).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(file.slice(200, 2).unwrap(), &[9, 9]);
    }
}
