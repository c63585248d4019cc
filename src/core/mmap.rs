use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Mmap, MmapOptions};

use crate::core::{Error, Result};

/// Read-only mapping of a whole file.
pub struct MmapFile {
    _file: File,
    map: Mmap,
    len: usize,
}

impl MmapFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(Error::Corrupt("empty file"));
        }
        // SAFETY: the bag is opened read-only and never written through this map.
        let map = unsafe { MmapOptions::new().len(len).map(&file)? };
        Ok(Self {
            _file: file,
            map,
            len,
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.map
    }

    pub fn range(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(Error::Corrupt("range overflow"))?;
        if end > self.len {
            return Err(Error::Corrupt("range out of bounds"));
        }
        Ok(&self.map[offset..end])
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn range_checks_bounds() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").expect("write");

        let map = MmapFile::open(&path).expect("open");
        assert_eq!(map.len(), 10);
        assert_eq!(map.range(2, 3).expect("range"), b"234");
        assert!(map.range(8, 3).is_err());
        assert!(map.range(usize::MAX, 2).is_err());
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("empty.bin");
        std::fs::write(&path, b"").expect("write");
        assert!(MmapFile::open(&path).is_err());
    }
}
