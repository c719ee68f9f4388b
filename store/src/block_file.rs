use crate::error::StoreError;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Size of the per-record `[size u64]` header.
pub const RECORD_HEADER_SIZE: u64 = 8;

/// One append-only data segment with a fixed capacity.
///
/// Records are a raw concatenation of `[size u64][payload]`. Offsets handed
/// out by `append` point at the size header; readers know the payload length
/// from the store index and the stored header only serves as a safety check.
#[derive(Debug)]
pub struct BlockFile {
    path: PathBuf,
    file: File,
    current_size: u64,
    capacity: u64,
}

impl BlockFile {
    /// Open or create the segment. Fails if an existing file is already
    /// larger than the configured capacity.
    pub fn open(path: impl Into<PathBuf>, capacity: u64) -> Result<Self, StoreError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let current_size = file.metadata()?.len();
        if current_size > capacity {
            return Err(StoreError::OverCapacity {
                path: path.display().to_string(),
                capacity,
            });
        }
        Ok(BlockFile {
            path,
            file,
            current_size,
            capacity,
        })
    }

    /// Whether a payload of `size` bytes fits, header included.
    pub fn can_fit(&self, size: u64) -> bool {
        self.current_size + RECORD_HEADER_SIZE + size <= self.capacity
    }

    /// Append one record and flush it. Returns the offset of the record's
    /// size header. A failed or partial write truncates back to the
    /// pre-write size so the file never holds a torn record.
    pub fn append(&mut self, payload: &[u8]) -> Result<u64, StoreError> {
        let size = payload.len() as u64;
        if !self.can_fit(size) {
            return Err(StoreError::RecordTooLarge {
                size,
                current: self.current_size,
                capacity: self.capacity,
            });
        }

        let offset = self.current_size;
        let result = self.write_record(offset, payload);
        if let Err(err) = result {
            // Roll back a torn record; the file stays consistent at its
            // pre-write size.
            let _ = self.file.set_len(offset);
            return Err(err);
        }

        self.current_size = offset + RECORD_HEADER_SIZE + size;
        self.file.sync_data()?;
        Ok(offset)
    }

    fn write_record(&mut self, offset: u64, payload: &[u8]) -> Result<(), StoreError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_u64::<BigEndian>(payload.len() as u64)?;
        self.file.write_all(payload)?;
        Ok(())
    }

    /// Read the payload of the record whose header sits at `offset`. The
    /// caller supplies the payload length from the index; the stored header
    /// must agree.
    pub fn read_at(&mut self, offset: u64, size: u64) -> Result<Vec<u8>, StoreError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let header = self.file.read_u64::<BigEndian>()?;
        if header != size {
            return Err(StoreError::RecordMismatch {
                offset,
                header,
                expected: size,
            });
        }
        let mut payload = vec![0u8; size as usize];
        self.file.read_exact(&mut payload)?;
        Ok(payload)
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn opens_fresh_file() {
        let dir = tempdir().unwrap();
        let file = BlockFile::open(dir.path().join("seg.dat"), 1024).unwrap();
        assert_eq!(file.current_size(), 0);
    }

    #[test]
    fn append_then_read_back() {
        let dir = tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("seg.dat"), 1024).unwrap();

        let offset = file.append(b"first record").unwrap();
        assert_eq!(offset, 0);
        assert_eq!(
            file.current_size(),
            RECORD_HEADER_SIZE + b"first record".len() as u64
        );

        let payload = file.read_at(offset, b"first record".len() as u64).unwrap();
        assert_eq!(payload, b"first record");
    }

    #[test]
    fn offsets_advance_per_record() {
        let dir = tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("seg.dat"), 1024).unwrap();

        let first = file.append(b"aaaa").unwrap();
        let second = file.append(b"bbbbbb").unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, RECORD_HEADER_SIZE + 4);

        assert_eq!(file.read_at(second, 6).unwrap(), b"bbbbbb");
        assert_eq!(file.read_at(first, 4).unwrap(), b"aaaa");
    }

    #[test]
    fn can_fit_accounts_for_header() {
        let dir = tempdir().unwrap();
        let file = BlockFile::open(dir.path().join("seg.dat"), 20).unwrap();
        assert!(file.can_fit(12));
        assert!(!file.can_fit(13));
    }

    #[test]
    fn rejects_record_over_capacity() {
        let dir = tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("seg.dat"), 16).unwrap();
        let err = file.append(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, StoreError::RecordTooLarge { .. }));
        assert_eq!(file.current_size(), 0);
    }

    #[test]
    fn header_mismatch_is_detected() {
        let dir = tempdir().unwrap();
        let mut file = BlockFile::open(dir.path().join("seg.dat"), 1024).unwrap();
        let offset = file.append(b"payload").unwrap();
        let err = file.read_at(offset, 3).unwrap_err();
        assert!(matches!(err, StoreError::RecordMismatch { .. }));
    }

    #[test]
    fn reopen_preserves_size_and_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");

        let offset = {
            let mut file = BlockFile::open(&path, 1024).unwrap();
            file.append(b"persistent").unwrap()
        };

        let mut reopened = BlockFile::open(&path, 1024).unwrap();
        assert_eq!(
            reopened.current_size(),
            RECORD_HEADER_SIZE + b"persistent".len() as u64
        );
        assert_eq!(reopened.read_at(offset, 10).unwrap(), b"persistent");
    }

    #[test]
    fn rejects_oversized_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        {
            let mut file = BlockFile::open(&path, 1024).unwrap();
            file.append(&[1u8; 100]).unwrap();
        }
        let err = BlockFile::open(&path, 50).unwrap_err();
        assert!(matches!(err, StoreError::OverCapacity { .. }));
    }
}
