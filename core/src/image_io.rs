// Positioned byte I/O over a disk image file
// Every access seeks to its absolute offset; there is no buffering layer

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::FatError;

/// Exclusive read-write handle over the backing image file.
///
/// All multi-byte on-disk integers are little-endian; the `read_*_le`
/// helpers accumulate a stored field into its natural value. The handle
/// is released when the value is dropped.
pub struct ImageFile {
    file: File,
}

impl ImageFile {
    /// Open an image file for reading and writing.
    pub fn open(path: &Path) -> Result<Self, FatError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Size of the backing file in bytes.
    pub fn len(&self) -> Result<u64, FatError> {
        Ok(self.file.metadata()?.len())
    }

    /// Read exactly `len` bytes starting at `offset`.
    pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, FatError> {
        let mut buf = vec![0u8; len];
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| FatError::Io { offset, source: e })?;
        self.file
            .read_exact(&mut buf)
            .map_err(|e| FatError::Io { offset, source: e })?;
        Ok(buf)
    }

    /// Write all of `buf` starting at `offset`.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), FatError> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| FatError::Io { offset, source: e })?;
        self.file
            .write_all(buf)
            .map_err(|e| FatError::Io { offset, source: e })?;
        Ok(())
    }

    pub fn read_u8(&mut self, offset: u64) -> Result<u8, FatError> {
        Ok(self.read_at(offset, 1)?[0])
    }

    pub fn read_u16_le(&mut self, offset: u64) -> Result<u16, FatError> {
        let b = self.read_at(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self, offset: u64) -> Result<u32, FatError> {
        let b = self.read_at(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian unsigned field of 1 to 8 bytes.
    pub fn read_int_le(&mut self, offset: u64, len: usize) -> Result<u64, FatError> {
        let bytes = self.read_at(offset, len)?;
        let mut value = 0u64;
        for (i, &b) in bytes.iter().enumerate() {
            value |= (b as u64) << (8 * i);
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn positioned_reads_are_little_endian() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&[0x00, 0x34, 0x12, 0x78, 0x56, 0x00, 0x00]).unwrap();
        let mut img = ImageFile::open(tmp.path()).unwrap();

        assert_eq!(img.read_u16_le(1).unwrap(), 0x1234);
        assert_eq!(img.read_u32_le(1).unwrap(), 0x56781234);
        assert_eq!(img.read_int_le(1, 3).unwrap(), 0x781234);
    }

    #[test]
    fn write_then_read_back() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(16).unwrap();
        let mut img = ImageFile::open(tmp.path()).unwrap();

        img.write_at(4, &0xBEEFu16.to_le_bytes()).unwrap();
        assert_eq!(img.read_u16_le(4).unwrap(), 0xBEEF);
        assert_eq!(img.read_u8(4).unwrap(), 0xEF);
    }

    #[test]
    fn read_past_end_reports_offset() {
        let tmp = NamedTempFile::new().unwrap();
        tmp.as_file().set_len(8).unwrap();
        let mut img = ImageFile::open(tmp.path()).unwrap();

        match img.read_at(6, 8) {
            Err(FatError::Io { offset, .. }) => assert_eq!(offset, 6),
            other => panic!("expected positioned I/O error, got {:?}", other.map(|_| ())),
        }
    }
}
