// Shared fixtures: a minimal blank FAT16 image and raw-offset helpers
// for asserting on-disk state without going through the library.

use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

pub const BYTES_PER_SECTOR: u64 = 512;
pub const SECTORS_PER_FAT: u64 = 12;
pub const FAT_COPIES: u64 = 2;
pub const ROOT_ENTRIES: u64 = 224;
pub const TOTAL_SECTORS: u64 = 2880;

pub const FAT_OFFSET: u64 = BYTES_PER_SECTOR; // one reserved sector
pub const FAT_COPY_LEN: u64 = SECTORS_PER_FAT * BYTES_PER_SECTOR;
pub const ROOT_OFFSET: u64 = FAT_OFFSET + FAT_COPIES * FAT_COPY_LEN;
pub const DATA_OFFSET: u64 = ROOT_OFFSET + ROOT_ENTRIES * 32;

/// Byte offset of cluster `n` in the data region.
pub fn cluster_offset(n: u64) -> u64 {
    DATA_OFFSET + (n - 2) * BYTES_PER_SECTOR
}

/// Byte offset of cluster `n`'s slot in FAT copy `copy`.
pub fn fat_slot(copy: u64, n: u64) -> u64 {
    FAT_OFFSET + copy * FAT_COPY_LEN + n * 2
}

/// Write a blank 1.44 MiB FAT16 volume into a scratch file: 512-byte
/// sectors, 1 sector per cluster, 2 FATs of 12 sectors, 224 root
/// entries.
pub fn blank_image() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create scratch image");

    let mut boot = [0u8; 512];
    boot[0] = 0xEB;
    boot[1] = 0x3C;
    boot[2] = 0x90;
    boot[3..11].copy_from_slice(b"FATIMG  ");
    boot[0x0B..0x0D].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
    boot[0x0D] = 1; // sectors per cluster
    boot[0x0E..0x10].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
    boot[0x10] = FAT_COPIES as u8;
    boot[0x11..0x13].copy_from_slice(&(ROOT_ENTRIES as u16).to_le_bytes());
    boot[0x13..0x15].copy_from_slice(&(TOTAL_SECTORS as u16).to_le_bytes());
    boot[0x15] = 0xF0; // media descriptor
    boot[0x16..0x18].copy_from_slice(&(SECTORS_PER_FAT as u16).to_le_bytes());
    boot[0x36..0x3E].copy_from_slice(b"FAT16   ");
    boot[510] = 0x55;
    boot[511] = 0xAA;

    file.write_all(&boot).expect("write boot sector");
    file.as_file()
        .set_len(TOTAL_SECTORS * BYTES_PER_SECTOR)
        .expect("size image");

    // Media descriptor and end-of-chain markers in slots 0 and 1
    for copy in 0..FAT_COPIES {
        file.as_file_mut()
            .seek(SeekFrom::Start(fat_slot(copy, 0)))
            .unwrap();
        file.as_file_mut()
            .write_all(&[0xF0, 0xFF, 0xFF, 0xFF])
            .unwrap();
    }
    file
}

/// The whole image as bytes, for raw assertions.
pub fn snapshot(path: &Path) -> Vec<u8> {
    fs::read(path).expect("read image")
}

/// Read a little-endian u16 out of a snapshot.
pub fn u16_at(image: &[u8], offset: u64) -> u16 {
    let i = offset as usize;
    u16::from_le_bytes([image[i], image[i + 1]])
}

/// Read a little-endian u32 out of a snapshot.
pub fn u32_at(image: &[u8], offset: u64) -> u32 {
    let i = offset as usize;
    u32::from_le_bytes([image[i], image[i + 1], image[i + 2], image[i + 3]])
}

/// Both FAT copies must be bit-identical after every mutating operation.
pub fn assert_fats_identical(image: &[u8]) {
    let first = &image[FAT_OFFSET as usize..(FAT_OFFSET + FAT_COPY_LEN) as usize];
    let second = &image
        [(FAT_OFFSET + FAT_COPY_LEN) as usize..(FAT_OFFSET + 2 * FAT_COPY_LEN) as usize];
    assert_eq!(first, second, "FAT copies diverged");
}

/// A scratch host file with the given contents.
pub fn host_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create host file");
    file.write_all(contents).expect("write host file");
    file
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
