// Typed values for FAT16 offset arithmetic
// Cluster numbers, entry offsets and directory bases never interconvert
// directly; conversions go through the volume layout.

/// Cluster number in the data region. Clusters are numbered from 2;
/// 0 marks "no cluster" (zero-length file, or the root as a parent).
/// The same number indexes the cluster's 16-bit FAT slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cluster(pub u16);

impl Cluster {
    pub const NONE: Cluster = Cluster(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Absolute byte offset of a 32-byte directory entry in the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOffset(pub u64);

/// Iteration domain of one directory: the fixed root region, or the
/// first data cluster of a subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirBase {
    Root,
    Cluster(Cluster),
}
