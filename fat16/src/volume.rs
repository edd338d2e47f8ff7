// The FAT16 image handle

use std::path::Path;

use fatimg_core::{FatError, ImageFile};
use log::{debug, info};

use crate::boot_sector::{Region, VolumeLayout};
use crate::types::DirBase;

/// An open FAT16 image.
///
/// The handle exclusively owns the backing file; the region map is
/// parsed once at open and the current directory starts at the root.
/// All operations are synchronous and positioned. Mutating operations
/// write in place with no transactional barrier: on an I/O failure
/// mid-operation the image may be left inconsistent (for example with
/// diverged FAT copies) and is not rolled back. Callers must treat
/// operations as atomic on success only and must not let any other
/// writer touch the image while the handle is open.
pub struct Fat16Volume {
    pub(crate) img: ImageFile,
    pub(crate) layout: VolumeLayout,
    pub(crate) current_dir: DirBase,
}

impl Fat16Volume {
    /// Open an image file read-write and parse its region map.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, FatError> {
        let path = path.as_ref();
        info!("Opening FAT16 image: {}", path.display());

        let mut img = ImageFile::open(path)?;
        let layout = VolumeLayout::read(&mut img)?;
        debug!(
            "Region map: fat @ {:#x}+{:#x}, root @ {:#x}+{:#x}, data @ {:#x}+{:#x}",
            layout.fat.offset,
            layout.fat.len,
            layout.root_dir.offset,
            layout.root_dir.len,
            layout.data.offset,
            layout.data.len,
        );

        Ok(Self {
            img,
            layout,
            current_dir: DirBase::Root,
        })
    }

    /// Close the image. Dropping the handle has the same effect.
    pub fn close(self) {}

    /// The parsed region map and common sizes.
    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// Byte region a directory's entries live in: the whole root region,
    /// or one cluster for a subdirectory.
    pub(crate) fn dir_region(&self, base: DirBase) -> Region {
        match base {
            DirBase::Root => self.layout.root_dir,
            DirBase::Cluster(cluster) => Region {
                offset: self.layout.cluster_offset(cluster),
                len: self.layout.bytes_per_cluster,
            },
        }
    }
}
