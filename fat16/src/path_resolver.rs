// Directory region walking and path resolution
//
// A directory's iteration domain is the fixed root region or one data
// cluster; name lookups scan the whole domain in 32-byte steps, reading
// long-name chains where they occur.

use fatimg_core::FatError;
use log::trace;

use crate::boot_sector::DIR_ENTRY_SIZE;
use crate::directory::{self, ENTRY_DELETED, ENTRY_FREE, OFF_ATTRIBUTES, OFF_FIRST_CLUSTER, attr};
use crate::lfn::{self, LFN_ORDINAL_MASK};
use crate::types::{Cluster, DirBase, EntryOffset};
use crate::volume::Fat16Volume;

impl Fat16Volume {
    /// Display name of the entry at `off`: the decoded long name for an
    /// LFN head, the trimmed 8.3 name for a plain entry, `None` for
    /// free and deleted slots.
    pub(crate) fn read_entry_name(&mut self, off: EntryOffset) -> Result<Option<String>, FatError> {
        let first = self.img.read_u8(off.0)?;
        if first == ENTRY_FREE || first == ENTRY_DELETED {
            return Ok(None);
        }
        let attrs = self.img.read_u8(off.0 + OFF_ATTRIBUTES)?;
        if attrs == attr::LFN {
            let chain_len = (first & LFN_ORDINAL_MASK) as usize;
            if chain_len == 0 {
                return Ok(None);
            }
            let chain = self.img.read_at(off.0, chain_len * 32)?;
            let name = lfn::decode_lfn_name(&chain);
            return Ok(if name.is_empty() { None } else { Some(name) });
        }

        let raw = self.img.read_at(off.0, 11)?;
        let mut name = [0u8; 11];
        name.copy_from_slice(&raw);
        Ok(Some(directory::parse_83_name(&name)))
    }

    /// Find `name` in the directory at `base`. Returns the offset of
    /// the 8.3 entry (for long-named files: the entry after the chain).
    /// The scan covers the whole region; later entries may follow a
    /// never-used slot.
    pub(crate) fn find_name(
        &mut self,
        base: DirBase,
        name: &str,
    ) -> Result<Option<EntryOffset>, FatError> {
        let region = self.dir_region(base);
        let mut i = 0u64;
        while i + DIR_ENTRY_SIZE <= region.len {
            let off = region.offset + i;
            let first = self.img.read_u8(off)?;
            if first == ENTRY_FREE || first == ENTRY_DELETED {
                i += DIR_ENTRY_SIZE;
                continue;
            }

            let attrs = self.img.read_u8(off + OFF_ATTRIBUTES)?;
            if attrs == attr::LFN {
                let stored = (first & LFN_ORDINAL_MASK) as u64;
                // Clamp a corrupt ordinal to the slots left in the region
                let chain_len = stored.max(1).min((region.len - i) / DIR_ENTRY_SIZE);
                let chain = self.img.read_at(off, (chain_len * DIR_ENTRY_SIZE) as usize)?;
                let candidate = lfn::decode_lfn_name(&chain);
                trace!("lfn candidate at {:#x}: {}", off, candidate);
                if candidate == name {
                    return Ok(Some(EntryOffset(off + chain_len * DIR_ENTRY_SIZE)));
                }
                // Consume the chain slots; the 8.3 entry that follows is
                // visited on the next iteration
                i += chain_len * DIR_ENTRY_SIZE;
            } else {
                let raw = self.img.read_at(off, 11)?;
                let mut stored = [0u8; 11];
                stored.copy_from_slice(&raw);
                if directory::parse_83_name(&stored) == name {
                    return Ok(Some(EntryOffset(off)));
                }
                i += DIR_ENTRY_SIZE;
            }
        }
        Ok(None)
    }

    /// First run of `count` adjacent free-or-deleted slots in `base`.
    pub(crate) fn find_free_run(
        &mut self,
        base: DirBase,
        count: u64,
    ) -> Result<Option<EntryOffset>, FatError> {
        let region = self.dir_region(base);
        if count == 0 || count * DIR_ENTRY_SIZE > region.len {
            return Ok(None);
        }

        let mut i = 0u64;
        while i + count * DIR_ENTRY_SIZE <= region.len {
            let mut fits = true;
            for j in 0..count {
                let first = self.img.read_u8(region.offset + i + j * DIR_ENTRY_SIZE)?;
                if first != ENTRY_FREE && first != ENTRY_DELETED {
                    fits = false;
                    break;
                }
            }
            if fits {
                return Ok(Some(EntryOffset(region.offset + i)));
            }
            i += DIR_ENTRY_SIZE;
        }
        Ok(None)
    }

    /// Walk a slash-separated path to the offset of its directory entry
    /// and the directory base it was found in. `Ok(None)` means the path
    /// names the root itself (bare `/`, empty, or only separators).
    pub(crate) fn resolve_entry(
        &mut self,
        path: &str,
    ) -> Result<Option<(EntryOffset, DirBase)>, FatError> {
        let mut base = if path.starts_with('/') {
            DirBase::Root
        } else {
            self.current_dir
        };

        let mut found: Option<(EntryOffset, DirBase)> = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if let Some((entry, _)) = found {
                base = self.entry_dir_base(entry)?;
            }
            let off = self
                .find_name(base, segment)?
                .ok_or_else(|| FatError::NotFound(path.to_string()))?;
            found = Some((off, base));
        }
        Ok(found)
    }

    /// Directory base named by an entry's starting cluster; cluster 0
    /// points back at the root region.
    pub(crate) fn entry_dir_base(&mut self, entry: EntryOffset) -> Result<DirBase, FatError> {
        let cluster = self.img.read_u16_le(entry.0 + OFF_FIRST_CLUSTER)?;
        if cluster == 0 {
            return Ok(DirBase::Root);
        }
        if cluster == 1 || cluster > self.layout.max_cluster() {
            return Err(FatError::Invalid(format!(
                "directory entry at {:#x} points at cluster {}",
                entry.0, cluster
            )));
        }
        Ok(DirBase::Cluster(Cluster(cluster)))
    }
}
