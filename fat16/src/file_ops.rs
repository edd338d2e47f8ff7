// The public filesystem operations
//
// Mutating operations write in place; there is no rollback on a failed
// host write, so a mid-operation error can leave the image needing a
// consistency check.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use fatimg_core::FatError;
use log::{debug, info};

use crate::boot_sector::DIR_ENTRY_SIZE;
use crate::directory::{
    self, ENTRY_DELETED, ENTRY_FREE, OFF_ATTRIBUTES, OFF_FILE_SIZE, OFF_FIRST_CLUSTER, attr,
};
use crate::fat_table::FAT_EOC;
use crate::lfn::{self, LAST_LONG_ENTRY, LFN_CHECKSUM_OFFSET, LFN_ORDINAL_MASK};
use crate::types::{Cluster, DirBase, EntryOffset};
use crate::volume::Fat16Volume;

/// Result of `make_entry`: where the 8.3 entry landed, the directory it
/// landed in, and the FAT slot reserved for it.
struct CreatedEntry {
    entry: EntryOffset,
    parent: DirBase,
    cluster: Cluster,
}

impl Fat16Volume {
    /// Change the current directory. A bare `/` (or a path of only
    /// separators) selects the root region.
    pub fn change_dir(&mut self, path: &str) -> Result<(), FatError> {
        debug!("change_dir: {}", path);
        match self.resolve_entry(path)? {
            None => self.current_dir = DirBase::Root,
            Some((entry, _)) => {
                let attrs = self.img.read_u8(entry.0 + OFF_ATTRIBUTES)?;
                if attrs & attr::DIRECTORY == 0 {
                    return Err(FatError::NotADirectory(path.to_string()));
                }
                self.current_dir = self.entry_dir_base(entry)?;
            }
        }
        Ok(())
    }

    /// Names in a directory, in on-disk order. `.` lists the current
    /// directory. Subdirectory listings include their `.` and `..`
    /// entries.
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<String>, FatError> {
        let base = if path == "." {
            self.current_dir
        } else {
            match self.resolve_entry(path)? {
                None => DirBase::Root,
                Some((entry, _)) => match self.entry_dir_base(entry)? {
                    // A zero starting cluster reads as the root region,
                    // whatever the attribute byte claims
                    DirBase::Root => DirBase::Root,
                    base => {
                        let attrs = self.img.read_u8(entry.0 + OFF_ATTRIBUTES)?;
                        if attrs & attr::DIRECTORY == 0 {
                            return Err(FatError::NotADirectory(path.to_string()));
                        }
                        base
                    }
                },
            }
        };

        let region = self.dir_region(base);
        let mut names = Vec::new();
        let mut i = 0u64;
        while i + DIR_ENTRY_SIZE <= region.len {
            let off = EntryOffset(region.offset + i);
            let first = self.img.read_u8(off.0)?;
            if first == ENTRY_FREE || first == ENTRY_DELETED {
                i += DIR_ENTRY_SIZE;
                continue;
            }
            let attrs = self.img.read_u8(off.0 + OFF_ATTRIBUTES)?;
            if let Some(name) = self.read_entry_name(off)? {
                names.push(name);
            }
            if attrs == attr::LFN {
                // Skip the chain and its 8.3 shadow in one step
                let chain_len = ((first & LFN_ORDINAL_MASK) as u64).max(1);
                i += (chain_len + 1) * DIR_ENTRY_SIZE;
            } else {
                i += DIR_ENTRY_SIZE;
            }
        }
        Ok(names)
    }

    /// Copy a file out of the image into `out_path` (created, or
    /// truncated if it exists).
    pub fn read_file<P: AsRef<Path>>(&mut self, src_path: &str, out_path: P) -> Result<(), FatError> {
        debug!("read_file: {}", src_path);
        let (entry, _) = self
            .resolve_entry(src_path)?
            .ok_or_else(|| FatError::IsADirectory(src_path.to_string()))?;

        let attrs = self.img.read_u8(entry.0 + OFF_ATTRIBUTES)?;
        if attrs & attr::DIRECTORY != 0 {
            return Err(FatError::IsADirectory(src_path.to_string()));
        }

        let size = self.img.read_u32_le(entry.0 + OFF_FILE_SIZE)? as u64;
        let first = self.img.read_u16_le(entry.0 + OFF_FIRST_CLUSTER)?;

        let mut out = File::create(out_path)?;
        if first >= 2 {
            let chain = self.cluster_chain(Cluster(first))?;
            let mut remaining = size;
            for cluster in chain {
                if remaining == 0 {
                    break;
                }
                let n = remaining.min(self.layout.bytes_per_cluster);
                let data = self.img.read_at(self.layout.cluster_offset(cluster), n as usize)?;
                out.write_all(&data)?;
                remaining -= n;
            }
        }
        Ok(())
    }

    /// Create an empty file. One cluster is reserved for it up front.
    pub fn make_empty_file(&mut self, path: &str) -> Result<(), FatError> {
        info!("make_empty_file: {}", path);
        self.make_entry(path)?;
        Ok(())
    }

    /// Create a directory with its `.` and `..` entries.
    pub fn make_dir(&mut self, path: &str) -> Result<(), FatError> {
        info!("make_dir: {}", path);
        let created = self.make_entry(path)?;

        let attrs = self.img.read_u8(created.entry.0 + OFF_ATTRIBUTES)? | attr::DIRECTORY;
        self.img.write_at(created.entry.0 + OFF_ATTRIBUTES, &[attrs])?;

        self.clear_cluster(created.cluster)?;

        let parent_cluster = match created.parent {
            DirBase::Root => Cluster::NONE,
            DirBase::Cluster(cluster) => cluster,
        };
        let base = self.layout.cluster_offset(created.cluster);
        let dot = directory::encode_entry(b".          ", attr::DIRECTORY, created.cluster, 0);
        let dotdot = directory::encode_entry(b"..         ", attr::DIRECTORY, parent_cluster, 0);
        self.img.write_at(base, &dot)?;
        self.img.write_at(base + DIR_ENTRY_SIZE, &dotdot)?;
        Ok(())
    }

    /// Copy a host file into the image at `img_path`.
    pub fn add_file<P: AsRef<Path>>(&mut self, host_path: P, img_path: &str) -> Result<(), FatError> {
        let host_path = host_path.as_ref();
        info!("add_file: {} -> {}", host_path.display(), img_path);

        let size = std::fs::metadata(host_path)?.len();
        if size > u32::MAX as u64 {
            return Err(FatError::TooLarge(size));
        }

        // Allocate every needed cluster in one scan pass, then create the
        // entry; make_entry reserves the lowest free slot, which is the
        // same slot the scan just returned first, and write_chain links
        // it below.
        let count = size.div_ceil(self.layout.bytes_per_cluster).max(1) as usize;
        let clusters = self.find_free_clusters(count)?;

        let created = self.make_entry(img_path)?;
        if created.cluster != clusters[0] {
            return Err(FatError::Invalid(
                "entry cluster does not match the allocation scan".to_string(),
            ));
        }

        self.img
            .write_at(created.entry.0 + OFF_FILE_SIZE, &(size as u32).to_le_bytes())?;
        self.img
            .write_at(created.entry.0 + OFF_FIRST_CLUSTER, &clusters[0].0.to_le_bytes())?;

        let mut src = File::open(host_path)?;
        let sector = self.layout.bytes_per_sector as usize;
        let mut remaining = size;
        for &cluster in &clusters {
            self.clear_cluster(cluster)?;
            let mut off = self.layout.cluster_offset(cluster);
            let mut cluster_left = self.layout.bytes_per_cluster;
            // One sector at a time
            while cluster_left > 0 && remaining > 0 {
                let n = sector.min(remaining as usize).min(cluster_left as usize);
                let mut buf = vec![0u8; n];
                src.read_exact(&mut buf)?;
                self.img.write_at(off, &buf)?;
                off += n as u64;
                cluster_left -= n as u64;
                remaining -= n as u64;
            }
        }

        self.write_chain(&clusters)?;
        Ok(())
    }

    /// Remove a file or directory. Directories are emptied recursively
    /// first; `.` and `..` entries are only marked deleted, their
    /// clusters belong to the directories they alias.
    pub fn remove(&mut self, path: &str) -> Result<(), FatError> {
        info!("remove: {}", path);
        let (entry, parent) = self
            .resolve_entry(path)?
            .ok_or_else(|| FatError::Invalid("cannot remove the root directory".to_string()))?;

        let last_segment = path.rsplit('/').find(|s| !s.is_empty()).unwrap_or("");
        if last_segment == "." || last_segment == ".." {
            self.img.write_at(entry.0, &[ENTRY_DELETED])?;
            return Ok(());
        }

        let attrs = self.img.read_u8(entry.0 + OFF_ATTRIBUTES)?;
        if attrs & attr::DIRECTORY != 0 {
            let base = path.trim_end_matches('/');
            for child in self.list_dir(path)? {
                self.remove(&format!("{}/{}", base, child))?;
            }
        }

        // Retire the 8.3 entry and any LFN slots stacked above it
        self.img.write_at(entry.0, &[ENTRY_DELETED])?;
        let region = self.dir_region(parent);
        let mut off = entry.0;
        while off >= region.offset + DIR_ENTRY_SIZE {
            off -= DIR_ENTRY_SIZE;
            let first = self.img.read_u8(off)?;
            let slot_attrs = self.img.read_u8(off + OFF_ATTRIBUTES)?;
            if slot_attrs != attr::LFN || first == ENTRY_DELETED {
                break;
            }
            self.img.write_at(off, &[ENTRY_DELETED])?;
        }

        let first_cluster = self.img.read_u16_le(entry.0 + OFF_FIRST_CLUSTER)?;
        if first_cluster >= 2 {
            self.free_chain(Cluster(first_cluster))?;
        }
        Ok(())
    }

    /// Move `src_path` into the directory `dst_path` resolves to. The
    /// entry block is relocated as-is; the data chain is untouched. The
    /// rename form (a destination that does not resolve) is not
    /// implemented.
    pub fn move_entry(&mut self, src_path: &str, dst_path: &str) -> Result<(), FatError> {
        info!("move: {} -> {}", src_path, dst_path);
        let (src_entry, src_parent) = self
            .resolve_entry(src_path)?
            .ok_or_else(|| FatError::Invalid("cannot move the root directory".to_string()))?;

        let dst_base = match self.resolve_entry(dst_path) {
            Ok(None) => DirBase::Root,
            Ok(Some((entry, _))) => {
                let attrs = self.img.read_u8(entry.0 + OFF_ATTRIBUTES)?;
                if attrs & attr::DIRECTORY == 0 {
                    return Err(FatError::Exists(dst_path.to_string()));
                }
                self.entry_dir_base(entry)?
            }
            Err(FatError::NotFound(_)) => {
                if dst_path.ends_with('/') && self.parent_resolves(dst_path)? {
                    return Err(FatError::Unsupported(
                        "renaming while moving is not implemented".to_string(),
                    ));
                }
                return Err(FatError::NotFound(dst_path.to_string()));
            }
            Err(e) => return Err(e),
        };

        // Measure the LFN chain stacked above the source's 8.3 entry
        let src_region = self.dir_region(src_parent);
        let mut chain_len = 0u64;
        let mut off = src_entry.0;
        while off >= src_region.offset + DIR_ENTRY_SIZE {
            off -= DIR_ENTRY_SIZE;
            let first = self.img.read_u8(off)?;
            let slot_attrs = self.img.read_u8(off + OFF_ATTRIBUTES)?;
            if slot_attrs != attr::LFN || first == ENTRY_DELETED {
                break;
            }
            chain_len += 1;
            if first & LAST_LONG_ENTRY != 0 {
                break;
            }
        }

        let block_start = src_entry.0 - chain_len * DIR_ENTRY_SIZE;
        let total = chain_len + 1;
        let mut block = self
            .img
            .read_at(block_start, (total * DIR_ENTRY_SIZE) as usize)?;

        // Resolve 8.3 collisions against the destination; a renamed
        // shadow invalidates the chain checksum, so recompute it
        let short_at = (chain_len * DIR_ENTRY_SIZE) as usize;
        let mut short = [0u8; 11];
        short.copy_from_slice(&block[short_at..short_at + 11]);
        let mut renamed = false;
        while self
            .find_name(dst_base, &directory::parse_83_name(&short))?
            .is_some()
        {
            directory::increment_short_name(&mut short)?;
            renamed = true;
        }
        if renamed {
            debug!("shadow renamed to {}", directory::parse_83_name(&short));
            block[short_at..short_at + 11].copy_from_slice(&short);
            let sum = lfn::lfn_checksum(&short);
            for slot in 0..chain_len as usize {
                block[slot * 32 + LFN_CHECKSUM_OFFSET] = sum;
            }
        }

        let free = self
            .find_free_run(dst_base, total)?
            .ok_or_else(|| FatError::NoSpace("no free directory slots in destination".to_string()))?;
        self.img.write_at(free.0, &block)?;

        for slot in 0..total {
            self.img
                .write_at(block_start + slot * DIR_ENTRY_SIZE, &[ENTRY_DELETED])?;
        }

        // A moved directory's `..` entry must follow it to the new parent
        let attrs = block[short_at + OFF_ATTRIBUTES as usize];
        if attrs & attr::DIRECTORY != 0 {
            let cluster = u16::from_le_bytes([
                block[short_at + OFF_FIRST_CLUSTER as usize],
                block[short_at + OFF_FIRST_CLUSTER as usize + 1],
            ]);
            if cluster >= 2 {
                let parent_cluster = match dst_base {
                    DirBase::Root => 0u16,
                    DirBase::Cluster(c) => c.0,
                };
                let dotdot = self.layout.cluster_offset(Cluster(cluster)) + DIR_ENTRY_SIZE;
                self.img
                    .write_at(dotdot + OFF_FIRST_CLUSTER, &parent_cluster.to_le_bytes())?;
            }
        }
        Ok(())
    }

    /// Whether the parent directory of `path` resolves.
    fn parent_resolves(&mut self, path: &str) -> Result<bool, FatError> {
        let trimmed = path.trim_end_matches('/');
        match trimmed.rfind('/') {
            // Parent is the root, or the current directory
            Some(0) | None => Ok(true),
            Some(pos) => match self.resolve_entry(&trimmed[..pos]) {
                Ok(_) => Ok(true),
                Err(FatError::NotFound(_)) => Ok(false),
                Err(e) => Err(e),
            },
        }
    }

    /// Shared creation path: place a named entry block in its parent
    /// directory and reserve one terminated FAT slot for it. Returns the
    /// offset of the 8.3 entry.
    fn make_entry(&mut self, path: &str) -> Result<CreatedEntry, FatError> {
        let path = path.strip_suffix('/').unwrap_or(path);
        if path.is_empty() {
            return Err(FatError::Invalid("empty entry name".to_string()));
        }

        let (dir_path, file_name) = match path.rfind('/') {
            Some(0) => ("/", &path[1..]),
            Some(pos) => (&path[..pos], &path[pos + 1..]),
            None => ("", path),
        };
        if file_name.is_empty() {
            return Err(FatError::Invalid("empty entry name".to_string()));
        }

        let parent = if dir_path.is_empty() {
            self.current_dir
        } else {
            match self.resolve_entry(dir_path)? {
                None => DirBase::Root,
                Some((entry, _)) => {
                    let attrs = self.img.read_u8(entry.0 + OFF_ATTRIBUTES)?;
                    if attrs & attr::DIRECTORY == 0 {
                        return Err(FatError::NotADirectory(dir_path.to_string()));
                    }
                    self.entry_dir_base(entry)?
                }
            }
        };

        if self.find_name(parent, file_name)?.is_some() {
            return Err(FatError::Exists(file_name.to_string()));
        }

        // Settle the 8.3 shadow first; whether the entry needs a long
        // name chain depends on the shadow that survives collisions
        let mut short = directory::short_name_for(file_name)?;
        while self
            .find_name(parent, &directory::parse_83_name(&short))?
            .is_some()
        {
            directory::increment_short_name(&mut short)?;
        }

        let slots = lfn::block_slots(file_name, &short) as u64;
        let free = self.find_free_run(parent, slots)?.ok_or_else(|| {
            FatError::NoSpace(format!("no run of {} free directory slots", slots))
        })?;

        let cluster = self.find_free_clusters(1)?[0];
        self.write_fat_entry(cluster, FAT_EOC)?;

        let block = lfn::build_name_block(file_name, &short, 0, cluster, 0);
        self.img.write_at(free.0, &block)?;

        let entry = EntryOffset(free.0 + (slots - 1) * DIR_ENTRY_SIZE);
        debug!("created entry for {} at {:#x}", file_name, entry.0);
        Ok(CreatedEntry {
            entry,
            parent,
            cluster,
        })
    }
}
