// FAT slot access and cluster chain management
// Reads go through the first FAT copy; every write is mirrored across
// all copies so the copies stay bit-identical.

use fatimg_core::FatError;
use log::{debug, trace};

use crate::types::Cluster;
use crate::volume::Fat16Volume;

/// Free slot.
pub const FAT_FREE: u16 = 0x0000;
/// Bad cluster marker.
pub const FAT_BAD: u16 = 0xFFF7;
/// Lowest value that terminates a chain.
pub const FAT_EOC_MIN: u16 = 0xFFF8;
/// The terminator written at the end of a chain.
pub const FAT_EOC: u16 = 0xFFFF;

/// Allocation scans start here; slots 0 and 1 are reserved and slot 2
/// is left alone.
const FIRST_SCAN_SLOT: u16 = 3;

impl Fat16Volume {
    /// Read cluster `n`'s slot from the first FAT copy.
    pub(crate) fn read_fat_entry(&mut self, cluster: Cluster) -> Result<u16, FatError> {
        let off = self.layout.fat_slot_offset(0, cluster);
        self.img.read_u16_le(off)
    }

    /// Write cluster `n`'s slot in every FAT copy.
    pub(crate) fn write_fat_entry(&mut self, cluster: Cluster, value: u16) -> Result<(), FatError> {
        for copy in 0..self.layout.fat_copies {
            let off = self.layout.fat_slot_offset(copy, cluster);
            self.img.write_at(off, &value.to_le_bytes())?;
        }
        Ok(())
    }

    /// Collect the first `count` free slots in one monotonic scan from
    /// slot 3 upward; a slot is never returned twice by the same call.
    /// Nothing is reserved -- the caller links or terminates the slots
    /// before allocating again.
    pub(crate) fn find_free_clusters(&mut self, count: usize) -> Result<Vec<Cluster>, FatError> {
        let limit = self
            .layout
            .slots_per_fat()
            .min(self.layout.max_cluster() as u64 + 1);

        let mut found = Vec::with_capacity(count);
        let mut slot = FIRST_SCAN_SLOT;
        while (slot as u64) < limit && found.len() < count {
            if self.read_fat_entry(Cluster(slot))? == FAT_FREE {
                trace!("free FAT slot {}", slot);
                found.push(Cluster(slot));
            }
            slot += 1;
        }
        if found.len() < count {
            return Err(FatError::NoSpace(format!(
                "need {} free clusters, found {}",
                count,
                found.len()
            )));
        }
        debug!("found {} free cluster(s) starting at {}", count, found[0].0);
        Ok(found)
    }

    /// Link `chain[i] -> chain[i+1]` and terminate the last slot, in
    /// every FAT copy.
    pub(crate) fn write_chain(&mut self, chain: &[Cluster]) -> Result<(), FatError> {
        for (i, &cluster) in chain.iter().enumerate() {
            let value = match chain.get(i + 1) {
                Some(next) => next.0,
                None => FAT_EOC,
            };
            self.write_fat_entry(cluster, value)?;
        }
        Ok(())
    }

    /// Walk the chain from `start` via the first FAT copy and zero every
    /// visited slot in all copies.
    pub(crate) fn free_chain(&mut self, start: Cluster) -> Result<(), FatError> {
        let mut current = start;
        let mut steps = 0u64;
        loop {
            let next = self.read_fat_entry(current)?;
            self.write_fat_entry(current, FAT_FREE)?;
            if next >= FAT_EOC_MIN {
                break;
            }
            if next < 2 || next == FAT_BAD {
                return Err(FatError::Invalid(format!(
                    "chain from cluster {} links to slot value {:#06x}",
                    start.0, next
                )));
            }
            steps += 1;
            if steps > self.layout.max_cluster() as u64 {
                return Err(FatError::Invalid(format!(
                    "chain from cluster {} does not terminate",
                    start.0
                )));
            }
            current = Cluster(next);
        }
        Ok(())
    }

    /// Collect the chain starting at `start` without modifying it,
    /// terminator excluded.
    pub(crate) fn cluster_chain(&mut self, start: Cluster) -> Result<Vec<Cluster>, FatError> {
        let mut chain = vec![start];
        let mut current = start;
        loop {
            let next = self.read_fat_entry(current)?;
            if next >= FAT_EOC_MIN {
                break;
            }
            if next < 2 || next == FAT_BAD {
                return Err(FatError::Invalid(format!(
                    "chain from cluster {} links to slot value {:#06x}",
                    start.0, next
                )));
            }
            if chain.len() as u64 > self.layout.max_cluster() as u64 {
                return Err(FatError::Invalid(format!(
                    "chain from cluster {} does not terminate",
                    start.0
                )));
            }
            current = Cluster(next);
            chain.push(current);
        }
        Ok(chain)
    }

    /// Zero every byte of cluster `n`.
    pub(crate) fn clear_cluster(&mut self, cluster: Cluster) -> Result<(), FatError> {
        let zeros = vec![0u8; self.layout.bytes_per_cluster as usize];
        self.img.write_at(self.layout.cluster_offset(cluster), &zeros)
    }
}
