//! FAT table codec and cluster-chain allocator.
//!
//! A FAT entry is either 2 bytes (FAT16) or 4 bytes (FAT32), addressed
//! by `FATOffset = cluster * entry_width`. On FAT32 the top 4 bits of
//! every 4-byte entry are reserved and must be preserved across a
//! read-modify-write cycle -- only the low 28 bits carry the next-
//! cluster value.
//!
//! Every FAT copy (`BPB_NumFATs`, normally 2) is kept in lockstep: a
//! write to cluster N's entry is mirrored to all copies before the
//! call returns.

use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{trace, warn};

use crate::bpb::{BIOSParameterBlock, FatType};
use crate::cache::{get_block_cache, Cache};
use crate::device::{BlockDevice, DeviceErr};
use crate::{read_le_u16, read_le_u32, BLOCK_SIZE, FREE_CLUSTER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    Io(DeviceErr),
    NoSpace,
    InvalidCluster,
}

impl From<DeviceErr> for FatError {
    fn from(e: DeviceErr) -> Self {
        FatError::Io(e)
    }
}

/// End-of-chain marker callers can match on without re-deriving it from
/// `FatType` every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    Next(u32),
    Eoc,
    Free,
    Bad,
}

pub struct FatTable {
    device: Arc<dyn BlockDevice>,
    fat_type: FatType,
    /// Byte offset of FAT copy 0's first byte.
    fat1_offset: usize,
    /// Byte offset between corresponding entries in consecutive FAT copies.
    fat_copy_stride: usize,
    fat_copies: usize,
    /// First data cluster number, always 2.
    data_cluster_base: u32,
    total_clusters: u32,
}

impl FatTable {
    pub fn new(device: Arc<dyn BlockDevice>, bpb: &BIOSParameterBlock) -> Self {
        Self {
            device,
            fat_type: bpb.fat_type(),
            fat1_offset: bpb.fat1_offset(),
            fat_copy_stride: bpb.fat_size_sectors() * bpb.bytes_per_sector(),
            fat_copies: bpb.fat_cnt(),
            data_cluster_base: 2,
            total_clusters: bpb.data_cluster_cnt() as u32 + 2,
        }
    }

    fn entry_width(&self) -> usize {
        self.fat_type.entry_width()
    }

    fn entry_byte_offset(&self, cluster: u32, copy: usize) -> usize {
        self.fat1_offset + copy * self.fat_copy_stride + cluster as usize * self.entry_width()
    }

    fn read_raw(&self, cluster: u32) -> Result<u32, FatError> {
        let offset = self.entry_byte_offset(cluster, 0);
        let block_id = offset / BLOCK_SIZE;
        let in_block = offset % BLOCK_SIZE;
        let cache = get_block_cache(block_id, Arc::clone(&self.device))?;
        let value = match self.fat_type {
            FatType::Fat16 => cache
                .read()
                .read(in_block, |bytes: &[u8; 2]| read_le_u16(bytes) as u32),
            FatType::Fat32 => cache
                .read()
                .read(in_block, |bytes: &[u8; 4]| read_le_u32(bytes) & 0x0FFF_FFFF),
        };
        Ok(value)
    }

    fn write_raw(&self, cluster: u32, value: u32) -> Result<(), FatError> {
        for copy in 0..self.fat_copies {
            let offset = self.entry_byte_offset(cluster, copy);
            let block_id = offset / BLOCK_SIZE;
            let in_block = offset % BLOCK_SIZE;
            let cache = get_block_cache(block_id, Arc::clone(&self.device))?;
            let mut guard = cache.write();
            match self.fat_type {
                FatType::Fat16 => {
                    guard.modify(in_block, |bytes: &mut [u8; 2]| {
                        *bytes = (value as u16).to_le_bytes();
                    });
                }
                FatType::Fat32 => {
                    // Preserve the reserved top 4 bits across the write.
                    let preserved =
                        guard.read(in_block, |bytes: &[u8; 4]| read_le_u32(bytes) & 0xF000_0000);
                    let new_value = preserved | (value & 0x0FFF_FFFF);
                    guard.modify(in_block, |bytes: &mut [u8; 4]| {
                        *bytes = new_value.to_le_bytes();
                    });
                }
            }
        }
        Ok(())
    }

    fn classify(&self, raw: u32) -> ClusterLink {
        if raw == FREE_CLUSTER {
            ClusterLink::Free
        } else if raw == self.fat_type.bad_cluster_mark() {
            ClusterLink::Bad
        } else if raw >= self.fat_type.eoc_min() {
            ClusterLink::Eoc
        } else {
            ClusterLink::Next(raw)
        }
    }

    pub fn get_next_cluster(&self, cluster: u32) -> Result<ClusterLink, FatError> {
        if cluster < self.data_cluster_base {
            return Err(FatError::InvalidCluster);
        }
        Ok(self.classify(self.read_raw(cluster)?))
    }

    pub fn set_next_cluster(&self, cluster: u32, next: u32) -> Result<(), FatError> {
        self.write_raw(cluster, next)
    }

    pub fn mark_eoc(&self, cluster: u32) -> Result<(), FatError> {
        self.write_raw(cluster, self.fat_type.eoc_mark())
    }

    pub fn mark_free(&self, cluster: u32) -> Result<(), FatError> {
        self.write_raw(cluster, FREE_CLUSTER)
    }

    /// Full cluster chain starting at `start`, in traversal order.
    /// Returns an empty vector if `start` is itself the free marker.
    pub fn get_all_cluster_id(&self, start: u32) -> Result<Vec<u32>, FatError> {
        let mut chain = Vec::new();
        if start == FREE_CLUSTER {
            return Ok(chain);
        }
        let mut current = start;
        loop {
            chain.push(current);
            match self.get_next_cluster(current)? {
                ClusterLink::Next(next) => current = next,
                ClusterLink::Eoc | ClusterLink::Free | ClusterLink::Bad => break,
            }
        }
        Ok(chain)
    }

    pub fn cluster_chain_len(&self, start: u32) -> Result<usize, FatError> {
        Ok(self.get_all_cluster_id(start)?.len())
    }

    pub fn cluster_chain_tail(&self, start: u32) -> Result<u32, FatError> {
        self.get_all_cluster_id(start)?
            .last()
            .copied()
            .ok_or(FatError::InvalidCluster)
    }

    pub fn get_cluster_at(&self, start: u32, index: usize) -> Result<u32, FatError> {
        self.get_all_cluster_id(start)?
            .get(index)
            .copied()
            .ok_or(FatError::InvalidCluster)
    }

    /// First-fit scan for a free cluster, starting from cluster 2.
    fn find_blank_cluster(&self) -> Result<u32, FatError> {
        for cluster in self.data_cluster_base..self.total_clusters {
            if matches!(self.get_next_cluster(cluster)?, ClusterLink::Free) {
                return Ok(cluster);
            }
        }
        Err(FatError::NoSpace)
    }

    /// Allocate a single free cluster, mark it end-of-chain, and return it.
    pub fn alloc_one(&self) -> Result<u32, FatError> {
        let cluster = self.find_blank_cluster()?;
        self.mark_eoc(cluster)?;
        Ok(cluster)
    }

    /// Allocate `count` clusters, chaining them together and appending to
    /// `tail` if given. Returns the newly allocated clusters in chain order.
    /// On `NoSpace` partway through, the clusters allocated so far are
    /// freed before returning the error so a failed grow never leaks space.
    pub fn alloc_chain(&self, count: usize, tail: Option<u32>) -> Result<Vec<u32>, FatError> {
        let mut allocated = Vec::with_capacity(count);
        let mut previous = tail;
        for _ in 0..count {
            match self.alloc_one() {
                Ok(cluster) => {
                    if let Some(prev) = previous {
                        if let Err(e) = self.set_next_cluster(prev, cluster) {
                            let _ = self.free_chain_from(&allocated);
                            let _ = self.mark_free(cluster);
                            return Err(e);
                        }
                    }
                    previous = Some(cluster);
                    allocated.push(cluster);
                }
                Err(e) => {
                    let _ = self.free_chain_from(&allocated);
                    warn!("fat: alloc_chain({count}) ran out of space after {} clusters", allocated.len());
                    return Err(e);
                }
            }
        }
        trace!("fat: allocated {} clusters starting at {:?}", allocated.len(), allocated.first());
        Ok(allocated)
    }

    fn free_chain_from(&self, clusters: &[u32]) -> Result<(), FatError> {
        for &cluster in clusters {
            self.mark_free(cluster)?;
        }
        Ok(())
    }

    /// Free every cluster in the chain starting at `start`.
    pub fn free_chain(&self, start: u32) -> Result<(), FatError> {
        let chain = self.get_all_cluster_id(start)?;
        trace!("fat: freeing {} clusters starting at {start}", chain.len());
        self.free_chain_from(&chain)
    }

    pub fn free_cluster_count(&self) -> Result<usize, FatError> {
        let mut free = 0;
        for cluster in self.data_cluster_base..self.total_clusters {
            if matches!(self.get_next_cluster(cluster)?, ClusterLink::Free) {
                free += 1;
            }
        }
        Ok(free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpb::{BasicBPB, BIOSParameterBlock};
    use crate::tests::RamDisk;

    fn make_volume(total_clusters: u32) -> (Arc<RamDisk>, BIOSParameterBlock) {
        let sec_per_clus = 1u8;
        let rsvd = 1u16;
        let num_fats = 2u8;
        let fat_sz = 8u16; // generous for small test volumes
        let data_sectors = total_clusters;
        let total_sectors = rsvd as u32 + num_fats as u32 * fat_sz as u32 + data_sectors;
        let disk = Arc::new(RamDisk::new(total_sectors as usize + 4));
        let bpb = BIOSParameterBlock {
            basic_bpb: BasicBPB {
                bs_jmp_boot: [0xEB, 0x00, 0x90],
                bs_oem_name: *b"TESTFAT ",
                byts_per_sec: 512,
                sec_per_clus,
                rsvd_sec_cnt: rsvd,
                num_fats,
                root_ent_cnt: 0,
                tot_sec16: 0,
                media: 0xF8,
                fat_sz16: 0,
                sec_per_trk: 0,
                num_heads: 0,
                hidd_sec: 0,
                tot_sec32: total_sectors,
            },
            ext: {
                let mut e = [0u8; 54];
                e[0..4].copy_from_slice(&(fat_sz as u32).to_le_bytes());
                e[8..12].copy_from_slice(&2u32.to_le_bytes());
                e
            },
        };
        (disk, bpb)
    }

    #[test]
    fn alloc_chain_links_clusters_and_marks_eoc() {
        let (disk, bpb) = make_volume(16);
        let fat = FatTable::new(disk, &bpb);
        let chain = fat.alloc_chain(3, None).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(fat.get_all_cluster_id(chain[0]).unwrap(), chain);
        assert_eq!(
            fat.get_next_cluster(*chain.last().unwrap()).unwrap(),
            ClusterLink::Eoc
        );
    }

    #[test]
    fn free_chain_returns_clusters_to_the_pool() {
        let (disk, bpb) = make_volume(16);
        let fat = FatTable::new(disk, &bpb);
        let before = fat.free_cluster_count().unwrap();
        let chain = fat.alloc_chain(4, None).unwrap();
        assert_eq!(fat.free_cluster_count().unwrap(), before - 4);
        fat.free_chain(chain[0]).unwrap();
        assert_eq!(fat.free_cluster_count().unwrap(), before);
    }

    #[test]
    fn alloc_exhausting_space_returns_no_space_and_does_not_leak() {
        let (disk, bpb) = make_volume(4);
        let fat = FatTable::new(disk, &bpb);
        let total_free = fat.free_cluster_count().unwrap();
        let err = fat.alloc_chain(total_free + 1, None);
        assert_eq!(err, Err(FatError::NoSpace));
        // Nothing should have been left allocated.
        assert_eq!(fat.free_cluster_count().unwrap(), total_free);
    }

    #[test]
    fn fat32_write_preserves_reserved_top_bits() {
        let (disk, bpb) = make_volume(16);
        let fat = FatTable::new(Arc::clone(&disk) as Arc<dyn BlockDevice>, &bpb);
        // Poison the reserved bits directly on the backing store.
        let offset = fat.entry_byte_offset(2, 0);
        let mut raw = [0u8; 4];
        disk.read_blocks(&mut raw, offset, 1).unwrap();
        let poisoned = read_le_u32(&raw) | 0xF000_0000;
        disk.write_blocks(&poisoned.to_le_bytes(), offset, 1)
            .unwrap();

        fat.set_next_cluster(2, 5).unwrap();

        let mut raw = [0u8; 4];
        disk.read_blocks(&mut raw, offset, 1).unwrap();
        let value = read_le_u32(&raw);
        assert_eq!(value & 0xF000_0000, 0xF000_0000);
        assert_eq!(value & 0x0FFF_FFFF, 5);
    }

    #[test]
    fn fat32_read_masks_reserved_top_bits_before_classifying() {
        let (disk, bpb) = make_volume(16);
        let fat = FatTable::new(Arc::clone(&disk) as Arc<dyn BlockDevice>, &bpb);
        let offset = fat.entry_byte_offset(2, 0);
        // An ordinary next-cluster link with garbage in the reserved bits
        // must not be misclassified as end-of-chain.
        let poisoned = 0xF000_0000u32 | 5u32;
        disk.write_blocks(&poisoned.to_le_bytes(), offset, 1)
            .unwrap();
        assert_eq!(fat.get_next_cluster(2).unwrap(), ClusterLink::Next(5));
    }
}
