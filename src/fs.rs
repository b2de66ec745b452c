//! Volume mount and teardown: reads the BPB (and, on FAT32, the
//! FSInfo sector), builds the [`crate::fat::FatTable`], and exposes the
//! root [`Node`].

use alloc::string::String;
use alloc::sync::Arc;
use log::{debug, warn};
use spin::RwLock;

use crate::bpb::{BIOSParameterBlock, FSInfo, FatType};
use crate::cache::{get_block_cache, sync_all, Cache};
use crate::clock::TimeSource;
use crate::device::{BlockDevice, DeviceErr};
use crate::fat::{FatError, FatTable};
use crate::node::Node;
use crate::BLOCK_SIZE;

/// Shared, mostly-immutable volume state: the device, the parsed BPB,
/// and the FAT table. Concurrency is handled at the block-cache and
/// FAT-table level (each cached sector behind its own `RwLock`), not
/// by a single whole-filesystem lock, so unrelated directories and
/// files can be touched from different threads at once.
pub struct VolumeManager {
    pub(crate) device: Arc<dyn BlockDevice>,
    pub(crate) bpb: BIOSParameterBlock,
    pub(crate) fat: FatTable,
    pub(crate) clock: Arc<dyn TimeSource>,
    fs_info_sector: Option<usize>,
    mount_prefix: String,
}

impl VolumeManager {
    /// Reads the boot sector, validates it, builds the FAT table, and
    /// (on FAT32) checks the FSInfo signature. `mount_prefix` is the
    /// path component this volume answers to, e.g. `"C:"` -- matched
    /// case-insensitively by [`crate::path`].
    pub fn mount(
        device: Arc<dyn BlockDevice>,
        mount_prefix: &str,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Arc<Self>, crate::Error> {
        let boot_sector = get_block_cache(0, Arc::clone(&device))?;
        let bpb = boot_sector
            .read()
            .read(0, |b: &BIOSParameterBlock| *b);
        if !bpb.is_valid() {
            warn!("mount: boot sector failed validation");
            return Err(crate::Error::NotFound);
        }

        let fs_info_sector = match bpb.fat_type() {
            FatType::Fat32 => {
                let sector = bpb.fat_info_sector();
                let cache = get_block_cache(sector, Arc::clone(&device))?;
                let ok = cache.read().read(0, |info: &FSInfo| info.check_signature());
                if !ok {
                    warn!("mount: FSInfo sector {sector} failed signature check");
                    return Err(crate::Error::NotFound);
                }
                Some(sector)
            }
            FatType::Fat16 => None,
        };

        debug!("mount: {:?} volume, prefix {mount_prefix:?}", bpb.fat_type());
        let fat = FatTable::new(Arc::clone(&device), &bpb);
        Ok(Arc::new(Self {
            device,
            bpb,
            fat,
            clock,
            fs_info_sector,
            mount_prefix: String::from(mount_prefix),
        }))
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    pub fn bpb(&self) -> &BIOSParameterBlock {
        &self.bpb
    }

    pub fn clock(&self) -> &dyn TimeSource {
        &*self.clock
    }

    pub fn root(self: &Arc<Self>) -> Node {
        match self.bpb.fat_type() {
            FatType::Fat32 => Node::root_fat32(Arc::clone(self), self.bpb.root_cluster()),
            FatType::Fat16 => Node::root_fat16(
                Arc::clone(self),
                self.bpb.root_dir_first_sector(),
                self.bpb.root_dir_sector_cnt(),
            ),
        }
    }

    pub fn free_cluster_count(&self) -> Result<usize, FatError> {
        self.fat.free_cluster_count()
    }

    /// Allocates a chain and marks the FSInfo free-cluster/next-free
    /// hints unknown rather than trying to keep them exactly in sync --
    /// a stale hint can point at an already-used cluster; `0xFFFFFFFF`
    /// only ever costs a future from-cluster-2 scan.
    pub(crate) fn alloc_chain(
        &self,
        count: usize,
        tail: Option<u32>,
    ) -> Result<alloc::vec::Vec<u32>, FatError> {
        let result = self.fat.alloc_chain(count, tail)?;
        self.invalidate_fs_info();
        Ok(result)
    }

    pub(crate) fn free_chain(&self, start: u32) -> Result<(), FatError> {
        self.fat.free_chain(start)?;
        self.invalidate_fs_info();
        Ok(())
    }

    fn invalidate_fs_info(&self) {
        let Some(sector) = self.fs_info_sector else {
            return;
        };
        if let Ok(cache) = get_block_cache(sector, Arc::clone(&self.device)) {
            cache.write().modify(0, |info: &mut FSInfo| info.invalidate());
        }
    }

    /// Flushes every dirty cached sector back to the device.
    pub fn sync(&self) -> Result<(), DeviceErr> {
        sync_all()
    }
}

const _: () = assert!(BLOCK_SIZE >= 512);

/// Shared by this module's and other modules' test suites: formats a
/// tiny in-memory FAT32 image to mount.
#[cfg(test)]
pub(crate) mod tests_support {
    use crate::device::BlockDevice;
    use crate::tests::RamDisk;
    use alloc::sync::Arc as StdArc;

    /// Formats a tiny FAT32 image in memory: boot sector + FSInfo +
    /// two FAT copies + a one-cluster root directory.
    pub(crate) fn format_fat32(total_clusters: u32) -> StdArc<RamDisk> {
        let bytes_per_sector = 512usize;
        let sec_per_clus = 1u8;
        let rsvd = 32usize;
        let num_fats = 2usize;
        let fat_sz = 8usize;
        let data_sectors = total_clusters as usize;
        let total_sectors = rsvd + num_fats * fat_sz + data_sectors;

        let disk = StdArc::new(RamDisk::new(total_sectors + 4));

        let mut boot = [0u8; 512];
        boot[0] = 0xEB;
        boot[1] = 0x00;
        boot[2] = 0x90;
        boot[11..13].copy_from_slice(&(bytes_per_sector as u16).to_le_bytes());
        boot[13] = sec_per_clus;
        boot[14..16].copy_from_slice(&(rsvd as u16).to_le_bytes());
        boot[16] = num_fats as u8;
        // root_ent_cnt = 0, tot_sec16 = 0 -> FAT32 markers
        boot[36..40].copy_from_slice(&(fat_sz as u32).to_le_bytes()); // fat_sz32
        boot[44..48].copy_from_slice(&2u32.to_le_bytes()); // root_clus
        boot[48..50].copy_from_slice(&1u16.to_le_bytes()); // fs_info sector
        boot[32..36].copy_from_slice(&(total_sectors as u32).to_le_bytes()); // tot_sec32
        disk.write_blocks(&boot, 0, 1).unwrap();

        let mut fsinfo = [0u8; 512];
        fsinfo[0..4].copy_from_slice(&crate::LEAD_SIGNATURE.to_le_bytes());
        fsinfo[484..488].copy_from_slice(&crate::STRUCT_SIGNATURE.to_le_bytes());
        fsinfo[488..492].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        fsinfo[492..496].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        fsinfo[508..512].copy_from_slice(&crate::TRAIL_SIGNATURE.to_le_bytes());
        disk.write_blocks(&fsinfo, bytes_per_sector, 1).unwrap();

        // Mark cluster 2 (the root dir) as end-of-chain in both FAT copies.
        for copy in 0..num_fats {
            let fat_offset = (rsvd + copy * fat_sz) * bytes_per_sector;
            let mut entry = [0u8; 512];
            entry[8..12].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
            disk.write_blocks(&entry, fat_offset, 1).unwrap();
        }

        disk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NullClock;
    use crate::dir::Dir;
    use crate::node::NodeKind;
    use alloc::sync::Arc as StdArc;
    use tests_support::format_fat32;

    #[test]
    fn mount_reads_bpb_and_validates_fsinfo() {
        let disk = format_fat32(16);
        let volume = VolumeManager::mount(disk, "C:", StdArc::new(NullClock)).unwrap();
        assert_eq!(volume.bpb().fat_type(), FatType::Fat32);
        assert_eq!(volume.bpb().root_cluster(), 2);
    }

    #[test]
    fn root_directory_create_and_find_round_trip() {
        let disk = format_fat32(16);
        let volume = VolumeManager::mount(disk, "C:", StdArc::new(NullClock)).unwrap();
        let root = volume.root();
        let created = root.create("hello.txt", NodeKind::File).unwrap();
        assert!(created.is_file());
        assert!(root.find_by_name("hello.txt").is_some());
    }
}
