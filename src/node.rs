//! [`Node`]: a handle to one file or directory on the volume -- its
//! directory-entry position, its resolved cluster chain, and the raw
//! read/write primitives everything else (the directory layer, the
//! file I/O engine) is built on.
//!
//! A node's cluster chain is resolved once at lookup time into a plain
//! `Vec<u32>` rather than walked lazily through the FAT on every access;
//! growth appends to that vector and to the FAT together.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::debug;
use spin::RwLock;

use crate::cache::{get_block_cache, Cache};
use crate::clock::FatTimestamp;
use crate::entry::ShortDirEntry;
use crate::fat::FatError;
use crate::fs::VolumeManager;
use crate::{ATTR_DIRECTORY, BLOCK_SIZE, DIRENT_SIZE, DIR_ENTRY_UNUSED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Dir,
}

/// Where one 32-byte directory entry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryPos {
    /// The root directory's own "entry", which isn't actually stored
    /// anywhere -- the root has no name, no attributes, and no parent
    /// entry pointing at it.
    Root,
    /// An entry inside an ordinary cluster-chain directory.
    Cluster { cluster: u32, offset_in_cluster: usize },
    /// An entry inside a FAT16 volume's fixed-size root directory
    /// region, addressed by absolute volume sector instead of cluster.
    FixedSector { sector: usize, offset_in_sector: usize },
}

#[derive(Clone)]
pub struct Node {
    name: String,
    sde_pos: DirEntryPos,
    lde_pos: Vec<DirEntryPos>,
    pub(crate) volume: Arc<VolumeManager>,
    cluster_chain: Arc<RwLock<Vec<u32>>>,
    kind: NodeKind,
    /// Set only for a FAT16 root directory: its own data lives in a
    /// fixed sector range rather than a cluster chain.
    fixed_region: Option<(usize, usize)>,
}

impl Node {
    pub fn new(
        name: String,
        sde_pos: DirEntryPos,
        lde_pos: Vec<DirEntryPos>,
        volume: Arc<VolumeManager>,
        cluster_chain: Arc<RwLock<Vec<u32>>>,
        kind: NodeKind,
    ) -> Self {
        Self {
            name,
            sde_pos,
            lde_pos,
            volume,
            cluster_chain,
            kind,
            fixed_region: None,
        }
    }

    /// The FAT32 root directory: addressed by an ordinary cluster chain
    /// starting at `BPB_RootClus`.
    pub fn root_fat32(volume: Arc<VolumeManager>, root_cluster: u32) -> Self {
        let mut chain = Vec::new();
        chain.push(root_cluster);
        Self {
            name: String::from("/"),
            sde_pos: DirEntryPos::Root,
            lde_pos: Vec::new(),
            cluster_chain: Arc::new(RwLock::new(chain)),
            kind: NodeKind::Dir,
            volume,
            fixed_region: None,
        }
    }

    /// A FAT16 root directory: a fixed sector range with no cluster
    /// chain and no directory entry describing it.
    pub fn root_fat16(volume: Arc<VolumeManager>, first_sector: usize, sector_count: usize) -> Self {
        Self {
            name: String::from("/"),
            sde_pos: DirEntryPos::Root,
            lde_pos: Vec::new(),
            cluster_chain: Arc::new(RwLock::new(Vec::new())),
            kind: NodeKind::Dir,
            volume,
            fixed_region: Some((first_sector, sector_count)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    pub fn is_root(&self) -> bool {
        matches!(self.sde_pos, DirEntryPos::Root)
    }

    pub fn volume(&self) -> Arc<VolumeManager> {
        Arc::clone(&self.volume)
    }

    pub fn first_cluster(&self) -> u32 {
        self.cluster_chain.read().first().copied().unwrap_or(0)
    }

    fn bytes_per_sector(&self) -> usize {
        self.volume.bpb.bytes_per_sector()
    }

    fn cluster_size(&self) -> usize {
        self.volume.bpb.cluster_size()
    }

    fn dir_entry_block(&self, pos: DirEntryPos) -> Option<(usize, usize)> {
        match pos {
            DirEntryPos::Root => None,
            DirEntryPos::Cluster { cluster, offset_in_cluster } => {
                let bps = self.bytes_per_sector();
                let sector = self.volume.bpb.first_sector_of_cluster(cluster)
                    + offset_in_cluster / bps;
                Some((sector, offset_in_cluster % bps))
            }
            DirEntryPos::FixedSector { sector, offset_in_sector } => Some((sector, offset_in_sector)),
        }
    }

    /// Reads this node's own short directory entry. `None` for a root
    /// directory, which has no entry describing itself anywhere.
    fn read_sde(&self) -> Option<ShortDirEntry> {
        let (block_id, in_block) = self.dir_entry_block(self.sde_pos)?;
        let cache = get_block_cache(block_id, Arc::clone(&self.volume.device)).ok()?;
        let buf = cache.read().read(0, |b: &[u8; BLOCK_SIZE]| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&b[in_block..in_block + 32]);
            out
        });
        Some(ShortDirEntry::new_from_bytes(&buf))
    }

    fn modify_sde<V>(&self, f: impl FnOnce(&mut ShortDirEntry) -> V) -> Option<V> {
        let (block_id, in_block) = self.dir_entry_block(self.sde_pos)?;
        let cache = get_block_cache(block_id, Arc::clone(&self.volume.device)).ok()?;
        let mut guard = cache.write();
        let mut raw = guard.read(0, |b: &[u8; BLOCK_SIZE]| {
            let mut out = [0u8; 32];
            out.copy_from_slice(&b[in_block..in_block + 32]);
            out
        });
        let mut sde = ShortDirEntry::new_from_bytes(&raw);
        let result = f(&mut sde);
        raw.copy_from_slice(sde.as_bytes());
        guard.modify(0, |b: &mut [u8; BLOCK_SIZE]| {
            b[in_block..in_block + 32].copy_from_slice(&raw);
        });
        Some(result)
    }

    /// Translates a byte offset within this node's own data into the
    /// position of the 32-byte entry that contains it -- used right
    /// after a directory write to record where the entry now lives.
    pub fn dir_entry_pos(&self, offset: usize) -> Option<DirEntryPos> {
        if let Some((first_sector, sector_count)) = self.fixed_region {
            let bps = self.bytes_per_sector();
            let sector_index = offset / bps;
            if sector_index >= sector_count {
                return None;
            }
            return Some(DirEntryPos::FixedSector {
                sector: first_sector + sector_index,
                offset_in_sector: offset % bps,
            });
        }
        let cluster_size = self.cluster_size();
        let chain = self.cluster_chain.read();
        let cluster_index = offset / cluster_size;
        let cluster = *chain.get(cluster_index)?;
        Some(DirEntryPos::Cluster {
            cluster,
            offset_in_cluster: offset % cluster_size,
        })
    }

    fn block_id_and_offset(&self, offset: usize) -> Option<(usize, usize)> {
        let bps = self.bytes_per_sector();
        if let Some((first_sector, sector_count)) = self.fixed_region {
            let sector_index = offset / bps;
            if sector_index >= sector_count {
                return None;
            }
            return Some((first_sector + sector_index, offset % bps));
        }
        let cluster_size = self.cluster_size();
        let cluster_index = offset / cluster_size;
        let offset_in_cluster = offset % cluster_size;
        let chain = self.cluster_chain.read();
        let cluster = *chain.get(cluster_index)?;
        let sector = self.volume.bpb.first_sector_of_cluster(cluster) + offset_in_cluster / bps;
        Some((sector, offset_in_cluster % bps))
    }

    /// Cluster chain belonging to the entry at `sde_offset` within this
    /// (directory) node's own data -- used right after a lookup finds a
    /// short entry, to build the `Node` for the file it describes.
    pub fn file_cluster_chain(&self, sde_offset: usize) -> Result<Vec<u32>, FatError> {
        let mut buf = [0u8; 32];
        if self.read_at(sde_offset, &mut buf) != DIRENT_SIZE {
            return Ok(Vec::new());
        }
        let sde = ShortDirEntry::new_from_bytes(&buf);
        let start = sde.first_cluster();
        if start == 0 {
            return Ok(Vec::new());
        }
        self.volume.fat.get_all_cluster_id(start)
    }

    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let mut read = 0;
        while read < buf.len() {
            let Some((block_id, in_block)) = self.block_id_and_offset(offset + read) else {
                break;
            };
            let Ok(cache) = get_block_cache(block_id, Arc::clone(&self.volume.device)) else {
                break;
            };
            let to_copy = (BLOCK_SIZE - in_block).min(buf.len() - read);
            cache.read().read(0, |block: &[u8; BLOCK_SIZE]| {
                buf[read..read + to_copy].copy_from_slice(&block[in_block..in_block + to_copy]);
            });
            read += to_copy;
        }
        read
    }

    /// Writes `buf`, growing the cluster chain first if `offset + buf.len()`
    /// exceeds it. Returns the number of bytes actually written, which is
    /// less than `buf.len()` if growth ran out of space partway through.
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        if self.fixed_region.is_none() {
            let _ = self.grow_to(offset + buf.len());
        }
        let mut written = 0;
        while written < buf.len() {
            let Some((block_id, in_block)) = self.block_id_and_offset(offset + written) else {
                break;
            };
            let Ok(cache) = get_block_cache(block_id, Arc::clone(&self.volume.device)) else {
                break;
            };
            let to_copy = (BLOCK_SIZE - in_block).min(buf.len() - written);
            cache.write().modify(0, |block: &mut [u8; BLOCK_SIZE]| {
                block[in_block..in_block + to_copy]
                    .copy_from_slice(&buf[written..written + to_copy]);
            });
            written += to_copy;
        }
        if self.is_file() && written > 0 {
            let new_end = (offset + written) as u32;
            if new_end > self.file_size() {
                self.set_file_size(new_end);
            }
        }
        written
    }

    /// Allocates additional clusters so the chain covers byte `end`,
    /// recording the chain's first cluster on the node's own entry the
    /// moment it goes from empty to non-empty.
    fn grow_to(&self, end: usize) -> Result<(), FatError> {
        if self.fixed_region.is_some() {
            return Ok(());
        }
        let cluster_size = self.cluster_size();
        let needed_clusters = if end == 0 {
            0
        } else {
            (end + cluster_size - 1) / cluster_size
        };
        let mut chain = self.cluster_chain.write();
        if needed_clusters <= chain.len() {
            return Ok(());
        }
        let to_alloc = needed_clusters - chain.len();
        let tail = chain.last().copied();
        let new_clusters = self.volume.alloc_chain(to_alloc, tail)?;
        let was_empty = chain.is_empty();
        chain.extend(new_clusters.iter());
        let first = chain[0];
        drop(chain);
        if was_empty && !self.is_root() {
            self.modify_sde(|sde| sde.set_first_cluster(first));
        }
        Ok(())
    }

    pub fn file_size(&self) -> u32 {
        self.read_sde().map(|s| s.file_size()).unwrap_or(0)
    }

    fn set_file_size(&self, size: u32) {
        self.modify_sde(|sde| sde.set_file_size(size));
    }

    pub fn attr(&self) -> u8 {
        self.read_sde().map(|s| s.attr()).unwrap_or(ATTR_DIRECTORY)
    }

    pub fn set_time_created(&self, ts: FatTimestamp) {
        self.modify_sde(|sde| sde.set_create_time(ts));
    }

    pub fn set_time_accessed(&self, ts: FatTimestamp) {
        self.modify_sde(|sde| sde.set_last_access_date(ts));
    }

    pub fn set_time_written(&self, ts: FatTimestamp) {
        self.modify_sde(|sde| sde.set_last_write(ts));
    }

    /// `(file_size, cluster_size, cluster_count, is_dir, created, last_write)`.
    pub fn stat(&self) -> (u32, usize, usize, bool, FatTimestamp, FatTimestamp) {
        let sde = self.read_sde();
        let size = sde.as_ref().map(|s| s.file_size()).unwrap_or(0);
        let created = sde.as_ref().map(|s| s.created()).unwrap_or(FatTimestamp::EPOCH);
        let written = sde.as_ref().map(|s| s.last_write()).unwrap_or(FatTimestamp::EPOCH);
        (
            size,
            self.cluster_size(),
            self.cluster_chain.read().len(),
            self.is_dir(),
            created,
            written,
        )
    }

    /// Marks this node's short entry (and any long entries describing
    /// it) deleted and returns its clusters to the free pool. The
    /// parent directory's own entry slots are left in place, marked
    /// 0xE5, per the documented deletion convention.
    pub fn clear(&self) -> Result<(), FatError> {
        debug!("node: clearing {:?} ({} lde entries)", self.name, self.lde_pos.len());
        for pos in self.lde_pos.clone() {
            self.mark_entry_deleted(pos);
        }
        self.mark_entry_deleted(self.sde_pos);
        let start = self.first_cluster();
        if start != 0 {
            self.volume.free_chain(start)?;
        }
        self.cluster_chain.write().clear();
        Ok(())
    }

    /// Frees this file's cluster chain and resets its size to zero,
    /// without touching its directory entry's name or attributes.
    pub fn truncate(&self) -> Result<(), FatError> {
        let start = self.first_cluster();
        if start != 0 {
            self.volume.free_chain(start)?;
            self.modify_sde(|sde| sde.set_first_cluster(0));
        }
        self.cluster_chain.write().clear();
        self.set_file_size(0);
        Ok(())
    }

    fn mark_entry_deleted(&self, pos: DirEntryPos) {
        if let Some((block_id, in_block)) = self.dir_entry_block(pos) {
            if let Ok(cache) = get_block_cache(block_id, Arc::clone(&self.volume.device)) {
                cache.write().modify(0, |block: &mut [u8; BLOCK_SIZE]| {
                    block[in_block] = DIR_ENTRY_UNUSED;
                });
            }
        }
    }
}
