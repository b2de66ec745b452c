//! Block cache: LRU-backed read/modify access to raw sectors, with
//! write-back on eviction or drop.
//!
//! See <https://github.com/rcore-os/rCore-Tutorial-v3/pull/79> for why
//! the cache buffer is a `Vec<u8>` rather than `[u8; BLOCK_SIZE]`
//! (avoids blowing the stack when `BlockCache` is moved).

use alloc::{sync::Arc, vec, vec::Vec};
use core::ops::{Drop, FnOnce};
use lazy_static::lazy_static;
use log::trace;
use lru::LruCache;
use spin::{Mutex, RwLock};

use super::device::{BlockDevice, DeviceErr};
use super::{BLOCK_CACHE_LIMIT, BLOCK_SIZE};

pub trait Cache {
    /// The read-only mapper to the block cache.
    fn read<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V;
    /// The mutable mapper to the block cache; marks the block dirty.
    fn modify<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V;
    /// Write back to the device if dirty.
    fn sync(&mut self) -> Result<(), DeviceErr>;
}

pub struct BlockCache {
    cache: Vec<u8>,
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
    modified: bool,
}

impl BlockCache {
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Result<Self, DeviceErr> {
        let mut cache = vec![0u8; BLOCK_SIZE];
        block_device.read_blocks(&mut cache, block_id * BLOCK_SIZE, 1)?;
        Ok(Self {
            cache,
            block_id,
            block_device,
            modified: false,
        })
    }

    fn addr_of_offset(&self, offset: usize) -> usize {
        &self.cache[offset] as *const _ as usize
    }

    fn get_ref<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= BLOCK_SIZE);
        let addr = self.addr_of_offset(offset);
        unsafe { &*(addr as *const T) }
    }

    fn get_mut<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        let type_size = core::mem::size_of::<T>();
        assert!(offset + type_size <= BLOCK_SIZE);
        self.modified = true;
        let addr = self.addr_of_offset(offset);
        unsafe { &mut *(addr as *mut T) }
    }
}

impl Cache for BlockCache {
    fn read<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get_ref(offset))
    }

    fn modify<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    fn sync(&mut self) -> Result<(), DeviceErr> {
        if self.modified {
            self.modified = false;
            trace!("block cache: writing back block {}", self.block_id);
            self.block_device
                .write_blocks(&self.cache, self.block_id * BLOCK_SIZE, 1)?;
        }
        Ok(())
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        // A drop-time write-back failure has nowhere to go; callers that
        // need to observe I/O errors on the final write must call
        // `sync()` explicitly before dropping the last handle.
        let _ = self.sync();
    }
}

pub struct BlockCacheManager {
    lru: LruCache<usize, Arc<RwLock<BlockCache>>>,
}

impl BlockCacheManager {
    pub fn new() -> Self {
        Self {
            lru: LruCache::unbounded(),
        }
    }

    pub fn get_block_cache(
        &mut self,
        block_id: usize,
        block_device: Arc<dyn BlockDevice>,
    ) -> Result<Arc<RwLock<BlockCache>>, DeviceErr> {
        if let Some(pair) = self.lru.get(&block_id) {
            return Ok(Arc::clone(pair));
        }

        let block_cache = Arc::new(RwLock::new(BlockCache::new(
            block_id,
            Arc::clone(&block_device),
        )?));

        if self.lru.len() == BLOCK_CACHE_LIMIT {
            if let Some((_, peek_cache)) = self.lru.peek_lru() {
                if Arc::strong_count(peek_cache) == 1 {
                    self.lru.pop_lru();
                }
            }
        }
        self.lru.put(block_id, Arc::clone(&block_cache));
        Ok(block_cache)
    }

    pub fn sync_all(&mut self) -> Result<(), DeviceErr> {
        for (_, block_cache) in self.lru.iter() {
            block_cache.write().sync()?;
        }
        Ok(())
    }
}

impl Default for BlockCacheManager {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    pub static ref BLOCK_CACHE_MANAGER: Mutex<BlockCacheManager> =
        Mutex::new(BlockCacheManager::new());
}

pub fn get_block_cache(
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
) -> Result<Arc<RwLock<BlockCache>>, DeviceErr> {
    BLOCK_CACHE_MANAGER
        .lock()
        .get_block_cache(block_id, block_device)
}

pub fn sync_all() -> Result<(), DeviceErr> {
    BLOCK_CACHE_MANAGER.lock().sync_all()
}
