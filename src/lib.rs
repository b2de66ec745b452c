#![no_std]
//! A FAT16/FAT32 volume driver: FAT table codec, cluster-chain manager,
//! directory-entry codec, directory scanner, path resolver, entry
//! creator and a small file I/O engine on top of a caller-supplied
//! block device.
//!
//! The block device, the clock, and any VFS-level locking are external
//! collaborators — see [`device::BlockDevice`] and [`clock::TimeSource`].

pub mod bpb;
pub mod cache;
pub mod clock;
pub mod device;
pub mod dir;
pub mod entry;
pub mod error;
pub mod fat;
pub mod file;
pub mod fs;
pub mod node;
pub mod path;

extern crate alloc;

use core::convert::TryInto;

pub use error::Error;

pub const LEAD_SIGNATURE: u32 = 0x41615252;
pub const STRUCT_SIGNATURE: u32 = 0x61417272;
pub const TRAIL_SIGNATURE: u32 = 0xAA550000;

pub const FREE_CLUSTER: u32 = 0x0000_0000;
pub const BAD_CLUSTER_16: u16 = 0xFFF7;
pub const BAD_CLUSTER_32: u32 = 0x0FFF_FFF7;
pub const EOC_MIN_16: u16 = 0xFFF8;
pub const EOC_MIN_32: u32 = 0x0FFF_FFF8;
pub const EOC_16: u16 = 0xFFFF;
pub const EOC_32: u32 = 0x0FFF_FFFF;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

pub const DIRENT_SIZE: usize = 32;
pub const LONG_NAME_LEN_CAP: usize = 13;

pub const BLOCK_CACHE_LIMIT: usize = 64;

pub const SPACE: u8 = 0x20;
pub const DOT: u8 = 0x2E;

/// BPB Bytes Per Sector
pub const BLOCK_SIZE: usize = 512;

pub const LONG_DIR_ENT_NAME_CAPACITY: usize = 13;
pub const SHORT_DIR_ENT_NAME_CAPACITY: usize = 11;

/// For Short Directory Entry Name\[0\] and Long Directory Entry Ord: deleted.
pub const DIR_ENTRY_UNUSED: u8 = 0xE5;
/// For Short Directory Entry Name\[0\]: free, and no entries after it are in use.
pub const DIR_ENTRY_LAST_AND_UNUSED: u8 = 0x00;
/// For Long Directory Entry Ord as the last-entry-in-set mask.
pub const LAST_LONG_ENTRY: u8 = 0x40;

pub const MAX_CLUSTER_FAT12: u32 = 4085;
pub const MAX_CLUSTER_FAT16: u32 = 65525;

/// nt_res value meaning base name and extension are both stored upper case.
pub const ALL_UPPER_CASE: u8 = 0x00;
/// nt_res bit meaning the base name is stored lower case.
pub const LOWERCASE_BASE: u8 = 0x08;
/// nt_res bit meaning the extension is stored lower case.
pub const LOWERCASE_EXT: u8 = 0x10;

/// Sentinel first-cluster value used while building a directory entry whose
/// cluster chain has not been allocated yet.
pub const NEW_NODE_CLUSTER: u32 = 0;
/// Pseudo start-cluster tag used to mark the root directory's own entry
/// position, which does not live at a real cluster/offset pair.
pub const ROOT_DIR_ENTRY_CLUSTER: u32 = u32::MAX;

pub(crate) fn read_le_u16(input: &[u8]) -> u16 {
    let (int_bytes, _) = input.split_at(core::mem::size_of::<u16>());
    u16::from_le_bytes(int_bytes.try_into().unwrap())
}

pub(crate) fn read_le_u32(input: &[u8]) -> u32 {
    let (int_bytes, _) = input.split_at(core::mem::size_of::<u32>());
    u32::from_le_bytes(int_bytes.try_into().unwrap())
}

/// Characters forbidden in either a short or a long name component.
pub(crate) fn has_illegal_char(s: &str) -> bool {
    const ILLEGAL: &str = "\\/:*?\"<>|";
    s.chars().any(|c| ILLEGAL.contains(c) || c.is_control())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::device::{BlockDevice, DeviceErr};
    use alloc::vec;
    use alloc::vec::Vec;
    use spin::Mutex;

    /// An in-memory block device backing test volumes. Mirrors the shape
    /// of a std-backed `BlockFile`, minus the file descriptor.
    pub struct RamDisk {
        bytes: Mutex<Vec<u8>>,
    }

    impl RamDisk {
        pub fn new(block_count: usize) -> Self {
            Self {
                bytes: Mutex::new(vec![0u8; block_count * super::BLOCK_SIZE]),
            }
        }

        pub fn from_image(image: Vec<u8>) -> Self {
            Self {
                bytes: Mutex::new(image),
            }
        }
    }

    impl BlockDevice for RamDisk {
        fn read_blocks(&self, buf: &mut [u8], offset: usize, _block_cnt: usize) -> Result<(), DeviceErr> {
            let data = self.bytes.lock();
            if offset + buf.len() > data.len() {
                return Err(DeviceErr::ReadError);
            }
            buf.copy_from_slice(&data[offset..offset + buf.len()]);
            Ok(())
        }

        fn write_blocks(&self, buf: &[u8], offset: usize, _block_cnt: usize) -> Result<(), DeviceErr> {
            let mut data = self.bytes.lock();
            if offset + buf.len() > data.len() {
                return Err(DeviceErr::WriteError);
            }
            data[offset..offset + buf.len()].copy_from_slice(buf);
            Ok(())
        }
    }
}
