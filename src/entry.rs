//! FAT directory entry structures: short (8.3) and long (VFAT) entries,
//! and the short-name synthesis helpers a directory uses when creating
//! an entry for a name that doesn't fit the 8.3 form.
//!
//! DIR_Name[0] special values: 0xE5 marks a free (deleted) entry, 0x00
//! marks free-and-no-more-entries-follow, and 0x05 is the escape used
//! when the real first character is itself 0xE5 (a valid Shift-JIS lead
//! byte). See [`ShortDirEntry::is_free`] / [`ShortDirEntry::is_empty`].
//!
//! A set of long entries always immediately precedes the short entry it
//! describes. The first long entry (nearest the short entry... no, the
//! *last* one written, numerically) carries `LDIR_Ord | LAST_LONG_ENTRY`;
//! an 8-bit checksum of the short name ties every long entry in the set
//! to its short entry so orphaned long entries can be detected.

use super::node::NodeKind;
use super::{
    ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_HIDDEN, ATTR_LONG_NAME, ATTR_READ_ONLY, ATTR_SYSTEM,
    ATTR_VOLUME_ID, DIR_ENTRY_LAST_AND_UNUSED, DIR_ENTRY_UNUSED, LAST_LONG_ENTRY,
    LONG_NAME_LEN_CAP, SPACE,
};
use crate::clock::FatTimestamp;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::fmt::Debug;
use core::str;

#[derive(PartialEq, Debug, Clone, Copy)]
#[repr(u8)]
pub enum FatAttr {
    /// Indicates that writes to the file should fail.
    AttrReadOnly = ATTR_READ_ONLY,
    /// Indicates that normal directory listings should not show this file.
    AttrHidden = ATTR_HIDDEN,
    /// Indicates that this is an operating system file.
    AttrSystem = ATTR_SYSTEM,
    /// Set only on the single volume-label entry, which always lives in
    /// the root directory and has no data clusters of its own.
    AttrVolumeID = ATTR_VOLUME_ID,
    /// Indicates that this file is actually a container for other files.
    AttrDirectory = ATTR_DIRECTORY,
    /// Set by the driver on create/rename/write; backup tools use it to
    /// decide what's changed since the last backup.
    AttrArchive = ATTR_ARCHIVE,
    /// Indicates the entry is actually a member of a long-name set.
    AttrLongName = ATTR_LONG_NAME,
}

/// FAT 32-byte short directory entry.
#[derive(Clone, Copy, Debug)]
#[repr(packed)]
pub struct ShortDirEntry {
    name: [u8; 8],
    extension: [u8; 3],
    attr: u8,
    /// 0x00: name and extension both upper case. 0x08: base lower case.
    /// 0x10: extension lower case. Preserves display case for names that
    /// are otherwise representable as 8.3 without a long-name entry.
    nt_res: u8,
    /// Tenths of a second at creation (0-199); combines with `crt_time`'s
    /// 2-second granularity to give 1-second creation-time resolution.
    crt_time_tenth: u8,
    crt_time: u16,
    crt_date: u16,
    lst_acc_date: u16,
    /// High word of the first cluster number. Zero on FAT16.
    fst_clus_hi: u16,
    wrt_time: u16,
    wrt_date: u16,
    fst_clus_lo: u16,
    /// Always 0 for a directory; directories are sized by walking their
    /// cluster chain to EOC, not by this field.
    file_size: u32,
}

impl Default for ShortDirEntry {
    fn default() -> Self {
        Self::empty()
    }
}

impl ShortDirEntry {
    /// `name`/`extension` must already be split and fit 8/3 bytes; callers
    /// needing a name that doesn't fit should synthesize one first via
    /// [`generate_short_name`].
    pub fn new(cluster: u32, name: &[u8], extension: &[u8], kind: NodeKind) -> Self {
        let mut item = Self::empty();
        let mut name_: [u8; 8] = [SPACE; 8];
        let mut extension_: [u8; 3] = [SPACE; 3];
        name_[0..name.len()].copy_from_slice(name);
        extension_[0..extension.len()].copy_from_slice(extension);
        name_.make_ascii_uppercase();
        extension_.make_ascii_uppercase();

        item.name = name_;
        item.extension = extension_;
        item.attr = match kind {
            NodeKind::File => ATTR_ARCHIVE,
            NodeKind::Dir => ATTR_DIRECTORY,
        };
        item.set_first_cluster(cluster);
        item
    }

    pub fn set_name(&mut self, name: &[u8], extension: &[u8]) {
        let mut name_: [u8; 8] = [SPACE; 8];
        name_[0..name.len()].copy_from_slice(name);
        name_.make_ascii_uppercase();

        let mut extension_: [u8; 3] = [SPACE; 3];
        extension_[0..extension.len()].copy_from_slice(extension);
        extension_.make_ascii_uppercase();
        self.name = name_;
        self.extension = extension_;
    }

    /// Checksum of the 11-byte name+extension, per the VFAT algorithm:
    /// `sum = ((sum & 1) ? 0x80 : 0) + (sum >> 1) + name[i]` over all 11
    /// bytes. Every long entry in a name's set carries this value so
    /// orphaned long entries (whose short entry was since overwritten)
    /// can be detected. Uses wrapping add since the running sum
    /// legitimately wraps around a `u8`.
    pub fn gen_check_sum(&self) -> u8 {
        let mut name_ = [0u8; 11];
        name_[0..8].copy_from_slice(&self.name);
        name_[8..11].copy_from_slice(&self.extension);

        let mut sum: u8 = 0;
        for &byte in name_.iter() {
            sum = ((sum & 1) << 7).wrapping_add(sum >> 1).wrapping_add(byte);
        }
        sum
    }

    pub fn name(&self) -> String {
        let name_len = self.name.iter().position(|&x| x == SPACE).unwrap_or(8);
        let ext_len = self.extension.iter().position(|&x| x == SPACE).unwrap_or(3);
        let name_str = str::from_utf8(&self.name[..name_len]).unwrap_or("");
        let ext_str = str::from_utf8(&self.extension[..ext_len]).unwrap_or("");
        if ext_len != 0 {
            [name_str, ".", ext_str].join("")
        } else {
            name_str.to_string()
        }
    }

    pub fn name_bytes_array(&self) -> [u8; 11] {
        let mut full_name = [0u8; 11];
        full_name[0..8].copy_from_slice(&self.name);
        full_name[8..11].copy_from_slice(&self.extension);
        full_name
    }
}

impl ShortDirEntry {
    pub fn empty() -> Self {
        Self {
            name: [0; 8],
            extension: [0; 3],
            attr: ATTR_ARCHIVE,
            nt_res: 0,
            crt_time_tenth: 0,
            crt_time: 0,
            crt_date: 0,
            lst_acc_date: 0,
            fst_clus_hi: 0,
            wrt_time: 0,
            wrt_date: 0,
            fst_clus_lo: 0,
            file_size: 0,
        }
    }

    pub fn root_dir(cluster: u32) -> Self {
        let mut item = Self::empty();
        item.set_first_cluster(cluster);
        item.attr = ATTR_DIRECTORY;
        item
    }

    pub fn set_name_case(&mut self, state: u8) {
        self.nt_res = state;
    }

    pub fn name_case(&self) -> u8 {
        self.nt_res
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.fst_clus_hi as u32) << 16) | (self.fst_clus_lo as u32)
    }

    /// Splits the cluster number across `fst_clus_hi`/`fst_clus_lo` at
    /// the documented bit boundary (high word at offset 0x14, low word
    /// at 0x1A) rather than writing the high word into the low-word slot
    /// twice, which a long-lived reference implementation of this
    /// format has been known to do.
    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.fst_clus_hi = ((cluster & 0xFFFF_0000) >> 16) as u16;
        self.fst_clus_lo = (cluster & 0x0000_FFFF) as u16;
    }

    pub fn is_free(&self) -> bool {
        self.name[0] == DIR_ENTRY_UNUSED || self.name[0] == DIR_ENTRY_LAST_AND_UNUSED
    }

    pub fn is_deleted(&self) -> bool {
        self.name[0] == DIR_ENTRY_UNUSED
    }

    /// True only for the 0x00 end-of-directory sentinel, distinct from
    /// an ordinary deleted (0xE5) entry.
    pub fn is_empty(&self) -> bool {
        self.name[0] == DIR_ENTRY_LAST_AND_UNUSED
    }

    pub fn is_dir(&self) -> bool {
        self.attr == ATTR_DIRECTORY
    }

    pub fn is_long(&self) -> bool {
        self.attr == ATTR_LONG_NAME
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir() && !self.is_long()
    }

    pub fn attr(&self) -> u8 {
        self.attr
    }

    pub fn set_attr(&mut self, attr: u8) {
        self.attr = attr;
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn set_file_size(&mut self, file_size: u32) {
        self.file_size = file_size;
    }

    pub fn get_name_uppercase(&self) -> String {
        let mut name = String::new();
        for &b in self.name.iter() {
            if b == SPACE {
                break;
            }
            name.push(b as char);
        }
        for (i, &b) in self.extension.iter().enumerate() {
            if b == SPACE {
                break;
            }
            if i == 0 {
                name.push('.');
            }
            name.push(b as char);
        }
        name
    }

    /// Case-preserving display name: applies `nt_res`'s lowercase-base
    /// and lowercase-extension bits independently, since a name like
    /// "makefile.TXT" is representable without a long-name entry.
    pub fn get_name_display(&self) -> String {
        let upper = self.get_name_uppercase();
        match upper.find('.') {
            Some(dot) => {
                let mut base = upper[..dot].to_string();
                let mut ext = upper[dot + 1..].to_string();
                if self.nt_res & crate::LOWERCASE_BASE != 0 {
                    base = base.to_ascii_lowercase();
                }
                if self.nt_res & crate::LOWERCASE_EXT != 0 {
                    ext = ext.to_ascii_lowercase();
                }
                [base, ".".to_string(), ext].concat()
            }
            None => {
                if self.nt_res & crate::LOWERCASE_BASE != 0 {
                    upper.to_ascii_lowercase()
                } else {
                    upper
                }
            }
        }
    }

    pub fn delete(&mut self) {
        self.file_size = 0;
        self.set_first_cluster(0);
        self.name[0] = DIR_ENTRY_UNUSED;
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut ShortDirEntry as *mut u8, 32) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const ShortDirEntry as *const u8, 32) }
    }

    pub fn new_from_bytes(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&buf[..32]);
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const ShortDirEntry) }
    }
}

impl ShortDirEntry {
    pub fn set_create_time(&mut self, ts: FatTimestamp) {
        self.crt_time = pack_time(ts);
        self.crt_date = pack_date(ts);
        self.crt_time_tenth = 0;
    }

    pub fn set_last_access_date(&mut self, ts: FatTimestamp) {
        self.lst_acc_date = pack_date(ts);
    }

    pub fn set_last_write(&mut self, ts: FatTimestamp) {
        self.wrt_time = pack_time(ts);
        self.wrt_date = pack_date(ts);
    }

    pub fn created(&self) -> FatTimestamp {
        unpack(self.crt_date, self.crt_time)
    }

    pub fn last_write(&self) -> FatTimestamp {
        unpack(self.wrt_date, self.wrt_time)
    }

    pub fn last_access(&self) -> FatTimestamp {
        unpack(self.lst_acc_date, 0)
    }
}

/// Packs a [`FatTimestamp`] into `DIR_CrtDate`/`DIR_WrtDate`'s layout:
/// bits 0-4 day (1-31), bits 5-8 month (1-12), bits 9-15 year since 1980.
pub fn pack_date(ts: FatTimestamp) -> u16 {
    ((ts.years_since_1980 & 0x7F) << 9) | ((ts.month as u16 & 0x0F) << 5) | (ts.day as u16 & 0x1F)
}

/// Packs a [`FatTimestamp`] into `DIR_CrtTime`/`DIR_WrtTime`'s layout:
/// bits 0-4 seconds/2 (0-29), bits 5-10 minutes, bits 11-15 hours.
pub fn pack_time(ts: FatTimestamp) -> u16 {
    ((ts.hour as u16 & 0x1F) << 11)
        | ((ts.minute as u16 & 0x3F) << 5)
        | ((ts.second as u16 / 2) & 0x1F)
}

fn unpack(date: u16, time: u16) -> FatTimestamp {
    FatTimestamp {
        years_since_1980: (date >> 9) & 0x7F,
        month: ((date >> 5) & 0x0F) as u8,
        day: (date & 0x1F) as u8,
        hour: ((time >> 11) & 0x1F) as u8,
        minute: ((time >> 5) & 0x3F) as u8,
        second: ((time & 0x1F) * 2) as u8,
    }
}

/// 32-byte long (VFAT) directory entry: up to 13 UCS-2 characters of a
/// long name's sub-component.
#[derive(Debug, Clone, Copy)]
#[repr(packed)]
pub struct LongDirEntry {
    /// Position in this name's long-entry set, 1-based, OR'd with
    /// [`LAST_LONG_ENTRY`] on the entry written last (numerically
    /// highest order, physically nearest the short entry).
    ord: u8,
    name1: [u16; 5],
    attr: u8,
    /// Zero for a genuine long-name sub-component; reserved otherwise.
    ldir_type: u8,
    /// Checksum of the associated short entry's 11-byte name.
    chk_sum: u8,
    name2: [u16; 6],
    /// Always zero; meaningless for a long entry but present so old
    /// disk utilities that assume every 32-byte entry has this field
    /// don't choke on it.
    fst_clus_lo: u16,
    name3: [u16; 2],
}

impl LongDirEntry {
    pub fn new_from_name_units(order: u8, name_array: [u16; 13], check_sum: u8) -> Self {
        let mut lde = Self::empty();
        lde.set_name(name_array);
        lde.ord = order;
        lde.chk_sum = check_sum;
        lde
    }

    pub fn set_name(&mut self, name_array: [u16; 13]) {
        unsafe {
            core::ptr::addr_of_mut!(self.name1)
                .write_unaligned(name_array[..5].try_into().unwrap());
            core::ptr::addr_of_mut!(self.name2)
                .write_unaligned(name_array[5..11].try_into().unwrap());
            core::ptr::addr_of_mut!(self.name3)
                .write_unaligned(name_array[11..].try_into().unwrap());
        }
    }

    pub fn name(&self) -> String {
        let units = self.name_utf16();
        let len = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        String::from_utf16_lossy(&units[..len])
    }

    /// Full UCS-2 decode of the name sub-component -- no Latin-1
    /// truncation. 0x0000 terminates; 0xFFFF pads beyond that.
    pub fn name_utf16(&self) -> [u16; LONG_NAME_LEN_CAP] {
        let mut name_all = [0u16; LONG_NAME_LEN_CAP];
        name_all[..5].copy_from_slice(&unsafe { core::ptr::addr_of!(self.name1).read_unaligned() });
        name_all[5..11]
            .copy_from_slice(&unsafe { core::ptr::addr_of!(self.name2).read_unaligned() });
        name_all[11..]
            .copy_from_slice(&unsafe { core::ptr::addr_of!(self.name3).read_unaligned() });
        name_all
    }
}

impl LongDirEntry {
    pub fn new_from_bytes(buf: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&buf[..32]);
        unsafe { core::ptr::read_unaligned(bytes.as_ptr() as *const LongDirEntry) }
    }

    pub fn empty() -> Self {
        Self {
            ord: 0,
            name1: [0u16; 5],
            attr: ATTR_LONG_NAME,
            ldir_type: 0,
            chk_sum: 0,
            name2: [0u16; 6],
            fst_clus_lo: 0,
            name3: [0u16; 2],
        }
    }

    pub fn attr(&self) -> u8 {
        self.attr
    }

    pub fn order(&self) -> u8 {
        self.ord
    }

    pub fn check_sum(&self) -> u8 {
        self.chk_sum
    }

    pub fn is_empty(&self) -> bool {
        self.ord == DIR_ENTRY_LAST_AND_UNUSED
    }

    pub fn is_deleted(&self) -> bool {
        self.ord == DIR_ENTRY_UNUSED
    }

    pub fn delete(&mut self) {
        self.ord = DIR_ENTRY_UNUSED;
    }

    /// Index within the name's long-entry set, with the last-entry
    /// marker bit stripped off.
    pub fn lde_order(&self) -> usize {
        (self.ord & (LAST_LONG_ENTRY - 1)) as usize
    }

    pub fn is_lde_end(&self) -> bool {
        (self.ord & LAST_LONG_ENTRY) == LAST_LONG_ENTRY
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self as *const Self as *const u8, 32) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self as *mut Self as *mut u8, 32) }
    }
}

pub(crate) enum NameType {
    Sfn,
    Lfn,
}

/// Splits `"name.ext"` into (name, ext) components, leaving the dot out
/// of both. A name with no dot has an empty extension. "." and ".."
/// keep their special all-dot form rather than being treated as an
/// empty-name-with-extension.
pub fn split_name_ext(name: &str) -> (&str, &str) {
    if name == "." || name == ".." {
        return (name, "");
    }
    match name.rfind('.') {
        Some(i) => (&name[..i], &name[i + 1..]),
        None => (name, ""),
    }
}

/// Whether `name` can be stored as a lone short entry -- fits 8.3, plain
/// ASCII, and each component (base, extension) is either all upper or
/// all lower case, the only case patterns `nt_res`'s LOWERCASE_BASE/
/// LOWERCASE_EXT bits can reproduce without a long-name entry.
pub(crate) fn name_type(name: &str) -> NameType {
    if name == "." || name == ".." {
        return NameType::Sfn;
    }
    let (base, ext) = split_name_ext(name);
    if base.is_empty() || base.len() > 8 || ext.len() > 3 {
        return NameType::Lfn;
    }
    if !base.is_ascii() || !ext.is_ascii() {
        return NameType::Lfn;
    }
    if !is_uniform_case(base) || !is_uniform_case(ext) {
        return NameType::Lfn;
    }
    NameType::Sfn
}

fn is_uniform_case(s: &str) -> bool {
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    !(has_upper && has_lower)
}

/// `nt_res` bits reproducing `name`'s actual case, for a name
/// [`name_type`] has already classified as [`NameType::Sfn`].
pub(crate) fn name_case_bits(name: &str) -> u8 {
    let (base, ext) = split_name_ext(name);
    let mut bits = 0u8;
    if base.chars().any(|c| c.is_ascii_lowercase()) {
        bits |= crate::LOWERCASE_BASE;
    }
    if ext.chars().any(|c| c.is_ascii_lowercase()) {
        bits |= crate::LOWERCASE_EXT;
    }
    bits
}

/// Truncates/pads `(base, ext)` to the fixed 8/3 byte slots a
/// [`ShortDirEntry`] stores, without touching case.
pub fn short_name_format(name: &str) -> ([u8; 8], [u8; 3]) {
    let (base, ext) = split_name_ext(name);
    let mut name_bytes = [SPACE; 8];
    let mut ext_bytes = [SPACE; 3];
    let n = base.len().min(8);
    name_bytes[..n].copy_from_slice(&base.as_bytes()[..n]);
    let e = ext.len().min(3);
    ext_bytes[..e].copy_from_slice(&ext.as_bytes()[..e]);
    (name_bytes, ext_bytes)
}

/// Synthesizes a numeric-tail 8.3 alias ("LONGFI~1.TXT") for a name that
/// doesn't fit the short-name form, per the documented disambiguation
/// scheme (the caller is responsible for retrying with a higher tail
/// number if the alias collides with an existing entry).
pub fn generate_short_name(name: &str) -> String {
    generate_short_name_with_tail(name, 1)
}

pub fn generate_short_name_with_tail(name: &str, tail: u32) -> String {
    let (base, ext) = split_name_ext(name);
    let base_upper: String = base
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let ext_upper: String = ext.chars().take(3).collect::<String>().to_ascii_uppercase();

    let tail_str = tail.to_string();
    let keep = 8usize.saturating_sub(1 + tail_str.len());
    let base_kept: String = base_upper.chars().take(keep.max(1)).collect();

    if ext_upper.is_empty() {
        [base_kept, "~".to_string(), tail_str].concat()
    } else {
        [base_kept, "~".to_string(), tail_str, ".".to_string(), ext_upper].concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    #[test]
    fn date_time_pack_unpack_round_trip() {
        let ts = FatTimestamp {
            years_since_1980: 44,
            month: 11,
            day: 23,
            hour: 17,
            minute: 42,
            second: 30,
        };
        let round_tripped = unpack(pack_date(ts), pack_time(ts));
        // Seconds only have 2-second granularity on disk.
        assert_eq!(round_tripped.years_since_1980, ts.years_since_1980);
        assert_eq!(round_tripped.month, ts.month);
        assert_eq!(round_tripped.day, ts.day);
        assert_eq!(round_tripped.hour, ts.hour);
        assert_eq!(round_tripped.minute, ts.minute);
        assert_eq!(round_tripped.second, 30);
    }

    #[test]
    fn date_time_pack_unpack_round_trip_odd_second() {
        let ts = FatTimestamp {
            years_since_1980: 0,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 1,
        };
        // Odd seconds round down to the nearest 2-second tick.
        let round_tripped = unpack(pack_date(ts), pack_time(ts));
        assert_eq!(round_tripped.second, 0);
    }

    #[test]
    fn check_sum_is_stable_for_the_same_name() {
        let (name, ext) = short_name_format("README.TXT");
        let sde = ShortDirEntry::new(2, &name, &ext, NodeKind::File);
        let first = sde.gen_check_sum();
        let second = sde.gen_check_sum();
        assert_eq!(first, second);
    }

    #[test]
    fn check_sum_differs_for_different_names() {
        let (name_a, ext_a) = short_name_format("README.TXT");
        let (name_b, ext_b) = short_name_format("LICENSE.TXT");
        let a = ShortDirEntry::new(2, &name_a, &ext_a, NodeKind::File);
        let b = ShortDirEntry::new(2, &name_b, &ext_b, NodeKind::File);
        assert_ne!(a.gen_check_sum(), b.gen_check_sum());
    }

    #[test]
    fn check_sum_ignores_first_cluster_and_attr() {
        let (name, ext) = short_name_format("NOTES.TXT");
        let a = ShortDirEntry::new(2, &name, &ext, NodeKind::File);
        let b = ShortDirEntry::new(9000, &name, &ext, NodeKind::Dir);
        assert_eq!(a.gen_check_sum(), b.gen_check_sum());
    }

    #[test]
    fn short_name_format_round_trips_through_get_name_uppercase() {
        let (name, ext) = short_name_format("hello.txt");
        let sde = ShortDirEntry::new(2, &name, &ext, NodeKind::File);
        assert_eq!(sde.get_name_uppercase(), "HELLO.TXT");
    }

    #[test]
    fn short_name_format_with_no_extension() {
        let (name, ext) = short_name_format("README");
        let sde = ShortDirEntry::new(2, &name, &ext, NodeKind::File);
        assert_eq!(sde.get_name_uppercase(), "README");
    }

    #[test]
    fn nt_res_bits_round_trip_case_preserving_display() {
        let (name, ext) = short_name_format("readme.TXT");
        let mut sde = ShortDirEntry::new(2, &name, &ext, NodeKind::File);
        sde.set_name_case(name_case_bits("readme.TXT"));
        assert_eq!(sde.get_name_display(), "readme.TXT");
    }

    #[test]
    fn name_type_classifies_plain_8_3_names_as_sfn() {
        assert!(matches!(name_type("README.TXT"), NameType::Sfn));
        assert!(matches!(name_type("readme.txt"), NameType::Sfn));
        assert!(matches!(name_type("README"), NameType::Sfn));
    }

    #[test]
    fn name_type_requires_lfn_for_mixed_case_or_overflow() {
        assert!(matches!(name_type("ReadMe.txt"), NameType::Lfn));
        assert!(matches!(name_type("areallylongname.txt"), NameType::Lfn));
        assert!(matches!(name_type("x.abcd"), NameType::Lfn));
    }

    #[test]
    fn long_name_split_and_decode_round_trip_short_name() {
        let name = "hello.txt";
        let mut chunks = long_name_split(name);
        assert_eq!(chunks.len(), 1);
        let lde = LongDirEntry::new_from_name_units(1 | LAST_LONG_ENTRY, chunks.pop().unwrap(), 0);
        assert_eq!(lde.name(), name);
    }

    #[test]
    fn long_name_split_and_decode_round_trip_multi_chunk_name() {
        // 30 units needs 3 chunks of 13.
        let name = "a".repeat(30);
        let mut chunks = long_name_split(&name);
        assert_eq!(chunks.len(), 3);
        let chunk_cnt = chunks.len();
        let mut reconstructed = String::new();
        // Entries are written tail-first; decode in the same order the
        // directory writer produces them, then reverse to get the name.
        let mut pieces = Vec::with_capacity(chunk_cnt);
        for i in 0..chunk_cnt {
            let mut order = (chunk_cnt - i) as u8;
            if i == 0 {
                order |= LAST_LONG_ENTRY;
            }
            let lde = LongDirEntry::new_from_name_units(order, chunks.pop().unwrap(), 0);
            pieces.push(lde.name());
        }
        for piece in pieces.into_iter().rev() {
            reconstructed.push_str(&piece);
        }
        assert_eq!(reconstructed, name);
    }

    #[test]
    fn long_dir_entry_bytes_round_trip() {
        let chunk = long_name_split("hi.txt").pop().unwrap();
        let lde = LongDirEntry::new_from_name_units(1 | LAST_LONG_ENTRY, chunk, 0xAB);
        let bytes = lde.as_bytes().to_vec();
        let decoded = LongDirEntry::new_from_bytes(&bytes);
        assert_eq!(decoded.check_sum(), 0xAB);
        assert_eq!(decoded.name(), "hi.txt");
        assert!(decoded.is_lde_end());
    }

    #[test]
    fn short_dir_entry_bytes_round_trip() {
        let (name, ext) = short_name_format("data.bin");
        let sde = ShortDirEntry::new(12345, &name, &ext, NodeKind::File);
        let bytes = sde.as_bytes().to_vec();
        let decoded = ShortDirEntry::new_from_bytes(&bytes);
        assert_eq!(decoded.first_cluster(), 12345);
        assert_eq!(decoded.get_name_uppercase(), "DATA.BIN");
    }

    #[test]
    fn split_name_ext_keeps_dot_entries_special() {
        assert_eq!(split_name_ext("."), (".", ""));
        assert_eq!(split_name_ext(".."), ("..", ""));
        assert_eq!(split_name_ext("a.b.c"), ("a.b", "c"));
        assert_eq!(split_name_ext("noext"), ("noext", ""));
    }

    #[test]
    fn generate_short_name_with_tail_increments_numeric_suffix() {
        let name = "a really long name.txt";
        let first = generate_short_name(name);
        let second = generate_short_name_with_tail(name, 2);
        assert_ne!(first, second);
        assert!(second.contains("~2"));
    }
}

/// Splits a long name into 13-UCS2-unit chunks, padded with a 0x0000
/// terminator then 0xFFFF filler on the final (possibly partial) chunk,
/// returned in the order the entries are *written* to disk, i.e. the
/// first element is the last chunk (nearest the short entry).
pub fn long_name_split(name: &str) -> Vec<[u16; 13]> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let chunk_cnt = ((units.len() + 12) / 13).max(1);
    let mut chunks = Vec::with_capacity(chunk_cnt);
    for c in 0..chunk_cnt {
        let mut chunk = [0xFFFFu16; 13];
        let start = c * 13;
        let end = (start + 13).min(units.len());
        for (i, &u) in units[start..end].iter().enumerate() {
            chunk[i] = u;
        }
        if end < start + 13 && end == units.len() {
            chunk[end - start] = 0x0000;
        }
        chunks.push(chunk);
    }
    // Forward order: chunks[0] is the name's first 13 units, chunks[last]
    // its tail. Callers `.pop()` from the end to get the tail chunk first,
    // since the highest-order long entry (the tail) is written to disk
    // before the lowest-order one (immediately preceding the short entry).
    chunks
}
