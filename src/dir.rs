//! Directory operations on top of [`Node`]: lookup, listing, creation
//! and removal.
//!
//! On-disk layout of one directory's entries (low address -> high):
//! `fileA_lde_n, fileA_lde_n-1, ..., fileA_lde_1, fileA_sde, fileB_lde_n, ...`
//! -- a name's long entries always immediately precede its short entry,
//! written in descending order number so the short entry comes last.

use alloc::{string::String, sync::Arc, vec::Vec};
use log::debug;
use spin::RwLock;

use super::entry::{
    generate_short_name, long_name_split, name_case_bits, name_type, short_name_format,
    split_name_ext, LongDirEntry, NameType, ShortDirEntry,
};
use super::fat::FatError;
use super::node::{DirEntryPos, Node, NodeKind};
use super::{
    has_illegal_char, ALL_UPPER_CASE, ATTR_DIRECTORY, ATTR_LONG_NAME, DIRENT_SIZE,
    LAST_LONG_ENTRY, NEW_NODE_CLUSTER,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirError {
    NotFound,
    NotDirectory,
    Exists,
    InvalidName,
    NoSpace,
    Fat(FatError),
}

impl From<FatError> for DirError {
    fn from(e: FatError) -> Self {
        match e {
            FatError::NoSpace => DirError::NoSpace,
            other => DirError::Fat(other),
        }
    }
}

/// Reads one raw 32-byte entry at a time from a directory's data,
/// advancing past the 0x00 end-of-directory marker rather than
/// stopping there itself -- callers that want the conventional
/// "directory ends at the first all-zero entry" behavior check
/// `is_empty()`/`buf[0] == 0` themselves and break. Kept tolerant here
/// so a future consistency checker can walk every allocated entry in a
/// directory's clusters, including ones after a stray zeroed slot.
pub struct DirScanner<'a> {
    node: &'a Node,
    offset: usize,
}

impl<'a> DirScanner<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self { node, offset: 0 }
    }

    pub fn at(node: &'a Node, offset: usize) -> Self {
        Self { node, offset }
    }

    /// Offset of the entry most recently returned by `next_raw`.
    pub fn entry_offset(&self) -> usize {
        self.offset - DIRENT_SIZE
    }

    pub fn seek(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// The next 32-byte slot, or `None` once the directory's cluster
    /// chain is exhausted (a short read, not a 0x00 marker).
    pub fn next_raw(&mut self) -> Option<[u8; 32]> {
        let mut buf = [0u8; 32];
        let read = self.node.read_at(self.offset, &mut buf);
        self.offset += DIRENT_SIZE;
        if read != DIRENT_SIZE {
            None
        } else {
            Some(buf)
        }
    }
}

pub trait Dir {
    fn find(&self, path: Vec<&str>) -> Result<Arc<Node>, DirError>;
    fn create(&self, name: &str, kind: NodeKind) -> Result<Node, DirError>;
    fn ls(&self) -> Result<Vec<String>, DirError>;
    fn remove(&self, path: Vec<&str>) -> Result<(), DirError>;
}

impl Dir for Node {
    fn find(&self, path: Vec<&str>) -> Result<Arc<Node>, DirError> {
        let components: Vec<&str> = path
            .into_iter()
            .filter(|c| !c.is_empty() && *c != ".")
            .collect();
        if components.is_empty() {
            return Ok(Arc::new(self.clone()));
        }
        let last = components.len() - 1;
        let mut current = self.clone();
        for (i, component) in components.into_iter().enumerate() {
            let is_final = i == last;
            match current.find_by_name(component) {
                Some(next) => current = next,
                // A missing intermediate component can never be walked
                // into -- same failure as one that resolves to a file.
                None if is_final => return Err(DirError::NotFound),
                None => return Err(DirError::NotDirectory),
            }
            if !is_final && !current.is_dir() {
                return Err(DirError::NotDirectory);
            }
        }
        Ok(Arc::new(current))
    }

    fn remove(&self, path: Vec<&str>) -> Result<(), DirError> {
        let file = self.find(path)?;
        file.clear()?;
        Ok(())
    }

    fn ls(&self) -> Result<Vec<String>, DirError> {
        Ok(self.ls_with_attr()?.into_iter().map(|(n, _)| n).collect())
    }

    fn create(&self, name: &str, kind: NodeKind) -> Result<Node, DirError> {
        if !self.is_dir() {
            return Err(DirError::NotDirectory);
        }
        if name.is_empty() || has_illegal_char(name) {
            return Err(DirError::InvalidName);
        }
        if self.find_by_name(name).is_some() {
            return Err(DirError::Exists);
        }

        let (base, ext) = split_name_ext(name);
        let fits_8_3 = base.len() <= 8 && ext.len() <= 3;
        // A name that fits 8.3 on its own still needs a long entry when
        // its case can't be reproduced by the nt_res lowercase bits
        // alone (mixed case within a component, or non-ASCII).
        let needs_lfn = !fits_8_3 || matches!(name_type(name), NameType::Lfn);
        let lfn_chunk_cnt = if !fits_8_3 {
            long_name_split(name).len()
        } else if needs_lfn {
            1
        } else {
            0
        };
        let mut entry_offset = self.empty_entry_index(lfn_chunk_cnt + 1)?;

        let sde = if !fits_8_3 {
            let mut tail = 1u32;
            let short_name = loop {
                let candidate = generate_short_name_with_tail(name, tail);
                if self.find_by_sfn(&candidate).is_none() {
                    break candidate;
                }
                tail += 1;
            };
            let (name_bytes, ext_bytes) = short_name_format(&short_name);
            let mut sde = ShortDirEntry::new(NEW_NODE_CLUSTER, &name_bytes, &ext_bytes, kind);
            sde.set_name_case(ALL_UPPER_CASE);

            let mut lfn_chunks = long_name_split(name);
            let lfn_cnt = lfn_chunks.len();
            for i in 0..lfn_cnt {
                let mut order = (lfn_cnt - i) as u8;
                if i == 0 {
                    order |= LAST_LONG_ENTRY;
                }
                let lde = LongDirEntry::new_from_name_units(
                    order,
                    lfn_chunks.pop().unwrap(),
                    sde.gen_check_sum(),
                );
                let written = self.write_at(entry_offset, lde.as_bytes());
                if written != DIRENT_SIZE {
                    return Err(DirError::NoSpace);
                }
                entry_offset += DIRENT_SIZE;
            }
            sde
        } else if needs_lfn {
            let (name_bytes, ext_bytes) = short_name_format(name);
            let mut sde = ShortDirEntry::new(NEW_NODE_CLUSTER, &name_bytes, &ext_bytes, kind);
            sde.set_name_case(ALL_UPPER_CASE);

            let order = 1 | LAST_LONG_ENTRY;
            let chunk = long_name_split(name)[0];
            let lde = LongDirEntry::new_from_name_units(order, chunk, sde.gen_check_sum());
            let written = self.write_at(entry_offset, lde.as_bytes());
            if written != DIRENT_SIZE {
                return Err(DirError::NoSpace);
            }
            entry_offset += DIRENT_SIZE;
            sde
        } else {
            // Plain 8.3-representable name: no long entry at all, case
            // carried entirely by nt_res's lowercase bits.
            let (name_bytes, ext_bytes) = short_name_format(name);
            let mut sde = ShortDirEntry::new(NEW_NODE_CLUSTER, &name_bytes, &ext_bytes, kind);
            sde.set_name_case(name_case_bits(name));
            sde
        };

        let written = self.write_at(entry_offset, sde.as_bytes());
        if written != DIRENT_SIZE {
            return Err(DirError::NoSpace);
        }

        let created = self.find_by_name(name).ok_or(DirError::NotFound)?;
        debug!("dir: created {name:?} ({kind:?}) in {:?}", self.name());
        if kind == NodeKind::Dir {
            // Write ".." first so the directory is forced to allocate its
            // first cluster; otherwise a zero-length write_at at offset 0
            // would not grow the chain and first_cluster() would stay 0.
            let (n, e) = short_name_format("..");
            let mut dotdot = ShortDirEntry::new(self.first_cluster(), &n, &e, NodeKind::Dir);
            created.write_at(DIRENT_SIZE, dotdot.as_bytes_mut());

            let (n, e) = short_name_format(".");
            let mut dot = ShortDirEntry::new(created.first_cluster(), &n, &e, NodeKind::Dir);
            created.write_at(0, dot.as_bytes_mut());
        }
        Ok(created)
    }
}

fn generate_short_name_with_tail(name: &str, tail: u32) -> String {
    super::entry::generate_short_name_with_tail(name, tail)
}

impl Node {
    fn find_by_lfn(&self, name: &str) -> Option<Node> {
        let name_chunks = long_name_split(name);
        let chunk_cnt = name_chunks.len();
        let tail_chunk = name_chunks[chunk_cnt - 1];

        let mut scanner = DirScanner::new(self);
        loop {
            let raw = scanner.next_raw()?;
            if raw[0] == 0 {
                return None;
            }
            let lde = LongDirEntry::new_from_bytes(&raw);
            if lde.attr() != ATTR_LONG_NAME || lde.name_utf16() != tail_chunk {
                continue;
            }
            let order = lde.order();
            if order & LAST_LONG_ENTRY == 0 {
                continue;
            }
            if lde.lde_order() != chunk_cnt {
                continue;
            }

            let set_start = scanner.entry_offset();
            let mut matched = true;
            for i in 1..chunk_cnt {
                let Some(raw) = scanner.next_raw() else {
                    return None;
                };
                let lde = LongDirEntry::new_from_bytes(&raw);
                if lde.attr() != ATTR_LONG_NAME || lde.name_utf16() != name_chunks[chunk_cnt - 1 - i]
                {
                    matched = false;
                    break;
                }
            }
            if !matched {
                scanner.seek(set_start + DIRENT_SIZE);
                continue;
            }

            let checksum = lde.check_sum();
            let sde_offset = set_start + chunk_cnt * DIRENT_SIZE;
            let mut sde_buf = [0u8; 32];
            if self.read_at(sde_offset, &mut sde_buf) != DIRENT_SIZE {
                return None;
            }
            let sde = ShortDirEntry::new_from_bytes(&sde_buf);
            if sde.is_deleted() || checksum != sde.gen_check_sum() {
                scanner.seek(sde_offset);
                continue;
            }

            let mut lfn_positions = Vec::with_capacity(chunk_cnt);
            for i in 0..chunk_cnt {
                lfn_positions.push(self.dir_entry_pos(set_start + i * DIRENT_SIZE)?);
            }
            let sde_pos = self.dir_entry_pos(sde_offset)?;
            let kind = if sde.attr() & ATTR_DIRECTORY != 0 {
                NodeKind::Dir
            } else {
                NodeKind::File
            };
            let chain = self.file_cluster_chain(sde_offset).ok()?;
            return Some(Node::new(
                String::from(name),
                sde_pos,
                lfn_positions,
                self.volume(),
                Arc::new(RwLock::new(chain)),
                kind,
            ));
        }
    }

    fn find_by_sfn(&self, name: &str) -> Option<Node> {
        let name = name.to_ascii_uppercase();
        let mut scanner = DirScanner::new(self);
        loop {
            let raw = scanner.next_raw()?;
            if raw[0] == 0 {
                return None;
            }
            let sde = ShortDirEntry::new_from_bytes(&raw);
            if sde.is_deleted() || sde.is_long() {
                continue;
            }
            if sde.get_name_uppercase() != name {
                continue;
            }
            let offset = scanner.entry_offset();
            let sde_pos = self.dir_entry_pos(offset)?;

            // `create` always writes a matching long entry, even for a
            // name that fits 8.3 on its own, so the original case
            // survives -- pick it up here too, or `clear` would leave
            // it behind as an orphan.
            let mut lde_positions = Vec::new();
            if offset >= DIRENT_SIZE {
                let mut preceding = [0u8; 32];
                if self.read_at(offset - DIRENT_SIZE, &mut preceding) == DIRENT_SIZE
                    && preceding[11] == ATTR_LONG_NAME
                {
                    if let Some(pos) = self.dir_entry_pos(offset - DIRENT_SIZE) {
                        lde_positions.push(pos);
                    }
                }
            }

            let kind = if sde.attr() & ATTR_DIRECTORY != 0 {
                NodeKind::Dir
            } else {
                NodeKind::File
            };
            let chain = self.file_cluster_chain(offset).ok()?;
            return Some(Node::new(
                String::from(name),
                sde_pos,
                lde_positions,
                self.volume(),
                Arc::new(RwLock::new(chain)),
                kind,
            ));
        }
    }

    pub fn find_by_name(&self, name: &str) -> Option<Node> {
        if !self.is_dir() {
            return None;
        }
        if name == "." {
            return Some(self.clone());
        }
        let (base, ext) = split_name_ext(name);
        if base.len() > 8 || ext.len() > 3 {
            self.find_by_lfn(name)
        } else {
            self.find_by_sfn(name)
        }
    }

    /// Offset of the first run of `required` contiguous free (0x00 or
    /// deleted) 32-byte slots, allocating past the end of the
    /// directory's current size when no such run exists -- the
    /// subsequent `write_at` calls grow the chain as a side effect. A
    /// single free slot is never enough on its own when the name being
    /// created needs trailing long entries plus its short entry: using
    /// just the first free slot would let the short entry overwrite
    /// whatever live entries follow it.
    fn empty_entry_index(&self, required: usize) -> Result<usize, DirError> {
        if !self.is_dir() {
            return Err(DirError::NotDirectory);
        }
        let mut scanner = DirScanner::new(self);
        let mut offset = 0;
        let mut run_start = 0;
        let mut run_len = 0;
        loop {
            match scanner.next_raw() {
                None => return Ok(run_start),
                Some(raw) => {
                    if raw[0] == 0 || raw[0] == super::DIR_ENTRY_UNUSED {
                        if run_len == 0 {
                            run_start = offset;
                        }
                        run_len += 1;
                        if run_len >= required {
                            return Ok(run_start);
                        }
                    } else {
                        run_len = 0;
                    }
                    offset += DIRENT_SIZE;
                }
            }
        }
    }

    pub fn node_kind(&self) -> NodeKind {
        if self.is_dir() {
            NodeKind::Dir
        } else {
            NodeKind::File
        }
    }

    /// `(name, attr)` for every live entry, combining long-name sets
    /// back into their full name and skipping deleted entries.
    pub fn ls_with_attr(&self) -> Result<Vec<(String, u8)>, DirError> {
        if !self.is_dir() {
            return Err(DirError::NotDirectory);
        }
        let mut list = Vec::new();
        let mut scanner = DirScanner::new(self);
        loop {
            let Some(raw) = scanner.next_raw() else {
                return Ok(list);
            };
            if raw[0] == 0 {
                return Ok(list);
            }
            if raw[0] == super::DIR_ENTRY_UNUSED {
                continue;
            }
            if raw[11] != super::ATTR_LONG_NAME {
                let sde = ShortDirEntry::new_from_bytes(&raw);
                list.push((sde.get_name_display(), sde.attr()));
                continue;
            }
            let lde = LongDirEntry::new_from_bytes(&raw);
            let order = lde.lde_order();
            let mut name = String::new();
            name.insert_str(0, &lde.name());
            for _ in 1..order {
                let Some(raw) = scanner.next_raw() else {
                    return Ok(list);
                };
                let lde = LongDirEntry::new_from_bytes(&raw);
                name.insert_str(0, &lde.name());
            }
            // consume the short entry this long-name set describes
            let Some(sde_raw) = scanner.next_raw() else {
                return Ok(list);
            };
            let sde = ShortDirEntry::new_from_bytes(&sde_raw);
            list.push((name, sde.attr()));
        }
    }
}
