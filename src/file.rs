//! Stateful file handles layered on [`Node`]'s offset-based primitives,
//! plus the path-driven operations (`readdir`, `mkdir`, `rmdir`,
//! `unlink`) that resolve a path against a root before acting.

use alloc::string::String;
use alloc::vec::Vec;

use crate::dir::{Dir, DirError};
use crate::fat::FatError;
use crate::node::{Node, NodeKind};
use crate::path::{resolve, split_parent};
use crate::ATTR_READ_ONLY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileError {
    IsDirectory,
    NotDirectory,
    NotEmpty,
    ReadOnly,
    Dir(DirError),
    Fat(FatError),
}

impl From<DirError> for FileError {
    fn from(e: DirError) -> Self {
        FileError::Dir(e)
    }
}

impl From<FatError> for FileError {
    fn from(e: FatError) -> Self {
        FileError::Fat(e)
    }
}

/// Access mode and creation behavior requested by an `open` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub exclusive: bool,
    pub truncate: bool,
    pub append: bool,
    pub directory: bool,
}

impl OpenMode {
    pub const fn read_only() -> Self {
        Self { read: true, write: false, create: false, exclusive: false, truncate: false, append: false, directory: false }
    }

    pub const fn write_only() -> Self {
        Self { read: false, write: true, create: false, exclusive: false, truncate: false, append: false, directory: false }
    }

    pub const fn read_write() -> Self {
        Self { read: true, write: true, create: false, exclusive: false, truncate: false, append: false, directory: false }
    }

    pub fn create(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn exclusive(mut self) -> Self {
        self.create = true;
        self.exclusive = true;
        self
    }

    pub fn truncate(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn append(mut self) -> Self {
        self.write = true;
        self.append = true;
        self
    }

    pub fn directory(mut self) -> Self {
        self.directory = true;
        self
    }
}

/// A resolved node plus a byte-offset cursor. `seek` is pure arithmetic
/// on that cursor: seeking past the current end of file is permitted
/// and only actually extends the file on the next `write`.
pub struct FileHandle {
    node: Node,
    pos: usize,
    mode: OpenMode,
}

impl FileHandle {
    /// Resolves `path` against `root` and opens it per `mode`, creating
    /// it first when it doesn't exist and `mode.create` is set.
    pub fn open(root: &Node, path: &str, mode: OpenMode) -> Result<Self, FileError> {
        let node = match resolve(root, path) {
            Ok(node) => {
                if mode.exclusive {
                    return Err(FileError::Dir(DirError::Exists));
                }
                node
            }
            Err(DirError::NotFound) if mode.create => {
                let (parent_path, name) = split_parent(path);
                let parent = resolve(root, parent_path)?;
                if !parent.is_dir() {
                    return Err(FileError::NotDirectory);
                }
                let kind = if mode.directory { NodeKind::Dir } else { NodeKind::File };
                let created = parent.create(name, kind)?;
                let now = root.volume().clock().now();
                created.set_time_created(now);
                created.set_time_written(now);
                created.set_time_accessed(now);
                created
            }
            Err(e) => return Err(FileError::from(e)),
        };

        if node.is_dir() && mode.write && !mode.directory {
            return Err(FileError::IsDirectory);
        }
        if mode.write && node.attr() & ATTR_READ_ONLY != 0 {
            return Err(FileError::ReadOnly);
        }
        if mode.truncate && mode.write {
            node.truncate()?;
        }

        let pos = if mode.append { node.file_size() as usize } else { 0 };
        Ok(Self { node, pos, mode })
    }

    /// Releases the handle. Writes are committed synchronously as they
    /// happen, so there is nothing left to flush here; `close` exists
    /// to give callers an explicit open/close pairing to match against.
    pub fn close(self) {}

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FileError> {
        if self.node.is_dir() {
            return Err(FileError::IsDirectory);
        }
        let n = self.node.read_at(self.pos, buf);
        self.pos += n;
        Ok(n)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FileError> {
        if self.node.is_dir() {
            return Err(FileError::IsDirectory);
        }
        if !self.mode.write {
            return Err(FileError::ReadOnly);
        }
        if self.node.attr() & ATTR_READ_ONLY != 0 {
            return Err(FileError::ReadOnly);
        }
        if self.mode.append {
            self.pos = self.node.file_size() as usize;
        }
        let n = self.node.write_at(self.pos, buf);
        self.pos += n;
        let now = self.node.volume().clock().now();
        self.node.set_time_written(now);
        self.node.set_time_accessed(now);
        Ok(n)
    }

    pub fn seek(&mut self, offset: usize) {
        self.pos = offset;
    }

    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn total(&self) -> usize {
        self.node.file_size() as usize
    }
}

/// Lists a directory's entries, filtering out the synthesized `.` and
/// `..` self/parent links every subdirectory carries.
pub fn readdir(root: &Node, path: &str) -> Result<Vec<String>, FileError> {
    let dir = resolve(root, path)?;
    if !dir.is_dir() {
        return Err(FileError::NotDirectory);
    }
    Ok(dir.ls()?.into_iter().filter(|n| n != "." && n != "..").collect())
}

pub fn mkdir(root: &Node, path: &str) -> Result<Node, FileError> {
    let (parent_path, name) = split_parent(path);
    let parent = resolve(root, parent_path)?;
    if !parent.is_dir() {
        return Err(FileError::NotDirectory);
    }
    Ok(parent.create(name, NodeKind::Dir)?)
}

pub fn unlink(root: &Node, path: &str) -> Result<(), FileError> {
    let node = resolve(root, path)?;
    if node.is_dir() {
        return Err(FileError::IsDirectory);
    }
    if node.attr() & ATTR_READ_ONLY != 0 {
        return Err(FileError::ReadOnly);
    }
    node.clear()?;
    Ok(())
}

/// As `unlink`, but refuses a non-empty directory (anything besides
/// `.` and `..`) and the volume root.
pub fn rmdir(root: &Node, path: &str) -> Result<(), FileError> {
    let node = resolve(root, path)?;
    if !node.is_dir() {
        return Err(FileError::NotDirectory);
    }
    if node.is_root() {
        return Err(FileError::NotEmpty);
    }
    let extra = node.ls()?.into_iter().filter(|n| n != "." && n != "..").count();
    if extra > 0 {
        return Err(FileError::NotEmpty);
    }
    node.clear()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::NullClock;
    use crate::fs::tests_support::format_fat32;
    use crate::fs::VolumeManager;
    use alloc::sync::Arc;

    fn mount() -> (Arc<VolumeManager>, Node) {
        let disk = format_fat32(32);
        let volume = VolumeManager::mount(disk, "C:", Arc::new(NullClock)).unwrap();
        let root = volume.root();
        (volume, root)
    }

    #[test]
    fn create_write_close_then_read_round_trips() {
        let (_volume, root) = mount();
        let mut handle = FileHandle::open(&root, "hello.txt", OpenMode::write_only().create()).unwrap();
        let written = handle.write(b"abc").unwrap();
        assert_eq!(written, 3);
        handle.close();

        let mut handle = FileHandle::open(&root, "hello.txt", OpenMode::read_only()).unwrap();
        let mut buf = [0u8; 5];
        let read = handle.read(&mut buf).unwrap();
        assert_eq!(&buf[..read], b"abc");
        assert_eq!(handle.total(), 3);
    }

    #[test]
    fn mkdir_then_readdir_excludes_dot_entries() {
        let (_volume, root) = mount();
        mkdir(&root, "sub").unwrap();
        mkdir(&root, "sub/deep").unwrap();
        let names = readdir(&root, "sub").unwrap();
        assert_eq!(names, alloc::vec!["deep"]);
    }

    #[test]
    fn rmdir_refuses_non_empty_directory() {
        let (_volume, root) = mount();
        mkdir(&root, "sub").unwrap();
        mkdir(&root, "sub/deep").unwrap();
        assert_eq!(rmdir(&root, "sub"), Err(FileError::NotEmpty));
    }

    #[test]
    fn unlink_marks_entries_deleted_and_readdir_stops_seeing_it() {
        let (_volume, root) = mount();
        FileHandle::open(&root, "hello.txt", OpenMode::write_only().create()).unwrap().close();
        unlink(&root, "hello.txt").unwrap();
        assert!(readdir(&root, "").unwrap().is_empty());
    }

    #[test]
    fn exclusive_create_against_existing_name_fails() {
        let (_volume, root) = mount();
        FileHandle::open(&root, "hello.txt", OpenMode::write_only().create()).unwrap().close();
        let result = FileHandle::open(&root, "hello.txt", OpenMode::write_only().exclusive());
        assert_eq!(result.err(), Some(FileError::Dir(DirError::Exists)));
    }
}
