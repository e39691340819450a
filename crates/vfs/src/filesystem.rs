//! The filesystem root: inode allocation and the path-level operation
//! surface.

use std::io::{Read, Seek, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use cpiofs_common::path;
use cpiofs_format::reader::ArchiveReader;
use cpiofs_format::substream::{SeekableSource, SequentialSource, Source};
use cpiofs_format::writer::ArchiveWriter;
use cpiofs_format::Device;

use crate::archive;
use crate::content::FileContent;
use crate::copy::{self, CopyMode};
use crate::dir;
use crate::entry::DirEntry;
use crate::enumerate::{EntryIter, SearchOption};
use crate::error::FsError;
use crate::inode::{Inode, InodePayload, Metadata, ROOT_INDEX};

/// Which flavor of device node to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Char,
    Block,
}

/// An in-memory UNIX filesystem.
///
/// Owns the root directory (inode index 0) and the monotonic inode index
/// allocator. Paths given to these methods are resolved from the root;
/// [`DirEntry::try_get`] resolves relative to any directory.
#[derive(Debug)]
pub struct UnixFs {
    root: DirEntry,
    next_index: AtomicU64,
}

impl UnixFs {
    /// An empty filesystem: just the root directory, `nlink` 2.
    pub fn new() -> UnixFs {
        let root_inode: Arc<Inode> = Inode::new_directory(ROOT_INDEX, Metadata::with_mode(0o755));
        // Self reference plus the (virtual) parent slot.
        root_inode.inc_nlink();
        UnixFs {
            root: DirEntry::new(String::new(), root_inode),
            next_index: AtomicU64::new(1),
        }
    }

    /// The root directory entry.
    pub fn root(&self) -> &DirEntry {
        &self.root
    }

    pub(crate) fn allocate_index(&self) -> u64 {
        self.next_index.fetch_add(1, Ordering::SeqCst)
    }

    /// Resolve a path from the root; `None` when anything along the way is
    /// missing or not a directory.
    pub fn try_get(&self, target: &str) -> Result<Option<DirEntry>, FsError> {
        self.root.try_get(target)
    }

    /// Resolve a path from the root, failing on missing entries.
    pub fn get(&self, target: &str) -> Result<DirEntry, FsError> {
        self.root.get(target)
    }

    /// Create a regular file.
    ///
    /// Missing parent directories are created when `mkparents` is set;
    /// the final segment must not exist.
    pub fn create_file(
        &self,
        target: &str,
        content: impl Into<FileContent>,
        mkparents: bool,
    ) -> Result<DirEntry, FsError> {
        let (parent, name) = self.prepare_parent(target, mkparents)?;
        let payload: InodePayload = InodePayload::RegularFile(RwLock::new(content.into()));
        self.attach_new(&parent, &name, Metadata::with_mode(0o644), payload, target)
    }

    /// Create a directory; the new inode's `nlink` is 2 and the parent's
    /// is incremented.
    pub fn create_dir(&self, target: &str, mkparents: bool) -> Result<DirEntry, FsError> {
        let (parent, name) = self.prepare_parent(target, mkparents)?;
        let inode: Arc<Inode> = Inode::new_directory(self.allocate_index(), Metadata::with_mode(0o755));
        let entry: DirEntry = DirEntry::new(name.clone(), inode);
        self.attach_checked(&parent, &name, &entry, target)
    }

    /// Create a symbolic link. The target is stored verbatim and never
    /// resolved.
    pub fn create_symlink(
        &self,
        target: &str,
        link_target: &str,
        mkparents: bool,
    ) -> Result<DirEntry, FsError> {
        path::validate(link_target)?;
        if link_target.is_empty() {
            return Err(FsError::EmptyLinkTarget);
        }
        let (parent, name) = self.prepare_parent(target, mkparents)?;
        let payload: InodePayload = InodePayload::Symlink(RwLock::new(link_target.to_string()));
        self.attach_new(&parent, &name, Metadata::with_mode(0o777), payload, target)
    }

    /// Create a character or block device node.
    pub fn create_device(
        &self,
        target: &str,
        kind: DeviceKind,
        device: Device,
        mkparents: bool,
    ) -> Result<DirEntry, FsError> {
        let (parent, name) = self.prepare_parent(target, mkparents)?;
        let payload: InodePayload = match kind {
            DeviceKind::Char => InodePayload::CharDevice(device),
            DeviceKind::Block => InodePayload::BlockDevice(device),
        };
        self.attach_new(&parent, &name, Metadata::with_mode(0o644), payload, target)
    }

    /// Create a hard link to `existing`. The new entry shares the inode,
    /// whose `nlink` grows by one. Directories cannot be hard-linked.
    pub fn create_hard_link(
        &self,
        target: &str,
        existing: &DirEntry,
        mkparents: bool,
    ) -> Result<DirEntry, FsError> {
        if existing.is_directory() {
            return Err(FsError::HardLinkToDirectory);
        }
        let (parent, name) = self.prepare_parent(target, mkparents)?;
        let entry: DirEntry = DirEntry::new(name.clone(), Arc::clone(existing.inode()));
        self.attach_checked(&parent, &name, &entry, target)
    }

    /// Recursively delete the entry at `target`. The root cannot be
    /// deleted.
    pub fn delete(&self, target: &str) -> Result<(), FsError> {
        let entry: DirEntry = self.get(target)?;
        if entry.is_root() {
            return Err(FsError::RootEntry);
        }
        dir::delete_recursive(&entry)
    }

    /// Move (and possibly rename) a single entry.
    ///
    /// A destination that resolves to an existing directory receives the
    /// source inside itself; an existing non-directory destination is
    /// replaced only when `overwrite` is set.
    pub fn move_entry(
        &self,
        source_path: &str,
        dest_path: &str,
        mkparents: bool,
        overwrite: bool,
    ) -> Result<DirEntry, FsError> {
        let source: DirEntry = self.get(source_path)?;
        if source.is_root() {
            return Err(FsError::RootEntry);
        }

        let (target_parent, target_name) = match self.try_get(dest_path)? {
            Some(existing) if existing.same_entry(&source) => return Ok(source),
            Some(existing) if existing.is_directory() => {
                let name: String = source.name();
                if let Some(occupant) = existing.child(&name) {
                    if occupant.same_entry(&source) {
                        return Ok(source);
                    }
                    if occupant.is_directory() || !overwrite {
                        return Err(FsError::AlreadyExists(path::combine(dest_path, &name)));
                    }
                    dir::delete_recursive(&occupant)?;
                }
                (existing, name)
            }
            Some(existing) => {
                if !overwrite {
                    return Err(FsError::AlreadyExists(dest_path.to_string()));
                }
                let parent: DirEntry = existing.parent().ok_or(FsError::Detached)?;
                let name: String = existing.name();
                dir::delete_recursive(&existing)?;
                (parent, name)
            }
            None => self.prepare_parent(dest_path, mkparents)?,
        };

        if source.is_directory() && source.is_ancestor_of(&target_parent)? {
            return Err(FsError::SubtreeCycle);
        }

        dir::detach(&source)?;
        dir::attach(&target_parent, &target_name, &source)?;
        Ok(source)
    }

    /// Copy the entry at `source_path` to `dest_path` under the given
    /// [`CopyMode`]. A destination that resolves to an existing directory
    /// receives the copy inside itself.
    pub fn copy(
        &self,
        source_path: &str,
        dest_path: &str,
        mode: CopyMode,
    ) -> Result<DirEntry, FsError> {
        let source: DirEntry = self.get(source_path)?;

        let (target_parent, target_name) = match self.try_get(dest_path)? {
            Some(existing) if existing.is_directory() => {
                let name: String = source.name();
                if existing.child(&name).is_some() {
                    return Err(FsError::AlreadyExists(path::combine(dest_path, &name)));
                }
                (existing, name)
            }
            Some(_) => return Err(FsError::AlreadyExists(dest_path.to_string())),
            None => self.prepare_parent(dest_path, false)?,
        };

        copy::perform(self, &source, &target_parent, &target_name, mode)
    }

    /// Enumerate the whole tree from the root. See [`DirEntry::enumerate`].
    pub fn enumerate(
        &self,
        option: SearchOption,
        pattern: Option<&str>,
    ) -> Result<EntryIter, FsError> {
        self.root.enumerate(option, pattern)
    }

    /// Populate this filesystem from an archive stream.
    pub fn read_archive<S: Source>(
        &self,
        reader: &mut ArchiveReader<S>,
        overwrite: bool,
    ) -> Result<usize, FsError> {
        archive::read_archive(self, reader, overwrite)
    }

    /// Populate this filesystem from a forward-only byte stream.
    pub fn read_from<R: Read>(&self, source: R, overwrite: bool) -> Result<usize, FsError> {
        let mut reader: ArchiveReader<SequentialSource<R>> = ArchiveReader::new(source);
        self.read_archive(&mut reader, overwrite)
    }

    /// Populate this filesystem from a seekable byte stream.
    pub fn read_from_seekable<R: Read + Seek>(
        &self,
        source: R,
        overwrite: bool,
    ) -> Result<usize, FsError> {
        let mut reader: ArchiveReader<SeekableSource<R>> = ArchiveReader::new_seekable(source);
        self.read_archive(&mut reader, overwrite)
    }

    /// Serialize the whole tree into an archive writer, without finishing
    /// it.
    pub fn write_archive<W: Write>(&self, writer: &mut ArchiveWriter<W>) -> Result<usize, FsError> {
        archive::write_archive(self, writer)
    }

    /// Serialize the whole tree to `sink` as a finished archive.
    pub fn write_to<W: Write>(&self, sink: W) -> Result<usize, FsError> {
        let mut writer: ArchiveWriter<W> = ArchiveWriter::new(sink);
        let count: usize = self.write_archive(&mut writer)?;
        writer.finish()?;
        Ok(count)
    }

    /// Split a creation path into its parent directory and final name,
    /// creating intermediate directories when `mkparents` is set.
    fn prepare_parent(
        &self,
        target: &str,
        mkparents: bool,
    ) -> Result<(DirEntry, String), FsError> {
        path::validate(target)?;
        let normalized: String = path::normalize(target).into_owned();
        let (parent_path, name) = path::split(&normalized);
        if name.is_empty() || name == "." || name == ".." {
            return Err(FsError::InvalidName(normalized.clone()));
        }

        let parent: DirEntry = match self.try_get(parent_path)? {
            Some(existing) if existing.is_directory() => existing,
            Some(_) => return Err(FsError::NotADirectory(parent_path.to_string())),
            None if mkparents => self.make_dirs(parent_path)?,
            None => return Err(FsError::NotFound(parent_path.to_string())),
        };
        Ok((parent, name.to_string()))
    }

    /// Walk `target` from the root, creating missing directories.
    fn make_dirs(&self, target: &str) -> Result<DirEntry, FsError> {
        let mut current: DirEntry = self.root.clone();
        for segment in target.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                if let Some(parent) = current.parent() {
                    current = parent;
                }
                continue;
            }
            current = match current.child(segment) {
                Some(child) if child.is_directory() => child,
                Some(_) => return Err(FsError::NotADirectory(segment.to_string())),
                None => {
                    let inode: Arc<Inode> =
                        Inode::new_directory(self.allocate_index(), Metadata::with_mode(0o755));
                    let child: DirEntry = DirEntry::new(segment.to_string(), inode);
                    dir::attach(&current, segment, &child)?;
                    child
                }
            };
        }
        Ok(current)
    }

    fn attach_new(
        &self,
        parent: &DirEntry,
        name: &str,
        meta: Metadata,
        payload: InodePayload,
        target: &str,
    ) -> Result<DirEntry, FsError> {
        let inode: Arc<Inode> = Inode::new(self.allocate_index(), meta, payload);
        let entry: DirEntry = DirEntry::new(name.to_string(), inode);
        self.attach_checked(parent, name, &entry, target)
    }

    fn attach_checked(
        &self,
        parent: &DirEntry,
        name: &str,
        entry: &DirEntry,
        target: &str,
    ) -> Result<DirEntry, FsError> {
        if parent.child(name).is_some() {
            return Err(FsError::AlreadyExists(target.to_string()));
        }
        dir::attach(parent, name, entry)?;
        Ok(entry.clone())
    }
}

impl Default for UnixFs {
    fn default() -> Self {
        Self::new()
    }
}
