//! Inode records.
//!
//! An inode is the identity unit of the filesystem: directory entries are
//! named placements of an inode, and hard links are just multiple entries
//! sharing one. The inode holds no back-references to its entries. The
//! `nlink` counter is the only accounting, and the `Arc` holding the record
//! frees it when the last entry (or archive-import map) lets go.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use cpiofs_format::{Device, FileType};

use crate::content::FileContent;
use crate::entry::DirEntry;

/// Inode index reserved for the root directory.
pub const ROOT_INDEX: u64 = 0;

/// Kind of filesystem object an inode represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InodeKind {
    Directory,
    RegularFile,
    Symlink,
    CharDevice,
    BlockDevice,
}

impl InodeKind {
    /// The archive file type for this kind.
    pub fn file_type(&self) -> FileType {
        match self {
            InodeKind::Directory => FileType::Directory,
            InodeKind::RegularFile => FileType::RegularFile,
            InodeKind::Symlink => FileType::Symlink,
            InodeKind::CharDevice => FileType::CharDevice,
            InodeKind::BlockDevice => FileType::BlockDevice,
        }
    }

    /// Map an archive file type onto a filesystem kind. Pipes and sockets
    /// have no in-memory representation.
    pub fn from_file_type(file_type: FileType) -> Option<InodeKind> {
        match file_type {
            FileType::Directory => Some(InodeKind::Directory),
            FileType::RegularFile => Some(InodeKind::RegularFile),
            FileType::Symlink => Some(InodeKind::Symlink),
            FileType::CharDevice => Some(InodeKind::CharDevice),
            FileType::BlockDevice => Some(InodeKind::BlockDevice),
            FileType::NamedPipe | FileType::Socket => None,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, InodeKind::Directory)
    }
}

/// Mutable inode metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    /// Nine permission bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Creation time, seconds since the epoch.
    pub btime: u32,
    /// Status-change time.
    pub ctime: u32,
    /// Access time.
    pub atime: u32,
    /// Modification time.
    pub mtime: u32,
    /// Identifier of the containing device.
    pub dev: Device,
}

impl Metadata {
    /// Fresh metadata with the given permissions and all four timestamps
    /// set to the current time.
    pub fn with_mode(mode: u32) -> Self {
        let now: u32 = now_epoch();
        Self {
            mode: mode & 0o777,
            uid: 0,
            gid: 0,
            btime: now,
            ctime: now,
            atime: now,
            mtime: now,
            dev: Device::NONE,
        }
    }
}

/// Seconds since the epoch, clamped to the 32-bit range of the wire format.
pub(crate) fn now_epoch() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs().min(u64::from(u32::MAX)) as u32)
        .unwrap_or(0)
}

/// Kind-tagged inode payload. The payload determines the inode's kind, so
/// the two cannot disagree.
#[derive(Debug)]
pub enum InodePayload {
    /// Children keyed by name, compared byte-wise.
    Directory(RwLock<BTreeMap<String, DirEntry>>),
    RegularFile(RwLock<FileContent>),
    /// Non-empty link target, stored verbatim.
    Symlink(RwLock<String>),
    CharDevice(Device),
    BlockDevice(Device),
}

/// A shared file identity record.
#[derive(Debug)]
pub struct Inode {
    index: u64,
    nlink: AtomicU32,
    meta: RwLock<Metadata>,
    payload: InodePayload,
}

impl Inode {
    /// Create an inode. Directories start at `nlink` 1 (the self
    /// reference); everything else starts at 0 and reaches 1 when an entry
    /// attaches.
    pub(crate) fn new(index: u64, meta: Metadata, payload: InodePayload) -> Arc<Inode> {
        let initial: u32 = match payload {
            InodePayload::Directory(_) => 1,
            _ => 0,
        };
        Arc::new(Inode {
            index,
            nlink: AtomicU32::new(initial),
            meta: RwLock::new(meta),
            payload,
        })
    }

    pub(crate) fn new_directory(index: u64, meta: Metadata) -> Arc<Inode> {
        Self::new(index, meta, InodePayload::Directory(RwLock::new(BTreeMap::new())))
    }

    /// Index within the owning filesystem; unique and stable.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn kind(&self) -> InodeKind {
        match &self.payload {
            InodePayload::Directory(_) => InodeKind::Directory,
            InodePayload::RegularFile(_) => InodeKind::RegularFile,
            InodePayload::Symlink(_) => InodeKind::Symlink,
            InodePayload::CharDevice(_) => InodeKind::CharDevice,
            InodePayload::BlockDevice(_) => InodeKind::BlockDevice,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.payload, InodePayload::Directory(_))
    }

    /// Current hard-link count.
    pub fn nlink(&self) -> u32 {
        self.nlink.load(Ordering::SeqCst)
    }

    pub(crate) fn inc_nlink(&self) -> u32 {
        self.nlink.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn dec_nlink(&self) -> u32 {
        self.nlink.fetch_sub(1, Ordering::SeqCst) - 1
    }

    /// Snapshot of the metadata.
    pub fn metadata(&self) -> Metadata {
        *self.meta.read()
    }

    /// Mutate the metadata in place. Visible through every entry sharing
    /// this inode.
    pub fn update_metadata(&self, update: impl FnOnce(&mut Metadata)) {
        let mut meta = self.meta.write();
        update(&mut meta);
        meta.mode &= 0o777;
    }

    pub(crate) fn children(&self) -> Option<&RwLock<BTreeMap<String, DirEntry>>> {
        match &self.payload {
            InodePayload::Directory(children) => Some(children),
            _ => None,
        }
    }

    /// Clone of the file content, for regular files.
    pub fn content(&self) -> Option<FileContent> {
        match &self.payload {
            InodePayload::RegularFile(content) => Some(content.read().clone()),
            _ => None,
        }
    }

    /// Replace the file content. Returns false on non-files.
    pub(crate) fn set_content(&self, new_content: FileContent) -> bool {
        match &self.payload {
            InodePayload::RegularFile(content) => {
                *content.write() = new_content;
                true
            }
            _ => false,
        }
    }

    /// The symbolic link target.
    pub fn link_target(&self) -> Option<String> {
        match &self.payload {
            InodePayload::Symlink(target) => Some(target.read().clone()),
            _ => None,
        }
    }

    pub(crate) fn set_link_target(&self, new_target: String) -> bool {
        match &self.payload {
            InodePayload::Symlink(target) => {
                *target.write() = new_target;
                true
            }
            _ => false,
        }
    }

    /// Device numbers, for device inodes.
    pub fn device(&self) -> Option<Device> {
        match &self.payload {
            InodePayload::CharDevice(device) | InodePayload::BlockDevice(device) => Some(*device),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_determines_kind() {
        let dir = Inode::new_directory(1, Metadata::with_mode(0o755));
        assert_eq!(dir.kind(), InodeKind::Directory);
        assert!(dir.is_directory());
        assert_eq!(dir.nlink(), 1);

        let file = Inode::new(
            2,
            Metadata::with_mode(0o644),
            InodePayload::RegularFile(RwLock::new(FileContent::from("x"))),
        );
        assert_eq!(file.kind(), InodeKind::RegularFile);
        assert_eq!(file.nlink(), 0);

        let link = Inode::new(
            3,
            Metadata::with_mode(0o777),
            InodePayload::Symlink(RwLock::new("target".to_string())),
        );
        assert_eq!(link.kind(), InodeKind::Symlink);
        assert_eq!(link.link_target().as_deref(), Some("target"));
    }

    #[test]
    fn test_metadata_updates_are_shared() {
        let inode = Inode::new_directory(1, Metadata::with_mode(0o755));
        let alias = std::sync::Arc::clone(&inode);

        inode.update_metadata(|meta| {
            meta.mode = 0o700;
            meta.uid = 42;
        });
        assert_eq!(alias.metadata().mode, 0o700);
        assert_eq!(alias.metadata().uid, 42);
    }

    #[test]
    fn test_mode_is_masked_to_nine_bits() {
        let inode = Inode::new_directory(1, Metadata::with_mode(0o755));
        inode.update_metadata(|meta| meta.mode = 0o40_755);
        assert_eq!(inode.metadata().mode, 0o755);
    }

    #[test]
    fn test_kind_mapping_round_trip() {
        let kinds: [InodeKind; 5] = [
            InodeKind::Directory,
            InodeKind::RegularFile,
            InodeKind::Symlink,
            InodeKind::CharDevice,
            InodeKind::BlockDevice,
        ];
        for kind in kinds {
            assert_eq!(InodeKind::from_file_type(kind.file_type()), Some(kind));
        }
        assert_eq!(InodeKind::from_file_type(FileType::Socket), None);
        assert_eq!(InodeKind::from_file_type(FileType::NamedPipe), None);
    }
}
