//! Subtree copying.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::dir;
use crate::entry::DirEntry;
use crate::error::FsError;
use crate::filesystem::UnixFs;
use crate::inode::{Inode, InodeKind, InodePayload};

/// How a copy treats inode identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Copy one entry: file content is cloned into a fresh inode, while
    /// every other kind shares its inode with the source.
    Single,
    /// Deep-copy a subtree, cloning every inode. Hard-link groupings in
    /// the source become independent files.
    Recursive,
    /// Copy the subtree structure but share every non-directory inode:
    /// the copy is hard links all the way down.
    RecursiveWithHardLinks,
    /// Deep-copy the subtree while preserving hard-link identity inside
    /// it: entries that shared an inode in the source share a (new) inode
    /// in the copy.
    Archive,
}

/// Copy `source` under `parent` as `name`.
pub(crate) fn perform(
    fs: &UnixFs,
    source: &DirEntry,
    parent: &DirEntry,
    name: &str,
    mode: CopyMode,
) -> Result<DirEntry, FsError> {
    if source.is_directory() && source.is_ancestor_of(parent)? {
        return Err(FsError::SubtreeCycle);
    }

    let copied: DirEntry = match mode {
        CopyMode::Single => single(fs, source)?,
        CopyMode::Recursive => tree(fs, source, &mut SharePolicy::CloneAll)?,
        CopyMode::RecursiveWithHardLinks => tree(fs, source, &mut SharePolicy::ShareAll)?,
        CopyMode::Archive => tree(fs, source, &mut SharePolicy::Remap(HashMap::new()))?,
    };
    dir::attach(parent, name, &copied)?;
    Ok(copied)
}

/// Inode identity policy for tree copies, applied to non-directories.
/// Directories always get fresh inodes so each placement owns its map.
enum SharePolicy {
    CloneAll,
    ShareAll,
    /// Source inode index to its replacement in the copy.
    Remap(HashMap<u64, Arc<Inode>>),
}

fn single(fs: &UnixFs, source: &DirEntry) -> Result<DirEntry, FsError> {
    let inode: Arc<Inode> = match source.kind() {
        InodeKind::RegularFile => clone_inode(fs, source.inode()),
        _ => Arc::clone(source.inode()),
    };
    Ok(DirEntry::new(source.name(), inode))
}

fn tree(fs: &UnixFs, source: &DirEntry, policy: &mut SharePolicy) -> Result<DirEntry, FsError> {
    let inode: Arc<Inode> = if source.is_directory() {
        Inode::new_directory(fs.allocate_index(), source.inode().metadata())
    } else {
        match policy {
            SharePolicy::CloneAll => clone_inode(fs, source.inode()),
            SharePolicy::ShareAll => Arc::clone(source.inode()),
            SharePolicy::Remap(seen) => match seen.get(&source.inode().index()) {
                Some(replacement) => Arc::clone(replacement),
                None => {
                    let replacement: Arc<Inode> = clone_inode(fs, source.inode());
                    seen.insert(source.inode().index(), Arc::clone(&replacement));
                    replacement
                }
            },
        }
    };

    let copied: DirEntry = DirEntry::new(source.name(), inode);
    if source.is_directory() {
        for child in source.children() {
            let copied_child: DirEntry = tree(fs, &child, policy)?;
            dir::attach(&copied, &child.name(), &copied_child)?;
        }
    }
    Ok(copied)
}

/// Fresh inode with the same metadata and a cloned payload. Byte content
/// is deep-copied; stream content shares its source, which is the content
/// type's documented clone behavior.
fn clone_inode(fs: &UnixFs, source: &Arc<Inode>) -> Arc<Inode> {
    let payload: InodePayload = match source.kind() {
        InodeKind::RegularFile => InodePayload::RegularFile(RwLock::new(
            source.content().expect("regular file payload"),
        )),
        InodeKind::Symlink => {
            InodePayload::Symlink(RwLock::new(source.link_target().expect("symlink payload")))
        }
        InodeKind::CharDevice => {
            InodePayload::CharDevice(source.device().expect("device payload"))
        }
        InodeKind::BlockDevice => {
            InodePayload::BlockDevice(source.device().expect("device payload"))
        }
        InodeKind::Directory => unreachable!("directories are handled by the tree copy"),
    };
    Inode::new(fs.allocate_index(), source.metadata(), payload)
}
