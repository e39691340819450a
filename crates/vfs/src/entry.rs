//! Directory entries: named placements of inodes.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use cpiofs_common::path;

use crate::enumerate::{EntryIter, SearchOption};
use crate::error::{FsError, MAX_SEGMENTS};
use crate::inode::{Inode, InodeKind, ROOT_INDEX};

/// A named placement of an inode in the tree.
///
/// Entries are cheap shared handles: cloning one clones the handle, not the
/// entry. Several distinct entries may share one inode (hard links); the
/// inode's `nlink` counts them.
#[derive(Debug, Clone)]
pub struct DirEntry {
    inner: Arc<EntryInner>,
}

#[derive(Debug)]
struct EntryInner {
    /// Single path component; empty only for the root.
    name: RwLock<String>,
    /// Weak to avoid a cycle with the parent's child map.
    parent: RwLock<Weak<EntryInner>>,
    inode: Arc<Inode>,
}

impl DirEntry {
    /// A detached entry; attachment wires up the parent and counters.
    pub(crate) fn new(name: String, inode: Arc<Inode>) -> DirEntry {
        DirEntry {
            inner: Arc::new(EntryInner {
                name: RwLock::new(name),
                parent: RwLock::new(Weak::new()),
                inode,
            }),
        }
    }

    /// The entry's name. Empty only for the root directory.
    pub fn name(&self) -> String {
        self.inner.name.read().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.inner.name.write() = name.to_string();
    }

    /// The shared inode behind this entry.
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inner.inode
    }

    pub fn kind(&self) -> InodeKind {
        self.inner.inode.kind()
    }

    pub fn is_directory(&self) -> bool {
        self.inner.inode.is_directory()
    }

    pub fn is_root(&self) -> bool {
        self.inner.inode.index() == ROOT_INDEX
    }

    /// The containing directory, if attached.
    pub fn parent(&self) -> Option<DirEntry> {
        self.inner
            .parent
            .read()
            .upgrade()
            .map(|inner| DirEntry { inner })
    }

    pub(crate) fn set_parent(&self, parent: &DirEntry) {
        *self.inner.parent.write() = Arc::downgrade(&parent.inner);
    }

    pub(crate) fn clear_parent(&self) {
        *self.inner.parent.write() = Weak::new();
    }

    /// Whether the entry is reachable from a root.
    pub fn is_attached(&self) -> bool {
        self.is_root() || self.parent().is_some()
    }

    /// Identity comparison of the entries themselves.
    pub fn same_entry(&self, other: &DirEntry) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Whether two entries are hard links to one inode.
    pub fn shares_inode_with(&self, other: &DirEntry) -> bool {
        Arc::ptr_eq(&self.inner.inode, &other.inner.inode)
    }

    /// Absolute path of this entry, walking up to the root.
    ///
    /// # Errors
    /// [`FsError::Detached`] when the chain does not end at the root.
    pub fn full_path(&self) -> Result<String, FsError> {
        if self.is_root() {
            return Ok("/".to_string());
        }

        let mut segments: Vec<String> = Vec::new();
        let mut current: DirEntry = self.clone();
        for _ in 0..MAX_SEGMENTS {
            segments.push(current.name());
            match current.parent() {
                Some(parent) if parent.is_root() => {
                    segments.reverse();
                    return Ok(format!("/{}", segments.join("/")));
                }
                Some(parent) => current = parent,
                None => return Err(FsError::Detached),
            }
        }
        Err(FsError::PathTooDeep)
    }

    /// The topmost entry reachable through parent pointers.
    pub(crate) fn root_of(&self) -> Result<DirEntry, FsError> {
        let mut current: DirEntry = self.clone();
        for _ in 0..MAX_SEGMENTS {
            match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(current),
            }
        }
        Err(FsError::PathTooDeep)
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub(crate) fn is_ancestor_of(&self, other: &DirEntry) -> Result<bool, FsError> {
        let mut current: DirEntry = other.clone();
        for _ in 0..MAX_SEGMENTS {
            if self.same_entry(&current) {
                return Ok(true);
            }
            match current.parent() {
                Some(parent) => current = parent,
                None => return Ok(false),
            }
        }
        Err(FsError::PathTooDeep)
    }

    /// Look up a child of this directory by name.
    pub fn child(&self, name: &str) -> Option<DirEntry> {
        let children = self.inner.inode.children()?;
        let map = children.read();
        map.get(name).cloned()
    }

    /// Name-sorted snapshot of this directory's children. Empty for
    /// non-directories.
    pub fn children(&self) -> Vec<DirEntry> {
        match self.inner.inode.children() {
            Some(children) => children.read().values().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn child_count(&self) -> usize {
        match self.inner.inode.children() {
            Some(children) => children.read().len(),
            None => 0,
        }
    }

    /// Resolve a path relative to this entry; absolute paths resolve from
    /// the root of the tree this entry belongs to. Missing targets and
    /// non-directory intermediates yield `None`.
    pub fn try_get(&self, target: &str) -> Result<Option<DirEntry>, FsError> {
        path::validate(target)?;
        let normalized: String = path::normalize(target).into_owned();

        let mut current: DirEntry = if path::is_rooted(&normalized) {
            self.root_of()?
        } else {
            self.clone()
        };

        let segments: Vec<&str> = normalized
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect();
        if segments.len() > MAX_SEGMENTS {
            return Err(FsError::PathTooDeep);
        }

        for segment in segments {
            if segment == ".." {
                // The root is its own parent, POSIX-style.
                if let Some(parent) = current.parent() {
                    current = parent;
                }
                continue;
            }
            if !current.is_directory() {
                return Ok(None);
            }
            match current.child(segment) {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    /// Resolve a path, failing loudly where [`DirEntry::try_get`] yields
    /// `None`.
    pub fn get(&self, target: &str) -> Result<DirEntry, FsError> {
        self.try_get(target)?
            .ok_or_else(|| FsError::NotFound(target.to_string()))
    }

    /// Lazily enumerate entries under this directory in name-sorted
    /// pre-order. The traversal snapshots each directory as it is visited,
    /// so mutating the tree mid-iteration is safe.
    ///
    /// `pattern` filters returned entries by name with shell-style globs
    /// (`*`, `?`); it does not prune the traversal.
    pub fn enumerate(
        &self,
        option: SearchOption,
        pattern: Option<&str>,
    ) -> Result<EntryIter, FsError> {
        EntryIter::new(self, option, pattern)
    }
}
