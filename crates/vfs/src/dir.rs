//! Directory mechanics: attaching, detaching, and recursive removal.
//!
//! Every structural mutation of the tree funnels through `attach` and
//! `detach` so the `nlink` bookkeeping has exactly one home:
//! - attach: child inode +1; a directory child also bumps the parent (the
//!   child's `..`).
//! - detach: the reverse, children first so the counts converge.

use crate::entry::DirEntry;
use crate::error::FsError;

/// Place `child` into `parent` under `name`.
///
/// The child must be detached. Fails if the slot is taken or the parent is
/// not a directory.
pub(crate) fn attach(parent: &DirEntry, name: &str, child: &DirEntry) -> Result<(), FsError> {
    let children = parent
        .inode()
        .children()
        .ok_or_else(|| FsError::NotADirectory(parent.name()))?;

    {
        let mut map = children.write();
        if map.contains_key(name) {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        child.set_name(name);
        child.set_parent(parent);
        map.insert(name.to_string(), child.clone());
    }

    child.inode().inc_nlink();
    if child.is_directory() {
        parent.inode().inc_nlink();
    }
    Ok(())
}

/// Remove `child` from its parent, leaving it detached.
///
/// Directory children of `child` are untouched; recursive removal is
/// [`delete_recursive`]'s job.
pub(crate) fn detach(child: &DirEntry) -> Result<(), FsError> {
    let parent: DirEntry = child.parent().ok_or(FsError::Detached)?;
    let children = parent
        .inode()
        .children()
        .expect("attached entries hang off directories");

    {
        let mut map = children.write();
        map.remove(&child.name());
        child.clear_parent();
    }

    child.inode().dec_nlink();
    if child.is_directory() {
        parent.inode().dec_nlink();
    }
    Ok(())
}

/// Detach `entry` and everything below it, deepest entries first.
pub(crate) fn delete_recursive(entry: &DirEntry) -> Result<(), FsError> {
    if entry.is_directory() {
        for child in entry.children() {
            delete_recursive(&child)?;
        }
    }
    detach(entry)
}
