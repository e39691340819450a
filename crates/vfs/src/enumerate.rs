//! Lazy tree enumeration with glob filtering.

use std::collections::VecDeque;

use glob::Pattern;

use crate::entry::DirEntry;
use crate::error::FsError;

/// How far an enumeration descends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOption {
    /// Immediate children only.
    #[default]
    TopLevel,
    /// The whole subtree, pre-order.
    Recursive,
}

/// Iterator over directory entries in name-sorted pre-order.
///
/// Each directory's children are snapshotted when the directory is
/// visited, so mutations during iteration never invalidate the iterator;
/// they are simply reflected (or not) depending on whether the mutated
/// directory was already expanded.
#[derive(Debug)]
pub struct EntryIter {
    pending: VecDeque<DirEntry>,
    pattern: Option<Pattern>,
    recursive: bool,
}

impl EntryIter {
    pub(crate) fn new(
        root: &DirEntry,
        option: SearchOption,
        pattern: Option<&str>,
    ) -> Result<EntryIter, FsError> {
        if !root.is_directory() {
            return Err(FsError::NotADirectory(root.name()));
        }
        let pattern: Option<Pattern> = match pattern {
            Some(text) => Some(Pattern::new(text)?),
            None => None,
        };
        Ok(EntryIter {
            pending: root.children().into(),
            pattern,
            recursive: option == SearchOption::Recursive,
        })
    }

    fn matches(&self, entry: &DirEntry) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches(&entry.name()),
            None => true,
        }
    }
}

impl Iterator for EntryIter {
    type Item = DirEntry;

    fn next(&mut self) -> Option<DirEntry> {
        loop {
            let entry: DirEntry = self.pending.pop_front()?;
            if self.recursive && entry.is_directory() {
                // Pre-order: the subtree comes immediately after its root.
                for (position, child) in entry.children().into_iter().enumerate() {
                    self.pending.insert(position, child);
                }
            }
            if self.matches(&entry) {
                return Some(entry);
            }
        }
    }
}
