//! Error types for filesystem operations.

use thiserror::Error;

use cpiofs_format::{FileType, FormatError};

/// Maximum number of path segments a single resolution will walk.
pub const MAX_SEGMENTS: usize = 2048;

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("invalid path: {0}")]
    Path(#[from] cpiofs_common::PathError),

    #[error("invalid entry name '{0}'")]
    InvalidName(String),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    #[error("operation not permitted on the root directory")]
    RootEntry,

    #[error("path exceeds {MAX_SEGMENTS} segments")]
    PathTooDeep,

    #[error("hard links to directories are not permitted")]
    HardLinkToDirectory,

    #[error("cannot move or copy a directory into its own subtree")]
    SubtreeCycle,

    #[error("entry is detached from the tree")]
    Detached,

    #[error("symbolic link target is empty")]
    EmptyLinkTarget,

    #[error("archive entry type '{0}' is not representable in the filesystem")]
    UnsupportedEntryKind(FileType),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
