//! Error types for archive encoding and decoding.

use thiserror::Error;

use crate::header::FileType;

/// Errors that can occur while reading or writing an archive.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The archive bytes are malformed. The offset is measured from the
    /// stream origin; the stream cannot be resumed after this.
    #[error("malformed archive at byte {offset}: {kind}")]
    Data { offset: u64, kind: DataErrorKind },

    /// The caller supplied an invalid entry. Recoverable with corrected
    /// inputs.
    #[error("invalid entry: {0}")]
    Usage(#[from] EntryValidationError),

    /// The reader or writer was driven outside its protocol. Not
    /// recoverable on this instance.
    #[error("{0}")]
    State(#[from] StateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    pub(crate) fn data(offset: u64, kind: DataErrorKind) -> Self {
        FormatError::Data { offset, kind }
    }
}

/// Ways an archive byte stream can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataErrorKind {
    #[error("unrecognized magic {0:02X?}")]
    BadMagic([u8; 6]),

    #[error("header field is not hexadecimal")]
    InvalidHex,

    #[error("name size is zero")]
    ZeroNameSize,

    #[error("entry name is not valid UTF-8")]
    NameNotUtf8,

    #[error("link target is not valid UTF-8")]
    LinkTargetNotUtf8,

    #[error("{0} entry carries a body")]
    UnexpectedBody(FileType),

    #[error("trailer entry carries a body")]
    TrailerWithBody,

    #[error("archive is truncated")]
    Truncated,

    #[error("unsupported file type nibble {0:#X}")]
    UnsupportedFileType(u32),

    #[error("checksum mismatch: header {header:08X}, body {body:08X}")]
    ChecksumMismatch { header: u32, body: u32 },
}

/// Entry validation failures reported before any bytes are emitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryValidationError {
    #[error("entry name is empty")]
    EmptyName,

    #[error("entry name '{0}' contains a NUL byte")]
    NameHasNul(String),

    #[error("entry name '{0}' is not normalized")]
    NameNotNormalized(String),

    #[error("entry name '{0}' escapes the archive root")]
    NameEscapesRoot(String),

    #[error("link target on a {0} entry")]
    LinkTargetOnNonSymlink(FileType),

    #[error("symbolic link '{0}' has an empty target")]
    EmptyLinkTarget(String),

    #[error("data length {actual} does not match declared size {declared}")]
    DataLengthMismatch { declared: u64, actual: u64 },

    #[error("file of {0} bytes exceeds the 32-bit size field")]
    FileTooLarge(u64),

    #[error("{0} entry carries data")]
    UnexpectedData(FileType),

    #[error("regular file declares {0} bytes but no data was supplied")]
    MissingData(u64),

    #[error("directory has link count {0}, expected at least 2")]
    DirectoryLinkCount(u32),

    #[error("{file_type} entry has link count {nlink}, expected 1")]
    LinkCount { file_type: FileType, nlink: u32 },
}

/// Protocol violations that poison the reader or writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error(
        "next entry requested with {remaining} unread body bytes on a non-seekable source"
    )]
    UnconsumedData { remaining: u64 },

    #[error("reader is poisoned by an earlier error")]
    Poisoned,

    #[error("writer already finished")]
    Finished,
}
