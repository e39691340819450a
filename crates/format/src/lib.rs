//! Streaming codec for CPIO "new ASCII" archives.
//!
//! This crate reads and writes the `070701` (newc) and `070702`
//! (newc + checksum) archive flavors with byte-exact round-trip fidelity:
//! - `reader` / `writer` - streaming iteration and append-only emission
//! - `header` - the fixed 110-byte header codec
//! - `hex` - the vectorised ASCII-hex field codec behind it
//! - `substream` - bounded read windows over a parent stream
//!
//! File bodies are exposed lazily as bounded sub-streams, so archives
//! larger than memory can be processed entry by entry. The in-memory
//! filesystem that consumes these records lives in the companion
//! `cpiofs-vfs` crate.

pub mod checksum;
pub mod entry;
pub mod error;
pub mod header;
pub mod hex;
pub mod reader;
pub mod substream;
pub mod writer;

pub use entry::{CpioEntry, Device};
pub use error::{DataErrorKind, EntryValidationError, FormatError, StateError};
pub use header::{FileType, Format, HEADER_LEN, TRAILER_NAME};
pub use reader::{ArchiveReader, Entry};
pub use substream::{SeekableSource, SeekableSubStream, SequentialSource, Source, SubStream};
pub use writer::ArchiveWriter;
