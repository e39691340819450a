//! Append-only archive serializer.
//!
//! Entries are validated before any bytes reach the sink; once emission
//! starts there is no rewind, so a failed body copy leaves partial output
//! visible. The trailer record is written by `finish` (idempotent) and as
//! a backstop on drop.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::checksum;
use crate::entry::CpioEntry;
use crate::error::{EntryValidationError, FormatError, StateError};
use crate::header::{FileType, Format, RawHeader, TRAILER_NAME};

const ALIGN: u64 = 4;
const PADDING: [u8; 4] = [0; 4];

fn align4(offset: u64) -> u64 {
    (offset + ALIGN - 1) & !(ALIGN - 1)
}

/// Streaming archive writer.
///
/// The writer's configured [`Format`] governs every emitted header; the
/// `format` field of individual entries is informational (it reports what a
/// reader decoded) and is not consulted here.
#[derive(Debug)]
pub struct ArchiveWriter<W: Write> {
    sink: Option<W>,
    format: Format,
    offset: u64,
    finished: bool,
}

impl<W: Write> ArchiveWriter<W> {
    /// Writer for the plain `070701` flavor.
    pub fn new(sink: W) -> Self {
        Self::with_format(sink, Format::Newc)
    }

    /// Writer for an explicit archive flavor.
    pub fn with_format(sink: W, format: Format) -> Self {
        Self {
            sink: Some(sink),
            format,
            offset: 0,
            finished: false,
        }
    }

    /// Bytes emitted so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Append an entry without a body: directories, links, devices, pipes,
    /// sockets, and zero-length regular files.
    pub fn add_entry(&mut self, entry: &CpioEntry) -> Result<(), FormatError> {
        entry.validate(None)?;
        self.emit(entry, None)
    }

    /// Append a regular file, streaming its body from `data`.
    ///
    /// The stream must produce exactly `entry.file_size` bytes; a shorter
    /// or longer stream is a usage error, detected after the short body has
    /// already been emitted (the sink sees the partial output).
    pub fn add_file<R: Read>(&mut self, entry: &CpioEntry, mut data: R) -> Result<(), FormatError> {
        entry.validate(Some(entry.file_size))?;
        self.emit(entry, Some(&mut data))
    }

    /// Write the trailer record and flush the sink. Further `add_*` calls
    /// fail; repeated `finish` calls are no-ops.
    pub fn finish(&mut self) -> Result<(), FormatError> {
        if self.finished {
            return Ok(());
        }

        let header: RawHeader = RawHeader {
            format: self.format,
            ino: 0,
            mode: 0,
            uid: 0,
            gid: 0,
            nlink: 1,
            mtime: 0,
            file_size: 0,
            dev_major: 0,
            dev_minor: 0,
            rdev_major: 0,
            rdev_minor: 0,
            name_size: TRAILER_NAME.len() as u32 + 1,
            check: 0,
        };
        self.write_all(&header.encode())?;
        self.write_all(TRAILER_NAME.as_bytes())?;
        self.write_all(&[0])?;
        self.pad_to_alignment()?;
        self.sink_mut().flush()?;

        self.finished = true;
        debug!(bytes = self.offset, "archive finished");
        Ok(())
    }

    /// Finish the archive and hand back the sink.
    pub fn into_inner(mut self) -> Result<W, FormatError> {
        self.finish()?;
        Ok(self.sink.take().expect("sink present until disposal"))
    }

    fn emit(&mut self, entry: &CpioEntry, data: Option<&mut dyn Read>) -> Result<(), FormatError> {
        if self.finished {
            return Err(StateError::Finished.into());
        }

        // The checksum flavor needs the sum before the header goes out, so
        // a streamed body without a precomputed checksum is buffered.
        let mut buffered: Option<Vec<u8>> = None;
        let mut data: Option<&mut dyn Read> = data;
        let check: u32 = match self.format {
            Format::Newc => 0,
            Format::NewcCrc => {
                if entry.file_type != FileType::RegularFile || entry.file_size == 0 {
                    0
                } else if entry.checksum != 0 {
                    entry.checksum
                } else {
                    let body: Vec<u8> = Self::drain_body(
                        data.take().expect("validated: data present"),
                        entry.file_size,
                    )?;
                    let sum: u32 = checksum::of(&body);
                    buffered = Some(body);
                    sum
                }
            }
        };

        let header: RawHeader = RawHeader {
            format: self.format,
            ino: entry.ino,
            mode: entry.mode_word(),
            uid: entry.uid,
            gid: entry.gid,
            nlink: entry.nlink,
            mtime: entry.mtime,
            file_size: entry.file_size as u32,
            dev_major: entry.dev.major,
            dev_minor: entry.dev.minor,
            rdev_major: entry.rdev.major,
            rdev_minor: entry.rdev.minor,
            name_size: entry.name.len() as u32 + 1,
            check,
        };

        self.write_all(&header.encode())?;
        self.write_all(entry.name.as_bytes())?;
        self.write_all(&[0])?;
        self.pad_to_alignment()?;

        if let Some(target) = &entry.link_target {
            self.write_all(target.as_bytes())?;
        } else if let Some(body) = buffered {
            self.write_all(&body)?;
        } else if let Some(reader) = data {
            self.copy_body(reader, entry.file_size)?;
        }
        self.pad_to_alignment()?;

        Ok(())
    }

    /// Buffer a body, insisting on the declared length.
    fn drain_body(reader: &mut dyn Read, declared: u64) -> Result<Vec<u8>, FormatError> {
        let mut body: Vec<u8> = Vec::with_capacity(declared.min(usize::MAX as u64) as usize);
        (&mut *reader).take(declared).read_to_end(&mut body)?;
        if (body.len() as u64) < declared || Self::has_more(reader)? {
            return Err(EntryValidationError::DataLengthMismatch {
                declared,
                actual: body.len() as u64,
            }
            .into());
        }
        Ok(body)
    }

    /// Stream a body through to the sink, insisting on the declared length.
    fn copy_body(&mut self, reader: &mut dyn Read, declared: u64) -> Result<(), FormatError> {
        let sink: &mut W = self.sink.as_mut().expect("sink present until disposal");
        let copied: u64 = io::copy(&mut (&mut *reader).take(declared), sink)?;
        self.offset += copied;
        if copied < declared || Self::has_more(reader)? {
            return Err(EntryValidationError::DataLengthMismatch {
                declared,
                actual: copied,
            }
            .into());
        }
        Ok(())
    }

    fn has_more(reader: &mut dyn Read) -> io::Result<bool> {
        let mut probe: [u8; 1] = [0];
        Ok(reader.read(&mut probe)? > 0)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), FormatError> {
        self.sink_mut().write_all(bytes)?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn pad_to_alignment(&mut self) -> Result<(), FormatError> {
        let pad: u64 = align4(self.offset) - self.offset;
        if pad > 0 {
            self.write_all(&PADDING[..pad as usize])?;
        }
        Ok(())
    }

    fn sink_mut(&mut self) -> &mut W {
        self.sink.as_mut().expect("sink present until disposal")
    }
}

impl<W: Write> Drop for ArchiveWriter<W> {
    fn drop(&mut self) {
        if !self.finished && self.sink.is_some() {
            let _ = self.finish();
        }
    }
}
