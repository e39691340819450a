//! Streaming archive reader.
//!
//! The reader walks header → name → body for each record and stops at the
//! trailer. Regular-file bodies are never read eagerly: each entry hands
//! out a bounded sub-stream over the data region, and the caller decides
//! how much of it to consume before asking for the next entry. On
//! sequential sources the protocol therefore requires the body to be
//! consumed (up to alignment padding) before advancing; seekable sources
//! just jump.

use std::io::{self, Read, Seek};

use tracing::trace;

use crate::checksum;
use crate::entry::{CpioEntry, Device};
use crate::error::{DataErrorKind, FormatError, StateError};
use crate::header::{FileType, RawHeader, HEADER_LEN, TRAILER_NAME};
use crate::substream::{SeekableSource, SequentialSource, Source, SubStream};

/// Alignment unit for names and bodies.
const ALIGN: u64 = 4;

fn align4(offset: u64) -> u64 {
    (offset + ALIGN - 1) & !(ALIGN - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    /// Positioned at (or before, with skippable residue) the next header.
    Scanning,
    /// The trailer was consumed; iteration is over.
    Done,
    /// An earlier error abandoned the stream.
    Poisoned,
}

/// Streaming reader over an archive byte source.
///
/// Construct with [`ArchiveReader::new`] for forward-only sources or
/// [`ArchiveReader::new_seekable`] for seekable ones. Entries arrive in
/// archive order; the borrow on the yielded [`Entry`] prevents interleaved
/// calls on one reader.
#[derive(Debug)]
pub struct ArchiveReader<S> {
    source: S,
    state: ReaderState,
    /// Absolute offset where the next header starts.
    next_header: u64,
    /// End of the current pending data region, before alignment.
    data_end: u64,
    /// Scratch for names and link targets, grown on demand.
    scratch: Vec<u8>,
}

impl<R: Read> ArchiveReader<SequentialSource<R>> {
    /// Reader over a forward-only stream.
    pub fn new(source: R) -> Self {
        Self::from_source(SequentialSource::new(source))
    }
}

impl<R: Read + Seek> ArchiveReader<SeekableSource<R>> {
    /// Reader over a seekable stream. Unconsumed file bodies are skipped
    /// by seeking, so entries may be dropped without draining their data.
    pub fn new_seekable(source: R) -> Self {
        Self::from_source(SeekableSource::new(source))
    }
}

impl<S: Source> ArchiveReader<S> {
    fn from_source(source: S) -> Self {
        Self {
            source,
            state: ReaderState::Scanning,
            next_header: 0,
            data_end: 0,
            scratch: Vec::new(),
        }
    }

    /// Hand back the underlying source adapter, abandoning iteration.
    pub fn into_inner(self) -> S {
        self.source
    }

    /// Advance to the next entry, or `None` once the trailer is reached.
    ///
    /// # Errors
    /// Data errors mark the stream unusable; state errors additionally mean
    /// the reader was driven outside its protocol. Either poisons the
    /// reader.
    pub fn next_entry(&mut self) -> Result<Option<Entry<'_, S>>, FormatError> {
        match self.state {
            ReaderState::Done => return Ok(None),
            ReaderState::Poisoned => return Err(StateError::Poisoned.into()),
            ReaderState::Scanning => {}
        }

        // The scan produces an owned record; the borrowing handle is built
        // afterwards so a scan failure can still poison the reader.
        let scanned: Option<Scanned> = match self.advance() {
            Ok(scanned) => scanned,
            Err(error) => {
                self.state = ReaderState::Poisoned;
                return Err(error);
            }
        };

        match scanned {
            None => Ok(None),
            Some(Scanned { record, offset }) if record.file_type == FileType::RegularFile => {
                Ok(Some(Entry::with_data(record, offset, &mut self.source)))
            }
            Some(Scanned { record, offset }) => Ok(Some(Entry::without_data(record, offset))),
        }
    }

    fn advance(&mut self) -> Result<Option<Scanned>, FormatError> {
        self.skip_to_next_header()?;

        let header_offset: u64 = self.source.offset();
        let mut header_bytes: [u8; HEADER_LEN] = [0; HEADER_LEN];
        self.source.read_exact(&mut header_bytes).map_err(|error| {
            if error.kind() == io::ErrorKind::UnexpectedEof {
                FormatError::data(header_offset, DataErrorKind::Truncated)
            } else {
                FormatError::Io(error)
            }
        })?;
        let header: RawHeader = RawHeader::parse(&header_bytes, header_offset)?;

        if header.name_size == 0 {
            return Err(FormatError::data(header_offset, DataErrorKind::ZeroNameSize));
        }
        let name: String = self.read_name(&header, header_offset)?;

        // Name padding counts from the start of this (4-aligned) header.
        let name_end: u64 = header_offset + HEADER_LEN as u64 + u64::from(header.name_size);
        let body_start: u64 = align4(name_end);
        self.consume_padding(name_end, body_start)?;

        if name == TRAILER_NAME {
            if header.file_size != 0 {
                return Err(FormatError::data(header_offset, DataErrorKind::TrailerWithBody));
            }
            trace!(offset = header_offset, "archive trailer reached");
            self.state = ReaderState::Done;
            return Ok(None);
        }

        let file_type: FileType = header.file_type(header_offset)?;
        let file_size: u64 = u64::from(header.file_size);
        trace!(
            name = name.as_str(),
            file_type = file_type.as_str(),
            size = file_size,
            offset = header_offset,
            "archive entry"
        );

        let mut record: CpioEntry = CpioEntry {
            format: header.format,
            ino: header.ino,
            file_type,
            mode: header.permissions(),
            uid: header.uid,
            gid: header.gid,
            nlink: header.nlink,
            mtime: header.mtime,
            file_size,
            dev: Device::new(header.dev_major, header.dev_minor),
            rdev: Device::new(header.rdev_major, header.rdev_minor),
            checksum: header.check,
            name,
            link_target: None,
        };

        match file_type {
            FileType::Symlink => {
                record.link_target = Some(self.read_link_target(&header, header_offset)?);
                let target_end: u64 = body_start + file_size;
                self.consume_padding(target_end, align4(target_end))?;
                self.next_header = align4(target_end);
                self.data_end = self.next_header;
            }
            FileType::RegularFile => {
                self.data_end = body_start + file_size;
                self.next_header = align4(self.data_end);
            }
            _ => {
                if file_size != 0 {
                    return Err(FormatError::data(
                        header_offset,
                        DataErrorKind::UnexpectedBody(file_type),
                    ));
                }
                self.next_header = body_start;
                self.data_end = body_start;
            }
        }

        Ok(Some(Scanned {
            record,
            offset: header_offset,
        }))
    }

    /// Move the source to the next header, enforcing the consumption
    /// protocol for sequential sources.
    fn skip_to_next_header(&mut self) -> Result<(), FormatError> {
        let current: u64 = self.source.offset();
        debug_assert!(current <= self.next_header);
        let residue: u64 = self.next_header.saturating_sub(current);
        if residue == 0 {
            return Ok(());
        }

        if let Some(seek) = self.source.reposition(self.next_header) {
            seek?;
            return Ok(());
        }

        // More than alignment padding left over means the caller skipped a
        // file body it was required to drain.
        if residue > ALIGN - 1 {
            let remaining: u64 = self.data_end.saturating_sub(current);
            return Err(StateError::UnconsumedData { remaining }.into());
        }
        self.discard(residue)
    }

    fn consume_padding(&mut self, from: u64, to: u64) -> Result<(), FormatError> {
        debug_assert!(to >= from && to - from < ALIGN);
        self.discard(to - from)
    }

    fn discard(&mut self, count: u64) -> Result<(), FormatError> {
        if count == 0 {
            return Ok(());
        }
        let start: u64 = self.source.offset();
        let copied: u64 = io::copy(&mut (&mut self.source).take(count), &mut io::sink())?;
        if copied != count {
            return Err(FormatError::data(start + copied, DataErrorKind::Truncated));
        }
        Ok(())
    }

    fn read_name(&mut self, header: &RawHeader, header_offset: u64) -> Result<String, FormatError> {
        let bytes: &[u8] = self.read_scratch(header.name_size as usize, header_offset)?;
        // The final byte is the mandatory NUL terminator.
        std::str::from_utf8(&bytes[..bytes.len() - 1])
            .map(str::to_owned)
            .map_err(|_| FormatError::data(header_offset, DataErrorKind::NameNotUtf8))
    }

    fn read_link_target(
        &mut self,
        header: &RawHeader,
        header_offset: u64,
    ) -> Result<String, FormatError> {
        let bytes: &[u8] = self.read_scratch(header.file_size as usize, header_offset)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| FormatError::data(header_offset, DataErrorKind::LinkTargetNotUtf8))
    }

    fn read_scratch(&mut self, count: usize, header_offset: u64) -> Result<&[u8], FormatError> {
        if self.scratch.len() < count {
            self.scratch.resize(count, 0);
        }
        self.source
            .read_exact(&mut self.scratch[..count])
            .map_err(|error| {
                if error.kind() == io::ErrorKind::UnexpectedEof {
                    FormatError::data(header_offset, DataErrorKind::Truncated)
                } else {
                    FormatError::Io(error)
                }
            })?;
        Ok(&self.scratch[..count])
    }
}

/// Result of scanning one header: everything except the data borrow.
#[derive(Debug)]
struct Scanned {
    record: CpioEntry,
    offset: u64,
}

/// One archive entry: the decoded record plus, for regular files, a
/// bounded sub-stream over the body.
///
/// The entry mutably borrows its reader, so the next entry cannot be
/// requested until this one is dropped.
#[derive(Debug)]
pub struct Entry<'a, S> {
    record: CpioEntry,
    offset: u64,
    data: Option<SubStream<&'a mut S>>,
}

impl<'a, S: Source> Entry<'a, S> {
    fn without_data(record: CpioEntry, offset: u64) -> Self {
        Self {
            record,
            offset,
            data: None,
        }
    }

    fn with_data(record: CpioEntry, offset: u64, source: &'a mut S) -> Self {
        let start: u64 = source.offset();
        let len: u64 = record.file_size;
        Self {
            record,
            offset,
            data: Some(SubStream::new(source, start, len)),
        }
    }

    /// The decoded metadata record.
    pub fn record(&self) -> &CpioEntry {
        &self.record
    }

    /// Byte offset of this entry's header in the stream.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// The body window, present on regular files (possibly zero-length).
    pub fn data(&mut self) -> Option<&mut SubStream<&'a mut S>> {
        self.data.as_mut()
    }

    /// Drain the body into a buffer. Empty for entries without data.
    pub fn read_body(&mut self) -> Result<Vec<u8>, FormatError> {
        let mut body: Vec<u8> = Vec::new();
        if let Some(data) = self.data.as_mut() {
            body.reserve(data.remaining().min(usize::MAX as u64) as usize);
            data.read_to_end(&mut body)?;
        }
        Ok(body)
    }

    /// Check a drained body against the header checksum. Only meaningful
    /// for `070702` regular files; everything else passes trivially.
    pub fn verify_checksum(&self, body: &[u8]) -> Result<(), FormatError> {
        use crate::header::Format;

        if self.record.format != Format::NewcCrc
            || self.record.file_type != FileType::RegularFile
        {
            return Ok(());
        }
        let actual: u32 = checksum::of(body);
        if actual != self.record.checksum {
            return Err(FormatError::data(
                self.offset,
                DataErrorKind::ChecksumMismatch {
                    header: self.record.checksum,
                    body: actual,
                },
            ));
        }
        Ok(())
    }

    /// Consume the handle, keeping the record.
    pub fn into_record(self) -> CpioEntry {
        self.record
    }
}
