//! Bounded windows over a parent byte stream, and the source adapters the
//! archive reader is generic over.
//!
//! A sub-stream never owns responsibility for its parent: dropping one
//! leaves the parent open, and a `&mut R` parent works as well as an owned
//! one.

use std::io::{self, Read, Seek, SeekFrom};

/// Read-only window of `len` bytes over a sequential parent stream.
///
/// Reads consume the parent. Reaching the end of the window yields one
/// zero-byte read; reading again after that reports `UnexpectedEof`, which
/// distinguishes "finished" from "driven past the end" for callers that
/// loop on the stream.
#[derive(Debug)]
pub struct SubStream<R> {
    parent: R,
    start: u64,
    len: u64,
    pos: u64,
    end_latched: bool,
}

impl<R: Read> SubStream<R> {
    /// Window over the next `len` bytes of `parent`, which is currently
    /// positioned at absolute offset `start`.
    pub fn new(parent: R, start: u64, len: u64) -> Self {
        Self {
            parent,
            start,
            len,
            pos: 0,
            end_latched: false,
        }
    }

    /// Window length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current position in the parent's coordinate system.
    pub fn position(&self) -> u64 {
        self.start + self.pos
    }

    /// Bytes left in the window.
    pub fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    /// Hand back the parent stream.
    pub fn into_inner(self) -> R {
        self.parent
    }
}

impl<R: Read> Read for SubStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.len {
            if self.end_latched {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read past the end of a bounded sub-stream",
                ));
            }
            self.end_latched = true;
            return Ok(0);
        }

        let want: usize = buf.len().min(self.remaining().min(usize::MAX as u64) as usize);
        let n: usize = self.parent.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "parent stream ended inside a bounded sub-stream",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

/// Read-only window over a seekable parent, with a settable position.
///
/// The parent cursor is re-established from the tracked position before
/// every read, so other users of the parent stream between reads do not
/// disturb the window.
#[derive(Debug)]
pub struct SeekableSubStream<R> {
    parent: R,
    start: u64,
    len: u64,
    pos: u64,
    end_latched: bool,
}

impl<R: Read + Seek> SeekableSubStream<R> {
    /// Window over `[start, start + len)` of `parent`.
    pub fn new(parent: R, start: u64, len: u64) -> Self {
        Self {
            parent,
            start,
            len,
            pos: 0,
            end_latched: false,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Position relative to the window start.
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn remaining(&self) -> u64 {
        self.len - self.pos
    }

    pub fn into_inner(self) -> R {
        self.parent
    }
}

impl<R: Read + Seek> Read for SeekableSubStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.len {
            if self.end_latched {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "read past the end of a bounded sub-stream",
                ));
            }
            self.end_latched = true;
            return Ok(0);
        }

        self.parent.seek(SeekFrom::Start(self.start + self.pos))?;
        let want: usize = buf.len().min(self.remaining().min(usize::MAX as u64) as usize);
        let n: usize = self.parent.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "parent stream ended inside a bounded sub-stream",
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for SeekableSubStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: i64 = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => self.len as i64 + delta,
        };
        if target < 0 || target as u64 > self.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside the bounds of a sub-stream",
            ));
        }
        self.pos = target as u64;
        self.end_latched = false;
        Ok(self.pos)
    }
}

/// Byte source for [`crate::reader::ArchiveReader`].
///
/// Tracks the absolute offset of every byte handed out, and knows whether
/// unread regions can be skipped by repositioning rather than consuming.
/// The two implementations are [`SequentialSource`] and [`SeekableSource`].
pub trait Source: Read {
    /// Bytes consumed from the stream origin.
    fn offset(&self) -> u64;

    /// Jump to absolute offset `to`, if the underlying stream allows it.
    /// Returns `None` on sequential sources.
    fn reposition(&mut self, to: u64) -> Option<io::Result<()>>;
}

/// Forward-only source; skipping is only possible by consuming bytes.
#[derive(Debug)]
pub struct SequentialSource<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> SequentialSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for SequentialSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n: usize = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: Read> Source for SequentialSource<R> {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn reposition(&mut self, _to: u64) -> Option<io::Result<()>> {
        None
    }
}

/// Source over a seekable stream; unread regions are skipped with a seek.
#[derive(Debug)]
pub struct SeekableSource<R> {
    inner: R,
    offset: u64,
}

impl<R: Read + Seek> SeekableSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for SeekableSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n: usize = self.inner.read(buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Source for SeekableSource<R> {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn reposition(&mut self, to: u64) -> Option<io::Result<()>> {
        let result: io::Result<()> = self
            .inner
            .seek(SeekFrom::Start(to))
            .map(|landed| self.offset = landed);
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_substream_bounds_reads() {
        let data: &[u8] = b"0123456789";
        let mut parent: &[u8] = &data[2..];
        let mut sub: SubStream<&mut &[u8]> = SubStream::new(&mut parent, 2, 5);

        let mut out: Vec<u8> = Vec::new();
        sub.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"23456");
        assert_eq!(sub.position(), 7);
        assert_eq!(sub.remaining(), 0);

        // read_to_end consumed the terminating zero-byte read; one more is
        // strictly past the end.
        let mut buf: [u8; 1] = [0];
        let err = sub.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_substream_end_yields_zero_then_latches() {
        let mut parent: &[u8] = b"abc";
        let mut sub: SubStream<&mut &[u8]> = SubStream::new(&mut parent, 0, 3);

        let mut buf: [u8; 8] = [0; 8];
        assert_eq!(sub.read(&mut buf).unwrap(), 3);
        assert_eq!(sub.read(&mut buf).unwrap(), 0);
        assert!(sub.read(&mut buf).is_err());
    }

    #[test]
    fn test_substream_detects_truncated_parent() {
        let mut parent: &[u8] = b"ab";
        let mut sub: SubStream<&mut &[u8]> = SubStream::new(&mut parent, 0, 5);

        let mut out: Vec<u8> = Vec::new();
        let err = sub.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_substream_leaves_parent_open() {
        let mut parent: &[u8] = b"abcdef";
        {
            let mut sub: SubStream<&mut &[u8]> = SubStream::new(&mut parent, 0, 2);
            let mut buf: [u8; 2] = [0; 2];
            sub.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"ab");
        }
        // Parent continues where the window stopped consuming.
        let mut rest: Vec<u8> = Vec::new();
        parent.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"cdef");
    }

    #[test]
    fn test_seekable_substream_repositions_parent() {
        let parent: Cursor<&[u8]> = Cursor::new(b"0123456789");
        let mut sub: SeekableSubStream<Cursor<&[u8]>> = SeekableSubStream::new(parent, 3, 4);

        let mut buf: [u8; 2] = [0; 2];
        sub.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"34");

        sub.seek(SeekFrom::Start(0)).unwrap();
        sub.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"34");

        sub.seek(SeekFrom::End(-1)).unwrap();
        let mut one: [u8; 1] = [0];
        sub.read_exact(&mut one).unwrap();
        assert_eq!(&one, b"6");
    }

    #[test]
    fn test_seekable_substream_recovers_from_parent_drift() {
        let mut parent: Cursor<&[u8]> = Cursor::new(b"0123456789");
        parent.seek(SeekFrom::Start(9)).unwrap();

        let mut sub: SeekableSubStream<&mut Cursor<&[u8]>> =
            SeekableSubStream::new(&mut parent, 2, 3);
        let mut out: Vec<u8> = Vec::new();
        sub.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"234");
    }

    #[test]
    fn test_seekable_substream_rejects_out_of_bounds_seek() {
        let parent: Cursor<&[u8]> = Cursor::new(b"0123456789");
        let mut sub: SeekableSubStream<Cursor<&[u8]>> = SeekableSubStream::new(parent, 0, 4);

        assert!(sub.seek(SeekFrom::Start(5)).is_err());
        assert!(sub.seek(SeekFrom::Current(-1)).is_err());
        assert_eq!(sub.seek(SeekFrom::End(0)).unwrap(), 4);
    }

    #[test]
    fn test_sources_track_offsets() {
        let mut sequential: SequentialSource<&[u8]> = SequentialSource::new(b"abcdef".as_slice());
        let mut buf: [u8; 4] = [0; 4];
        sequential.read_exact(&mut buf).unwrap();
        assert_eq!(sequential.offset(), 4);
        assert!(sequential.reposition(0).is_none());

        let mut seekable: SeekableSource<Cursor<&[u8]>> =
            SeekableSource::new(Cursor::new(b"abcdef"));
        seekable.read_exact(&mut buf).unwrap();
        assert_eq!(seekable.offset(), 4);
        seekable.reposition(1).unwrap().unwrap();
        assert_eq!(seekable.offset(), 1);
        let mut one: [u8; 1] = [0];
        seekable.read_exact(&mut one).unwrap();
        assert_eq!(&one, b"b");
    }
}
