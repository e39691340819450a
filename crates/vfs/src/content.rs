//! File content sources.
//!
//! Regular-file payloads accept several shapes so callers can hand the
//! filesystem whatever they already have: owned bytes, text, a live read
//! stream, or a deferred producer. Cloning deep-copies buffers but only
//! shares stream handles; a shared stream has one cursor, and coordinating
//! it is the caller's job.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Producer for deferred content.
pub type ContentProducer = dyn Fn() -> io::Result<Vec<u8>> + Send + Sync;

/// The payload of a regular file.
#[derive(Clone)]
pub enum FileContent {
    /// Owned bytes.
    Bytes(Vec<u8>),
    /// Owned text, emitted as UTF-8.
    Text(String),
    /// A live stream of `len` bytes. Reading consumes the shared source.
    Stream {
        source: Arc<Mutex<dyn Read + Send>>,
        len: u64,
    },
    /// Content produced on demand; `len` is declared up front.
    Lazy {
        producer: Arc<ContentProducer>,
        len: u64,
    },
}

impl FileContent {
    /// Empty content.
    pub fn empty() -> Self {
        FileContent::Bytes(Vec::new())
    }

    /// Wrap a read stream of `len` bytes.
    pub fn from_reader<R: Read + Send + 'static>(source: R, len: u64) -> Self {
        FileContent::Stream {
            source: Arc::new(Mutex::new(source)),
            len,
        }
    }

    /// Wrap a deferred producer of `len` bytes.
    pub fn from_producer<F>(producer: F, len: u64) -> Self
    where
        F: Fn() -> io::Result<Vec<u8>> + Send + Sync + 'static,
    {
        FileContent::Lazy {
            producer: Arc::new(producer),
            len,
        }
    }

    /// Content length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            FileContent::Bytes(bytes) => bytes.len() as u64,
            FileContent::Text(text) => text.len() as u64,
            FileContent::Stream { len, .. } => *len,
            FileContent::Lazy { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the content into `sink`, returning the byte count.
    ///
    /// Stream-backed content is consumed by the copy; buffer-backed content
    /// can be copied any number of times. Underlying stream failures
    /// propagate unchanged.
    pub fn copy_to(&self, sink: &mut dyn Write) -> io::Result<u64> {
        match self {
            FileContent::Bytes(bytes) => {
                sink.write_all(bytes)?;
                Ok(bytes.len() as u64)
            }
            FileContent::Text(text) => {
                sink.write_all(text.as_bytes())?;
                Ok(text.len() as u64)
            }
            FileContent::Stream { source, .. } => {
                let mut source = source.lock();
                io::copy(&mut *source, sink)
            }
            FileContent::Lazy { producer, .. } => {
                let bytes: Vec<u8> = (**producer)()?;
                sink.write_all(&bytes)?;
                Ok(bytes.len() as u64)
            }
        }
    }

    /// Materialize the content as owned bytes.
    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut bytes: Vec<u8> = Vec::with_capacity(self.len().min(usize::MAX as u64) as usize);
        self.copy_to(&mut bytes)?;
        Ok(bytes)
    }
}

impl Default for FileContent {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        FileContent::Bytes(bytes)
    }
}

impl From<&[u8]> for FileContent {
    fn from(bytes: &[u8]) -> Self {
        FileContent::Bytes(bytes.to_vec())
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        FileContent::Text(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        FileContent::Text(text.to_string())
    }
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileContent::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            FileContent::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            FileContent::Stream { len, .. } => f.debug_struct("Stream").field("len", len).finish(),
            FileContent::Lazy { len, .. } => f.debug_struct("Lazy").field("len", len).finish(),
        }
    }
}
