//! Byte streams used while a payload is in flight

use bytes::Bytes;
use std::io::{self, Cursor, Read};

/// Page-sized read size for downloads
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Readable upload body for one push
///
/// Owns its bytes so it can be handed to the transport by value.
#[derive(Debug)]
pub struct BlobStream {
    cursor: Cursor<Vec<u8>>,
}

impl BlobStream {
    pub fn new(data: Vec<u8>) -> Self {
        BlobStream {
            cursor: Cursor::new(data),
        }
    }

    /// Total payload size, independent of read position
    pub fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for BlobStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

/// Lazy sequence of downloaded chunks
pub struct ChunkStream {
    inner: Box<dyn Iterator<Item = io::Result<Bytes>> + Send>,
}

impl ChunkStream {
    /// Read `source` lazily in pieces of `chunk_size` bytes
    pub fn from_reader(source: impl Read + Send + 'static, chunk_size: usize) -> Self {
        ChunkStream {
            inner: Box::new(ReaderChunks {
                source,
                chunk_size: chunk_size.max(1),
                done: false,
            }),
        }
    }

    pub fn from_chunks(chunks: Vec<Bytes>) -> Self {
        ChunkStream {
            inner: Box::new(chunks.into_iter().map(Ok)),
        }
    }

    /// Consume every chunk into one contiguous buffer
    pub fn drain(self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        for chunk in self {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

impl Iterator for ChunkStream {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl std::fmt::Debug for ChunkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStream").finish_non_exhaustive()
    }
}

struct ReaderChunks<R> {
    source: R,
    chunk_size: usize,
    done: bool,
}

impl<R: Read> Iterator for ReaderChunks<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < buf.len() {
            match self.source.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.done = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        if filled == 0 {
            return None;
        }
        buf.truncate(filled);
        Some(Ok(Bytes::from(buf)))
    }
}
