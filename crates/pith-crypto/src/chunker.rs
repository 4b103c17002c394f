use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use pith_types::BlockHash;
use tracing::trace;

use crate::hasher::BlockHasher;

/// Errors from chunking a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("block size must be greater than zero")]
    InvalidBlockSize,

    #[error("read failed at offset {offset}: {source}")]
    Io {
        offset: u64,
        #[source]
        source: io::Error,
    },
}

/// One fixed-size block of a payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    /// Content hash of `data`.
    pub hash: BlockHash,
    /// Block bytes; shorter than the block size only for the final block.
    pub data: Bytes,
    /// Offset of the block in the original stream.
    pub offset: u64,
}

impl Chunk {
    fn new(data: Bytes, offset: u64) -> Self {
        Self {
            hash: BlockHasher::BLOCK.hash(&data),
            data,
            offset,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Fixed-size chunker.
///
/// Splits payloads into `block_size` blocks and hashes each one. The final
/// block is hashed as-is, without padding; an empty payload has no blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chunker {
    block_size: usize,
}

impl Chunker {
    pub fn new(block_size: usize) -> Result<Self, ChunkError> {
        if block_size == 0 {
            return Err(ChunkError::InvalidBlockSize);
        }
        Ok(Self { block_size })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Lazily chunk a reader.
    pub fn chunks<R: Read>(&self, reader: R) -> Chunks<R> {
        Chunks {
            reader,
            block_size: self.block_size,
            offset: 0,
            done: false,
        }
    }

    /// Chunk an in-memory payload. The iterator is `Clone`, so it can be
    /// restarted by cloning before consumption.
    pub fn chunk_bytes<'a>(&self, data: &'a [u8]) -> ByteChunks<'a> {
        ByteChunks {
            inner: data.chunks(self.block_size),
            offset: 0,
        }
    }

    /// Number of blocks a payload of `size` bytes splits into.
    pub fn block_count(&self, size: u64) -> u64 {
        size.div_ceil(self.block_size as u64)
    }
}

/// Chunk iterator over a reader.
///
/// Yields `Err` at most once; the iterator is fused after an error or after
/// the final (short) block.
pub struct Chunks<R> {
    reader: R,
    block_size: usize,
    offset: u64,
    done: bool,
}

impl<R: Read> Chunks<R> {
    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Seek> Chunks<R> {
    /// Rewind the reader to its start and chunk again from offset zero.
    pub fn restart(&mut self) -> Result<(), ChunkError> {
        self.reader
            .seek(SeekFrom::Start(0))
            .map_err(|source| ChunkError::Io {
                offset: self.offset,
                source,
            })?;
        self.offset = 0;
        self.done = false;
        Ok(())
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = Result<Chunk, ChunkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0u8; self.block_size];
        let filled = match self.fill(&mut buf) {
            Ok(n) => n,
            Err(source) => {
                self.done = true;
                return Some(Err(ChunkError::Io {
                    offset: self.offset,
                    source,
                }));
            }
        };

        if filled < self.block_size {
            self.done = true;
        }
        if filled == 0 {
            return None;
        }

        buf.truncate(filled);
        let chunk = Chunk::new(Bytes::from(buf), self.offset);
        trace!(offset = chunk.offset, len = filled, hash = %chunk.hash.short_hex(), "chunked block");
        self.offset += filled as u64;
        Some(Ok(chunk))
    }
}

/// Chunk iterator over an in-memory payload.
#[derive(Clone)]
pub struct ByteChunks<'a> {
    inner: std::slice::Chunks<'a, u8>,
    offset: u64,
}

impl Iterator for ByteChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        let slice = self.inner.next()?;
        let chunk = Chunk::new(Bytes::copy_from_slice(slice), self.offset);
        self.offset += slice.len() as u64;
        Some(chunk)
    }
}
