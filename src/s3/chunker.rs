//! Splits a file into fixed-size chunks while computing per-chunk and
//! whole-file digests in a single sequential pass.

use std::num::NonZeroU64;
use std::path::Path;

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::digest::{Digest, DigestAccumulator};
use super::{Error, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub offset: u64,
    pub length: u64,
    pub md5: [u8; 16],
    pub sha256: [u8; 32],
}

impl ChunkDescriptor {
    pub fn digest(&self) -> Digest {
        Digest {
            md5: self.md5,
            sha256: self.sha256,
            len: self.length,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileDigest {
    pub size: u64,
    pub md5: [u8; 16],
    pub sha256: [u8; 32],
    pub chunks: Vec<ChunkDescriptor>,
}

/// Number of chunks a file of `file_size` bytes is split into.
pub fn chunk_count(file_size: u64, chunk_size: NonZeroU64) -> u64 {
    file_size.div_ceil(chunk_size.get())
}

/// Push-based chunk boundary tracker. Buffers may be fed at any granularity;
/// the resulting descriptors depend only on the byte sequence.
pub struct Chunker {
    chunk_size: u64,
    file: DigestAccumulator,
    current: DigestAccumulator,
    position_in_chunk: u64,
    chunks: Vec<ChunkDescriptor>,
}

impl Chunker {
    pub fn new(chunk_size: NonZeroU64) -> Self {
        Self {
            chunk_size: chunk_size.get(),
            file: DigestAccumulator::new(),
            current: DigestAccumulator::new(),
            position_in_chunk: 0,
            chunks: Vec::new(),
        }
    }

    pub fn feed(&mut self, buf: &[u8]) {
        self.file.update(buf);

        let mut rest = buf;
        while !rest.is_empty() {
            let left_in_chunk = self.chunk_size - self.position_in_chunk;
            if rest.len() as u64 <= left_in_chunk {
                self.current.update(rest);
                self.position_in_chunk += rest.len() as u64;
                break;
            }

            // left_in_chunk < rest.len(), so it fits in usize.
            let (head, tail) = rest.split_at(left_in_chunk as usize);
            self.current.update(head);
            self.close_chunk();
            rest = tail;
        }
    }

    fn close_chunk(&mut self) {
        let index = self.chunks.len() as u32;
        let digest = self.current.reset();
        self.position_in_chunk = 0;

        debug!(index, length = digest.len, "chunk complete");
        self.chunks.push(ChunkDescriptor {
            index,
            offset: u64::from(index) * self.chunk_size,
            length: digest.len,
            md5: digest.md5,
            sha256: digest.sha256,
        });
    }

    pub fn finish(mut self) -> FileDigest {
        if !self.current.is_empty() {
            self.close_chunk();
        }
        let file = self.file.finalize();
        FileDigest {
            size: file.len,
            md5: file.md5,
            sha256: file.sha256,
            chunks: self.chunks,
        }
    }
}

/// Streams `path` once and returns its chunk layout and digests.
///
/// Empty files are rejected: a multipart upload needs at least one part.
pub async fn chunk_file(path: impl AsRef<Path>, chunk_size: u64) -> Result<FileDigest> {
    chunk_file_with_buffer(path, chunk_size, READ_BUFFER_SIZE).await
}

async fn chunk_file_with_buffer(
    path: impl AsRef<Path>,
    chunk_size: u64,
    buffer_size: usize,
) -> Result<FileDigest> {
    let chunk_size = NonZeroU64::new(chunk_size)
        .ok_or_else(|| Error::Config("chunk size must be greater than zero".into()))?;

    let mut file = File::open(path.as_ref()).await?;
    let expected = file.metadata().await?.len();
    let mut chunker = Chunker::new(chunk_size);
    chunker
        .chunks
        .reserve(chunk_count(expected, chunk_size) as usize);

    let mut buf = BytesMut::with_capacity(buffer_size);
    loop {
        buf.clear();
        let n = file.read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
        chunker.feed(&buf);
    }

    let digest = chunker.finish();
    if digest.size == 0 {
        return Err(Error::EmptyFile);
    }
    Ok(digest)
}
