//! The Crc component: a rolling CRC32 over each buffer-sized chunk written
//! to an uncompressed Data or PrimaryIndex file, plus a whole-file checksum.
//!
//! Uses the real `crc32fast` crate rather than a hand-rolled polynomial
//! loop, matching the rest of this codebase's checksum usage.

use crc32fast::Hasher as Crc32Hasher;

/// One recorded chunk checksum: the chunk's logical end offset and its
/// CRC32 over just that chunk's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChunkChecksum {
    pub end_offset: u64,
    pub crc32: u32,
}

/// Accumulates per-chunk checksums as the sink flushes, and a running
/// whole-file checksum.
#[derive(Debug, Default)]
pub struct ChecksumBuilder {
    whole_file: Crc32Hasher,
    chunks: Vec<ChunkChecksum>,
    /// Whole-file CRC as of immediately after each chunk, so a rewind can
    /// restore the running hasher instead of rebuilding it from raw bytes
    /// (which the builder no longer has once a chunk is flushed).
    intermediates: Vec<u32>,
}

impl ChecksumBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one flushed chunk.
    pub fn record_chunk(&mut self, chunk: &[u8], end_offset: u64) {
        self.whole_file.update(chunk);
        let mut chunk_hasher = Crc32Hasher::new();
        chunk_hasher.update(chunk);
        self.chunks.push(ChunkChecksum {
            end_offset,
            crc32: chunk_hasher.finalize(),
        });
        self.intermediates.push(self.whole_file.clone().finalize());
    }

    /// Finalize into the serializable `Crc` component payload.
    pub fn build(self) -> CrcComponent {
        CrcComponent {
            whole_file_crc32: self.whole_file.finalize(),
            chunks: self.chunks,
        }
    }

    /// Number of chunks recorded so far.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Discard any chunks recorded after `chunk_count`, for a rewind.
    pub fn truncate(&mut self, chunk_count: usize) {
        self.chunks.truncate(chunk_count);
        self.intermediates.truncate(chunk_count);
        self.whole_file = match chunk_count {
            0 => Crc32Hasher::new(),
            n => Crc32Hasher::new_with_initial(self.intermediates[n - 1]),
        };
    }

    /// A point-in-time snapshot suitable for serializing without consuming
    /// the builder (used by `prepareToCommit`, which may be re-invoked).
    pub fn snapshot(&self) -> CrcComponent {
        CrcComponent {
            whole_file_crc32: self.whole_file.clone().finalize(),
            chunks: self.chunks.clone(),
        }
    }
}

/// Serialized content of the `Crc` component file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CrcComponent {
    pub whole_file_crc32: u32,
    pub chunks: Vec<ChunkChecksum>,
}

impl CrcComponent {
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        bincode::serialize(self).map_err(crate::Error::from)
    }

    pub fn from_bytes(data: &[u8]) -> crate::Result<Self> {
        bincode::deserialize(data).map_err(crate::Error::from)
    }
}
