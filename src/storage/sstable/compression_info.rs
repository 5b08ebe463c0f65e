//! The CompressionInfo component: records the codec name, chunk size, and
//! the compressed-file offset of every chunk so the Data file can be
//! decompressed chunk-by-chunk.
//!
//! Binary layout (big-endian, matching real Cassandra CompressionInfo.db):
//! - 2 bytes: algorithm name length
//! - N bytes: algorithm name
//! - padding to a 4-byte boundary
//! - 4 bytes: chunk length
//! - 8 bytes: total uncompressed data length
//! - 4 bytes: chunk count
//! - chunk count * 8 bytes: chunk offsets into the Data file

use crate::{Error, Result};
use std::io::{Cursor, Read, Seek, SeekFrom};

/// Parsed or in-progress CompressionInfo content.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionInfo {
    pub algorithm: String,
    pub chunk_length: u32,
    pub data_length: u64,
    pub chunk_offsets: Vec<u64>,
}

impl CompressionInfo {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        let mut len_bytes = [0u8; 2];
        cursor
            .read_exact(&mut len_bytes)
            .map_err(|e| Error::corruption(format!("failed to read algorithm name length: {e}")))?;
        let algorithm_len = u16::from_be_bytes(len_bytes) as usize;

        if algorithm_len > 256 {
            return Err(Error::corruption(format!(
                "algorithm name too long: {algorithm_len}"
            )));
        }

        let mut algorithm_bytes = vec![0u8; algorithm_len];
        cursor
            .read_exact(&mut algorithm_bytes)
            .map_err(|e| Error::corruption(format!("failed to read algorithm name: {e}")))?;
        let algorithm = String::from_utf8(algorithm_bytes)
            .map_err(|e| Error::corruption(format!("invalid algorithm name encoding: {e}")))?;

        let current_pos = cursor.position();
        let padding_needed = (4 - (current_pos % 4)) % 4;
        if padding_needed > 0 {
            cursor
                .seek(SeekFrom::Current(padding_needed as i64))
                .map_err(|e| Error::corruption(format!("failed to skip padding: {e}")))?;
        }

        let mut chunk_len_bytes = [0u8; 4];
        cursor
            .read_exact(&mut chunk_len_bytes)
            .map_err(|e| Error::corruption(format!("failed to read chunk length: {e}")))?;
        let chunk_length = u32::from_be_bytes(chunk_len_bytes);

        let mut data_len_bytes = [0u8; 8];
        cursor
            .read_exact(&mut data_len_bytes)
            .map_err(|e| Error::corruption(format!("failed to read data length: {e}")))?;
        let data_length = u64::from_be_bytes(data_len_bytes);

        let mut chunk_count_bytes = [0u8; 4];
        cursor
            .read_exact(&mut chunk_count_bytes)
            .map_err(|e| Error::corruption(format!("failed to read chunk count: {e}")))?;
        let chunk_count = u32::from_be_bytes(chunk_count_bytes) as usize;

        if chunk_count > 1_000_000 {
            return Err(Error::corruption(format!("too many chunks: {chunk_count}")));
        }

        let mut chunk_offsets = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            let mut offset_bytes = [0u8; 8];
            cursor
                .read_exact(&mut offset_bytes)
                .map_err(|e| Error::corruption(format!("failed to read chunk offset {i}: {e}")))?;
            chunk_offsets.push(u64::from_be_bytes(offset_bytes));
        }

        Ok(CompressionInfo {
            algorithm,
            chunk_length,
            data_length,
            chunk_offsets,
        })
    }

    /// Serialize to the on-disk layout `parse` reads back.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let algo_bytes = self.algorithm.as_bytes();
        out.extend_from_slice(&(algo_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(algo_bytes);

        let padding_needed = (4 - (out.len() % 4)) % 4;
        out.extend(std::iter::repeat(0u8).take(padding_needed));

        out.extend_from_slice(&self.chunk_length.to_be_bytes());
        out.extend_from_slice(&self.data_length.to_be_bytes());
        out.extend_from_slice(&(self.chunk_offsets.len() as u32).to_be_bytes());
        for offset in &self.chunk_offsets {
            out.extend_from_slice(&offset.to_be_bytes());
        }

        out
    }

    pub fn chunk_for_offset(&self, offset: u64) -> usize {
        (offset / self.chunk_length as u64) as usize
    }

    pub fn offset_within_chunk(&self, offset: u64) -> u64 {
        offset % self.chunk_length as u64
    }

    pub fn compressed_chunk_offset(&self, chunk_index: usize) -> Option<u64> {
        self.chunk_offsets.get(chunk_index).copied()
    }

    pub fn compressed_chunk_size(&self, chunk_index: usize, total_compressed_size: u64) -> Option<u64> {
        let start_offset = self.compressed_chunk_offset(chunk_index)?;

        if chunk_index + 1 < self.chunk_offsets.len() {
            let next_offset = self.chunk_offsets[chunk_index + 1];
            Some(next_offset - start_offset)
        } else {
            Some(total_compressed_size - start_offset)
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.algorithm.is_empty() {
            return Err(Error::corruption("empty compression algorithm"));
        }

        if self.chunk_length == 0 {
            return Err(Error::corruption("zero chunk length"));
        }

        if self.chunk_length > 1024 * 1024 {
            return Err(Error::corruption(format!(
                "chunk length too large: {}",
                self.chunk_length
            )));
        }

        for i in 1..self.chunk_offsets.len() {
            if self.chunk_offsets[i] <= self.chunk_offsets[i - 1] {
                return Err(Error::corruption(format!(
                    "chunk offsets not in ascending order: {} <= {}",
                    self.chunk_offsets[i],
                    self.chunk_offsets[i - 1]
                )));
            }
        }

        Ok(())
    }
}

/// Accumulates chunk offsets as the Sequential File Sink flushes compressed
/// chunks to the Data file, then produces the finished `CompressionInfo`.
#[derive(Debug, Clone)]
pub struct CompressionInfoBuilder {
    algorithm: String,
    chunk_length: u32,
    chunk_offsets: Vec<u64>,
    /// Uncompressed length of each recorded chunk, parallel to
    /// `chunk_offsets`, so `truncate` can recompute `data_length` instead of
    /// un-summing a running total.
    uncompressed_lens: Vec<u64>,
}

impl CompressionInfoBuilder {
    pub fn new(algorithm: impl Into<String>, chunk_length: u32) -> Self {
        Self {
            algorithm: algorithm.into(),
            chunk_length,
            chunk_offsets: Vec::new(),
            uncompressed_lens: Vec::new(),
        }
    }

    /// Record a chunk: `uncompressed_len` bytes of source data were
    /// compressed and written starting at `compressed_offset` in the Data
    /// file.
    pub fn record_chunk(&mut self, compressed_offset: u64, uncompressed_len: u64) {
        self.chunk_offsets.push(compressed_offset);
        self.uncompressed_lens.push(uncompressed_len);
    }

    /// Number of chunks recorded so far.
    pub fn chunk_count(&self) -> usize {
        self.chunk_offsets.len()
    }

    /// Discard any chunks recorded after `chunk_count`, for a rewind.
    pub fn truncate(&mut self, chunk_count: usize) {
        self.chunk_offsets.truncate(chunk_count);
        self.uncompressed_lens.truncate(chunk_count);
    }

    fn data_length(&self) -> u64 {
        self.uncompressed_lens.iter().sum()
    }

    /// A point-in-time snapshot suitable for serializing without consuming
    /// the builder (used by `prepareToCommit`, which may be re-invoked).
    pub fn snapshot(&self) -> CompressionInfo {
        CompressionInfo {
            algorithm: self.algorithm.clone(),
            chunk_length: self.chunk_length,
            data_length: self.data_length(),
            chunk_offsets: self.chunk_offsets.clone(),
        }
    }

    pub fn build(self) -> CompressionInfo {
        let data_length = self.data_length();
        CompressionInfo {
            algorithm: self.algorithm,
            chunk_length: self.chunk_length,
            data_length,
            chunk_offsets: self.chunk_offsets,
        }
    }
}
