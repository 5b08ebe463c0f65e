//! The compression codec collaborator consumed by the Sequential File Sink.
//!
//! Only the chunking *protocol* — fixed-size uncompressed chunks fed one at
//! a time to `compress` — is this crate's concern; the codec itself is
//! pluggable. LZ4 is the only implementation shipped.

use crate::config::CompressionAlgorithm as ConfigAlgorithm;
use crate::Result;

/// Compresses one chunk of uncompressed bytes at a time. The Sequential
/// File Sink calls this once per `chunk_size` bytes of buffered Data file
/// content and writes the result alongside an entry in `CompressionInfo`.
pub trait Codec: Send + Sync {
    /// Compress a single chunk.
    fn compress(&self, chunk: &[u8]) -> Result<Vec<u8>>;

    /// Fully-qualified compressor class name recorded in `CompressionInfo`,
    /// matching the strings real SSTable files carry (e.g. `LZ4Compressor`).
    fn component_name(&self) -> &'static str;
}

/// LZ4 block codec — the only compression this crate ships.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

impl Codec for Lz4Codec {
    fn compress(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(chunk))
    }

    fn component_name(&self) -> &'static str {
        "LZ4Compressor"
    }
}

/// Build the codec a `CompressionConfig` selects.
pub fn codec_for(algorithm: ConfigAlgorithm) -> Box<dyn Codec> {
    match algorithm {
        ConfigAlgorithm::Lz4 => Box::new(Lz4Codec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_codec_compresses_nonempty_chunk() {
        let codec = Lz4Codec;
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
        let compressed = codec.compress(data).unwrap();
        assert!(!compressed.is_empty());
    }

    #[test]
    fn test_lz4_codec_component_name() {
        let codec = Lz4Codec;
        assert_eq!(codec.component_name(), "LZ4Compressor");
    }

    #[test]
    fn test_codec_for_selects_lz4() {
        let codec = codec_for(ConfigAlgorithm::Lz4);
        assert_eq!(codec.component_name(), "LZ4Compressor");
    }
}
