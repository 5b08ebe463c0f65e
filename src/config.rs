//! Configuration for the SSTable writer subsystem

use serde::{Deserialize, Serialize};

/// Top-level configuration for building an SSTable generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data/index file layout and durability knobs
    pub storage: StorageConfig,

    /// Index summary sampling knobs
    pub summary: SummaryConfig,

    /// Bloom filter sizing knobs
    pub bloom: BloomConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            summary: SummaryConfig::default(),
            bloom: BloomConfig::default(),
        }
    }
}

/// Storage-level configuration for a single SSTable build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Compression configuration; `None` means the Data file gets a plain
    /// `Crc` sidecar instead of `CompressionInfo`.
    pub compression: CompressionConfig,

    /// Size, in uncompressed bytes, above which a partition triggers a
    /// large-partition warning log line (spec §7 `LargePartitionWarning`).
    pub large_partition_warning_threshold: u64,

    /// Durability sync mode applied to sink `sync()` calls.
    pub sync_mode: SyncMode,

    /// Internal write buffer size for each sequential file sink.
    pub write_buffer_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            compression: CompressionConfig::default(),
            large_partition_warning_threshold: 100 * 1024 * 1024, // 100MB
            sync_mode: SyncMode::Normal,
            write_buffer_size: 64 * 1024,
        }
    }
}

/// Compression configuration for the Data file sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Enable compression. When disabled the writer emits a `Crc` component
    /// instead of `CompressionInfo`.
    pub enabled: bool,

    /// Compression algorithm to use
    pub algorithm: CompressionAlgorithm,

    /// Size of each uncompressed chunk fed to the codec
    pub chunk_size: u32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: CompressionAlgorithm::Lz4,
            chunk_size: 64 * 1024,
        }
    }
}

/// Compression algorithms this writer can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// LZ4 compression (the only codec this crate ships; see SPEC_FULL §10)
    Lz4,
}

impl CompressionAlgorithm {
    /// The name recorded in the `CompressionInfo` component, matching the
    /// Cassandra-style fully-qualified compressor class name.
    pub fn component_name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Lz4 => "LZ4Compressor",
        }
    }
}

/// Durability sync modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// No explicit syncing until `prepareToCommit` (fastest, least durable
    /// intermediate state — early-open readers will rarely see a boundary).
    None,
    /// Sync periodically as buffers fill (balanced).
    Normal,
    /// Sync after every `append` (slowest, earliest readable boundary).
    Full,
}

/// Index summary sampling configuration (spec §4.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Sample every Nth partition into the index summary by default
    pub index_interval: u32,

    /// Floor on the sampling interval; downsampling never goes below this
    pub min_index_interval: u32,

    /// Upper bound on the number of entries kept in the final summary
    pub base_sampling_level: usize,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            index_interval: 128,
            min_index_interval: 128,
            base_sampling_level: 128,
        }
    }
}

/// Bloom filter sizing configuration (spec §4.3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomConfig {
    /// Expected number of keys; used to size the bit array up front
    pub expected_keys: u64,

    /// Target false positive rate
    pub false_positive_chance: f64,

    /// Emit the legacy (pre-3.0) byte order when serializing the bit array
    pub legacy_hash_order: bool,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            expected_keys: 1_000_000,
            false_positive_chance: 0.01,
            legacy_hash_order: false,
        }
    }
}

impl Config {
    /// Configuration for writers that should emit an uncompressed table
    /// with a `Crc` sidecar instead of `CompressionInfo`.
    pub fn uncompressed() -> Self {
        let mut config = Self::default();
        config.storage.compression.enabled = false;
        config
    }

    /// Validate the configuration, mirroring the checks a misconfigured
    /// build would otherwise only discover mid-write.
    pub fn validate(&self) -> crate::Result<()> {
        if self.storage.write_buffer_size == 0 {
            return Err(crate::Error::configuration(
                "write_buffer_size must be greater than 0",
            ));
        }

        if self.storage.compression.chunk_size == 0 {
            return Err(crate::Error::configuration(
                "compression.chunk_size must be greater than 0",
            ));
        }

        if self.bloom.false_positive_chance <= 0.0 || self.bloom.false_positive_chance >= 1.0 {
            return Err(crate::Error::configuration(
                "bloom.false_positive_chance must be between 0 and 1",
            ));
        }

        if self.bloom.expected_keys == 0 {
            return Err(crate::Error::configuration(
                "bloom.expected_keys must be greater than 0",
            ));
        }

        if self.summary.index_interval == 0 || self.summary.min_index_interval == 0 {
            return Err(crate::Error::configuration(
                "summary intervals must be greater than 0",
            ));
        }

        if self.summary.index_interval < self.summary.min_index_interval {
            return Err(crate::Error::configuration(
                "summary.index_interval must not be below summary.min_index_interval",
            ));
        }

        if self.summary.base_sampling_level == 0 {
            return Err(crate::Error::configuration(
                "summary.base_sampling_level must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.storage.compression.enabled);
    }

    #[test]
    fn test_uncompressed_config() {
        let config = Config::uncompressed();
        assert!(!config.storage.compression.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_catches_bad_fp_chance() {
        let mut config = Config::default();
        config.bloom.false_positive_chance = 0.0;
        assert!(config.validate().is_err());

        config.bloom.false_positive_chance = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_catches_zero_intervals() {
        let mut config = Config::default();
        config.summary.index_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_catches_index_interval_below_floor() {
        let mut config = Config::default();
        config.summary.index_interval = 16;
        config.summary.min_index_interval = 32;
        assert!(config.validate().is_err());
    }
}
