//! Bloom filter construction for the Filter component (C3).
//!
//! The filter is built incrementally as partitions stream through the
//! Index Writer, flushed to its own component file before the primary
//! index is closed (spec: filter-flush-before-index-close ordering), and
//! may be shared with an early-open reader via [`SharedBloomFilter`].

use crate::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::sync::Arc;
use std::sync::RwLock;

/// Bloom filter for efficient key existence checks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    hash_count: u32,
    bit_count: u64,
    expected_elements: u64,
    false_positive_rate: f64,
    /// Serialize the bit array in Cassandra's pre-3.0 byte order. A pure
    /// on-disk framing concern — it does not change which bits get set.
    legacy_hash_order: bool,
}

impl BloomFilter {
    /// Create a new bloom filter sized for `expected_elements` keys at the
    /// given target false positive rate.
    pub fn new(expected_elements: u64, false_positive_rate: f64) -> Result<Self> {
        Self::with_legacy_hash_order(expected_elements, false_positive_rate, false)
    }

    /// Same as [`BloomFilter::new`] but controls the serialized byte order.
    pub fn with_legacy_hash_order(
        expected_elements: u64,
        false_positive_rate: f64,
        legacy_hash_order: bool,
    ) -> Result<Self> {
        if false_positive_rate <= 0.0 || false_positive_rate >= 1.0 {
            return Err(Error::configuration(
                "false_positive_rate must be between 0 and 1",
            ));
        }

        if expected_elements == 0 {
            return Err(Error::configuration(
                "expected_elements must be greater than 0",
            ));
        }

        // m = -(n * ln(p)) / (ln(2)^2)
        let bit_count = (-(expected_elements as f64 * false_positive_rate.ln())
            / (2.0_f64.ln().powi(2)))
        .ceil() as u64;

        // k = (m / n) * ln(2)
        let hash_count =
            ((bit_count as f64 / expected_elements as f64) * 2.0_f64.ln()).ceil() as u32;
        let hash_count = hash_count.max(1);

        let word_count = (bit_count + 63) / 64;

        Ok(Self {
            bits: vec![0u64; word_count as usize],
            hash_count,
            bit_count,
            expected_elements,
            false_positive_rate,
            legacy_hash_order,
        })
    }

    /// Add a key to the filter. Called once per partition as it is
    /// appended to the Index Writer.
    pub fn add(&mut self, key: &[u8]) {
        self.insert(key);
    }

    pub fn insert(&mut self, key: &[u8]) {
        let hashes = self.calculate_hashes(key);

        for i in 0..self.hash_count {
            let hash = hashes.0.wrapping_add(i as u64 * hashes.1);
            let bit_index = (hash % self.bit_count) as usize;
            let word_index = bit_index / 64;
            let bit_offset = bit_index % 64;

            if word_index < self.bits.len() {
                self.bits[word_index] |= 1u64 << bit_offset;
            }
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let hashes = self.calculate_hashes(key);

        for i in 0..self.hash_count {
            let hash = hashes.0.wrapping_add(i as u64 * hashes.1);
            let bit_index = (hash % self.bit_count) as usize;
            let word_index = bit_index / 64;
            let bit_offset = bit_index % 64;

            if word_index >= self.bits.len() {
                return false;
            }

            if (self.bits[word_index] & (1u64 << bit_offset)) == 0 {
                return false;
            }
        }

        true
    }

    /// Alias for `contains` (Cassandra-style naming).
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.contains(key)
    }

    fn calculate_hashes(&self, key: &[u8]) -> (u64, u64) {
        let mut hasher1 = DefaultHasher::new();
        let mut hasher2 = DefaultHasher::new();

        hasher1.write(key);
        hasher1.write(&[0xAA]);

        hasher2.write(key);
        hasher2.write(&[0x55]);

        (hasher1.finish(), hasher2.finish())
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    pub fn false_positive_rate(&self) -> f64 {
        self.false_positive_rate
    }

    pub fn expected_elements(&self) -> u64 {
        self.expected_elements
    }

    pub fn current_false_positive_rate(&self, inserted_count: u64) -> f64 {
        if inserted_count == 0 {
            return 0.0;
        }

        let prob_bit_zero = (1.0 - 1.0 / self.bit_count as f64)
            .powf(self.hash_count as f64 * inserted_count as f64);

        (1.0 - prob_bit_zero).powf(self.hash_count as f64)
    }

    /// Serialize the filter for the Filter component file, honoring
    /// `legacy_hash_order`.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut payload = self.clone();
        if payload.legacy_hash_order {
            payload.bits.reverse();
        }
        bincode::serialize(&payload).map_err(|e| Error::serialization(e.to_string()))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self> {
        let mut filter: Self =
            bincode::deserialize(data).map_err(|e| Error::serialization(e.to_string()))?;
        if filter.legacy_hash_order {
            filter.bits.reverse();
        }
        Ok(filter)
    }

    pub fn clear(&mut self) {
        for word in &mut self.bits {
            *word = 0;
        }
    }

    pub fn memory_usage(&self) -> usize {
        self.bits.len() * 8 + std::mem::size_of::<Self>()
    }

    pub fn stats(&self) -> BloomFilterStats {
        let bits_set = self.bits.iter().map(|word| word.count_ones() as u64).sum();
        let fill_ratio = bits_set as f64 / self.bit_count as f64;

        BloomFilterStats {
            bit_count: self.bit_count,
            hash_count: self.hash_count,
            expected_elements: self.expected_elements,
            false_positive_rate: self.false_positive_rate,
            memory_usage: self.memory_usage(),
            bits_set,
            fill_ratio,
        }
    }
}

/// Statistics about a bloom filter.
#[derive(Debug, Clone)]
pub struct BloomFilterStats {
    pub bit_count: u64,
    pub hash_count: u32,
    pub expected_elements: u64,
    pub false_positive_rate: f64,
    pub memory_usage: usize,
    pub bits_set: u64,
    pub fill_ratio: f64,
}

/// A reference-counted handle to a filter under construction, so an
/// early-open reader can consult the same bits the writer is still
/// populating without a private copy.
#[derive(Debug, Clone)]
pub struct SharedBloomFilter(Arc<RwLock<BloomFilter>>);

impl SharedBloomFilter {
    pub fn new(filter: BloomFilter) -> Self {
        Self(Arc::new(RwLock::new(filter)))
    }

    pub fn add(&self, key: &[u8]) {
        self.0.write().unwrap().add(key);
    }

    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.0.read().unwrap().contains(key)
    }

    /// A fresh, independent snapshot of the current bits — for a reader
    /// that wants its own copy instead of contending on the shared lock.
    pub fn snapshot(&self) -> BloomFilter {
        self.0.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_filter_creation() {
        let bloom = BloomFilter::new(1000, 0.01).unwrap();
        assert!(bloom.bit_count > 0);
        assert!(bloom.hash_count > 0);
        assert_eq!(bloom.expected_elements, 1000);
        assert_eq!(bloom.false_positive_rate, 0.01);
    }

    #[test]
    fn test_bloom_filter_insert_and_contains() {
        let mut bloom = BloomFilter::new(100, 0.01).unwrap();

        let key1 = b"test_key_1";
        let key2 = b"test_key_2";
        let key3 = b"test_key_3";

        assert!(!bloom.contains(key1));
        assert!(!bloom.contains(key2));
        assert!(!bloom.contains(key3));

        bloom.insert(key1);
        assert!(bloom.contains(key1));
        assert!(!bloom.contains(key2));

        bloom.insert(key2);
        assert!(bloom.contains(key1));
        assert!(bloom.contains(key2));
        assert!(!bloom.contains(key3));
    }

    #[test]
    fn test_bloom_filter_false_positive_rate() {
        let mut bloom = BloomFilter::new(1000, 0.01).unwrap();

        for i in 0..100 {
            let key = format!("key_{}", i);
            bloom.insert(key.as_bytes());
        }

        let fp_rate = bloom.current_false_positive_rate(100);
        assert!(fp_rate >= 0.0);
        assert!(fp_rate <= 1.0);
    }

    #[test]
    fn test_bloom_filter_serialization_round_trip() {
        let mut bloom = BloomFilter::new(100, 0.01).unwrap();
        bloom.insert(b"key1");
        bloom.insert(b"key2");
        bloom.insert(b"key3");

        let serialized = bloom.serialize().unwrap();
        let deserialized = BloomFilter::deserialize(&serialized).unwrap();

        assert!(deserialized.contains(b"key1"));
        assert!(deserialized.contains(b"key2"));
        assert!(deserialized.contains(b"key3"));
        assert!(!deserialized.contains(b"key4"));
    }

    #[test]
    fn test_legacy_hash_order_round_trips() {
        let mut bloom =
            BloomFilter::with_legacy_hash_order(100, 0.01, true).unwrap();
        bloom.insert(b"key1");
        bloom.insert(b"key2");

        let serialized = bloom.serialize().unwrap();
        let deserialized = BloomFilter::deserialize(&serialized).unwrap();

        assert!(deserialized.contains(b"key1"));
        assert!(deserialized.contains(b"key2"));
    }

    #[test]
    fn test_bloom_filter_stats() {
        let mut bloom = BloomFilter::new(100, 0.01).unwrap();

        for i in 0..50 {
            let key = format!("key_{}", i);
            bloom.insert(key.as_bytes());
        }

        let stats = bloom.stats();
        assert_eq!(stats.bit_count, bloom.bit_count);
        assert_eq!(stats.hash_count, bloom.hash_count);
        assert_eq!(stats.expected_elements, 100);
        assert!(stats.bits_set > 0);
        assert!(stats.fill_ratio > 0.0);
        assert!(stats.memory_usage > 0);
    }

    #[test]
    fn test_bloom_filter_clear() {
        let mut bloom = BloomFilter::new(100, 0.01).unwrap();

        bloom.insert(b"key1");
        bloom.insert(b"key2");
        assert!(bloom.contains(b"key1"));

        bloom.clear();
        assert!(!bloom.contains(b"key1"));
        assert!(!bloom.contains(b"key2"));
    }

    #[test]
    fn test_bloom_filter_invalid_parameters() {
        assert!(BloomFilter::new(1000, 0.0).is_err());
        assert!(BloomFilter::new(1000, 1.0).is_err());
        assert!(BloomFilter::new(1000, -0.1).is_err());
        assert!(BloomFilter::new(1000, 1.1).is_err());
        assert!(BloomFilter::new(0, 0.01).is_err());
    }

    #[test]
    fn test_shared_bloom_filter_visible_across_handles() {
        let bloom = BloomFilter::new(100, 0.01).unwrap();
        let shared = SharedBloomFilter::new(bloom);
        let reader_handle = shared.clone();

        shared.add(b"key1");

        assert!(reader_handle.might_contain(b"key1"));
        assert!(!reader_handle.might_contain(b"key2"));
    }
}
