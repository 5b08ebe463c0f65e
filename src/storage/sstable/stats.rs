//! `StatsMetadata` and the stats-collecting projector that observes every
//! partition as C5 streams it through, without altering the stream.

use crate::storage::sstable::row::{ColumnIndex, DeletionTime, Partition};

/// A coarse histogram over `u64` samples, bucketed by power-of-two range,
/// matching the estimated histograms real SSTable statistics files carry.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EstimatedHistogram {
    /// `buckets[i]` counts samples whose value fell in `[2^i, 2^(i+1))`.
    buckets: Vec<u64>,
}

impl EstimatedHistogram {
    const BUCKET_COUNT: usize = 64;

    pub fn new() -> Self {
        Self {
            buckets: vec![0; Self::BUCKET_COUNT],
        }
    }

    pub fn add(&mut self, value: u64) {
        let bucket = if value == 0 {
            0
        } else {
            (64 - value.leading_zeros()) as usize
        };
        let bucket = bucket.min(Self::BUCKET_COUNT - 1);
        self.buckets[bucket] += 1;
    }

    pub fn count(&self) -> u64 {
        self.buckets.iter().sum()
    }

    pub fn buckets(&self) -> &[u64] {
        &self.buckets
    }
}

impl Default for EstimatedHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated per-partition numbers, built incrementally and serialized
/// once at finalize.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatsMetadata {
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub min_ttl: i32,
    pub max_ttl: i32,
    pub min_local_deletion_time: i32,
    pub max_local_deletion_time: i32,
    pub partition_size_histogram: EstimatedHistogram,
    pub cells_per_partition_histogram: EstimatedHistogram,
    pub min_clustering: Option<Vec<u8>>,
    pub max_clustering: Option<Vec<u8>>,
    pub total_cells: u64,
    pub repaired_at: i64,
    pub first_key: Option<Vec<u8>>,
    pub last_key: Option<Vec<u8>>,
}

impl StatsMetadata {
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        bincode::serialize(self).map_err(crate::Error::from)
    }
}

impl Default for StatsMetadata {
    fn default() -> Self {
        Self {
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            min_ttl: i32::MAX,
            max_ttl: i32::MIN,
            min_local_deletion_time: i32::MAX,
            max_local_deletion_time: i32::MIN,
            partition_size_histogram: EstimatedHistogram::new(),
            cells_per_partition_histogram: EstimatedHistogram::new(),
            min_clustering: None,
            max_clustering: None,
            total_cells: 0,
            repaired_at: 0,
            first_key: None,
            last_key: None,
        }
    }
}

/// A streaming wrapper around each appended partition: observes rows and
/// range-tombstone markers and folds them into `StatsMetadata` without
/// altering what C5 does with the partition itself.
#[derive(Debug, Default)]
pub struct StatsCollector {
    metadata: StatsMetadata,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one partition: deletion time on open, per-row cell count and
    /// clustering bounds, boundary markers' start/end deletion times, and a
    /// histogram sample of total cells at close.
    pub fn observe_partition(&mut self, partition: &Partition, column_index: &ColumnIndex) {
        if self.metadata.first_key.is_none() {
            self.metadata.first_key = Some(partition.key.key.clone());
        }
        self.metadata.last_key = Some(partition.key.key.clone());

        self.observe_deletion(partition.deletion);

        let mut cells_in_partition = 0u64;
        for row in &partition.rows {
            self.observe_deletion(row.deletion);
            if let Some(ttl) = row.ttl {
                self.metadata.min_ttl = self.metadata.min_ttl.min(ttl);
                self.metadata.max_ttl = self.metadata.max_ttl.max(ttl);
            }
            cells_in_partition += row.cells.len() as u64;
            self.observe_clustering(&row.clustering);
        }

        for boundary in &partition.range_tombstones {
            if let Some(open) = boundary.open {
                self.observe_deletion(open);
            }
            if let Some(close) = boundary.close {
                self.observe_deletion(close);
            }
        }

        self.metadata.total_cells += cells_in_partition;
        self.metadata
            .cells_per_partition_histogram
            .add(cells_in_partition);

        let partition_width = match column_index {
            ColumnIndex::Inline(bytes) => bytes.len() as u64,
            ColumnIndex::Blocks(blocks) => blocks.iter().map(|b| b.width).sum(),
        };
        self.metadata.partition_size_histogram.add(partition_width);
    }

    fn observe_deletion(&mut self, deletion: DeletionTime) {
        if deletion.is_live() {
            return;
        }
        self.metadata.min_timestamp = self.metadata.min_timestamp.min(deletion.marked_for_delete_at);
        self.metadata.max_timestamp = self.metadata.max_timestamp.max(deletion.marked_for_delete_at);
        self.metadata.min_local_deletion_time = self
            .metadata
            .min_local_deletion_time
            .min(deletion.local_deletion_time);
        self.metadata.max_local_deletion_time = self
            .metadata
            .max_local_deletion_time
            .max(deletion.local_deletion_time);
    }

    fn observe_clustering(&mut self, clustering: &[u8]) {
        let replace_min = match &self.metadata.min_clustering {
            None => true,
            Some(existing) => clustering < existing.as_slice(),
        };
        if replace_min {
            self.metadata.min_clustering = Some(clustering.to_vec());
        }

        let replace_max = match &self.metadata.max_clustering {
            None => true,
            Some(existing) => clustering > existing.as_slice(),
        };
        if replace_max {
            self.metadata.max_clustering = Some(clustering.to_vec());
        }
    }

    pub fn finish(self) -> StatsMetadata {
        self.metadata
    }

    pub fn snapshot(&self) -> StatsMetadata {
        self.metadata.clone()
    }
}
