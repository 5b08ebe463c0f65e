//! Index Summary Builder (C2): samples the primary index as partitions are
//! appended, tracks the durable readable boundary, and downsamples into the
//! final `Summary` component at commit time.

use crate::storage::sstable::partitioner::Partitioner;
use crate::{Error, Result};

/// One sampled entry: a partition key and the offset of its index record.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub key: Vec<u8>,
    pub index_offset: u64,
}

/// The durable frontier: the largest prefix of appended partitions for which
/// both data and index bytes have been fsynced. Monotonically advances.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadableBoundary {
    pub last_key: Vec<u8>,
    pub index_file_length: u64,
    pub data_file_length: u64,
    pub summary_entry_count: usize,
}

/// The finished, downsampled summary persisted to the `Summary` component.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSummary {
    pub sampling_level: usize,
    pub min_index_interval: u32,
    pub full_sampling_level: usize,
    pub entries: Vec<SummaryEntry>,
    pub first_key: Option<Vec<u8>>,
    pub last_key: Option<Vec<u8>>,
}

impl IndexSummary {
    /// Serialize per the on-disk layout: header, offsets table, packed keys,
    /// first/last key. The segmented-file-builder snapshot needed for reopen
    /// is appended by the caller, which alone knows the sink offsets.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(self.sampling_level as u32).to_be_bytes());
        out.extend_from_slice(&self.min_index_interval.to_be_bytes());
        out.extend_from_slice(&(self.full_sampling_level as u32).to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());

        let mut offset = 0u32;
        let mut offsets = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            offsets.push(offset);
            offset += entry.key.len() as u32 + 8;
        }
        for o in &offsets {
            out.extend_from_slice(&o.to_be_bytes());
        }

        for entry in &self.entries {
            out.extend_from_slice(&(entry.key.len() as u16).to_be_bytes());
            out.extend_from_slice(&entry.key);
            out.extend_from_slice(&entry.index_offset.to_be_bytes());
        }

        write_opt_key(&mut out, self.first_key.as_deref());
        write_opt_key(&mut out, self.last_key.as_deref());
        out
    }
}

fn write_opt_key(out: &mut Vec<u8>, key: Option<&[u8]>) {
    match key {
        Some(k) => {
            out.extend_from_slice(&(k.len() as u16).to_be_bytes());
            out.extend_from_slice(k);
        }
        None => out.extend_from_slice(&0u16.to_be_bytes()),
    }
}

/// Accumulates sampled index entries as the Index Writer processes
/// partitions, and produces the final `IndexSummary` at commit time.
pub struct SummaryBuilder {
    index_interval: u32,
    min_index_interval: u32,
    base_sampling_level: usize,
    partition_count: u64,
    samples: Vec<SummaryEntry>,
    /// `(indexEnd, dataEnd)` recorded alongside each sample, used to find
    /// the readable boundary.
    boundary_candidates: Vec<(u64, u64)>,
    synced_index_offset: u64,
    synced_data_offset: u64,
    readable_boundary: Option<ReadableBoundary>,
    first_key: Option<Vec<u8>>,
    last_key: Option<Vec<u8>>,
}

impl SummaryBuilder {
    /// `index_interval` is the normal sampling stride (read-path lookups
    /// use it); `min_index_interval` is the floor a caller may never
    /// configure `index_interval` below.
    pub fn new(
        index_interval: u32,
        min_index_interval: u32,
        base_sampling_level: usize,
    ) -> Result<Self> {
        if index_interval == 0 || min_index_interval == 0 || base_sampling_level == 0 {
            return Err(Error::configuration(
                "index_interval, min_index_interval, and base_sampling_level must be > 0",
            ));
        }
        if index_interval < min_index_interval {
            return Err(Error::configuration(
                "index_interval must not be below min_index_interval",
            ));
        }
        Ok(Self {
            index_interval,
            min_index_interval,
            base_sampling_level,
            partition_count: 0,
            samples: Vec::new(),
            boundary_candidates: Vec::new(),
            synced_index_offset: 0,
            synced_data_offset: 0,
            readable_boundary: None,
            first_key: None,
            last_key: None,
        })
    }

    /// Sampling stride: every `index_interval`th partition is sampled.
    fn stride(&self) -> u64 {
        self.index_interval as u64
    }

    /// Record one partition's index placement. Samples it if the running
    /// count lands on the current stride.
    pub fn maybe_add_entry(&mut self, key: &[u8], index_start: u64, index_end: u64, data_end: u64) {
        if self.first_key.is_none() {
            self.first_key = Some(key.to_vec());
        }
        self.last_key = Some(key.to_vec());

        if self.partition_count % self.stride() == 0 {
            self.samples.push(SummaryEntry {
                key: key.to_vec(),
                index_offset: index_start,
            });
            self.boundary_candidates.push((index_end, data_end));
        }
        self.partition_count += 1;
    }

    /// Record the latest durable index-file length; recomputes the
    /// readable boundary.
    pub fn mark_index_synced(&mut self, offset: u64) {
        self.synced_index_offset = offset;
        self.recompute_boundary();
    }

    /// Record the latest durable data-file length; recomputes the readable
    /// boundary.
    pub fn mark_data_synced(&mut self, offset: u64) {
        self.synced_data_offset = offset;
        self.recompute_boundary();
    }

    fn recompute_boundary(&mut self) {
        let mut best: Option<usize> = None;
        for (i, (index_end, data_end)) in self.boundary_candidates.iter().enumerate() {
            if *index_end <= self.synced_index_offset && *data_end <= self.synced_data_offset {
                best = Some(i);
            }
        }

        if let Some(i) = best {
            let candidate = ReadableBoundary {
                last_key: self.samples[i].key.clone(),
                index_file_length: self.boundary_candidates[i].0,
                data_file_length: self.boundary_candidates[i].1,
                summary_entry_count: i + 1,
            };
            // boundary only advances
            let advances = match &self.readable_boundary {
                None => true,
                Some(existing) => candidate.summary_entry_count > existing.summary_entry_count,
            };
            if advances {
                self.readable_boundary = Some(candidate);
            }
        }
    }

    pub fn readable_boundary(&self) -> Option<&ReadableBoundary> {
        self.readable_boundary.as_ref()
    }

    /// Number of samples currently recorded, for capturing/restoring a
    /// rewind point across `mark`/`resetAndTruncate`.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn partition_count(&self) -> u64 {
        self.partition_count
    }

    /// Restore the running counters to a prior rewind point. Sampling is
    /// deterministic in `partition_count`, so this alone suffices to make
    /// future sampling decisions identical to a writer that never wrote
    /// the rewound partitions.
    pub fn truncate(&mut self, sample_count: usize, partition_count: u64) {
        self.samples.truncate(sample_count);
        self.boundary_candidates.truncate(sample_count);
        self.partition_count = partition_count;
        self.readable_boundary = None;
        self.recompute_boundary();
    }

    /// Build the final, downsampled summary. `boundary` restricts the
    /// result to an early-open prefix; `None` finalizes over everything
    /// accumulated so far.
    pub fn build(
        &self,
        _partitioner: &dyn Partitioner,
        boundary: Option<&ReadableBoundary>,
    ) -> IndexSummary {
        let (entries, first_key, last_key) = match boundary {
            Some(b) => {
                let prefix = &self.samples[..b.summary_entry_count.min(self.samples.len())];
                (
                    prefix.to_vec(),
                    prefix.first().map(|e| e.key.clone()),
                    Some(b.last_key.clone()),
                )
            }
            None => (
                self.samples.clone(),
                self.first_key.clone(),
                self.last_key.clone(),
            ),
        };

        let (downsampled, sampling_level) = downsample(&entries, self.base_sampling_level);

        IndexSummary {
            sampling_level,
            min_index_interval: self.min_index_interval,
            full_sampling_level: self.base_sampling_level,
            entries: downsampled,
            first_key,
            last_key,
        }
    }
}

/// Drop every Nth sample in a deterministic round-robin pattern so at most
/// `base_sampling_level` entries remain.
fn downsample(entries: &[SummaryEntry], base_sampling_level: usize) -> (Vec<SummaryEntry>, usize) {
    if entries.len() <= base_sampling_level || base_sampling_level == 0 {
        return (entries.to_vec(), base_sampling_level.max(1));
    }

    let keep_every = (entries.len() as f64 / base_sampling_level as f64).ceil() as usize;
    let keep_every = keep_every.max(1);
    let downsampled: Vec<SummaryEntry> = entries.iter().step_by(keep_every).cloned().collect();

    let sampling_level = ((base_sampling_level as f64) / (keep_every as f64))
        .round()
        .max(1.0) as usize;
    let sampling_level = sampling_level.min(base_sampling_level);

    (downsampled, sampling_level)
}
