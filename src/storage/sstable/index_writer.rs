//! Index Writer (C4): owns the primary-index sink and drives the summary
//! and Bloom filter from the same per-partition event stream.

use std::path::{Path, PathBuf};

use crate::storage::sstable::bloom::{BloomFilter, SharedBloomFilter};
use crate::storage::sstable::partitioner::{DecoratedKey, Partitioner};
use crate::storage::sstable::row::RowIndexEntry;
use crate::storage::sstable::sink::{SequentialFileSink, SinkMark, SinkState};
use crate::storage::sstable::summary::{IndexSummary, ReadableBoundary, SummaryBuilder};
use crate::{Error, Result};

/// A joint rewind point across the index sink and the summary's running
/// counters (spec §4.5: "implementations must persist enough state at mark
/// to restore the summary's running counters").
#[derive(Debug, Clone, Copy)]
pub struct IndexWriterMark {
    sink_mark: SinkMark,
    sample_count: usize,
    partition_count: u64,
}

/// Drives the primary index file, the sampled summary, and the Bloom
/// filter in lockstep with the data file's partition appends.
pub struct IndexWriter {
    index_sink: SequentialFileSink,
    bloom: SharedBloomFilter,
    summary: SummaryBuilder,
    filter_path: PathBuf,
    filter_temp_path: PathBuf,
    summary_path: PathBuf,
    summary_temp_path: PathBuf,
    state: SinkState,
}

impl IndexWriter {
    pub fn open(
        index_path: &Path,
        filter_path: &Path,
        summary_path: &Path,
        chunk_size: usize,
        expected_keys: u64,
        false_positive_chance: f64,
        legacy_hash_order: bool,
        index_interval: u32,
        min_index_interval: u32,
        base_sampling_level: usize,
    ) -> Result<Self> {
        let index_sink_crc_path = index_path.with_extension("crc");
        let index_sink = SequentialFileSink::open_plain(index_path, &index_sink_crc_path, chunk_size)?;
        let bloom = SharedBloomFilter::new(BloomFilter::with_legacy_hash_order(
            expected_keys,
            false_positive_chance,
            legacy_hash_order,
        )?);
        let summary = SummaryBuilder::new(index_interval, min_index_interval, base_sampling_level)?;

        Ok(Self {
            index_sink,
            bloom,
            summary,
            filter_path: filter_path.to_path_buf(),
            filter_temp_path: temp_name(filter_path),
            summary_path: summary_path.to_path_buf(),
            summary_temp_path: temp_name(summary_path),
            state: SinkState::Open,
        })
    }

    /// A reference-counted handle to the Bloom filter, suitable for sharing
    /// with a reader whose view is frozen at the moment of the copy.
    pub fn shared_bloom_filter(&self) -> SharedBloomFilter {
        self.bloom.clone()
    }

    pub fn readable_boundary(&self) -> Option<&ReadableBoundary> {
        self.summary.readable_boundary()
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Invoked by the data sink's post-flush listener: advances the
    /// summary's notion of the durable data-file frontier.
    pub fn mark_data_synced(&mut self, offset: u64) {
        self.summary.mark_data_synced(offset);
    }

    /// Process one accepted partition: steps 1-5 of spec §4.4.
    pub fn append(&mut self, key: &DecoratedKey, entry: &RowIndexEntry, data_end: u64) -> Result<()> {
        if self.state != SinkState::Open {
            return Err(Error::invalid_operation("append called out of order"));
        }

        self.bloom.add(&key.key);

        let index_start = self.index_sink.file_pointer();

        let mut record = Vec::new();
        record.extend_from_slice(&(key.key.len() as u16).to_be_bytes());
        record.extend_from_slice(&key.key);
        let entry_bytes = entry.to_bytes()?;
        record.extend_from_slice(&(entry_bytes.len() as u32).to_be_bytes());
        record.extend_from_slice(&entry_bytes);

        self.index_sink.write(&record)?;

        let index_end = self.index_sink.file_pointer();
        self.summary
            .maybe_add_entry(&key.key, index_start, index_end, data_end);

        Ok(())
    }

    /// Force the index sink to fsync and advance the summary's index
    /// frontier, mirroring the data sink's post-flush listener.
    pub fn sync_index(&mut self) -> Result<()> {
        self.index_sink.sync()?;
        self.summary.mark_index_synced(self.index_sink.file_pointer());
        Ok(())
    }

    pub fn mark(&mut self) -> Result<IndexWriterMark> {
        Ok(IndexWriterMark {
            sink_mark: self.index_sink.mark()?,
            sample_count: self.summary.sample_count(),
            partition_count: self.summary.partition_count(),
        })
    }

    pub fn reset_and_truncate(&mut self, mark: IndexWriterMark) -> Result<()> {
        self.index_sink.reset_and_truncate(mark.sink_mark)?;
        self.summary
            .truncate(mark.sample_count, mark.partition_count);
        Ok(())
    }

    /// Serialize the filter (if present), fsync it, then truncate and
    /// durably close the index, then build and write the summary.
    pub fn prepare_to_commit(&mut self, partitioner: &dyn Partitioner) -> Result<()> {
        if matches!(self.state, SinkState::Prepared | SinkState::Committed) {
            return Ok(());
        }
        if self.state != SinkState::Open {
            return Err(Error::invalid_operation(
                "prepare_to_commit called out of order",
            ));
        }

        let filter_bytes = self.bloom.snapshot().serialize()?;
        write_atomic(&self.filter_temp_path, &self.filter_path, &filter_bytes)?;

        self.index_sink.prepare_to_commit()?;

        let summary = self.summary.build(partitioner, None);
        let summary_bytes = summary.to_bytes();
        write_atomic(&self.summary_temp_path, &self.summary_path, &summary_bytes)?;

        self.state = SinkState::Prepared;
        Ok(())
    }

    pub fn commit(&mut self) -> Result<()> {
        if self.state == SinkState::Committed {
            return Ok(());
        }
        if self.state != SinkState::Prepared {
            return Err(Error::invalid_operation("commit called before prepare"));
        }

        self.index_sink.commit()?;
        rename_prepared(&self.filter_temp_path, &self.filter_path)?;
        rename_prepared(&self.summary_temp_path, &self.summary_path)?;

        self.state = SinkState::Committed;
        Ok(())
    }

    pub fn abort(&mut self) -> Result<()> {
        if self.state == SinkState::Committed {
            return Err(Error::invalid_operation("cannot abort a committed index writer"));
        }

        let _ = self.index_sink.abort();
        let _ = std::fs::remove_file(&self.filter_temp_path);
        let _ = std::fs::remove_file(&self.summary_temp_path);
        self.state = SinkState::Aborted;
        Ok(())
    }

    /// Build a summary restricted to the current readable boundary, for
    /// `openEarly`.
    pub fn build_early_summary(&self, partitioner: &dyn Partitioner) -> Option<IndexSummary> {
        let boundary = self.summary.readable_boundary()?.clone();
        Some(self.summary.build(partitioner, Some(&boundary)))
    }
}

fn temp_name(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_owned();
    os.push("-tmp");
    PathBuf::from(os)
}

/// Write `bytes` to `temp_path`, fsync, but do not yet rename — the rename
/// happens at `commit()` so the whole writer stays atomic together.
fn write_atomic(temp_path: &Path, _final_path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(temp_path, bytes).map_err(|e| Error::write(temp_path, e))?;
    let file = std::fs::File::open(temp_path).map_err(|e| Error::write(temp_path, e))?;
    file.sync_all().map_err(|e| Error::write(temp_path, e))?;
    Ok(())
}

fn rename_prepared(temp_path: &Path, final_path: &Path) -> Result<()> {
    std::fs::rename(temp_path, final_path).map_err(|e| Error::write(final_path, e))
}
