//! Table Writer Orchestrator (C5): accepts partitions in sorted key order,
//! coordinates the data sink and the index writer, collects statistics,
//! publishes early readers, and executes the transactional commit.

use std::path::PathBuf;

use log::warn;

use crate::config::Config;
use crate::storage::sstable::bloom::SharedBloomFilter;
use crate::storage::sstable::compression::codec_for;
use crate::storage::sstable::index_writer::{IndexWriter, IndexWriterMark};
use crate::storage::sstable::partitioner::Partitioner;
use crate::storage::sstable::row::{Partition, RowIndexEntry, RowSerializer};
use crate::storage::sstable::sink::{SequentialFileSink, SinkMark, SinkState};
use crate::storage::sstable::stats::{StatsCollector, StatsMetadata};
use crate::storage::sstable::summary::ReadableBoundary;
use crate::storage::sstable::toc;
use crate::storage::sstable::{ComponentKind, Descriptor};
use crate::storage::transaction::TrackedTransaction;
use crate::{Error, Result};

/// Why an early reader handle was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenReason {
    Early,
    Final,
}

/// A reader-construction handle: everything a reader needs to serve
/// lookups against a (possibly still-open) generation, frozen at the
/// moment it was produced. The read path itself is out of scope; this is
/// the collaborator-facing surface C5 exposes.
#[derive(Debug, Clone)]
pub struct ReaderHandle {
    pub reason: OpenReason,
    pub data_path: PathBuf,
    pub index_path: PathBuf,
    pub boundary: Option<ReadableBoundary>,
    pub bloom: crate::storage::sstable::bloom::SharedBloomFilter,
}

/// A joint rewind point across the data sink and the index writer.
#[derive(Debug, Clone, Copy)]
pub struct WriterMark {
    data_mark: SinkMark,
    index_mark: IndexWriterMark,
}

/// Drives one SSTable generation from first `append` through `commit` or
/// `abort`.
pub struct TableWriter {
    descriptor: Descriptor,
    data_sink: SequentialFileSink,
    index_writer: IndexWriter,
    partitioner: Box<dyn Partitioner>,
    row_serializer: Box<dyn RowSerializer>,
    stats: StatsCollector,
    config: Config,
    transaction: TrackedTransaction,
    state: SinkState,
    last_key: Option<Vec<u8>>,
    statistics_path: PathBuf,
    statistics_temp_path: PathBuf,
}

impl TableWriter {
    /// Open a new generation. Registers with the transaction tracker
    /// before any file is created, per spec §5.
    pub fn open(
        descriptor: Descriptor,
        config: Config,
        partitioner: Box<dyn Partitioner>,
        row_serializer: Box<dyn RowSerializer>,
        transaction_tracker: &crate::storage::transaction::TransactionTracker,
    ) -> Result<Self> {
        config.validate()?;

        let data_path = descriptor.path_for(ComponentKind::Data);
        let index_path = descriptor.path_for(ComponentKind::PrimaryIndex);
        let filter_path = descriptor.path_for(ComponentKind::Filter);
        let summary_path = descriptor.path_for(ComponentKind::Summary);
        let statistics_path = descriptor.path_for(ComponentKind::Statistics);
        let statistics_temp_path = temp_name(&statistics_path);
        let compression_info_path = descriptor.path_for(ComponentKind::CompressionInfo);
        let crc_path = descriptor.path_for(ComponentKind::Crc);
        let toc_path = descriptor.path_for(ComponentKind::Toc);

        let mut temp_paths = vec![
            temp_name(&data_path),
            temp_name(&index_path),
            temp_name(&filter_path),
            temp_name(&summary_path),
            statistics_temp_path.clone(),
            temp_name(&toc_path),
        ];
        if config.storage.compression.enabled {
            temp_paths.push(temp_name(&compression_info_path));
        } else {
            temp_paths.push(temp_name(&crc_path));
        }
        let transaction = transaction_tracker.track_new(temp_paths);

        let chunk_size = config.storage.write_buffer_size;
        let data_sink = if config.storage.compression.enabled {
            let codec = codec_for(config.storage.compression.algorithm);
            SequentialFileSink::open_compressed(
                &data_path,
                &compression_info_path,
                config.storage.compression.chunk_size as usize,
                codec,
            )?
        } else {
            SequentialFileSink::open_plain(&data_path, &crc_path, chunk_size)?
        };

        let index_writer = IndexWriter::open(
            &index_path,
            &filter_path,
            &summary_path,
            chunk_size,
            config.bloom.expected_keys,
            config.bloom.false_positive_chance,
            config.bloom.legacy_hash_order,
            config.summary.index_interval,
            config.summary.min_index_interval,
            config.summary.base_sampling_level,
        )?;

        Ok(Self {
            descriptor,
            data_sink,
            index_writer,
            partitioner,
            row_serializer,
            stats: StatsCollector::new(),
            config,
            transaction,
            state: SinkState::Open,
            last_key: None,
            statistics_path,
            statistics_temp_path,
        })
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// A cloneable handle onto the Bloom filter accumulated so far, usable
    /// for membership checks before (or instead of) opening a reader.
    pub fn shared_bloom_filter(&self) -> SharedBloomFilter {
        self.index_writer.shared_bloom_filter()
    }

    /// Append one partition. Returns `None` if the key is oversized or the
    /// partition carries nothing to write (spec: logged skip, not an
    /// error).
    pub fn append(&mut self, partition: &Partition) -> Result<Option<RowIndexEntry>> {
        if self.state != SinkState::Open {
            return Err(Error::invalid_operation("append called out of order"));
        }

        if partition.key.key.len() > u16::MAX as usize {
            warn!(
                "skipping oversized partition key ({} bytes > u16::MAX)",
                partition.key.key.len()
            );
            return Ok(None);
        }
        if partition.is_empty() {
            return Ok(None);
        }

        debug_assert!(
            self.last_key
                .as_ref()
                .map(|k| partition.key.key.as_slice() >= k.as_slice())
                .unwrap_or(true),
            "partition keys must be non-decreasing across successive append calls"
        );
        self.last_key = Some(partition.key.key.clone());

        let start_position = self.data_sink.file_pointer();

        let mut header = Vec::new();
        header.extend_from_slice(&(partition.key.key.len() as u16).to_be_bytes());
        header.extend_from_slice(&partition.key.key);
        header.extend_from_slice(&partition.deletion.marked_for_delete_at.to_be_bytes());
        header.extend_from_slice(&partition.deletion.local_deletion_time.to_be_bytes());
        self.data_sink.write(&header)?;

        let column_index = self
            .row_serializer
            .write_and_build_index(partition, &mut self.data_sink)?;

        self.stats.observe_partition(partition, &column_index);

        let end_position = self.data_sink.file_pointer();
        let row_size = end_position - start_position;
        if row_size > self.config.storage.large_partition_warning_threshold {
            warn!(
                "large partition: key {} bytes wrote {row_size} bytes (threshold {})",
                partition.key.key.len(),
                self.config.storage.large_partition_warning_threshold
            );
        }

        let entry = RowIndexEntry::new(start_position, partition.deletion, column_index);
        self.index_writer
            .append(&partition.key, &entry, end_position)?;

        Ok(Some(entry))
    }

    /// Capture a joint rewind point across the data and index sinks.
    pub fn mark(&mut self) -> Result<WriterMark> {
        Ok(WriterMark {
            data_mark: self.data_sink.mark()?,
            index_mark: self.index_writer.mark()?,
        })
    }

    /// Discard everything appended after `mark`. The Bloom filter's stale
    /// entries from the rewound range are left in place (harmless false
    /// positives); the summary's running counters are restored so later
    /// deterministic sampling matches a writer that never saw the rewound
    /// partitions.
    pub fn reset_and_truncate(&mut self, mark: WriterMark) -> Result<()> {
        self.data_sink.reset_and_truncate(mark.data_mark)?;
        self.index_writer.reset_and_truncate(mark.index_mark)?;
        self.last_key = None;
        Ok(())
    }

    /// Sync both sinks and advance the readable boundary, without
    /// transitioning toward commit.
    pub fn sync(&mut self) -> Result<()> {
        self.data_sink.sync()?;
        self.index_writer.sync_index()?;
        self.index_writer.mark_data_synced(self.data_sink.file_pointer());
        Ok(())
    }

    /// If a readable boundary exists, return a reader handle bounded by
    /// `[first, boundary.lastKey]`.
    pub fn open_early(&self) -> Option<ReaderHandle> {
        let boundary = self.index_writer.readable_boundary()?.clone();
        Some(ReaderHandle {
            reason: OpenReason::Early,
            data_path: self.descriptor.path_for(ComponentKind::Data),
            index_path: self.descriptor.path_for(ComponentKind::PrimaryIndex),
            boundary: Some(boundary),
            bloom: self.index_writer.shared_bloom_filter(),
        })
    }

    /// Fsync data and index without closing, and hand back a reader over
    /// the entire current contents.
    pub fn open_final_early(&mut self) -> Result<ReaderHandle> {
        self.sync()?;
        Ok(ReaderHandle {
            reason: OpenReason::Final,
            data_path: self.descriptor.path_for(ComponentKind::Data),
            index_path: self.descriptor.path_for(ComponentKind::PrimaryIndex),
            boundary: None,
            bloom: self.index_writer.shared_bloom_filter(),
        })
    }

    /// Steps 1-5 of the transactional commit: filter, index, summary
    /// (via the index writer), then the data file's prepare phase, then
    /// statistics. Every step runs regardless of earlier failures; all
    /// failures are folded into one composite error.
    pub fn prepare_to_commit(&mut self) -> Result<()> {
        if matches!(self.state, SinkState::Prepared | SinkState::Committed) {
            return Ok(());
        }
        if self.state != SinkState::Open {
            return Err(Error::invalid_operation(
                "prepare_to_commit called out of order",
            ));
        }
        self.transaction.mark_preparing()?;
        self.state = SinkState::Preparing;

        let mut err = None;
        err = Error::accumulate(
            err,
            self.index_writer.prepare_to_commit(self.partitioner.as_ref()),
        );
        err = Error::accumulate(err, self.data_sink.prepare_to_commit());
        err = Error::accumulate(err, self.build_statistics());

        match err {
            Some(e) => Err(e),
            None => {
                self.state = SinkState::Prepared;
                Ok(())
            }
        }
    }

    fn build_statistics(&mut self) -> Result<()> {
        let metadata = self.stats.snapshot();
        let bytes = metadata.to_bytes()?;
        std::fs::write(&self.statistics_temp_path, &bytes)
            .map_err(|e| Error::write(&self.statistics_temp_path, e))?;
        let file = std::fs::File::open(&self.statistics_temp_path)
            .map_err(|e| Error::write(&self.statistics_temp_path, e))?;
        file.sync_all()
            .map_err(|e| Error::write(&self.statistics_temp_path, e))
    }

    /// Steps 2-3 (rename, via index writer), 4 (rename data), 5 (rename
    /// statistics), 6 (write + fsync TOC), 7 (fsync parent directory).
    pub fn commit(&mut self) -> Result<()> {
        if self.state == SinkState::Committed {
            return Ok(());
        }
        if self.state != SinkState::Prepared {
            return Err(Error::invalid_operation("commit called before prepare"));
        }

        let mut err = None;
        err = Error::accumulate(err, self.index_writer.commit());
        err = Error::accumulate(err, self.data_sink.commit());
        err = Error::accumulate(
            err,
            std::fs::rename(&self.statistics_temp_path, &self.statistics_path)
                .map_err(|e| Error::write(&self.statistics_path, e)),
        );

        if let Some(e) = err {
            let _ = self.abort();
            return Err(e);
        }

        // Step 6: the TOC is the last thing that can still fail the commit.
        // Past this point (the directory fsync below) the SSTable is
        // considered committed even if that fsync fails; the outer
        // transaction tracker is responsible for detecting this on a
        // subsequent crash-recovery sweep.
        let components = self.present_components();
        let toc_path = self.descriptor.path_for(ComponentKind::Toc);
        if let Err(e) = toc::write(&toc_path, &components) {
            warn!("failed to write TOC for {:?}: {e}", self.descriptor.directory);
            let _ = self.abort();
            return Err(e);
        }

        if let Ok(dir) = std::fs::File::open(&self.descriptor.directory) {
            let _ = dir.sync_all();
        }

        self.state = SinkState::Committed;
        self.transaction.mark_committed()?;
        Ok(())
    }

    fn present_components(&self) -> Vec<ComponentKind> {
        let mut components = vec![
            ComponentKind::Data,
            ComponentKind::PrimaryIndex,
            ComponentKind::Summary,
            ComponentKind::Filter,
            ComponentKind::Statistics,
            ComponentKind::Toc,
        ];
        if self.config.storage.compression.enabled {
            components.push(ComponentKind::CompressionInfo);
        } else {
            components.push(ComponentKind::Crc);
        }
        components
    }

    pub fn abort(&mut self) -> Result<()> {
        if self.state == SinkState::Committed {
            return Err(Error::invalid_operation("cannot abort a committed writer"));
        }

        let _ = self.index_writer.abort();
        let _ = self.data_sink.abort();
        let _ = std::fs::remove_file(&self.statistics_temp_path);

        self.state = SinkState::Aborted;
        self.transaction.mark_aborted()?;
        Ok(())
    }

    pub fn stats_snapshot(&self) -> StatsMetadata {
        self.stats.snapshot()
    }
}

fn temp_name(final_path: &std::path::Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_owned();
    os.push("-tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sstable::partitioner::{DecoratedKey, Murmur3Partitioner, Token};
    use crate::storage::sstable::row::{DefaultRowSerializer, DeletionTime, Row};
    use crate::storage::transaction::TransactionTracker;
    use crate::types::Value;
    use tempfile::TempDir;

    fn partition(n: u8, rows: usize) -> Partition {
        Partition {
            key: DecoratedKey::new(Token(n as i64), vec![n; 4]),
            deletion: DeletionTime::LIVE,
            rows: (0..rows)
                .map(|i| Row {
                    clustering: format!("c{i}").into_bytes(),
                    deletion: DeletionTime::LIVE,
                    ttl: None,
                    cells: vec![Value::Text("v".to_string())],
                })
                .collect(),
            range_tombstones: vec![],
        }
    }

    fn open_writer(dir: &TempDir, config: Config) -> TableWriter {
        let descriptor = Descriptor::new(dir.path().to_path_buf(), "ks", "tbl", "nb", 1);
        let tracker = TransactionTracker::new();
        TableWriter::open(
            descriptor,
            config,
            Box::new(Murmur3Partitioner),
            Box::new(DefaultRowSerializer),
            &tracker,
        )
        .unwrap()
    }

    #[test]
    fn test_append_three_partitions_then_commit() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::uncompressed());

        for n in 1..=3u8 {
            let entry = writer.append(&partition(n, 2)).unwrap();
            assert!(entry.is_some());
        }

        writer.prepare_to_commit().unwrap();
        writer.commit().unwrap();

        assert!(dir.path().join("ks-tbl-nb-1-Data.db").exists());
        assert!(dir.path().join("ks-tbl-nb-1-Index.db").exists());
        assert!(dir.path().join("ks-tbl-nb-1-Summary.db").exists());
        assert!(dir.path().join("ks-tbl-nb-1-Filter.db").exists());
        assert!(dir.path().join("ks-tbl-nb-1-Statistics.db").exists());
        assert!(dir.path().join("ks-tbl-nb-1-TOC.txt").exists());
        assert!(dir.path().join("ks-tbl-nb-1-CRC.db").exists());
    }

    #[test]
    fn test_oversized_key_is_skipped_not_errored() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::uncompressed());

        let oversized = Partition {
            key: DecoratedKey::new(Token(1), vec![0u8; u16::MAX as usize + 1]),
            deletion: DeletionTime::LIVE,
            rows: vec![Row {
                clustering: b"c".to_vec(),
                deletion: DeletionTime::LIVE,
                ttl: None,
                cells: vec![],
            }],
            range_tombstones: vec![],
        };

        let result = writer.append(&oversized).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_mark_and_reset_truncate_discards_appended_partitions() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::uncompressed());

        writer.append(&partition(1, 1)).unwrap();
        let mark = writer.mark().unwrap();
        writer.append(&partition(2, 1)).unwrap();
        writer.append(&partition(3, 1)).unwrap();

        writer.reset_and_truncate(mark).unwrap();

        writer.append(&partition(2, 1)).unwrap();
        writer.prepare_to_commit().unwrap();
        writer.commit().unwrap();

        let data = std::fs::read(dir.path().join("ks-tbl-nb-1-Data.db")).unwrap();
        assert!(!data.is_empty());
    }

    #[test]
    fn test_abort_leaves_no_final_files() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::uncompressed());
        writer.append(&partition(1, 1)).unwrap();

        writer.abort().unwrap();

        assert!(!dir.path().join("ks-tbl-nb-1-Data.db").exists());
        assert!(!dir.path().join("ks-tbl-nb-1-TOC.txt").exists());
    }

    #[test]
    fn test_open_early_returns_none_before_any_sync() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::uncompressed());
        writer.append(&partition(1, 1)).unwrap();

        assert!(writer.open_early().is_none());
    }

    #[test]
    fn test_open_early_returns_boundary_after_sync() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::uncompressed());
        writer.append(&partition(1, 1)).unwrap();
        writer.sync().unwrap();

        let handle = writer.open_early();
        assert!(handle.is_some());
        assert_eq!(handle.unwrap().reason, OpenReason::Early);
    }

    #[test]
    fn test_compressed_writer_produces_compression_info_not_crc() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_writer(&dir, Config::default());

        writer.append(&partition(1, 1)).unwrap();
        writer.prepare_to_commit().unwrap();
        writer.commit().unwrap();

        assert!(dir
            .path()
            .join("ks-tbl-nb-1-CompressionInfo.db")
            .exists());
        assert!(!dir.path().join("ks-tbl-nb-1-CRC.db").exists());
    }
}
