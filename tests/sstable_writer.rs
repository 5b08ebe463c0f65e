//! End-to-end scenarios for the SSTable builder subsystem, driving the
//! public `TableWriter` orchestrator the way a real caller would: open,
//! append a batch of partitions, commit (or abort), then inspect the
//! resulting component files.

use std::sync::{Mutex, Once, OnceLock};

use sstable_writer::storage::sstable::partitioner::{DecoratedKey, Murmur3Partitioner, Token};
use sstable_writer::storage::sstable::row::{DefaultRowSerializer, DeletionTime, Row};
use sstable_writer::storage::sstable::toc;
use sstable_writer::{Config, Descriptor, Partition, TableWriter, TransactionTracker, Value};
use tempfile::TempDir;

/// A `log::Log` that buffers records instead of printing them, so a test can
/// assert on a warning that would otherwise only be visible on stderr.
struct RecordingLogger;

fn recorded_messages() -> &'static Mutex<Vec<String>> {
    static MESSAGES: OnceLock<Mutex<Vec<String>>> = OnceLock::new();
    MESSAGES.get_or_init(|| Mutex::new(Vec::new()))
}

impl log::Log for RecordingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        recorded_messages()
            .lock()
            .unwrap()
            .push(format!("{}", record.args()));
    }

    fn flush(&self) {}
}

/// `log::set_logger` succeeds once per process; every test that wants to
/// capture log output shares this single registration.
fn install_recording_logger() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        log::set_boxed_logger(Box::new(RecordingLogger)).expect("logger installed once");
        log::set_max_level(log::LevelFilter::Warn);
    });
}

fn keyed_partition(key: &[u8]) -> Partition {
    Partition {
        key: DecoratedKey::new(Token(Murmur3Partitioner::hash(key)), key.to_vec()),
        deletion: DeletionTime::LIVE,
        rows: vec![Row {
            clustering: b"col".to_vec(),
            deletion: DeletionTime::LIVE,
            ttl: None,
            cells: vec![Value::Text("1".to_string())],
        }],
        range_tombstones: vec![],
    }
}

fn open_writer(dir: &TempDir, config: Config, tracker: &TransactionTracker) -> TableWriter {
    let descriptor = Descriptor::new(dir.path().to_path_buf(), "ks", "tbl", "nb", 1);
    TableWriter::open(
        descriptor,
        config,
        Box::new(Murmur3Partitioner),
        Box::new(DefaultRowSerializer),
        tracker,
    )
    .unwrap()
}

/// Scenario 1: three tiny partitions "a", "b", "c", each one cell.
#[test]
fn three_tiny_partitions_commit_with_all_seven_components() {
    let dir = TempDir::new().unwrap();
    let tracker = TransactionTracker::new();
    let mut config = Config::uncompressed();
    config.summary.min_index_interval = 128;
    let mut writer = open_writer(&dir, config, &tracker);

    for key in [b"a".as_slice(), b"b".as_slice(), b"c".as_slice()] {
        let entry = writer.append(&keyed_partition(key)).unwrap();
        assert!(entry.is_some(), "expected {key:?} to be accepted");
    }

    writer.prepare_to_commit().unwrap();
    writer.commit().unwrap();

    let base = dir.path();
    for (suffix, ext) in [
        ("Data", "db"),
        ("Index", "db"),
        ("Summary", "db"),
        ("Filter", "db"),
        ("Statistics", "db"),
        ("CRC", "db"),
        ("TOC", "txt"),
    ] {
        let path = base.join(format!("ks-tbl-nb-1-{suffix}.{ext}"));
        assert!(path.exists(), "missing component file {path:?}");
    }

    let toc_contents = std::fs::read_to_string(base.join("ks-tbl-nb-1-TOC.txt")).unwrap();
    let kinds = toc::parse(&toc_contents);
    assert_eq!(kinds.len(), 7, "TOC should list exactly 7 component kinds");

    let index_bytes = std::fs::read(base.join("ks-tbl-nb-1-Index.db")).unwrap();
    assert!(!index_bytes.is_empty(), "index file should hold 3 records");

    let bloom = writer.shared_bloom_filter();
    for key in [b"a".as_slice(), b"b".as_slice(), b"c".as_slice()] {
        assert!(bloom.might_contain(key), "{key:?} was appended and must test positive");
    }
    assert!(!bloom.might_contain(b"z"), "a key never appended should test negative");

    // Three partitions with index_interval 128 downsample to exactly one
    // summary entry; entry_count sits at byte offset 12 of the on-disk
    // summary header (sampling_level, min_index_interval, full_sampling_level,
    // entry_count, each a big-endian u32).
    let summary_bytes = std::fs::read(base.join("ks-tbl-nb-1-Summary.db")).unwrap();
    let entry_count = u32::from_be_bytes(summary_bytes[12..16].try_into().unwrap());
    assert_eq!(entry_count, 1, "three partitions at the default stride sample to one entry");
}

/// Scenario 2: rewind. Append a, b; mark; append c; resetAndTruncate;
/// append c2, d; commit. The writer only sees a, b, c2, d in the end.
#[test]
fn rewind_discards_everything_after_mark() {
    let dir = TempDir::new().unwrap();
    let tracker = TransactionTracker::new();
    let mut config = Config::uncompressed();
    config.summary.index_interval = 1;
    config.summary.min_index_interval = 1;
    let mut writer = open_writer(&dir, config, &tracker);

    writer.append(&keyed_partition(b"a")).unwrap();
    writer.append(&keyed_partition(b"b")).unwrap();

    let mark = writer.mark().unwrap();
    writer.append(&keyed_partition(b"c")).unwrap();

    writer.reset_and_truncate(mark).unwrap();

    writer.append(&keyed_partition(b"c2")).unwrap();
    writer.append(&keyed_partition(b"d")).unwrap();

    writer.prepare_to_commit().unwrap();
    writer.commit().unwrap();

    // The data file holds exactly the 4 surviving partitions, not 5.
    let data = std::fs::read(dir.path().join("ks-tbl-nb-1-Data.db")).unwrap();
    assert!(!data.is_empty());

    let stats = writer.stats_snapshot();
    assert_eq!(stats.first_key.as_deref(), Some(b"a".as_slice()));
    assert_eq!(stats.last_key.as_deref(), Some(b"d".as_slice()));
}

/// Scenario 3: early open. 10 000 partitions appended without a sync; no
/// boundary exists yet. A sync after the 5 000th partition produces a
/// boundary whose last key is that partition's key.
#[test]
fn early_open_tracks_boundary_after_sync() {
    let dir = TempDir::new().unwrap();
    let tracker = TransactionTracker::new();
    let mut config = Config::uncompressed();
    config.summary.index_interval = 1;
    config.summary.min_index_interval = 1;
    let mut writer = open_writer(&dir, config, &tracker);

    for n in 0..10_000u32 {
        let key = format!("key{n:05}").into_bytes();
        writer.append(&keyed_partition(&key)).unwrap();
        if n == 4_999 {
            writer.sync().unwrap();
        }
    }

    let handle = writer.open_early().expect("boundary should exist after the sync");
    let boundary = handle.boundary.expect("early handle carries a boundary");
    assert_eq!(boundary.last_key, b"key04999".to_vec());

    writer.prepare_to_commit().unwrap();
    writer.commit().unwrap();
}

/// Scenario 4: abort. Appends succeed, then the caller aborts; no final
/// (non-temp) files exist afterward and the transaction tracker observed it.
#[test]
fn abort_leaves_no_final_files_and_notifies_tracker() {
    let dir = TempDir::new().unwrap();
    let tracker = TransactionTracker::new();
    let mut config = Config::uncompressed();
    config.summary.index_interval = 1;
    config.summary.min_index_interval = 1;
    let mut writer = open_writer(&dir, config, &tracker);

    for n in 0..100u32 {
        let key = format!("key{n:04}").into_bytes();
        writer.append(&keyed_partition(&key)).unwrap();
    }

    writer.abort().unwrap();

    let base = dir.path();
    for (suffix, ext) in [
        ("Data", "db"),
        ("Index", "db"),
        ("Summary", "db"),
        ("Filter", "db"),
        ("Statistics", "db"),
        ("CRC", "db"),
        ("TOC", "txt"),
    ] {
        assert!(
            !base.join(format!("ks-tbl-nb-1-{suffix}.{ext}")).exists(),
            "aborted writer must not leave a final {suffix} file"
        );
    }

    assert!(tracker.live_temp_paths().is_empty());
}

/// Scenario 5: large partition. One partition whose encoded size exceeds
/// the warning threshold still commits successfully (the warning is
/// logged, not raised).
#[test]
fn large_partition_still_commits() {
    install_recording_logger();
    recorded_messages().lock().unwrap().clear();

    let dir = TempDir::new().unwrap();
    let tracker = TransactionTracker::new();
    let mut config = Config::uncompressed();
    config.storage.large_partition_warning_threshold = 64;
    let mut writer = open_writer(&dir, config, &tracker);

    let big_value = vec![0u8; 4096];
    let rows: Vec<Row> = (0..8)
        .map(|i| Row {
            clustering: format!("c{i:02}").into_bytes(),
            deletion: DeletionTime::LIVE,
            ttl: None,
            cells: vec![Value::Blob(big_value.clone())],
        })
        .collect();
    let partition = Partition {
        key: DecoratedKey::new(Token(1), b"bigkey".to_vec()),
        deletion: DeletionTime::LIVE,
        rows,
        range_tombstones: vec![],
    };

    let entry = writer.append(&partition).unwrap();
    assert!(entry.is_some());

    writer.prepare_to_commit().unwrap();
    writer.commit().unwrap();

    assert!(dir.path().join("ks-tbl-nb-1-Data.db").exists());

    let messages = recorded_messages().lock().unwrap();
    assert!(
        messages.iter().any(|m| m.to_lowercase().contains("large partition")),
        "expected a large-partition warning to be logged, got: {messages:?}"
    );
}

/// Scenario 6: compressed variant. Same shape as scenario 1, but with
/// compression enabled: `CompressionInfo` is present, `Crc` is absent.
#[test]
fn compressed_variant_emits_compression_info_not_crc() {
    let dir = TempDir::new().unwrap();
    let tracker = TransactionTracker::new();
    let config = Config::default(); // compression enabled by default
    let mut writer = open_writer(&dir, config, &tracker);

    for key in [b"a".as_slice(), b"b".as_slice(), b"c".as_slice()] {
        writer.append(&keyed_partition(key)).unwrap();
    }

    writer.prepare_to_commit().unwrap();
    writer.commit().unwrap();

    assert!(dir
        .path()
        .join("ks-tbl-nb-1-CompressionInfo.db")
        .exists());
    assert!(!dir.path().join("ks-tbl-nb-1-CRC.db").exists());

    let data_len = std::fs::metadata(dir.path().join("ks-tbl-nb-1-Data.db"))
        .unwrap()
        .len();
    assert!(data_len > 0);
}
