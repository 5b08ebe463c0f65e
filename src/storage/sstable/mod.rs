//! SSTable builder subsystem: constructs an immutable, multi-file sorted
//! string table from a sorted stream of partitions, publishing a
//! consistent set of on-disk components via a two-phase commit.

pub mod bloom;
pub mod compression;
pub mod compression_info;
pub mod crc;
pub mod index_writer;
pub mod partitioner;
pub mod row;
pub mod sink;
pub mod summary;
pub mod writer;
pub mod stats;
pub mod toc;

use std::path::PathBuf;

/// The nine kinds of file a finished SSTable generation may carry.
/// Grounded in the teacher's `SSTableComponent` enum, generalized from its
/// fixed `Data.db`/`Index.db`/... constants into a descriptor-parameterized
/// naming function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ComponentKind {
    Data,
    PrimaryIndex,
    Summary,
    Filter,
    Statistics,
    CompressionInfo,
    Crc,
    Digest,
    Toc,
}

impl ComponentKind {
    /// The component name used both in filenames and in the Toc listing.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            ComponentKind::Data => "Data",
            ComponentKind::PrimaryIndex => "Index",
            ComponentKind::Summary => "Summary",
            ComponentKind::Filter => "Filter",
            ComponentKind::Statistics => "Statistics",
            ComponentKind::CompressionInfo => "CompressionInfo",
            ComponentKind::Crc => "CRC",
            ComponentKind::Digest => "Digest",
            ComponentKind::Toc => "TOC",
        }
    }

    fn file_extension(&self) -> &'static str {
        match self {
            ComponentKind::Toc => "txt",
            _ => "db",
        }
    }
}

/// Immutable identity of one SSTable generation: directory, generation
/// number, and on-disk format version. The set of component kinds actually
/// present is derived from config at commit time (`TableWriter::
/// present_components`), not carried here.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub directory: PathBuf,
    pub keyspace: String,
    pub table: String,
    pub version: String,
    pub generation: u64,
}

impl Descriptor {
    pub fn new(
        directory: PathBuf,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        version: impl Into<String>,
        generation: u64,
    ) -> Self {
        Self {
            directory,
            keyspace: keyspace.into(),
            table: table.into(),
            version: version.into(),
            generation,
        }
    }

    /// `<keyspace>-<table>-<version>-<generation>-<kind>.<ext>`.
    pub fn path_for(&self, kind: ComponentKind) -> PathBuf {
        let filename = format!(
            "{}-{}-{}-{}-{}.{}",
            self.keyspace,
            self.table,
            self.version,
            self.generation,
            kind.file_suffix(),
            kind.file_extension()
        );
        self.directory.join(filename)
    }
}
