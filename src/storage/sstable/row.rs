//! The partition/row data model and the row-serialization collaborator
//! interface the orchestrator (C5) streams partitions through.
//!
//! Partition-content encoding is explicitly someone else's problem: this
//! module defines the shape C5 hands the collaborator and the shape it gets
//! back (a `ColumnIndex`), plus a default implementation exercised by tests.

use crate::storage::sstable::partitioner::DecoratedKey;
use crate::storage::sstable::sink::SequentialFileSink;
use crate::types::Value;
use crate::Result;

/// A deletion timestamp pair. `LIVE` means "not deleted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DeletionTime {
    pub marked_for_delete_at: i64,
    pub local_deletion_time: i32,
}

impl DeletionTime {
    pub const LIVE: DeletionTime = DeletionTime {
        marked_for_delete_at: i64::MIN,
        local_deletion_time: i32::MAX,
    };

    pub fn is_live(&self) -> bool {
        *self == Self::LIVE
    }
}

impl Default for DeletionTime {
    fn default() -> Self {
        Self::LIVE
    }
}

/// A single clustered row: a clustering key and its cell values.
#[derive(Debug, Clone)]
pub struct Row {
    pub clustering: Vec<u8>,
    pub deletion: DeletionTime,
    /// Row-level TTL in seconds, if any cell in the row carries one.
    pub ttl: Option<i32>,
    pub cells: Vec<Value>,
}

/// A range-tombstone boundary marker between two clustering positions.
#[derive(Debug, Clone)]
pub struct RangeTombstoneBoundary {
    pub clustering: Vec<u8>,
    pub open: Option<DeletionTime>,
    pub close: Option<DeletionTime>,
}

/// One partition as handed to `append`: a decorated key plus its rows and
/// range-tombstone markers, already in clustering order.
#[derive(Debug, Clone)]
pub struct Partition {
    pub key: DecoratedKey,
    pub deletion: DeletionTime,
    pub rows: Vec<Row>,
    pub range_tombstones: Vec<RangeTombstoneBoundary>,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.range_tombstones.is_empty()
    }
}

/// One in-partition column-index block: the clustering bounds, offset, and
/// width of a run of rows, plus whether a tombstone is open at its
/// boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnIndexBlock {
    pub first_clustering: Vec<u8>,
    pub last_clustering: Vec<u8>,
    pub offset: u64,
    pub width: u64,
    pub open_tombstone: Option<DeletionTime>,
}

/// Result of serializing one partition's rows: either inlined (small
/// partitions) or a block array (large partitions), per spec's
/// `RowIndexEntry` shape.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum ColumnIndex {
    Inline(Vec<u8>),
    Blocks(Vec<ColumnIndexBlock>),
}

/// The external row-serialization collaborator (`ColumnIndex.writeAndBuild`
/// in the original Cassandra nomenclature): streams one partition's rows
/// into the data sink and returns the resulting column index.
pub trait RowSerializer: Send + Sync {
    fn write_and_build_index(
        &self,
        partition: &Partition,
        data_sink: &mut SequentialFileSink,
    ) -> Result<ColumnIndex>;
}

/// Byte threshold above which a partition's rows are indexed in blocks
/// instead of inlined whole.
const INLINE_THRESHOLD_BYTES: u64 = 4096;

/// Byte span covered by each column-index block once a partition crosses
/// `INLINE_THRESHOLD_BYTES`.
const BLOCK_SPAN_BYTES: u64 = 4096;

/// Default row serializer: a simple length-prefixed encoding of clustering,
/// deletion time, and bincode-encoded cells, sufficient for this crate's
/// tests and for any caller that doesn't need a custom wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRowSerializer;

impl DefaultRowSerializer {
    fn encode_row(row: &Row) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&(row.clustering.len() as u16).to_be_bytes());
        out.extend_from_slice(&row.clustering);
        out.extend_from_slice(&row.deletion.marked_for_delete_at.to_be_bytes());
        out.extend_from_slice(&row.deletion.local_deletion_time.to_be_bytes());
        out.extend_from_slice(&row.ttl.unwrap_or(0).to_be_bytes());
        out.push(row.ttl.is_some() as u8);

        let cells_bytes = bincode::serialize(&row.cells).map_err(crate::Error::from)?;
        out.extend_from_slice(&(cells_bytes.len() as u32).to_be_bytes());
        out.extend_from_slice(&cells_bytes);
        Ok(out)
    }
}

impl RowSerializer for DefaultRowSerializer {
    fn write_and_build_index(
        &self,
        partition: &Partition,
        data_sink: &mut SequentialFileSink,
    ) -> Result<ColumnIndex> {
        let partition_start = data_sink.file_pointer();
        let mut inline_buffer = Vec::new();
        let mut blocks = Vec::new();
        let mut block_start_offset = 0u64;
        let mut block_start_clustering: Option<Vec<u8>> = None;
        let mut last_clustering = Vec::new();

        for row in &partition.rows {
            let encoded = Self::encode_row(row)?;
            let row_offset = data_sink.file_pointer() - partition_start;

            if block_start_clustering.is_none() {
                block_start_clustering = Some(row.clustering.clone());
                block_start_offset = row_offset;
            }
            last_clustering = row.clustering.clone();

            data_sink.write(&encoded)?;
            inline_buffer.extend_from_slice(&encoded);

            let current_offset = data_sink.file_pointer() - partition_start;
            if current_offset - block_start_offset >= BLOCK_SPAN_BYTES {
                blocks.push(ColumnIndexBlock {
                    first_clustering: block_start_clustering.take().unwrap(),
                    last_clustering: last_clustering.clone(),
                    offset: block_start_offset,
                    width: current_offset - block_start_offset,
                    open_tombstone: None,
                });
            }
        }

        if let Some(first) = block_start_clustering {
            let current_offset = data_sink.file_pointer() - partition_start;
            blocks.push(ColumnIndexBlock {
                first_clustering: first,
                last_clustering: last_clustering.clone(),
                offset: block_start_offset,
                width: current_offset - block_start_offset,
                open_tombstone: None,
            });
        }

        let total_width = data_sink.file_pointer() - partition_start;
        if total_width <= INLINE_THRESHOLD_BYTES {
            Ok(ColumnIndex::Inline(inline_buffer))
        } else {
            Ok(ColumnIndex::Blocks(blocks))
        }
    }
}

/// A partition's index entry: where its data starts, its deletion time, and
/// the column index describing its internal layout.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RowIndexEntry {
    pub data_file_offset: u64,
    pub partition_deletion: DeletionTime,
    pub column_index: ColumnIndex,
}

impl RowIndexEntry {
    pub fn new(
        data_file_offset: u64,
        partition_deletion: DeletionTime,
        column_index: ColumnIndex,
    ) -> Self {
        Self {
            data_file_offset,
            partition_deletion,
            column_index,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(crate::Error::from)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(crate::Error::from)
    }
}
