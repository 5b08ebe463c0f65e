//! SSTable Builder Subsystem
//!
//! Builds immutable, multi-file sorted string tables from a sorted stream
//! of partitions, publishing a consistent set of on-disk components via a
//! two-phase commit.

pub mod config;
pub mod error;
pub mod storage;
pub mod types;

// Re-export main types for convenience
pub use crate::{
    config::Config,
    error::{Error, Result},
    storage::{
        sstable::{
            row::{DefaultRowSerializer, Partition, Row, RowSerializer},
            writer::{OpenReason, ReaderHandle, TableWriter, WriterMark},
            ComponentKind, Descriptor,
        },
        TransactionTracker,
    },
    types::Value,
};
