//! Storage layer: the SSTable builder subsystem and its supporting
//! transaction tracker.

pub mod sstable;
pub mod transaction;

pub use sstable::writer::{OpenReason, ReaderHandle, TableWriter, WriterMark};
pub use sstable::{ComponentKind, Descriptor};
pub use transaction::{TrackedTransaction, TransactionState, TransactionTracker};
