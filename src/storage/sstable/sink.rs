//! Sequential File Sink (C1): an append-only, buffered, mark/rewindable
//! byte sink with a two-phase prepare/commit/abort lifecycle, optionally
//! interposed by compression and always paired with a checksum sidecar.

use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::sstable::compression::Codec;
use crate::storage::sstable::compression_info::{CompressionInfo, CompressionInfoBuilder};
use crate::storage::sstable::crc::{ChecksumBuilder, CrcComponent};
use crate::{Error, Result};

/// State machine mirrored from the Index Writer's (spec §4.4, §9): sinks
/// only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Open,
    Preparing,
    Prepared,
    Committed,
    Aborted,
}

/// A captured rewind point. Taken at a chunk boundary: `mark()` forces a
/// chunk flush first so the on-disk offset it records is always the start
/// of a not-yet-written chunk, which makes truncation exact.
#[derive(Debug, Clone, Copy)]
pub struct SinkMark {
    logical_offset: u64,
    on_disk_offset: u64,
    chunk_count: usize,
}

/// Callback invoked with the last-flushed logical offset after each fsync.
pub type PostFlushListener = Box<dyn FnMut(u64) + Send>;

enum Checksumming {
    Plain(ChecksumBuilder),
    Compressed {
        codec: Box<dyn Codec>,
        info: CompressionInfoBuilder,
    },
}

/// An append-only byte sink backing one component file (Data or
/// PrimaryIndex).
pub struct SequentialFileSink {
    file: std::fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    sidecar_temp_path: PathBuf,
    sidecar_final_path: PathBuf,
    buffer: Vec<u8>,
    chunk_size: usize,
    logical_offset: u64,
    on_disk_offset: u64,
    checksumming: Checksumming,
    post_flush_listener: Option<PostFlushListener>,
    state: SinkState,
    poisoned: Option<String>,
}

impl SequentialFileSink {
    /// Open an uncompressed sink. `final_path`'s parent must already exist.
    /// `sidecar_path` names the plain `Crc` sidecar's final path.
    pub fn open_plain(final_path: &Path, sidecar_path: &Path, chunk_size: usize) -> Result<Self> {
        Self::open(
            final_path,
            sidecar_path,
            chunk_size,
            Checksumming::Plain(ChecksumBuilder::new()),
        )
    }

    /// Open a compressed sink, writing a `CompressionInfo` sidecar instead
    /// of a plain `Crc` at `sidecar_path`.
    pub fn open_compressed(
        final_path: &Path,
        sidecar_path: &Path,
        chunk_size: usize,
        codec: Box<dyn Codec>,
    ) -> Result<Self> {
        let info = CompressionInfoBuilder::new(codec.component_name(), chunk_size as u32);
        Self::open(
            final_path,
            sidecar_path,
            chunk_size,
            Checksumming::Compressed { codec, info },
        )
    }

    fn open(
        final_path: &Path,
        sidecar_final_path: &Path,
        chunk_size: usize,
        checksumming: Checksumming,
    ) -> Result<Self> {
        let temp_path = temp_name(final_path);
        let sidecar_final_path = sidecar_final_path.to_path_buf();
        let sidecar_temp_path = temp_name(&sidecar_final_path);

        let file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| Error::write(&temp_path, e))?;

        Ok(Self {
            file,
            temp_path,
            final_path: final_path.to_path_buf(),
            sidecar_temp_path,
            sidecar_final_path,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            logical_offset: 0,
            on_disk_offset: 0,
            checksumming,
            post_flush_listener: None,
            state: SinkState::Open,
            poisoned: None,
        })
    }

    /// Register the single observer capability the sink supports (spec §9:
    /// "listener callbacks on the sink" — one observer suffices).
    pub fn set_post_flush_listener(&mut self, listener: PostFlushListener) {
        self.post_flush_listener = Some(listener);
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Logical (uncompressed) byte offset of the next write.
    pub fn file_pointer(&self) -> u64 {
        self.logical_offset + self.buffer.len() as u64
    }

    /// Physical on-disk position; differs from `file_pointer` under
    /// compression.
    pub fn on_disk_file_pointer(&self) -> u64 {
        self.on_disk_offset
    }

    /// Append bytes. Buffers until a full chunk is accumulated, then
    /// flushes that chunk (checksummed, optionally compressed) to disk.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.check_poisoned()?;

        self.buffer.extend_from_slice(bytes);
        while self.buffer.len() >= self.chunk_size {
            let chunk: Vec<u8> = self.buffer.drain(..self.chunk_size).collect();
            if let Err(e) = self.flush_chunk(&chunk) {
                self.poisoned = Some(e.to_string());
                return Err(e);
            }
        }

        Ok(())
    }

    fn flush_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        self.logical_offset += chunk.len() as u64;

        let on_disk_bytes = match &mut self.checksumming {
            Checksumming::Plain(checksums) => {
                checksums.record_chunk(chunk, self.logical_offset);
                chunk.to_vec()
            }
            Checksumming::Compressed { codec, info } => {
                let compressed = codec.compress(chunk)?;
                info.record_chunk(self.on_disk_offset, chunk.len() as u64);
                compressed
            }
        };

        self.file
            .write_all(&on_disk_bytes)
            .map_err(|e| Error::write(&self.temp_path, e))?;
        self.on_disk_offset += on_disk_bytes.len() as u64;

        Ok(())
    }

    /// Capture a rewind point. Forces a chunk flush first so the recorded
    /// on-disk offset always lands on a chunk boundary.
    pub fn mark(&mut self) -> Result<SinkMark> {
        self.check_poisoned()?;

        if !self.buffer.is_empty() {
            let chunk = std::mem::take(&mut self.buffer);
            self.flush_chunk(&chunk)?;
        }

        let chunk_count = match &self.checksumming {
            Checksumming::Plain(checksums) => checksums.chunk_count(),
            Checksumming::Compressed { info, .. } => info.chunk_count(),
        };

        Ok(SinkMark {
            logical_offset: self.logical_offset,
            on_disk_offset: self.on_disk_offset,
            chunk_count,
        })
    }

    /// Discard bytes written after `mark`; truncates the physical file to
    /// the corresponding on-disk length.
    pub fn reset_and_truncate(&mut self, mark: SinkMark) -> Result<()> {
        self.check_poisoned()?;

        self.buffer.clear();
        self.file
            .seek(SeekFrom::Start(mark.on_disk_offset))
            .map_err(|e| Error::write(&self.temp_path, e))?;
        self.file
            .set_len(mark.on_disk_offset)
            .map_err(|e| Error::write(&self.temp_path, e))?;

        self.logical_offset = mark.logical_offset;
        self.on_disk_offset = mark.on_disk_offset;

        match &mut self.checksumming {
            Checksumming::Plain(checksums) => checksums.truncate(mark.chunk_count),
            Checksumming::Compressed { info, .. } => info.truncate(mark.chunk_count),
        }

        Ok(())
    }

    /// Force buffered data to the OS and fsync; invokes the post-flush
    /// listener with the newly-durable logical offset.
    pub fn sync(&mut self) -> Result<()> {
        self.check_poisoned()?;

        if !self.buffer.is_empty() {
            let chunk = std::mem::take(&mut self.buffer);
            self.flush_chunk(&chunk)?;
        }

        self.file
            .sync_all()
            .map_err(|e| Error::write(&self.temp_path, e))?;

        if let Some(listener) = self.post_flush_listener.as_mut() {
            listener(self.logical_offset);
        }

        Ok(())
    }

    /// Flush the tail, pad the compression frame, finalize the checksum
    /// sidecar, and fsync everything. Idempotent once `Prepared`.
    pub fn prepare_to_commit(&mut self) -> Result<()> {
        self.check_poisoned()?;
        if matches!(self.state, SinkState::Prepared | SinkState::Committed) {
            return Ok(());
        }
        if self.state != SinkState::Open {
            return Err(Error::invalid_operation(
                "prepare_to_commit called out of order",
            ));
        }
        self.state = SinkState::Preparing;

        if !self.buffer.is_empty() {
            let chunk = std::mem::take(&mut self.buffer);
            self.flush_chunk(&chunk)?;
        }

        self.file
            .sync_all()
            .map_err(|e| Error::write(&self.temp_path, e))?;

        let sidecar_bytes = match &self.checksumming {
            Checksumming::Plain(checksums) => checksums.snapshot().to_bytes()?,
            Checksumming::Compressed { info, .. } => info.snapshot().to_bytes(),
        };

        std::fs::write(&self.sidecar_temp_path, &sidecar_bytes)
            .map_err(|e| Error::write(&self.sidecar_temp_path, e))?;
        let sidecar_file = std::fs::File::open(&self.sidecar_temp_path)
            .map_err(|e| Error::write(&self.sidecar_temp_path, e))?;
        sidecar_file
            .sync_all()
            .map_err(|e| Error::write(&self.sidecar_temp_path, e))?;

        self.state = SinkState::Prepared;
        Ok(())
    }

    /// Rename from the temp name to the final name for both the data file
    /// and its sidecar. No-op if already committed.
    pub fn commit(&mut self) -> Result<()> {
        if self.state == SinkState::Committed {
            return Ok(());
        }
        if self.state != SinkState::Prepared {
            return Err(Error::invalid_operation("commit called before prepare"));
        }

        std::fs::rename(&self.temp_path, &self.final_path)
            .map_err(|e| Error::write(&self.final_path, e))?;
        std::fs::rename(&self.sidecar_temp_path, &self.sidecar_final_path)
            .map_err(|e| Error::write(&self.sidecar_final_path, e))?;

        self.state = SinkState::Committed;
        Ok(())
    }

    /// Close and unlink the temp file(s). Valid from any pre-committed
    /// state.
    pub fn abort(&mut self) -> Result<()> {
        if self.state == SinkState::Committed {
            return Err(Error::invalid_operation("cannot abort a committed sink"));
        }

        let _ = std::fs::remove_file(&self.temp_path);
        let _ = std::fs::remove_file(&self.sidecar_temp_path);
        self.state = SinkState::Aborted;
        Ok(())
    }

    fn check_poisoned(&self) -> Result<()> {
        if let Some(msg) = &self.poisoned {
            return Err(Error::storage(format!("sink is poisoned: {msg}")));
        }
        Ok(())
    }
}

fn temp_name(final_path: &Path) -> PathBuf {
    let mut os = final_path.as_os_str().to_owned();
    os.push("-tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_mark_truncate_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks-tbl-nb-1-Data.db");
        let crc_path = dir.path().join("ks-tbl-nb-1-CRC.db");
        let mut sink = SequentialFileSink::open_plain(&path, &crc_path, 8).unwrap();

        sink.write(b"abcdefgh").unwrap();
        let mark = sink.mark().unwrap();
        sink.write(b"ijklmnop").unwrap();
        assert_eq!(sink.file_pointer(), 16);

        sink.reset_and_truncate(mark).unwrap();
        assert_eq!(sink.file_pointer(), 8);

        sink.write(b"qrstuvwx").unwrap();
        sink.prepare_to_commit().unwrap();
        sink.commit().unwrap();

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents, b"abcdefghqrstuvwx");
    }

    #[test]
    fn test_abort_removes_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks-tbl-nb-1-Data.db");
        let crc_path = dir.path().join("ks-tbl-nb-1-CRC.db");
        let mut sink = SequentialFileSink::open_plain(&path, &crc_path, 64).unwrap();
        sink.write(b"hello").unwrap();
        sink.abort().unwrap();

        assert!(!path.exists());
        assert!(!temp_name(&path).exists());
    }

    #[test]
    fn test_commit_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks-tbl-nb-1-Data.db");
        let crc_path = dir.path().join("ks-tbl-nb-1-CRC.db");
        let mut sink = SequentialFileSink::open_plain(&path, &crc_path, 64).unwrap();
        sink.write(b"hello").unwrap();
        sink.prepare_to_commit().unwrap();
        sink.commit().unwrap();
        sink.commit().unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_post_flush_listener_invoked_on_sync() {
        use std::sync::{Arc, Mutex};

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ks-tbl-nb-1-Data.db");
        let crc_path = dir.path().join("ks-tbl-nb-1-CRC.db");
        let mut sink = SequentialFileSink::open_plain(&path, &crc_path, 64).unwrap();

        let observed = Arc::new(Mutex::new(0u64));
        let observed_clone = observed.clone();
        sink.set_post_flush_listener(Box::new(move |offset| {
            *observed_clone.lock().unwrap() = offset;
        }));

        sink.write(b"hello world").unwrap();
        sink.sync().unwrap();

        assert_eq!(*observed.lock().unwrap(), 11);
    }
}
