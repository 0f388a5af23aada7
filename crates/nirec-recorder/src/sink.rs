//! Output storage: the file-backed [`FileSink`], the position-tracking
//! [`RecordFile`] the writer appends through, and [`Transaction`], the
//! checkpoint that discards a partially written record group.

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use nirec_core::RecordSink;
use tracing::{error, warn};

// ── FileSink ───────────────────────────────────────────────────────

/// A [`RecordSink`] over a buffered local file.
pub struct FileSink {
    file: BufWriter<File>,
}

impl FileSink {
    /// Create `path`, truncating any existing file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            file: BufWriter::new(file),
        })
    }
}

impl RecordSink for FileSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(position)).map(|_| ())
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().set_len(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.get_ref().sync_data()
    }
}

// ── RecordFile ─────────────────────────────────────────────────────

/// Append cursor over a [`RecordSink`].
///
/// Tracks the logical write position itself. A failed write or seek
/// leaves the logical position unchanged and re-seeks the sink before
/// the next write, so a partial record is overwritten, never appended
/// to.
pub struct RecordFile {
    sink: Box<dyn RecordSink>,
    position: u64,
    needs_seek: bool,
}

impl RecordFile {
    /// Wrap `sink`, starting at its current position.
    pub fn new(mut sink: Box<dyn RecordSink>) -> io::Result<Self> {
        let position = sink.position()?;
        Ok(Self {
            sink,
            position,
            needs_seek: false,
        })
    }

    /// Logical write position.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn sync_position(&mut self) -> io::Result<()> {
        if self.needs_seek {
            self.sink.seek_to(self.position)?;
            self.needs_seek = false;
        }
        Ok(())
    }

    /// Append `bytes`, returning the offset they were written at.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        self.sync_position()?;
        let at = self.position;
        if let Err(e) = self.sink.write_all(bytes) {
            self.needs_seek = true;
            return Err(e);
        }
        self.position += bytes.len() as u64;
        Ok(at)
    }

    /// Overwrite already-written bytes at `at`, then return to the end.
    pub fn rewrite_at(&mut self, at: u64, bytes: &[u8]) -> io::Result<()> {
        if at.saturating_add(bytes.len() as u64) > self.position {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "rewrite of {} bytes at {at} extends past write position {}",
                    bytes.len(),
                    self.position
                ),
            ));
        }
        self.needs_seek = true;
        self.sink.seek_to(at)?;
        self.sink.write_all(bytes)?;
        self.sync_position()
    }

    /// Move the logical write position to `position`.
    ///
    /// The logical position moves even if the sink seek fails; the seek
    /// is retried before the next write.
    pub fn seek(&mut self, position: u64) -> io::Result<()> {
        self.position = position;
        self.needs_seek = true;
        self.sync_position()
    }

    /// Cut the sink at the logical write position.
    pub fn truncate_here(&mut self) -> io::Result<()> {
        self.sink.truncate(self.position)
    }

    /// Flush buffered bytes to storage.
    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

// ── Transaction ────────────────────────────────────────────────────

/// A group of records written all-or-nothing.
///
/// The transaction remembers the write position when it began (or was
/// last [`reuse`](Self::reuse)d). [`commit`](Self::commit) keeps what
/// was written; dropping the transaction uncommitted, or calling
/// [`rollback`](Self::rollback), moves the write position back to the
/// checkpoint so the next record overwrites the discarded group. The
/// bytes themselves are cut by the final truncate at close.
///
/// In-place rewrites made through [`rewrite_at`](Self::rewrite_at) are
/// not undone.
pub struct Transaction<'a> {
    file: &'a mut RecordFile,
    checkpoint: u64,
    done: bool,
}

impl<'a> Transaction<'a> {
    /// Start a group at the current write position.
    pub fn begin(file: &'a mut RecordFile) -> Self {
        let checkpoint = file.position();
        Self {
            file,
            checkpoint,
            done: false,
        }
    }

    /// Append one record, returning its offset.
    pub fn write(&mut self, bytes: &[u8]) -> io::Result<u64> {
        self.file.write(bytes)
    }

    /// Overwrite an earlier record in place.
    pub fn rewrite_at(&mut self, at: u64, bytes: &[u8]) -> io::Result<()> {
        self.file.rewrite_at(at, bytes)
    }

    /// Offset a rollback returns to.
    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    /// Keep everything written so far and start a new group here.
    pub fn reuse(&mut self) {
        self.checkpoint = self.file.position();
    }

    /// Discard everything written since the checkpoint. Idempotent.
    pub fn rollback(&mut self) -> io::Result<()> {
        self.file.seek(self.checkpoint)
    }

    /// Keep everything written.
    pub fn commit(mut self) {
        self.done = true;
    }

    /// Discard everything written since the checkpoint and end the group.
    pub fn abort(mut self) -> io::Result<()> {
        self.done = true;
        self.file.seek(self.checkpoint)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if self.file.position() != self.checkpoint {
            warn!(
                checkpoint = self.checkpoint,
                position = self.file.position(),
                "discarding uncommitted record group"
            );
        }
        if let Err(e) = self.file.seek(self.checkpoint) {
            error!(checkpoint = self.checkpoint, error = %e, "rollback seek failed");
        }
    }
}
