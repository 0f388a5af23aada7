//! In-memory storage usable as both a record sink and an input stream.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use nirec_core::{InputStream, RecordSink, SeekOrigin};

/// A growable byte buffer behind an `Arc<Mutex<_>>`.
///
/// Clones share the same bytes and the same cursor, so a test can hand
/// one clone to the recorder and inspect the result through another.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Cursor<Vec<u8>>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A buffer pre-filled with `bytes`, positioned at the start.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Cursor::new(bytes))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cursor<Vec<u8>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current contents.
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().get_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A fresh, independent input stream over the current contents.
    pub fn reader(&self) -> SharedBuffer {
        SharedBuffer::from_bytes(self.bytes())
    }
}

impl RecordSink for SharedBuffer {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut *self.lock(), bytes)
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.lock().set_position(position);
        Ok(())
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.lock().position())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let mut cursor = self.lock();
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds usize"))?;
        cursor.get_mut().resize(len, 0);
        if cursor.position() > len as u64 {
            cursor.set_position(len as u64);
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl InputStream for SharedBuffer {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut *self.lock(), buf)
    }

    fn seek64(&mut self, origin: SeekOrigin, offset: i64) -> io::Result<()> {
        let from = match origin {
            SeekOrigin::Start => SeekFrom::Start(
                u64::try_from(offset)
                    .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "negative offset"))?,
            ),
            SeekOrigin::Current => SeekFrom::Current(offset),
            SeekOrigin::End => SeekFrom::End(offset),
        };
        self.lock().seek(from).map(|_| ())
    }

    fn tell64(&mut self) -> io::Result<u64> {
        Ok(self.lock().position())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── FailingSink ─────────────────────────────────────────────────

type WritePredicate = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// A [`SharedBuffer`] sink that fails one chosen write.
///
/// The first `write_all` whose bytes satisfy the predicate fails with
/// an I/O error and writes nothing; every other call is forwarded.
pub struct FailingSink {
    inner: SharedBuffer,
    predicate: WritePredicate,
    armed: bool,
    failures: Arc<AtomicUsize>,
}

impl FailingSink {
    pub fn new(inner: SharedBuffer, predicate: impl FnMut(&[u8]) -> bool + Send + 'static) -> Self {
        Self {
            inner,
            predicate: Box::new(predicate),
            armed: true,
            failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fail the `n`th write (0-based).
    pub fn on_nth_write(inner: SharedBuffer, n: usize) -> Self {
        let mut count = 0usize;
        Self::new(inner, move |_| {
            let hit = count == n;
            count += 1;
            hit
        })
    }

    /// Shared counter of injected failures.
    pub fn failures(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.failures)
    }
}

impl RecordSink for FailingSink {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.armed && (self.predicate)(bytes) {
            self.armed = false;
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(io::Error::other("injected write failure"));
        }
        self.inner.write_all(bytes)
    }

    fn seek_to(&mut self, position: u64) -> io::Result<()> {
        self.inner.seek_to(position)
    }

    fn position(&mut self) -> io::Result<u64> {
        RecordSink::position(&mut self.inner)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.inner.truncate(len)
    }

    fn flush(&mut self) -> io::Result<()> {
        RecordSink::flush(&mut self.inner)
    }
}
