//! [`InputStream`] implementations and the `Read` adapter the player
//! parses through.

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;

use nirec_core::{InputStream, SeekOrigin};

fn seek_from(origin: SeekOrigin, offset: i64) -> io::Result<SeekFrom> {
    Ok(match origin {
        SeekOrigin::Start => SeekFrom::Start(u64::try_from(offset).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("negative seek offset {offset}"),
            )
        })?),
        SeekOrigin::Current => SeekFrom::Current(offset),
        SeekOrigin::End => SeekFrom::End(offset),
    })
}

// ── FileInputStream ────────────────────────────────────────────────

/// A local file, opened on [`open`](InputStream::open).
pub struct FileInputStream {
    path: PathBuf,
    file: Option<BufReader<File>>,
}

impl FileInputStream {
    /// An input stream over `path`. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut BufReader<File>> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "input stream is not open")
        })
    }
}

impl InputStream for FileInputStream {
    fn open(&mut self) -> io::Result<()> {
        self.file = Some(BufReader::new(File::open(&self.path)?));
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }

    fn seek64(&mut self, origin: SeekOrigin, offset: i64) -> io::Result<()> {
        let from = seek_from(origin, offset)?;
        self.file()?.seek(from).map(|_| ())
    }

    fn tell64(&mut self) -> io::Result<u64> {
        self.file()?.stream_position()
    }

    fn close(&mut self) -> io::Result<()> {
        self.file = None;
        Ok(())
    }
}

// ── ReaderInputStream ──────────────────────────────────────────────

/// Any seekable reader, such as a `Cursor<Vec<u8>>`.
pub struct ReaderInputStream<R> {
    inner: R,
}

impl<R: Read + Seek + Send> ReaderInputStream<R> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Unwrap the reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek + Send> InputStream for ReaderInputStream<R> {
    fn open(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn seek64(&mut self, origin: SeekOrigin, offset: i64) -> io::Result<()> {
        let from = seek_from(origin, offset)?;
        self.inner.seek(from).map(|_| ())
    }

    fn tell64(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── StreamReader ───────────────────────────────────────────────────

/// `io::Read` over a borrowed [`InputStream`].
pub(crate) struct StreamReader<'a> {
    inner: &'a mut dyn InputStream,
}

impl<'a> StreamReader<'a> {
    pub fn new(inner: &'a mut dyn InputStream) -> Self {
        Self { inner }
    }
}

impl Read for StreamReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
