//! Sequential container reader.
//!
//! [`ContainerReader`] walks a container front to back from any `Read`
//! source, yielding each record with the offset it starts at. The
//! player has its own seekable parser; this reader serves tools and
//! tests that only need a linear pass.

use std::io::Read;

use tracing::trace;

use crate::codec::{decode_container_header, decode_record};
use crate::error::FormatError;
use crate::types::{ContainerHeader, Record, RecordHeader, RecordType};
use crate::CONTAINER_HEADER_SIZE;

/// One record and the file offset it was read from.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordEntry {
    /// Offset of the record's first byte.
    pub position: u64,
    /// Fixed header.
    pub header: RecordHeader,
    /// Decoded body.
    pub record: Record,
}

/// Reads a container from a byte stream.
///
/// Generic over `R: Read` so tests can use `&[u8]` and production
/// code can use `BufReader<File>`.
pub struct ContainerReader<R: Read> {
    reader: R,
    header: ContainerHeader,
    position: u64,
    finished: bool,
}

impl<R: Read> ContainerReader<R> {
    /// Open a container, reading and validating the header.
    pub fn open(mut reader: R) -> Result<Self, FormatError> {
        let header = decode_container_header(&mut reader)?;
        Ok(Self {
            reader,
            header,
            position: CONTAINER_HEADER_SIZE as u64,
            finished: false,
        })
    }

    /// The container header.
    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    /// Offset of the next record.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record, or `None` after the end record or at EOF.
    pub fn next_record(&mut self) -> Result<Option<RecordEntry>, FormatError> {
        if self.finished {
            return Ok(None);
        }
        let Some((header, record)) = decode_record(&mut self.reader)? else {
            self.finished = true;
            return Ok(None);
        };
        let position = self.position;
        self.position += header.record_size();
        trace!(position, kind = ?header.record_type, node = %header.node_id, "record");
        if header.record_type == RecordType::End {
            self.finished = true;
        }
        Ok(Some(RecordEntry {
            position,
            header,
            record,
        }))
    }

    /// Convert into a record iterator.
    pub fn records(self) -> RecordIter<R> {
        RecordIter { inner: self }
    }

    /// Read every remaining record.
    pub fn read_all(self) -> Result<Vec<RecordEntry>, FormatError> {
        self.records().collect()
    }
}

/// Iterator adapter over container records.
pub struct RecordIter<R: Read> {
    inner: ContainerReader<R>,
}

impl<R: Read> Iterator for RecordIter<R> {
    type Item = Result<RecordEntry, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next_record() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.inner.finished = true;
                Some(Err(e))
            }
        }
    }
}
