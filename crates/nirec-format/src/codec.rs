//! Encode/decode of single records.
//!
//! [`RecordBuffer`] builds one record in a buffer whose capacity is
//! fixed at construction. Every emit checks capacity before touching
//! the buffer, so a failed emit leaves the record exactly as it was.
//! Decoding goes the other way: [`decode_record`] reads one record
//! from any `Read` source and [`Record::decode`] interprets its fields.

use std::io::{self, Read};

use nirec_core::{CodecId, NodeId, NodeType, PropertyValue};

use crate::error::FormatError;
use crate::types::{
    ContainerHeader, NodeAdded, NodeAddedVersion, Record, RecordHeader, RecordType,
    SeekTableEntry,
};
use crate::{CONTAINER_HEADER_SIZE, RECORD_HEADER_SIZE, SEEK_TABLE_ENTRY_SIZE, STRING_CAPACITY};

// ── Field values ────────────────────────────────────────────────

/// A fixed-size scalar that can be emitted as a record field.
pub trait FieldValue: Copy {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the little-endian encoding to `out`.
    fn write_le(self, out: &mut Vec<u8>);
}

impl FieldValue for u32 {
    const SIZE: usize = 4;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl FieldValue for u64 {
    const SIZE: usize = 8;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl FieldValue for f64 {
    const SIZE: usize = 8;

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Longest prefix of `text` that fits in a string slot with its NUL
/// terminator, cut on a character boundary.
pub fn truncate_to_slot(text: &str) -> &str {
    let mut end = text.len().min(STRING_CAPACITY - 1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ── Record buffer ───────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Idle,
    Fields,
    Payload,
}

/// Reusable single-record encode buffer.
///
/// Usage is `begin`, any number of `emit_field`/`emit_string`, any
/// number of `emit_payload`, then `finish`. Owned by one thread; the
/// `&mut self` receivers make sharing impossible anyway.
pub struct RecordBuffer {
    buf: Vec<u8>,
    capacity: usize,
    fields_end: usize,
    stage: Stage,
}

impl RecordBuffer {
    /// Create a buffer that can hold records of up to `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            fields_end: 0,
            stage: Stage::Idle,
        }
    }

    /// Maximum record size.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of the record built so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no record has been started since the buffer was created.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes still free.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Current `fields_size` of the record being built.
    pub fn fields_size(&self) -> usize {
        self.fields_end
    }

    /// Current `payload_size` of the record being built.
    pub fn payload_size(&self) -> usize {
        self.buf.len() - self.fields_end
    }

    fn ensure(&self, needed: usize) -> Result<(), FormatError> {
        let available = self.remaining();
        if needed > available {
            return Err(FormatError::Capacity { needed, available });
        }
        Ok(())
    }

    fn expect_fields(&self) -> Result<(), FormatError> {
        match self.stage {
            Stage::Fields => Ok(()),
            Stage::Idle => Err(FormatError::Sequence("field emitted before begin")),
            Stage::Payload => Err(FormatError::Sequence("field emitted after payload")),
        }
    }

    fn patch_u32(&mut self, at: usize, value: u32) {
        self.buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn fields_written(&mut self) {
        self.fields_end = self.buf.len();
        self.patch_u32(RecordHeader::FIELDS_SIZE_OFFSET, self.fields_end as u32);
    }

    /// Start a new record, discarding whatever the buffer held.
    pub fn begin(
        &mut self,
        record_type: RecordType,
        node_id: NodeId,
        undo_position: u64,
    ) -> Result<(), FormatError> {
        if self.capacity < RECORD_HEADER_SIZE {
            return Err(FormatError::Capacity {
                needed: RECORD_HEADER_SIZE,
                available: self.capacity,
            });
        }
        let header = RecordHeader {
            record_type,
            node_id,
            fields_size: RECORD_HEADER_SIZE as u32,
            payload_size: 0,
            undo_position,
        };
        self.buf.clear();
        self.buf.extend_from_slice(&header.encode());
        self.fields_end = RECORD_HEADER_SIZE;
        self.stage = Stage::Fields;
        Ok(())
    }

    /// Append a fixed-size field.
    pub fn emit_field<T: FieldValue>(&mut self, value: T) -> Result<(), FormatError> {
        self.expect_fields()?;
        self.ensure(T::SIZE)?;
        value.write_le(&mut self.buf);
        self.fields_written();
        Ok(())
    }

    /// Append a string field: `u32` size plus the fixed slot.
    ///
    /// Text longer than the slot allows is truncated; the stored size
    /// includes the NUL terminator.
    pub fn emit_string(&mut self, text: &str) -> Result<(), FormatError> {
        self.expect_fields()?;
        self.ensure(4 + STRING_CAPACITY)?;
        let text = truncate_to_slot(text);
        let data_size = text.len() + 1;
        self.buf.extend_from_slice(&(data_size as u32).to_le_bytes());
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.resize(self.buf.len() + STRING_CAPACITY - text.len(), 0);
        self.fields_written();
        Ok(())
    }

    /// Append payload bytes. May be called repeatedly; no fields may
    /// follow.
    pub fn emit_payload(&mut self, bytes: &[u8]) -> Result<(), FormatError> {
        if self.stage == Stage::Idle {
            return Err(FormatError::Sequence("payload emitted before begin"));
        }
        self.ensure(bytes.len())?;
        let payload_size = u32::try_from(self.payload_size() + bytes.len()).map_err(|_| {
            FormatError::Capacity {
                needed: bytes.len(),
                available: u32::MAX as usize - self.payload_size(),
            }
        })?;
        self.buf.extend_from_slice(bytes);
        self.patch_u32(RecordHeader::PAYLOAD_SIZE_OFFSET, payload_size);
        self.stage = Stage::Payload;
        Ok(())
    }

    /// Complete the record and return its bytes.
    pub fn finish(&mut self) -> Result<&[u8], FormatError> {
        if self.stage == Stage::Idle {
            return Err(FormatError::Sequence("finish called before begin"));
        }
        self.stage = Stage::Idle;
        Ok(&self.buf)
    }
}

// ── Field decoding ──────────────────────────────────────────────

/// Sequential reader over a record's field bytes.
pub struct FieldCursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FieldCursor<'a> {
    /// Start reading at the first field.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FormatError> {
        if n > self.remaining() {
            return Err(FormatError::malformed(format!(
                "fields end at byte {}, need {n} more",
                self.data.len()
            )));
        }
        let out = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    /// Read a `u32` field.
    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    /// Read a `u64` field.
    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    /// Read an `f64` field.
    pub fn read_f64(&mut self) -> Result<f64, FormatError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(b))
    }

    /// Read a string field. Invalid UTF-8 is replaced rather than
    /// rejected, since foreign writers do not guarantee it.
    pub fn read_string(&mut self) -> Result<String, FormatError> {
        let data_size = self.read_u32()? as usize;
        let slot = self.take(STRING_CAPACITY)?;
        if data_size > STRING_CAPACITY {
            return Err(FormatError::malformed(format!(
                "string size {data_size} exceeds slot of {STRING_CAPACITY}"
            )));
        }
        Ok(nul_terminated(&slot[..data_size]))
    }
}

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn eight_bytes(payload: &[u8], what: &str) -> Result<[u8; 8], FormatError> {
    payload
        .try_into()
        .map_err(|_| FormatError::malformed(format!("{what} payload is {} bytes", payload.len())))
}

impl Record {
    /// Interpret a record's fields and payload according to its header.
    ///
    /// `fields` are the bytes after the fixed header; trailing field
    /// bytes a newer writer may have added are ignored.
    pub fn decode(
        header: &RecordHeader,
        fields: &[u8],
        payload: Vec<u8>,
    ) -> Result<Record, FormatError> {
        let mut cur = FieldCursor::new(fields);
        let record = match header.record_type {
            RecordType::NodeAddedV1004 | RecordType::NodeAddedV1005 | RecordType::NodeAdded => {
                let name = cur.read_string()?;
                let node_type = NodeType::from_raw(cur.read_u32()?);
                let codec = CodecId(cur.read_u32()?);
                let version = if header.record_type == RecordType::NodeAddedV1004 {
                    NodeAddedVersion::V1004 {
                        name,
                        node_type,
                        codec,
                    }
                } else {
                    let frame_count = cur.read_u32()?;
                    let min_timestamp = cur.read_u64()?;
                    let max_timestamp = cur.read_u64()?;
                    if header.record_type == RecordType::NodeAddedV1005 {
                        NodeAddedVersion::V1005 {
                            name,
                            node_type,
                            codec,
                            frame_count,
                            min_timestamp,
                            max_timestamp,
                        }
                    } else {
                        NodeAddedVersion::Current(NodeAdded {
                            name,
                            node_type,
                            codec,
                            frame_count,
                            min_timestamp,
                            max_timestamp,
                            seek_table_position: cur.read_u64()?,
                        })
                    }
                };
                Record::NodeAdded(version)
            }
            RecordType::IntProperty
            | RecordType::RealProperty
            | RecordType::StringProperty
            | RecordType::GeneralProperty => {
                let name = cur.read_string()?;
                let data_size = cur.read_u32()? as usize;
                if data_size != payload.len() {
                    return Err(FormatError::malformed(format!(
                        "property {name:?} declares {data_size} bytes, payload has {}",
                        payload.len()
                    )));
                }
                let value = match header.record_type {
                    RecordType::IntProperty => {
                        PropertyValue::Int(u64::from_le_bytes(eight_bytes(&payload, "int")?))
                    }
                    RecordType::RealProperty => {
                        PropertyValue::Real(f64::from_le_bytes(eight_bytes(&payload, "real")?))
                    }
                    RecordType::StringProperty => PropertyValue::String(nul_terminated(&payload)),
                    _ => PropertyValue::General(payload),
                };
                Record::Property { name, value }
            }
            RecordType::NodeRemoved => Record::NodeRemoved,
            RecordType::NodeStateReady => Record::NodeStateReady,
            RecordType::End => Record::End,
            RecordType::NodeDataBegin => Record::NodeDataBegin {
                frame_count: cur.read_u32()?,
                max_timestamp: cur.read_u64()?,
            },
            RecordType::NewData => Record::NewData {
                timestamp: cur.read_u64()?,
                frame_id: cur.read_u32()?,
                data: payload,
            },
            RecordType::SeekTable => {
                if payload.len() % SEEK_TABLE_ENTRY_SIZE != 0 {
                    return Err(FormatError::malformed(format!(
                        "seek table payload of {} bytes is not a whole number of entries",
                        payload.len()
                    )));
                }
                Record::SeekTable(
                    payload
                        .chunks_exact(SEEK_TABLE_ENTRY_SIZE)
                        .map(SeekTableEntry::decode)
                        .collect(),
                )
            }
        };
        Ok(record)
    }
}

// ── Stream decoding ─────────────────────────────────────────────

fn truncated(what: &str, e: io::Error) -> FormatError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FormatError::Truncated {
            detail: what.to_string(),
        }
    } else {
        FormatError::Io(e)
    }
}

/// Read and validate the container header.
pub fn decode_container_header(r: &mut dyn Read) -> Result<ContainerHeader, FormatError> {
    let mut bytes = [0u8; CONTAINER_HEADER_SIZE];
    r.read_exact(&mut bytes)
        .map_err(|e| truncated("container header", e))?;
    ContainerHeader::decode(&bytes)
}

/// Read the next record header.
///
/// Returns `Ok(None)` on clean EOF (no bytes available) and
/// [`FormatError::Truncated`] when the input ends partway through.
pub fn read_record_header(r: &mut dyn Read) -> Result<Option<RecordHeader>, FormatError> {
    let mut bytes = [0u8; RECORD_HEADER_SIZE];
    let mut filled = 0;
    while filled < RECORD_HEADER_SIZE {
        match r.read(&mut bytes[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(FormatError::Truncated {
                    detail: format!("record header: got {filled} of {RECORD_HEADER_SIZE} bytes"),
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FormatError::Io(e)),
        }
    }
    RecordHeader::decode(&bytes).map(Some)
}

/// Read the fields and payload that follow `header` and decode them.
pub fn read_record_body(r: &mut dyn Read, header: &RecordHeader) -> Result<Record, FormatError> {
    let mut fields = vec![0u8; header.field_bytes()];
    r.read_exact(&mut fields)
        .map_err(|e| truncated("record fields", e))?;

    let expected = header.payload_size as usize;
    let mut payload = Vec::new();
    r.take(u64::from(header.payload_size))
        .read_to_end(&mut payload)?;
    if payload.len() != expected {
        return Err(FormatError::Truncated {
            detail: format!(
                "record payload: got {} of {expected} bytes",
                payload.len()
            ),
        });
    }
    Record::decode(header, &fields, payload)
}

/// Read one complete record.
///
/// Returns `Ok(None)` on clean EOF, `Ok(Some(..))` on success, or an
/// error on truncated or corrupt data.
pub fn decode_record(r: &mut dyn Read) -> Result<Option<(RecordHeader, Record)>, FormatError> {
    let Some(header) = read_record_header(r)? else {
        return Ok(None);
    };
    let record = read_record_body(r, &header)?;
    Ok(Some((header, record)))
}
