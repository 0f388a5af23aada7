//! Hand-assembled containers and frame payloads.
//!
//! [`ContainerBuilder`] writes records directly with the assembler, so
//! tests can produce containers the recorder itself never writes
//! (older node-added shapes, missing seek tables, truncated tails).

use nirec_core::{NodeId, Version};
use nirec_format::{ContainerHeader, FormatError, RecordAssembler, CONTAINER_HEADER_SIZE};

/// Builds a container record by record.
pub struct ContainerBuilder {
    header: ContainerHeader,
    bytes: Vec<u8>,
    assembler: RecordAssembler,
}

impl ContainerBuilder {
    /// Start a container of the given version.
    pub fn new(version: Version) -> Self {
        Self {
            header: ContainerHeader {
                version,
                max_timestamp: 0,
                max_node_id: 0,
            },
            bytes: vec![0; CONTAINER_HEADER_SIZE],
            assembler: RecordAssembler::new(1 << 16),
        }
    }

    /// Append the record built by `f` and return its offset.
    ///
    /// Panics if the assembler rejects the record; fixtures are
    /// expected to be well formed.
    pub fn push(
        &mut self,
        f: impl FnOnce(&mut RecordAssembler) -> Result<&[u8], FormatError>,
    ) -> u64 {
        let position = self.bytes.len() as u64;
        let record = f(&mut self.assembler).expect("fixture record must encode");
        self.bytes.extend_from_slice(record);
        position
    }

    /// Offset the next record will be written at.
    pub fn position(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Record `node` as the highest node id and `ts` as the largest
    /// timestamp if they exceed the current values.
    pub fn note(&mut self, node: NodeId, ts: u64) {
        self.header.max_node_id = self.header.max_node_id.max(node.0);
        self.header.max_timestamp = self.header.max_timestamp.max(ts);
    }

    /// Patch the header and return the container bytes.
    pub fn finish(mut self) -> Vec<u8> {
        self.bytes[..CONTAINER_HEADER_SIZE].copy_from_slice(&self.header.encode());
        self.bytes
    }
}

/// A `width × height` frame of little-endian `u16` pixels all set to
/// `value`.
pub fn depth_frame(width: usize, height: usize, value: u16) -> Vec<u8> {
    value
        .to_le_bytes()
        .iter()
        .copied()
        .cycle()
        .take(width * height * 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nirec_format::ContainerReader;

    #[test]
    fn builder_produces_readable_container() {
        let mut builder = ContainerBuilder::new(Version::CURRENT);
        let pos = builder.push(|asm| asm.node_state_ready(NodeId(1)));
        builder.push(|asm| asm.end());
        builder.note(NodeId(1), 0);
        let bytes = builder.finish();
        assert_eq!(pos, CONTAINER_HEADER_SIZE as u64);

        let reader = ContainerReader::open(&bytes[..]).unwrap();
        assert_eq!(reader.header().max_node_id, 1);
        assert_eq!(reader.read_all().unwrap().len(), 2);
    }

    #[test]
    fn depth_frame_layout() {
        assert_eq!(depth_frame(2, 2, 0x0102), vec![2, 1, 2, 1, 2, 1, 2, 1]);
    }
}
