//! End-to-end recorder tests: record into memory or a temp file, then
//! walk the container with the sequential reader.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use nirec_core::{
    CodecError, CodecFactory, CodecId, FrameCodec, NodeId, NodeType, PropertyId, PropertyValue,
};
use nirec_format::{
    ContainerReader, NodeAddedVersion, Record, RecordEntry, RecordType, SeekTableEntry,
    CONTAINER_HEADER_SIZE, NEW_DATA_FIELDS_SIZE, PROPERTY_FIELDS_SIZE,
};
use nirec_recorder::{FileRecorder, RecorderConfig, RecorderError, RecorderState};
use nirec_test_utils::{depth_frame, FailingSink, MockStream, SharedBuffer};

fn small_config() -> RecorderConfig {
    RecorderConfig {
        max_width: 64,
        max_height: 48,
        max_bytes_per_pixel: 2,
        ..RecorderConfig::default()
    }
}

fn open_in_memory() -> (FileRecorder, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let mut recorder = FileRecorder::new(small_config()).unwrap();
    recorder
        .initialize_with_sink(Box::new(buffer.clone()))
        .unwrap();
    (recorder, buffer)
}

fn read_entries(bytes: &[u8]) -> Vec<RecordEntry> {
    ContainerReader::open(bytes).unwrap().read_all().unwrap()
}

fn kinds(entries: &[RecordEntry]) -> Vec<(RecordType, u32)> {
    entries
        .iter()
        .map(|e| (e.header.record_type, e.header.node_id.0))
        .collect()
}

fn frames_of(entries: &[RecordEntry], node: NodeId) -> Vec<(u64, u32, u64)> {
    entries
        .iter()
        .filter(|e| e.header.node_id == node)
        .filter_map(|e| match &e.record {
            Record::NewData {
                timestamp,
                frame_id,
                ..
            } => Some((*timestamp, *frame_id, e.position)),
            _ => None,
        })
        .collect()
}

fn seek_table_of(entries: &[RecordEntry], node: NodeId) -> (u64, Vec<SeekTableEntry>) {
    entries
        .iter()
        .find_map(|e| match &e.record {
            Record::SeekTable(table) if e.header.node_id == node => {
                Some((e.position, table.clone()))
            }
            _ => None,
        })
        .expect("seek table present")
}

fn node_added_of(entries: &[RecordEntry], node: NodeId) -> nirec_format::NodeAdded {
    entries
        .iter()
        .find_map(|e| match &e.record {
            Record::NodeAdded(added) if e.header.node_id == node => Some(added.clone().upgrade()),
            _ => None,
        })
        .expect("node-added present")
}

#[test]
fn end_to_end_record_order() {
    let (mut recorder, buffer) = open_in_memory();
    let stream = MockStream::depth().with_property(PropertyId::MAX_VALUE, PropertyValue::Int(10_000));
    let depth = recorder.attach(&stream, false).unwrap();
    assert_eq!(depth.node(), NodeId(2));
    recorder.start().unwrap();

    recorder.record(depth, 1_000, &depth_frame(2, 2, 7)).unwrap();
    recorder.record(depth, 1_033, &depth_frame(2, 2, 8)).unwrap();
    recorder
        .record_property_value(depth, PropertyId::MAX_VALUE, PropertyValue::Int(9_000))
        .unwrap();
    recorder.record(depth, 1_066, &depth_frame(2, 2, 9)).unwrap();
    recorder.close().unwrap();
    assert_eq!(recorder.state(), RecorderState::Closed);

    let bytes = buffer.bytes();
    let reader = ContainerReader::open(&bytes[..]).unwrap();
    assert_eq!(reader.header().max_node_id, 2);
    assert_eq!(reader.header().max_timestamp, 1_066);
    let entries = reader.read_all().unwrap();

    use RecordType::*;
    assert_eq!(
        kinds(&entries),
        vec![
            (NodeAdded, 1),
            (NodeAdded, 2),
            (IntProperty, 2),
            (NodeStateReady, 1),
            (NodeStateReady, 2),
            (NodeDataBegin, 2),
            (NewData, 2),
            (NewData, 2),
            (IntProperty, 2),
            (NewData, 2),
            (NodeRemoved, 2),
            (SeekTable, 2),
            (NodeRemoved, 1),
            (End, 0),
        ]
    );
    assert_eq!(entries[0].position, CONTAINER_HEADER_SIZE as u64);

    match &entries[6].record {
        Record::NewData {
            frame_id, data, ..
        } => {
            assert_eq!(*frame_id, 1);
            assert_eq!(data, &depth_frame(2, 2, 7));
        }
        other => panic!("expected new-data, got {other:?}"),
    }

    let device = node_added_of(&entries, NodeId::DEVICE);
    assert_eq!(device.name, "Device");
    assert_eq!(device.node_type, NodeType::Device);

    let added = node_added_of(&entries, depth.node());
    assert_eq!(added.name, "Depth");
    assert_eq!(added.codec, CodecId::UNCOMPRESSED);
    assert_eq!(added.frame_count, 3);
    assert_eq!((added.min_timestamp, added.max_timestamp), (1_000, 1_066));
}

#[test]
fn file_ends_at_end_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.oni");
    let mut recorder = FileRecorder::new(small_config()).unwrap();
    recorder.initialize(&path).unwrap();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();
    for i in 0..10u64 {
        recorder.record(depth, i * 33, &depth_frame(4, 4, i as u16)).unwrap();
    }
    recorder.detach(depth).unwrap();
    recorder.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let entries = read_entries(&bytes);
    let last = entries.last().unwrap();
    assert_eq!(last.header.record_type, RecordType::End);
    assert_eq!(last.position + last.header.record_size(), bytes.len() as u64);
    assert_eq!(frames_of(&entries, depth.node()).len(), 10);
}

#[test]
fn undo_chains_point_to_previous_record_of_same_chain() {
    let (mut recorder, buffer) = open_in_memory();
    let stream = MockStream::depth()
        .with_property(PropertyId::GAIN, PropertyValue::Int(1))
        .with_property(PropertyId::MIRRORING, PropertyValue::Int(0));
    let depth = recorder.attach(&stream, false).unwrap();
    recorder.start().unwrap();
    for i in 0..6u64 {
        recorder.record(depth, i * 10, &[1, 2, 3, 4]).unwrap();
        if i % 2 == 0 {
            recorder
                .record_property_value(depth, PropertyId::GAIN, PropertyValue::Int(i + 2))
                .unwrap();
        }
    }
    recorder
        .record_property_value(
            recorder.device(),
            PropertyId::SERIAL_NUMBER,
            PropertyValue::String("A1".into()),
        )
        .unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    let by_position: HashMap<u64, &RecordEntry> =
        entries.iter().map(|e| (e.position, e)).collect();

    let mut last_in_chain: HashMap<(u32, String), u64> = HashMap::new();
    for entry in &entries {
        let chain = match &entry.record {
            Record::Property { name, .. } => Some(name.clone()),
            Record::NewData { .. } => Some(String::new()),
            _ => None,
        };
        let Some(chain) = chain else { continue };
        let key = (entry.header.node_id.0, chain);
        let expected = last_in_chain.get(&key).copied().unwrap_or(0);
        assert_eq!(entry.header.undo_position, expected, "record at {}", entry.position);
        if expected != 0 {
            let previous = by_position[&expected];
            assert!(previous.position < entry.position);
            assert_eq!(previous.header.node_id, entry.header.node_id);
        }
        last_in_chain.insert(key, entry.position);
    }

    let gain_records = entries
        .iter()
        .filter(|e| matches!(&e.record, Record::Property { name, .. } if name == "Gain"))
        .count();
    assert_eq!(gain_records, 4);
}

#[test]
fn node_removed_points_at_node_added() {
    let (mut recorder, buffer) = open_in_memory();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    for node in [NodeId::DEVICE, depth.node()] {
        let added = entries
            .iter()
            .find(|e| e.header.node_id == node && e.header.record_type == RecordType::NodeAdded)
            .unwrap();
        let removed = entries
            .iter()
            .find(|e| e.header.node_id == node && e.header.record_type == RecordType::NodeRemoved)
            .unwrap();
        assert_eq!(removed.header.undo_position, added.position);
    }
}

#[test]
fn seek_table_matches_frames() {
    let (mut recorder, buffer) = open_in_memory();
    let stream = MockStream::depth().with_property(PropertyId::GAIN, PropertyValue::Int(1));
    let depth = recorder.attach(&stream, false).unwrap();
    recorder.start().unwrap();
    for i in 0..5u64 {
        if i == 3 {
            recorder
                .record_property_value(depth, PropertyId::GAIN, PropertyValue::Int(2))
                .unwrap();
        }
        recorder.record(depth, 100 + i * 33, &[i as u8; 8]).unwrap();
    }
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    let frames = frames_of(&entries, depth.node());
    let (table_position, table) = seek_table_of(&entries, depth.node());

    assert_eq!(table.len(), frames.len() + 1);
    assert_eq!(table[0], SeekTableEntry::ZERO);
    for (entry, (timestamp, _, position)) in table[1..].iter().zip(&frames) {
        assert_eq!(entry.timestamp, *timestamp);
        assert_eq!(entry.seek_pos, *position);
    }
    assert!(table[1..].windows(2).all(|w| w[0].seek_pos < w[1].seek_pos));
    // Two node-added records and the initial gain precede the first frame.
    let configs: Vec<u32> = table[1..].iter().map(|e| e.configuration_id).collect();
    assert_eq!(configs, vec![3, 3, 3, 4, 4]);

    let added = node_added_of(&entries, depth.node());
    assert_eq!(added.frame_count, 5);
    assert_eq!(added.seek_table_position, table_position);
}

#[test]
fn attach_after_start_begins_data_in_same_group() {
    let (mut recorder, buffer) = open_in_memory();
    recorder.start().unwrap();
    let image = recorder
        .attach(
            &MockStream::image().with_property(PropertyId::STRIDE, PropertyValue::Int(12)),
            true,
        )
        .unwrap();
    recorder.record(image, 5, &[9; 12]).unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    let node = image.node().0;
    let group: Vec<(RecordType, u32)> = kinds(&entries)
        .into_iter()
        .filter(|(_, n)| *n == node)
        .take(5)
        .collect();
    assert_eq!(
        group,
        vec![
            (RecordType::NodeAdded, node),
            (RecordType::IntProperty, node),
            (RecordType::NodeStateReady, node),
            (RecordType::NodeDataBegin, node),
            (RecordType::NewData, node),
        ]
    );
    // No JPEG codec in the default factory.
    assert_eq!(node_added_of(&entries, image.node()).codec, CodecId::UNCOMPRESSED);
}

#[test]
fn pause_drops_frames_and_collapses_gap() {
    let (mut recorder, buffer) = open_in_memory();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();
    recorder.record(depth, 0, &[1; 4]).unwrap();
    recorder.record(depth, 33, &[2; 4]).unwrap();
    recorder.pause().unwrap();
    assert!(recorder.is_paused());
    recorder.record(depth, 1_000, &[3; 4]).unwrap();
    recorder.resume().unwrap();
    recorder.record(depth, 50_000, &[4; 4]).unwrap();
    recorder.record(depth, 50_040, &[5; 4]).unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    let timestamps: Vec<(u64, u32)> = frames_of(&entries, depth.node())
        .into_iter()
        .map(|(ts, id, _)| (ts, id))
        .collect();
    assert_eq!(timestamps, vec![(0, 1), (33, 2), (66, 3), (106, 4)]);
}

#[test]
fn non_monotonic_timestamps_still_increase() {
    let (mut recorder, buffer) = open_in_memory();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();
    for ts in [500u64, 400, 400, 410] {
        recorder.record(depth, ts, &[0; 2]).unwrap();
    }
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    let timestamps: Vec<u64> = frames_of(&entries, depth.node())
        .into_iter()
        .map(|(ts, _, _)| ts)
        .collect();
    assert_eq!(timestamps, vec![500, 501, 502, 512]);
}

fn is_record(bytes: &[u8], kind: RecordType, node: u32) -> bool {
    bytes.len() >= 12
        && u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) == kind.tag()
        && u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) == node
}

#[test]
fn failed_frame_write_is_rolled_back() {
    let buffer = SharedBuffer::new();
    let sink = FailingSink::new(buffer.clone(), |bytes| {
        is_record(bytes, RecordType::NewData, 2)
    });
    let failures = sink.failures();
    let mut recorder = FileRecorder::new(small_config()).unwrap();
    recorder.initialize_with_sink(Box::new(sink)).unwrap();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();
    for i in 0..4u64 {
        recorder.record(depth, i * 10, &[i as u8; 6]).unwrap();
    }
    recorder.close().unwrap();
    assert_eq!(failures.load(Ordering::SeqCst), 1);

    let entries = read_entries(&buffer.bytes());
    let frames = frames_of(&entries, depth.node());
    let ids: Vec<u32> = frames.iter().map(|(_, id, _)| *id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    // The dropped frame consumed no timestamp either.
    let timestamps: Vec<u64> = frames.iter().map(|(ts, _, _)| *ts).collect();
    assert_eq!(timestamps, vec![10, 20, 30]);
    let (_, table) = seek_table_of(&entries, depth.node());
    assert_eq!(table.len(), 4);
}

#[test]
fn failed_attach_group_leaves_no_trace() {
    let buffer = SharedBuffer::new();
    let sink = FailingSink::new(buffer.clone(), |bytes| {
        is_record(bytes, RecordType::IntProperty, 2)
    });
    let mut recorder = FileRecorder::new(small_config()).unwrap();
    recorder.initialize_with_sink(Box::new(sink)).unwrap();
    let stream = MockStream::depth().with_property(PropertyId::GAIN, PropertyValue::Int(3));
    recorder.attach(&stream, false).unwrap();
    let second = recorder.attach(&MockStream::image(), false).unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    assert!(entries.iter().all(|e| e.header.node_id != NodeId(2)));
    assert!(entries
        .iter()
        .any(|e| e.header.node_id == second.node()
            && e.header.record_type == RecordType::NodeAdded));
    assert_eq!(entries.last().unwrap().header.record_type, RecordType::End);
}

#[test]
fn seek_table_too_large_is_skipped() {
    let config = RecorderConfig {
        max_width: 1,
        max_height: 1,
        max_bytes_per_pixel: 1,
        compression_expansion: 1.0,
        ..RecorderConfig::default()
    };
    let buffer = SharedBuffer::new();
    let mut recorder = FileRecorder::new(config).unwrap();
    recorder
        .initialize_with_sink(Box::new(buffer.clone()))
        .unwrap();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();
    // 250 entries need more than the 4 KiB record buffer.
    for i in 0..250u64 {
        recorder.record(depth, i, &[1]).unwrap();
    }
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    assert!(entries
        .iter()
        .all(|e| e.header.record_type != RecordType::SeekTable));
    let added = node_added_of(&entries, depth.node());
    assert_eq!(added.frame_count, 250);
    assert_eq!(added.seek_table_position, 0);
}

#[test]
fn device_snapshot_recorded_with_device_node() {
    let device = MockStream::new("Sensor", NodeType::Device)
        .with_property(PropertyId::SERIAL_NUMBER, PropertyValue::String("X-1".into()));
    let buffer = SharedBuffer::new();
    let mut recorder = FileRecorder::new(small_config())
        .unwrap()
        .with_device(&device);
    recorder
        .initialize_with_sink(Box::new(buffer.clone()))
        .unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    match &entries[0].record {
        Record::NodeAdded(NodeAddedVersion::Current(added)) => assert_eq!(added.name, "Sensor"),
        other => panic!("expected device node-added, got {other:?}"),
    }
    assert_eq!(
        entries[1].record,
        Record::Property {
            name: "SerialNumber".into(),
            value: PropertyValue::String("X-1".into()),
        }
    );
}

fn tiny_config() -> RecorderConfig {
    RecorderConfig {
        max_width: 4,
        max_height: 4,
        max_bytes_per_pixel: 2,
        ..RecorderConfig::default()
    }
}

#[test]
fn oversized_submissions_rejected_synchronously() {
    let config = tiny_config();
    let frame_limit = config.record_buffer_size() - NEW_DATA_FIELDS_SIZE;
    let property_limit = config.record_buffer_size() - PROPERTY_FIELDS_SIZE;
    let buffer = SharedBuffer::new();
    let mut recorder = FileRecorder::new(config).unwrap();
    recorder
        .initialize_with_sink(Box::new(buffer.clone()))
        .unwrap();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();

    match recorder.record(depth, 0, &vec![0; 2 * frame_limit]) {
        Err(RecorderError::TooLarge { node, size, limit }) => {
            assert_eq!(node, depth.node());
            assert_eq!(size, 2 * frame_limit);
            assert_eq!(limit, frame_limit);
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
    assert!(matches!(
        recorder.record(depth, 0, &vec![0; frame_limit + 1]),
        Err(RecorderError::TooLarge { .. })
    ));
    recorder.record(depth, 10, &vec![7; frame_limit]).unwrap();

    assert!(matches!(
        recorder.record_property(depth, PropertyId::GAIN, &vec![0; property_limit + 1]),
        Err(RecorderError::TooLarge { .. })
    ));
    recorder
        .record_property(depth, PropertyId::GAIN, &vec![1; property_limit])
        .unwrap();
    recorder.close().unwrap();

    let entries = read_entries(&buffer.bytes());
    let frames = frames_of(&entries, depth.node());
    assert_eq!(frames.len(), 1);
    assert!(entries
        .iter()
        .any(|e| e.header.record_type == RecordType::GeneralProperty
            && e.header.payload_size as usize == property_limit));
}

/// Stores frames as-is but reports a quarter of the input plus 16
/// bytes as worst-case overhead.
struct PaddedCodec;

impl FrameCodec for PaddedCodec {
    fn codec_id(&self) -> CodecId {
        CodecId::DEPTH_16Z_EMB_TABLES
    }

    fn overhead_size(&self, raw_len: usize) -> usize {
        raw_len / 4 + 16
    }

    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        dst.clear();
        dst.extend_from_slice(src);
        Ok(())
    }

    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        dst.clear();
        dst.extend_from_slice(src);
        Ok(())
    }
}

struct PaddedFactory;

impl CodecFactory for PaddedFactory {
    fn create(&self, codec: CodecId) -> Option<Box<dyn FrameCodec>> {
        match codec {
            CodecId::DEPTH_16Z_EMB_TABLES => Some(Box::new(PaddedCodec)),
            _ => None,
        }
    }
}

#[test]
fn codec_overhead_lowers_frame_limit() {
    let config = tiny_config();
    let room = config.record_buffer_size() - NEW_DATA_FIELDS_SIZE;
    let expected = room - (room / 4 + 16);
    let mut recorder = FileRecorder::with_codec_factory(config, Arc::new(PaddedFactory)).unwrap();
    recorder
        .initialize_with_sink(Box::new(SharedBuffer::new()))
        .unwrap();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();

    match recorder.record(depth, 0, &vec![0; expected + 1]) {
        Err(RecorderError::TooLarge { limit, .. }) => assert_eq!(limit, expected),
        other => panic!("expected TooLarge, got {other:?}"),
    }
    recorder.record(depth, 0, &vec![0; expected]).unwrap();
    recorder.close().unwrap();
}
