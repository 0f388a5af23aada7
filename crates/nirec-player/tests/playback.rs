//! Player tests against containers written by the recorder and
//! hand-assembled legacy containers.

use std::sync::{Arc, OnceLock};

use nirec_core::{
    CodecId, DefaultCodecFactory, NodeId, NodeType, PropertyId, PropertyValue, Version,
};
use nirec_format::{NodeAdded, NodeAddedVersion, CONTAINER_HEADER_SIZE};
use nirec_player::{Player, PlayerError, PlayerState};
use nirec_recorder::{FileRecorder, RecorderConfig};
use nirec_test_utils::{
    depth_frame, ContainerBuilder, Event, MockNotifications, MockStream, SharedBuffer,
};
use proptest::prelude::*;

const GAIN: &str = "Gain";

fn timestamp(frame: u64) -> u64 {
    1_000 + frame * 33
}

/// Ten depth frames. Gain is 1 at attach, 5 from frame 5 and 9 from
/// frame 9.
fn gain_session() -> &'static (Vec<u8>, NodeId) {
    static SESSION: OnceLock<(Vec<u8>, NodeId)> = OnceLock::new();
    SESSION.get_or_init(|| {
        let buffer = SharedBuffer::new();
        let mut recorder = FileRecorder::new(RecorderConfig {
            max_width: 16,
            max_height: 16,
            max_bytes_per_pixel: 2,
            ..RecorderConfig::default()
        })
        .unwrap();
        recorder
            .initialize_with_sink(Box::new(buffer.clone()))
            .unwrap();
        let stream = MockStream::depth().with_property(PropertyId::GAIN, PropertyValue::Int(1));
        let depth = recorder.attach(&stream, false).unwrap();
        recorder.start().unwrap();
        for frame in 1..=10u64 {
            if frame == 5 || frame == 9 {
                recorder
                    .record_property_value(depth, PropertyId::GAIN, PropertyValue::Int(frame))
                    .unwrap();
            }
            recorder
                .record(depth, timestamp(frame), &depth_frame(4, 4, frame as u16))
                .unwrap();
        }
        recorder.close().unwrap();
        (buffer.bytes(), depth.node())
    })
}

fn expected_gain(frame: u32) -> PropertyValue {
    PropertyValue::Int(match frame {
        0..=4 => 1,
        5..=8 => 5,
        _ => 9,
    })
}

fn open(bytes: Vec<u8>) -> (Player, Arc<MockNotifications>) {
    let notifications = Arc::new(MockNotifications::new());
    let player = Player::open(
        Box::new(SharedBuffer::from_bytes(bytes)),
        notifications.clone(),
        Arc::new(DefaultCodecFactory),
    )
    .unwrap();
    (player, notifications)
}

fn read_to_end(player: &mut Player) {
    while player.read_next().unwrap() {}
}

fn frame_ids(notifications: &MockNotifications) -> Vec<u32> {
    notifications.frames().iter().map(|f| f.2).collect()
}

// ── Sequential playback ─────────────────────────────────────────

#[test]
fn open_announces_everything_before_first_frame() {
    let (bytes, depth) = gain_session().clone();
    let (player, notifications) = open(bytes);

    assert_eq!(player.state(), PlayerState::Ready);
    assert_eq!(player.header().max_node_id, depth.0);
    assert_eq!(player.nodes().count(), 2);
    assert_eq!(player.frame_count(depth).unwrap(), 10);
    assert!(player.node(depth).unwrap().index().is_some());

    let events = notifications.events();
    assert!(events.contains(&Event::NodeAdded {
        node: NodeId::DEVICE,
        name: "Device".into(),
        node_type: NodeType::Device,
        codec: CodecId::NULL,
        frame_count: 0,
    }));
    assert!(events.contains(&Event::StateReady { node: depth }));
    assert_eq!(
        notifications.property_values(depth, GAIN),
        vec![PropertyValue::Int(1)]
    );
    assert!(notifications.frames().is_empty());
}

#[test]
fn plays_every_frame_in_order() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    read_to_end(&mut player);

    assert_eq!(player.state(), PlayerState::Eof);
    let frames = notifications.frames();
    assert_eq!(frames.len(), 10);
    for (i, (node, ts, id)) in frames.into_iter().enumerate() {
        assert_eq!(node, depth);
        assert_eq!(id, i as u32 + 1);
        assert_eq!(ts, timestamp(i as u64 + 1));
    }
    assert_eq!(
        notifications.property_values(depth, GAIN),
        vec![
            PropertyValue::Int(1),
            PropertyValue::Int(5),
            PropertyValue::Int(9)
        ]
    );
    let events = notifications.events();
    assert!(events.contains(&Event::NodeRemoved { node: depth }));
    assert!(events.contains(&Event::NodeRemoved {
        node: NodeId::DEVICE
    }));
    assert!(!player.read_next().unwrap());
}

#[test]
fn frames_are_decoded() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    assert!(player.read_next().unwrap());
    let data = notifications.events().into_iter().find_map(|e| match e {
        Event::NewData { node, data, .. } if node == depth => Some(data),
        _ => None,
    });
    assert_eq!(data, Some(depth_frame(4, 4, 1)));
}

#[test]
fn repeat_mode_hides_node_removal() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    player.set_repeat(true);
    read_to_end(&mut player);
    assert!(!notifications
        .events()
        .iter()
        .any(|e| matches!(e, Event::NodeRemoved { .. })));
    assert!(!player.node(depth).unwrap().removed);
}

// ── Seeking ─────────────────────────────────────────────────────

#[test]
fn backward_seek_restores_properties() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    read_to_end(&mut player);
    notifications.clear();

    player.seek_to_frame(depth, 7).unwrap();
    assert_eq!(player.state(), PlayerState::Ready);
    assert_eq!(notifications.last_property(depth, GAIN), Some(expected_gain(7)));
    assert_eq!(player.tell_frame(depth).unwrap(), 6);
    assert!(notifications.frames().is_empty());

    assert!(player.read_next().unwrap());
    assert_eq!(notifications.frames(), vec![(depth, timestamp(7), 7)]);
}

#[test]
fn backward_seek_to_first_configuration() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    for _ in 0..6 {
        assert!(player.read_next().unwrap());
    }
    notifications.clear();

    player.seek_to_frame(depth, 2).unwrap();
    assert_eq!(
        notifications.property_values(depth, GAIN),
        vec![PropertyValue::Int(1)]
    );
    assert!(player.read_next().unwrap());
    assert_eq!(frame_ids(&notifications), vec![2]);
}

#[test]
fn forward_seek_replays_skipped_properties() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    notifications.clear();

    player.seek_to_frame(depth, 7).unwrap();
    assert_eq!(notifications.last_property(depth, GAIN), Some(expected_gain(7)));
    assert!(notifications.frames().is_empty());

    assert!(player.read_next().unwrap());
    assert_eq!(frame_ids(&notifications), vec![7]);
}

#[test]
fn seek_within_configuration_announces_nothing() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    notifications.clear();

    player.seek_to_frame(depth, 3).unwrap();
    assert!(notifications.events().is_empty());
    assert!(player.read_next().unwrap());
    assert_eq!(frame_ids(&notifications), vec![3]);
}

#[test]
fn seek_target_is_clamped() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);

    player.seek_to_frame(depth, 0).unwrap();
    assert!(player.read_next().unwrap());
    player.seek_to_frame(depth, 99).unwrap();
    assert!(player.read_next().unwrap());
    assert_eq!(frame_ids(&notifications), vec![1, 10]);
}

#[test]
fn seek_rejects_unknown_and_frameless_nodes() {
    let (bytes, _) = gain_session().clone();
    let (mut player, _) = open(bytes);
    assert!(matches!(
        player.seek_to_frame(NodeId(42), 1),
        Err(PlayerError::UnknownNode(NodeId(42)))
    ));
    assert!(matches!(
        player.seek_to_frame(NodeId::DEVICE, 1),
        Err(PlayerError::NoFrames(Some(NodeId::DEVICE)))
    ));
    assert_eq!(player.state(), PlayerState::Ready);
}

#[test]
fn timestamp_seek_picks_latest_frame_at_or_before() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);

    player.seek_to_timestamp(timestamp(5) + 10).unwrap();
    assert!(player.read_next().unwrap());
    player.seek_to_timestamp(0).unwrap();
    assert!(player.read_next().unwrap());
    player.seek_to_timestamp(u64::MAX).unwrap();
    assert!(player.read_next().unwrap());

    assert_eq!(frame_ids(&notifications), vec![5, 1, 10]);
    assert_eq!(notifications.last_property(depth, GAIN), Some(expected_gain(10)));
}

#[test]
fn rewind_after_end_of_file() {
    let (bytes, _) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    read_to_end(&mut player);
    player.rewind().unwrap();
    assert_eq!(player.state(), PlayerState::Ready);
    read_to_end(&mut player);

    let ids = frame_ids(&notifications);
    assert_eq!(ids.len(), 20);
    assert_eq!(ids[..10], ids[10..]);
}

// ── Node topology across seeks ──────────────────────────────────

fn small_recorder() -> (FileRecorder, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let mut recorder = FileRecorder::new(RecorderConfig {
        max_width: 4,
        max_height: 4,
        max_bytes_per_pixel: 2,
        ..RecorderConfig::default()
    })
    .unwrap();
    recorder
        .initialize_with_sink(Box::new(buffer.clone()))
        .unwrap();
    (recorder, buffer)
}

fn frames_of(notifications: &MockNotifications, node: NodeId) -> Vec<u32> {
    notifications
        .frames()
        .into_iter()
        .filter(|f| f.0 == node)
        .map(|f| f.2)
        .collect()
}

#[test]
fn forward_seek_announces_nodes_attached_on_the_way() {
    let (mut recorder, buffer) = small_recorder();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    recorder.start().unwrap();
    for frame in 1..=3u64 {
        recorder.record(depth, frame * 10, &depth_frame(4, 4, 1)).unwrap();
    }
    // No properties, so only the node-added record marks the change.
    let image = recorder.attach(&MockStream::image(), false).unwrap();
    for frame in 4..=6u64 {
        recorder.record(depth, frame * 10, &depth_frame(4, 4, 1)).unwrap();
        recorder.record(image, frame * 10 + 1, &[frame as u8; 8]).unwrap();
    }
    recorder.close().unwrap();

    let (mut player, notifications) = open(buffer.bytes());
    assert!(player.node(image.node()).is_none());
    player.seek_to_frame(depth.node(), 5).unwrap();

    assert!(!player.node(image.node()).unwrap().removed);
    assert!(notifications.events().iter().any(|e| matches!(
        e,
        Event::NodeAdded { node, node_type: NodeType::Image, .. } if *node == image.node()
    )));
    assert!(notifications.events().contains(&Event::StateReady { node: image.node() }));

    read_to_end(&mut player);
    assert_eq!(frames_of(&notifications, depth.node()), vec![5, 6]);
    assert_eq!(frames_of(&notifications, image.node()), vec![2, 3]);
}

#[test]
fn backward_seek_undoes_node_removal() {
    let (mut recorder, buffer) = small_recorder();
    let depth = recorder.attach(&MockStream::depth(), false).unwrap();
    let image = recorder
        .attach(
            &MockStream::image().with_property(PropertyId::GAIN, PropertyValue::Int(3)),
            false,
        )
        .unwrap();
    recorder.start().unwrap();
    for frame in 1..=3u64 {
        recorder.record(depth, frame * 10, &depth_frame(4, 4, 1)).unwrap();
        recorder.record(image, frame * 10 + 1, &[frame as u8; 8]).unwrap();
    }
    recorder.detach(image).unwrap();
    for frame in 4..=6u64 {
        recorder.record(depth, frame * 10, &depth_frame(4, 4, 1)).unwrap();
    }
    recorder.close().unwrap();

    let (mut player, notifications) = open(buffer.bytes());
    read_to_end(&mut player);
    assert!(player.node(image.node()).unwrap().removed);
    notifications.clear();

    player.seek_to_frame(depth.node(), 1).unwrap();
    let info = player.node(image.node()).unwrap();
    assert!(!info.removed);
    assert_eq!(info.removed_position, 0);
    let revived: Vec<Event> = notifications
        .events()
        .into_iter()
        .filter(|e| match e {
            Event::NodeAdded { node, .. }
            | Event::Property { node, .. }
            | Event::StateReady { node } => *node == image.node(),
            _ => false,
        })
        .collect();
    assert_eq!(
        revived,
        vec![
            Event::NodeAdded {
                node: image.node(),
                name: "Image".into(),
                node_type: NodeType::Image,
                codec: CodecId::UNCOMPRESSED,
                frame_count: 3,
            },
            Event::Property {
                node: image.node(),
                name: GAIN.into(),
                value: PropertyValue::Int(3),
            },
            Event::StateReady { node: image.node() },
        ]
    );

    read_to_end(&mut player);
    assert_eq!(frames_of(&notifications, image.node()), vec![1, 2, 3]);
    assert!(notifications
        .events()
        .contains(&Event::NodeRemoved { node: image.node() }));
    assert!(player.node(image.node()).unwrap().removed);
}

#[test]
fn seek_back_before_removal_restores_node() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, notifications) = open(bytes);
    read_to_end(&mut player);
    let removed_at = player.node(depth).unwrap().removed_position;
    assert!(removed_at > 0);

    // Frame 10 precedes the removal, so the node comes back.
    player.seek_to_frame(depth, 10).unwrap();
    assert!(!player.node(depth).unwrap().removed);
    assert_eq!(notifications.last_property(depth, GAIN), Some(expected_gain(10)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn seek_state_matches_straight_playback(start in 0u32..=10, target in 1u32..=10) {
        let (bytes, depth) = gain_session().clone();
        let (mut player, notifications) = open(bytes);
        for _ in 0..start {
            prop_assert!(player.read_next().unwrap());
        }
        notifications.clear();

        player.seek_to_frame(depth, target).unwrap();
        let gain = notifications
            .last_property(depth, GAIN)
            .unwrap_or_else(|| expected_gain(start.max(1)));
        prop_assert_eq!(gain, expected_gain(target));
        prop_assert_eq!(player.tell_frame(depth).unwrap(), target - 1);

        prop_assert!(player.read_next().unwrap());
        prop_assert_eq!(frame_ids(&notifications), vec![target]);
    }
}

// ── Legacy and damaged containers ───────────────────────────────

type Shape = fn(&str, NodeType, CodecId) -> NodeAddedVersion;

fn v1004(name: &str, node_type: NodeType, codec: CodecId) -> NodeAddedVersion {
    NodeAddedVersion::V1004 {
        name: name.into(),
        node_type,
        codec,
    }
}

fn v1005(name: &str, node_type: NodeType, codec: CodecId) -> NodeAddedVersion {
    NodeAddedVersion::V1005 {
        name: name.into(),
        node_type,
        codec,
        frame_count: 0,
        min_timestamp: 0,
        max_timestamp: 0,
    }
}

/// Six uncompressed depth frames without a seek table. Gain is 1, then
/// 2 from frame 4.
fn legacy_container(version: Version, shape: Shape) -> Vec<u8> {
    let device = NodeId::DEVICE;
    let depth = NodeId::FIRST_STREAM;
    let mut builder = ContainerBuilder::new(version);
    builder.push(|asm| {
        asm.node_added_versioned(device, &shape("Device", NodeType::Device, CodecId::NULL))
    });
    let added = builder.push(|asm| {
        asm.node_added_versioned(depth, &shape("Depth", NodeType::Depth, CodecId::UNCOMPRESSED))
    });
    let mut gain = builder.push(|asm| asm.int_property(depth, GAIN, 1, 0));
    builder.push(|asm| asm.node_state_ready(device));
    builder.push(|asm| asm.node_state_ready(depth));
    builder.push(|asm| asm.node_data_begin(depth, 0, 0));
    let mut previous = 0;
    for frame in 1..=6u32 {
        if frame == 4 {
            let undo = gain;
            gain = builder.push(|asm| asm.int_property(depth, GAIN, 2, undo));
        }
        let ts = u64::from(frame) * 100;
        let data = [frame as u8; 4];
        let undo = previous;
        previous = builder.push(|asm| asm.new_data(depth, ts, frame, &data, undo));
        builder.note(depth, ts);
    }
    builder.push(|asm| asm.node_removed(depth, added));
    builder.push(|asm| asm.node_removed(device, CONTAINER_HEADER_SIZE as u64));
    builder.push(|asm| asm.end());
    builder.finish()
}

#[test]
fn legacy_containers_are_indexed_by_scan() {
    let depth = NodeId::FIRST_STREAM;
    for (version, shape) in [
        (Version::OLDEST_SUPPORTED, v1004 as Shape),
        (Version::NODE_ADDED_TIMESTAMPS, v1005 as Shape),
    ] {
        let (mut player, notifications) = open(legacy_container(version, shape));
        assert!(player.node(depth).unwrap().index().is_none());
        read_to_end(&mut player);
        assert_eq!(frame_ids(&notifications), vec![1, 2, 3, 4, 5, 6]);
        notifications.clear();

        player.seek_to_frame(depth, 2).unwrap();
        assert_eq!(player.frame_count(depth).unwrap(), 6);
        assert_eq!(
            notifications.last_property(depth, GAIN),
            Some(PropertyValue::Int(1))
        );
        player.seek_to_timestamp(450).unwrap();
        assert_eq!(
            notifications.last_property(depth, GAIN),
            Some(PropertyValue::Int(2))
        );
        assert!(player.read_next().unwrap());
        assert_eq!(notifications.frames(), vec![(depth, 400, 4)]);
    }
}

#[test]
fn truncated_tail_ends_playback_cleanly() {
    let depth = NodeId::FIRST_STREAM;
    let mut builder = ContainerBuilder::new(Version::CURRENT);
    builder.push(|asm| {
        asm.node_added(depth, &NodeAdded::new("Depth", NodeType::Depth, CodecId::UNCOMPRESSED))
    });
    builder.push(|asm| asm.node_data_begin(depth, 0, 0));
    let mut last = 0;
    for frame in 1..=3u32 {
        let undo = last;
        last = builder.push(|asm| asm.new_data(depth, u64::from(frame), frame, &[7; 64], undo));
    }
    let mut bytes = builder.finish();
    bytes.truncate(last as usize + 40);

    let (mut player, notifications) = open(bytes);
    read_to_end(&mut player);
    assert_eq!(player.state(), PlayerState::Eof);
    assert_eq!(frame_ids(&notifications), vec![1, 2]);

    player.seek_to_frame(depth, 9).unwrap();
    assert_eq!(player.frame_count(depth).unwrap(), 2);
    assert!(player.read_next().unwrap());
    assert_eq!(frame_ids(&notifications), vec![1, 2, 2]);
}

#[test]
fn unusable_seek_table_falls_back_to_scan() {
    let depth = NodeId::FIRST_STREAM;
    let mut builder = ContainerBuilder::new(Version::CURRENT);
    builder.push(|asm| {
        asm.node_added(
            NodeId::DEVICE,
            &NodeAdded::new("Device", NodeType::Device, CodecId::NULL),
        )
    });
    // Points at the device's node-added record, not a seek table.
    let added = NodeAdded {
        frame_count: 3,
        seek_table_position: CONTAINER_HEADER_SIZE as u64,
        ..NodeAdded::new("Depth", NodeType::Depth, CodecId::UNCOMPRESSED)
    };
    builder.push(|asm| asm.node_added(depth, &added));
    let mut last = 0;
    for frame in 1..=3u32 {
        let undo = last;
        last = builder.push(|asm| asm.new_data(depth, u64::from(frame) * 10, frame, &[1; 8], undo));
    }
    builder.push(|asm| asm.end());

    let (mut player, notifications) = open(builder.finish());
    assert!(player.node(depth).unwrap().index().is_none());
    player.seek_to_frame(depth, 2).unwrap();
    assert!(player.node(depth).unwrap().index().is_some());
    assert!(player.read_next().unwrap());
    assert_eq!(notifications.frames(), vec![(depth, 20, 2)]);
}

#[test]
fn unsupported_codec_fails_open() {
    let mut builder = ContainerBuilder::new(Version::CURRENT);
    builder.push(|asm| {
        asm.node_added(
            NodeId::FIRST_STREAM,
            &NodeAdded::new("Image", NodeType::Image, CodecId::JPEG),
        )
    });
    builder.push(|asm| asm.end());
    let result = Player::open(
        Box::new(SharedBuffer::from_bytes(builder.finish())),
        Arc::new(MockNotifications::new()),
        Arc::new(DefaultCodecFactory),
    );
    assert!(matches!(
        result,
        Err(PlayerError::UnsupportedCodec {
            node: NodeId::FIRST_STREAM,
            codec: CodecId::JPEG,
        })
    ));
}

#[test]
fn container_without_frames() {
    let mut builder = ContainerBuilder::new(Version::CURRENT);
    builder.push(|asm| {
        asm.node_added(
            NodeId::DEVICE,
            &NodeAdded::new("Device", NodeType::Device, CodecId::NULL),
        )
    });
    builder.push(|asm| asm.end());
    let (mut player, notifications) = open(builder.finish());

    assert_eq!(player.state(), PlayerState::Eof);
    assert_eq!(notifications.events().len(), 1);
    assert!(!player.read_next().unwrap());
    assert!(matches!(player.rewind(), Err(PlayerError::NoFrames(None))));
    assert!(matches!(
        player.seek_to_timestamp(0),
        Err(PlayerError::NoFrames(None))
    ));
}

#[test]
fn bad_magic_fails_open() {
    let mut bytes = gain_session().0.clone();
    bytes[0] = b'X';
    let result = Player::open(
        Box::new(SharedBuffer::from_bytes(bytes)),
        Arc::new(MockNotifications::new()),
        Arc::new(DefaultCodecFactory),
    );
    assert!(matches!(result, Err(PlayerError::Format(_))));
}

#[test]
fn closed_player_rejects_reads() {
    let (bytes, depth) = gain_session().clone();
    let (mut player, _) = open(bytes);
    player.close().unwrap();
    assert_eq!(player.state(), PlayerState::Closed);
    assert!(matches!(
        player.next_frame(),
        Err(PlayerError::InvalidState {
            state: PlayerState::Closed,
            ..
        })
    ));
    assert!(player.seek_to_frame(depth, 1).is_err());
}

#[test]
fn plays_from_a_file() {
    let (bytes, _) = gain_session().clone();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.oni");
    std::fs::write(&path, bytes).unwrap();

    let notifications = Arc::new(MockNotifications::new());
    let mut player = Player::open(
        Box::new(nirec_player::FileInputStream::new(&path)),
        notifications.clone(),
        Arc::new(DefaultCodecFactory),
    )
    .unwrap();
    read_to_end(&mut player);
    assert_eq!(notifications.frames().len(), 10);
}
