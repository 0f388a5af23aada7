//! Benchmark profiles and synthetic sessions for nirec.
//!
//! - [`SessionProfile`]: frame geometry, length and property churn
//! - [`synthetic_depth_frames`]: deterministic noisy depth frames via seed
//! - [`record_session`]: a complete container recorded into memory

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use nirec_core::{NodeId, PropertyId, PropertyValue};
use nirec_recorder::{FileRecorder, RecorderConfig, RecorderError};
use nirec_test_utils::{MockStream, SharedBuffer};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Shape of a synthetic recording session.
#[derive(Clone, Copy, Debug)]
pub struct SessionProfile {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Number of depth frames.
    pub frames: u32,
    /// A gain change is recorded before every `property_every`-th frame.
    pub property_every: u32,
}

/// QVGA depth, 300 frames (10 s at 30 fps), a gain change every second.
pub fn qvga_profile() -> SessionProfile {
    SessionProfile {
        width: 320,
        height: 240,
        frames: 300,
        property_every: 30,
    }
}

/// VGA depth, 90 frames, a gain change every 10 frames.
pub fn vga_profile() -> SessionProfile {
    SessionProfile {
        width: 640,
        height: 480,
        frames: 90,
        property_every: 10,
    }
}

/// `count` depth frames of little-endian `u16` pixels in 500..4500 mm.
pub fn synthetic_depth_frames(width: u32, height: u32, count: usize, seed: u64) -> Vec<Vec<u8>> {
    let pixels = width as usize * height as usize;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let mut frame = Vec::with_capacity(pixels * 2);
            for _ in 0..pixels {
                let depth = 500 + (rng.next_u32() % 4000) as u16;
                frame.extend_from_slice(&depth.to_le_bytes());
            }
            frame
        })
        .collect()
}

/// Record `profile` into memory at 30 fps. Returns the container and
/// the depth node id.
pub fn record_session(
    profile: SessionProfile,
    seed: u64,
) -> Result<(Vec<u8>, NodeId), RecorderError> {
    let frames = synthetic_depth_frames(profile.width, profile.height, 4, seed);
    let buffer = SharedBuffer::new();
    let mut recorder = FileRecorder::new(RecorderConfig {
        max_width: profile.width,
        max_height: profile.height,
        max_bytes_per_pixel: 2,
        ..RecorderConfig::default()
    })?;
    recorder.initialize_with_sink(Box::new(buffer.clone()))?;
    let depth = recorder.attach(
        &MockStream::depth().with_property(PropertyId::GAIN, PropertyValue::Int(0)),
        false,
    )?;
    recorder.start()?;
    for i in 0..profile.frames {
        if profile.property_every > 0 && i > 0 && i % profile.property_every == 0 {
            recorder.record_property_value(
                depth,
                PropertyId::GAIN,
                PropertyValue::Int(u64::from(i)),
            )?;
        }
        let timestamp = u64::from(i) * 33_333;
        recorder.record(depth, timestamp, &frames[i as usize % frames.len()])?;
    }
    recorder.close()?;
    Ok((buffer.bytes(), depth.node()))
}
