//! Property identifiers, their record names, and owned property values.
//!
//! Properties are stored in the container by name, not by numeric id.
//! [`PropertyId::record_name`] and [`PropertyId::from_record_name`] map
//! between the two; ids without a well-known name use a reversible
//! `Property0x…` spelling so that any id survives a round trip.

use std::borrow::Cow;
use std::fmt;

/// Numeric property identifier as used by stream and device APIs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(pub u32);

const UNNAMED_PREFIX: &str = "Property0x";

impl PropertyId {
    /// Stream cropping window.
    pub const CROPPING: PropertyId = PropertyId(0);
    /// Horizontal field of view (radians, `f32`).
    pub const HORIZONTAL_FOV: PropertyId = PropertyId(1);
    /// Vertical field of view (radians, `f32`).
    pub const VERTICAL_FOV: PropertyId = PropertyId(2);
    /// Resolution, pixel format and fps.
    pub const VIDEO_MODE: PropertyId = PropertyId(3);
    /// Largest pixel value the stream can produce.
    pub const MAX_VALUE: PropertyId = PropertyId(4);
    /// Smallest pixel value the stream can produce.
    pub const MIN_VALUE: PropertyId = PropertyId(5);
    /// Bytes per row.
    pub const STRIDE: PropertyId = PropertyId(6);
    /// Horizontal mirroring flag.
    pub const MIRRORING: PropertyId = PropertyId(7);
    /// Automatic white balance flag.
    pub const AUTO_WHITE_BALANCE: PropertyId = PropertyId(100);
    /// Automatic exposure flag.
    pub const AUTO_EXPOSURE: PropertyId = PropertyId(101);
    /// Exposure time.
    pub const EXPOSURE: PropertyId = PropertyId(102);
    /// Sensor gain.
    pub const GAIN: PropertyId = PropertyId(103);
    /// Device firmware version string.
    pub const FIRMWARE_VERSION: PropertyId = PropertyId(0x1000);
    /// Device driver version.
    pub const DRIVER_VERSION: PropertyId = PropertyId(0x1001);
    /// Device hardware revision.
    pub const HARDWARE_VERSION: PropertyId = PropertyId(0x1002);
    /// Device serial number.
    pub const SERIAL_NUMBER: PropertyId = PropertyId(0x1003);
    /// Depth-to-colour registration mode.
    pub const IMAGE_REGISTRATION: PropertyId = PropertyId(0x1005);

    const NAMED: [(PropertyId, &'static str); 17] = [
        (Self::CROPPING, "Cropping"),
        (Self::HORIZONTAL_FOV, "HFOV"),
        (Self::VERTICAL_FOV, "VFOV"),
        (Self::VIDEO_MODE, "VideoMode"),
        (Self::MAX_VALUE, "MaxValue"),
        (Self::MIN_VALUE, "MinValue"),
        (Self::STRIDE, "Stride"),
        (Self::MIRRORING, "Mirror"),
        (Self::AUTO_WHITE_BALANCE, "AutoWhiteBalance"),
        (Self::AUTO_EXPOSURE, "AutoExposure"),
        (Self::EXPOSURE, "Exposure"),
        (Self::GAIN, "Gain"),
        (Self::FIRMWARE_VERSION, "FirmwareVersion"),
        (Self::DRIVER_VERSION, "DriverVersion"),
        (Self::HARDWARE_VERSION, "HardwareVersion"),
        (Self::SERIAL_NUMBER, "SerialNumber"),
        (Self::IMAGE_REGISTRATION, "ImageRegistration"),
    ];

    /// Name under which this property is stored in property records.
    pub fn record_name(self) -> Cow<'static, str> {
        Self::NAMED
            .iter()
            .find(|(id, _)| *id == self)
            .map(|(_, name)| Cow::Borrowed(*name))
            .unwrap_or_else(|| Cow::Owned(format!("{UNNAMED_PREFIX}{:08X}", self.0)))
    }

    /// Inverse of [`record_name`](Self::record_name).
    ///
    /// Returns `None` for names written by other tools that do not map
    /// onto a numeric id; such properties are still replayed by name.
    pub fn from_record_name(name: &str) -> Option<PropertyId> {
        if let Some((id, _)) = Self::NAMED.iter().find(|(_, n)| *n == name) {
            return Some(*id);
        }
        let hex = name.strip_prefix(UNNAMED_PREFIX)?;
        if hex.len() != 8 {
            return None;
        }
        u32::from_str_radix(hex, 16).ok().map(PropertyId)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.record_name())
    }
}

/// Owned property value, one variant per property record kind.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    /// Integer property, stored as `u64`.
    Int(u64),
    /// Real property, stored as `f64`.
    Real(f64),
    /// String property, stored NUL terminated.
    String(String),
    /// Opaque property bytes.
    General(Vec<u8>),
}

impl PropertyValue {
    /// Number of payload bytes the value occupies in its record.
    pub fn payload_len(&self) -> usize {
        match self {
            Self::Int(_) | Self::Real(_) => 8,
            Self::String(s) => s.len() + 1,
            Self::General(bytes) => bytes.len(),
        }
    }
}
