//! File-format version tuple.

use std::fmt;

/// Four-part container format version.
///
/// Ordered lexicographically by `(major, minor, maintenance, build)`,
/// which is the order the player uses to decide which record shapes
/// a container may contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
    /// Maintenance version.
    pub maintenance: u16,
    /// Build number.
    pub build: u32,
}

impl Version {
    /// Oldest container version the player accepts.
    pub const OLDEST_SUPPORTED: Version = Version::new(1, 0, 0, 4);
    /// First version whose node-added records carry frame counts and timestamps.
    pub const NODE_ADDED_TIMESTAMPS: Version = Version::new(1, 0, 0, 5);
    /// Version written by this recorder; adds seek tables.
    pub const CURRENT: Version = Version::new(1, 0, 1, 0);

    /// Build a version tuple.
    pub const fn new(major: u8, minor: u8, maintenance: u16, build: u32) -> Self {
        Self {
            major,
            minor,
            maintenance,
            build,
        }
    }

    /// Whether the player can read containers of this version.
    pub fn is_supported(&self) -> bool {
        *self >= Self::OLDEST_SUPPORTED && *self <= Self::CURRENT
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.maintenance, self.build
        )
    }
}
