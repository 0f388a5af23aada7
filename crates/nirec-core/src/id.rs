//! Strongly-typed identifiers for nodes, codecs and node types.

use std::fmt;

/// Identifies a node (device or stream) within a container.
///
/// Node ids are allocated by the recorder and stay valid for the whole
/// lifetime of the container. Id 0 is never allocated; the device node
/// is always [`NodeId::DEVICE`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The device node that owns every recorded stream.
    pub const DEVICE: NodeId = NodeId(1);

    /// First id handed out to an attached stream.
    pub const FIRST_STREAM: NodeId = NodeId(2);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Four-character code identifying the codec used for a node's frames.
///
/// Stored on the wire as a little-endian `u32` whose bytes spell the
/// code, e.g. `b"NONE"` for uncompressed data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodecId(pub u32);

impl CodecId {
    /// No codec; the node carries no frame data (e.g. the device node).
    pub const NULL: CodecId = CodecId(0);
    /// Raw frame bytes.
    pub const UNCOMPRESSED: CodecId = CodecId::from_fourcc(*b"NONE");
    /// 16-bit depth delta coding.
    pub const DEPTH_16Z: CodecId = CodecId::from_fourcc(*b"16zP");
    /// 16-bit depth delta coding with embedded translation tables.
    pub const DEPTH_16Z_EMB_TABLES: CodecId = CodecId::from_fourcc(*b"16zT");
    /// 8-bit image delta coding.
    pub const IMAGE_8Z: CodecId = CodecId::from_fourcc(*b"im8z");
    /// Lossy JPEG.
    pub const JPEG: CodecId = CodecId::from_fourcc(*b"JPEG");

    /// Build a codec id from its four-character code.
    pub const fn from_fourcc(code: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(code))
    }

    /// The four-character code bytes.
    pub const fn fourcc(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Debug for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecId({self})")
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "NULL");
        }
        let code = self.fourcc();
        if code.iter().all(|b| b.is_ascii_graphic()) {
            for b in code {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

/// Kind of production node a record describes.
///
/// Values match the container's `u32` node-type field. Unknown values
/// read from older or foreign containers are preserved in
/// [`NodeType::Other`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// The capture device itself; carries properties but no frames.
    Device,
    /// Depth stream.
    Depth,
    /// Colour stream.
    Image,
    /// Infrared stream.
    Ir,
    /// Any other node type, kept verbatim.
    Other(u32),
}

impl NodeType {
    /// Wire value of this node type.
    pub fn to_raw(self) -> u32 {
        match self {
            Self::Device => 1,
            Self::Depth => 2,
            Self::Image => 3,
            Self::Ir => 5,
            Self::Other(v) => v,
        }
    }

    /// Decode a wire value.
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Device,
            2 => Self::Depth,
            3 => Self::Image,
            5 => Self::Ir,
            v => Self::Other(v),
        }
    }

    /// Whether nodes of this type produce frame data.
    pub fn is_stream(self) -> bool {
        !matches!(self, Self::Device)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Depth => write!(f, "depth"),
            Self::Image => write!(f, "image"),
            Self::Ir => write!(f, "ir"),
            Self::Other(v) => write!(f, "node-type {v}"),
        }
    }
}
