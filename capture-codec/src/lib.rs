/// LRAW capture file codec.
///
/// Decodes the binary capture format produced by LiDAR-equipped mobile
/// devices into typed records: mesh anchors, colour texture frames, and raw
/// depth frames with per-frame camera parameters. The format is strictly
/// sequential with no seek table; every record's length is self-describing
/// through embedded counts, and all numeric fields are little-endian.
mod decode;
mod encode;
mod error;
mod reader;
mod types;

pub use decode::{HEADER_SIZE, MAGIC, decode, limits};
pub use encode::encode;
pub use error::{DecodeError, Result};
pub use types::{
    CaptureData, CaptureFlags, CaptureHeader, DepthFrame, ImageContainer, MeshAnchor,
    TextureFrame, Transform,
};
