/// Typed records decoded from an LRAW capture file.
///
/// All records are immutable after construction and owned by the caller for
/// the duration of one processing run.

/// Feature flag bits from the capture header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFlags(pub u16);

impl CaptureFlags {
    /// Mesh anchors may carry per-vertex classification bytes.
    pub const HAS_CLASSIFICATIONS: u16 = 1 << 0;
    /// Depth frames carry a dense confidence grid.
    pub const HAS_CONFIDENCE_MAPS: u16 = 1 << 1;
    /// The file contains texture frames.
    pub const HAS_TEXTURE_FRAMES: u16 = 1 << 2;
    /// The file contains depth frames.
    pub const HAS_DEPTH_FRAMES: u16 = 1 << 3;
    /// Record payloads are compressed. Defined by the format but never
    /// emitted by any known device; the decoder rejects it.
    pub const COMPRESSED: u16 = 1 << 4;

    /// Whether mesh anchors may carry classifications.
    pub fn has_classifications(self) -> bool {
        self.0 & Self::HAS_CLASSIFICATIONS != 0
    }

    /// Whether depth frames carry confidence grids.
    pub fn has_confidence_maps(self) -> bool {
        self.0 & Self::HAS_CONFIDENCE_MAPS != 0
    }

    /// Whether payload compression is flagged.
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }
}

/// Fixed 32-byte capture file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHeader {
    /// Format version.
    pub version: u16,
    /// Feature flag bitfield.
    pub flags: CaptureFlags,
    /// Number of mesh anchor records that follow.
    pub mesh_count: u32,
    /// Number of texture frame records.
    pub texture_count: u32,
    /// Number of depth frame records.
    pub depth_count: u32,
}

/// A 4x4 world transform stored row-major as 16 f32 values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub [f32; 16]);

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        let mut m = [0.0f32; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Transform(m)
    }

    /// Apply the full transform to a point (homogeneous, w = 1).
    pub fn apply_point(&self, p: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        [
            m[0] * p[0] + m[1] * p[1] + m[2] * p[2] + m[3],
            m[4] * p[0] + m[5] * p[1] + m[6] * p[2] + m[7],
            m[8] * p[0] + m[9] * p[1] + m[10] * p[2] + m[11],
        ]
    }

    /// Apply only the upper-left 3x3 rotation block to a direction.
    ///
    /// Normals are treated as already unit-length; no renormalisation is
    /// performed here.
    pub fn apply_direction(&self, d: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        [
            m[0] * d[0] + m[1] * d[1] + m[2] * d[2],
            m[4] * d[0] + m[5] * d[1] + m[6] * d[2],
            m[8] * d[0] + m[9] * d[1] + m[10] * d[2],
        ]
    }
}

/// Pinhole camera intrinsics stored row-major as a 3x3 f32 matrix.
pub type Intrinsics = [f32; 9];

/// A single mesh anchor: one chunk of scanned surface in anchor-local space.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshAnchor {
    /// Opaque 16-byte identifier assigned by the device.
    pub uuid: [u8; 16],
    /// Anchor-to-world transform.
    pub transform: Transform,
    /// Vertex positions, anchor-local.
    pub vertices: Vec<[f32; 3]>,
    /// Per-vertex unit normals, anchor-local.
    pub normals: Vec<[f32; 3]>,
    /// Triangle faces as indices into `vertices`.
    pub faces: Vec<[u32; 3]>,
    /// Optional per-vertex classification bytes.
    pub classifications: Option<Vec<u8>>,
}

/// Container format of a texture frame payload, detected by magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageContainer {
    /// JPEG (starts with FF D8).
    Jpeg,
    /// HEIC (starts with 00 00 00 0C).
    Heic,
    /// Anything else.
    Unknown,
}

impl ImageContainer {
    /// Detect the container from the first payload bytes.
    pub fn detect(data: &[u8]) -> Self {
        if data.len() >= 2 && data[0] == 0xff && data[1] == 0xd8 {
            ImageContainer::Jpeg
        } else if data.len() >= 4 && data[..4] == [0x00, 0x00, 0x00, 0x0c] {
            ImageContainer::Heic
        } else {
            ImageContainer::Unknown
        }
    }
}

/// A colour camera frame with pose, intrinsics, and encoded image payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureFrame {
    /// Opaque 16-byte identifier.
    pub uuid: [u8; 16],
    /// Capture timestamp in seconds.
    pub timestamp: f64,
    /// Camera-to-world transform at capture time.
    pub transform: Transform,
    /// 3x3 camera intrinsics.
    pub intrinsics: Intrinsics,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Encoded image payload, copied out of the source buffer.
    pub image_data: Vec<u8>,
}

impl TextureFrame {
    /// Container format of the image payload.
    pub fn container(&self) -> ImageContainer {
        ImageContainer::detect(&self.image_data)
    }
}

/// A raw depth sensor frame with pose, intrinsics, and dense grids.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    /// Opaque 16-byte identifier.
    pub uuid: [u8; 16],
    /// Capture timestamp in seconds.
    pub timestamp: f64,
    /// Camera-to-world transform at capture time.
    pub transform: Transform,
    /// 3x3 camera intrinsics.
    pub intrinsics: Intrinsics,
    /// Grid width in pixels.
    pub width: u32,
    /// Grid height in pixels.
    pub height: u32,
    /// Row-major depth values in metres, length width * height.
    pub depth: Vec<f32>,
    /// Optional row-major confidence tiers (0-2), length width * height.
    pub confidence: Option<Vec<u8>>,
}

/// A fully decoded capture file.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureData {
    /// The decoded header.
    pub header: CaptureHeader,
    /// Mesh anchors in stream order.
    pub mesh_anchors: Vec<MeshAnchor>,
    /// Texture frames in stream order.
    pub texture_frames: Vec<TextureFrame>,
    /// Depth frames in stream order.
    pub depth_frames: Vec<DepthFrame>,
}

impl CaptureData {
    /// Total vertex count across all mesh anchors.
    pub fn total_vertices(&self) -> usize {
        self.mesh_anchors.iter().map(|a| a.vertices.len()).sum()
    }

    /// Total face count across all mesh anchors.
    pub fn total_faces(&self) -> usize {
        self.mesh_anchors.iter().map(|a| a.faces.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform_is_noop() {
        let t = Transform::identity();
        assert_eq!(t.apply_point([1.0, -2.0, 3.0]), [1.0, -2.0, 3.0]);
        assert_eq!(t.apply_direction([0.0, 1.0, 0.0]), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn translation_moves_points_not_directions() {
        let mut m = Transform::identity();
        m.0[3] = 5.0;
        m.0[7] = -1.0;
        assert_eq!(m.apply_point([0.0, 0.0, 0.0]), [5.0, -1.0, 0.0]);
        assert_eq!(m.apply_direction([0.0, 0.0, 1.0]), [0.0, 0.0, 1.0]);
    }

    #[test]
    fn container_detection() {
        assert_eq!(
            ImageContainer::detect(&[0xff, 0xd8, 0xff, 0xe0]),
            ImageContainer::Jpeg
        );
        assert_eq!(
            ImageContainer::detect(&[0x00, 0x00, 0x00, 0x0c, b'f']),
            ImageContainer::Heic
        );
        assert_eq!(ImageContainer::detect(&[1, 2, 3]), ImageContainer::Unknown);
    }

    #[test]
    fn flag_helpers() {
        let flags = CaptureFlags(CaptureFlags::HAS_CLASSIFICATIONS | CaptureFlags::HAS_DEPTH_FRAMES);
        assert!(flags.has_classifications());
        assert!(!flags.has_confidence_maps());
        assert!(!flags.is_compressed());
    }
}
