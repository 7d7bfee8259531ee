/// Sequential decoder for the LRAW capture format.
use crate::error::{DecodeError, Result};
use crate::reader::ByteReader;
use crate::types::{
    CaptureData, CaptureFlags, CaptureHeader, DepthFrame, MeshAnchor, TextureFrame, Transform,
};

/// Sanity ceilings applied to declared counts before any allocation.
///
/// A corrupt header must never drive a multi-gigabyte allocation; every
/// count is validated against these limits first.
pub mod limits {
    /// Maximum vertices in a single mesh anchor.
    pub const MAX_VERTICES: u64 = 8_388_608;
    /// Maximum faces in a single mesh anchor.
    pub const MAX_FACES: u64 = 16_777_216;
    /// Maximum encoded image payload in bytes (64 MiB).
    pub const MAX_IMAGE_BYTES: u64 = 64 * 1024 * 1024;
    /// Maximum depth grid dimension in pixels.
    pub const MAX_DEPTH_DIMENSION: u64 = 8192;
    /// Maximum record count of any kind declared in the header.
    pub const MAX_RECORD_COUNT: u64 = 65_536;
}

/// Magic signature at the start of every capture file.
pub const MAGIC: [u8; 4] = *b"LRAW";

/// Size of the fixed file header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Decode a complete capture file into typed records.
///
/// The format has no seek table; records are read strictly sequentially and
/// each record's length is self-describing. Decoding is pure: no partial
/// result is ever returned on failure.
pub fn decode(bytes: &[u8]) -> Result<CaptureData> {
    let mut r = ByteReader::new(bytes);
    let header = decode_header(&mut r)?;

    tracing::debug!(
        version = header.version,
        flags = format_args!("{:#06x}", header.flags.0),
        meshes = header.mesh_count,
        textures = header.texture_count,
        depth = header.depth_count,
        "decoded capture header"
    );

    let mut mesh_anchors = Vec::with_capacity(header.mesh_count as usize);
    for index in 0..header.mesh_count as usize {
        mesh_anchors.push(decode_mesh_anchor(
            &mut r,
            index,
            header.flags.has_classifications(),
        )?);
    }

    let mut texture_frames = Vec::with_capacity(header.texture_count as usize);
    for index in 0..header.texture_count as usize {
        texture_frames.push(decode_texture_frame(&mut r, index)?);
    }

    let mut depth_frames = Vec::with_capacity(header.depth_count as usize);
    for index in 0..header.depth_count as usize {
        depth_frames.push(decode_depth_frame(
            &mut r,
            index,
            header.flags.has_confidence_maps(),
        )?);
    }

    Ok(CaptureData {
        header,
        mesh_anchors,
        texture_frames,
        depth_frames,
    })
}

/// Decode and validate the fixed 32-byte header.
fn decode_header(r: &mut ByteReader<'_>) -> Result<CaptureHeader> {
    let magic_bytes = r.take(4)?;
    let mut found = [0u8; 4];
    found.copy_from_slice(magic_bytes);
    if found != MAGIC {
        return Err(DecodeError::InvalidMagic { found });
    }

    let version = r.read_u16()?;
    let flags = CaptureFlags(r.read_u16()?);
    let mesh_count = r.read_u32()?;
    let texture_count = r.read_u32()?;
    let depth_count = r.read_u32()?;
    // Reserved padding, present but unused.
    r.take(12)?;

    if flags.is_compressed() {
        return Err(DecodeError::UnsupportedFlags {
            flags: CaptureFlags::COMPRESSED,
        });
    }

    for (what, value) in [
        ("mesh anchor count", mesh_count),
        ("texture frame count", texture_count),
        ("depth frame count", depth_count),
    ] {
        if value as u64 > limits::MAX_RECORD_COUNT {
            return Err(DecodeError::implausible(
                what,
                0,
                value as u64,
                limits::MAX_RECORD_COUNT,
            ));
        }
    }

    Ok(CaptureHeader {
        version,
        flags,
        mesh_count,
        texture_count,
        depth_count,
    })
}

/// Decode one mesh anchor record.
fn decode_mesh_anchor(
    r: &mut ByteReader<'_>,
    index: usize,
    file_has_classifications: bool,
) -> Result<MeshAnchor> {
    let uuid = r.read_uuid()?;
    let transform = Transform(r.read_f32_array::<16>()?);
    let vertex_count = r.read_u32()? as usize;
    let face_count = r.read_u32()? as usize;
    let has_class = r.read_u8()? != 0;

    if vertex_count as u64 > limits::MAX_VERTICES {
        return Err(DecodeError::implausible(
            "vertex count",
            index,
            vertex_count as u64,
            limits::MAX_VERTICES,
        ));
    }
    if face_count as u64 > limits::MAX_FACES {
        return Err(DecodeError::implausible(
            "face count",
            index,
            face_count as u64,
            limits::MAX_FACES,
        ));
    }

    let vertices = r.read_vec3_list(vertex_count)?;
    let normals = r.read_vec3_list(vertex_count)?;
    let faces = r.read_index_list(face_count)?;

    // Classification bytes are per-vertex and present only when both the
    // per-anchor flag and the file-level flag are set.
    let classifications = if has_class && file_has_classifications {
        Some(r.take(vertex_count)?.to_vec())
    } else {
        None
    };

    Ok(MeshAnchor {
        uuid,
        transform,
        vertices,
        normals,
        faces,
        classifications,
    })
}

/// Decode one texture frame record.
fn decode_texture_frame(r: &mut ByteReader<'_>, index: usize) -> Result<TextureFrame> {
    let uuid = r.read_uuid()?;
    let timestamp = r.read_f64()?;
    let transform = Transform(r.read_f32_array::<16>()?);
    let intrinsics = r.read_f32_array::<9>()?;
    let width = r.read_u32()?;
    let height = r.read_u32()?;
    let image_length = r.read_u32()? as usize;

    if image_length as u64 > limits::MAX_IMAGE_BYTES {
        return Err(DecodeError::implausible(
            "image payload length",
            index,
            image_length as u64,
            limits::MAX_IMAGE_BYTES,
        ));
    }

    // Payload bytes are copied out and owned by the frame record.
    let image_data = r.take(image_length)?.to_vec();

    Ok(TextureFrame {
        uuid,
        timestamp,
        transform,
        intrinsics,
        width,
        height,
        image_data,
    })
}

/// Decode one depth frame record.
fn decode_depth_frame(
    r: &mut ByteReader<'_>,
    index: usize,
    has_confidence: bool,
) -> Result<DepthFrame> {
    let uuid = r.read_uuid()?;
    let timestamp = r.read_f64()?;
    let transform = Transform(r.read_f32_array::<16>()?);
    let intrinsics = r.read_f32_array::<9>()?;
    let width = r.read_u32()?;
    let height = r.read_u32()?;

    for (what, value) in [("depth width", width), ("depth height", height)] {
        if value as u64 > limits::MAX_DEPTH_DIMENSION {
            return Err(DecodeError::implausible(
                what,
                index,
                value as u64,
                limits::MAX_DEPTH_DIMENSION,
            ));
        }
    }

    let pixel_count = width as usize * height as usize;
    let depth = r.read_f32_list(pixel_count)?;

    let confidence = if has_confidence {
        Some(r.take(pixel_count)?.to_vec())
    } else {
        None
    };

    Ok(DepthFrame {
        uuid,
        timestamp,
        transform,
        intrinsics,
        width,
        height,
        depth,
        confidence,
    })
}
