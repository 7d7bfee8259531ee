/// Bit-exact encoder for the LRAW capture format.
///
/// The capturing device is the canonical writer; this encoder mirrors its
/// layout so synthetic captures can be constructed for tests and tooling,
/// and so `decode(encode(x)) == x` holds for every well-formed capture.
use crate::decode::MAGIC;
use crate::types::{CaptureData, DepthFrame, MeshAnchor, TextureFrame, Transform};

/// Encode a capture into the sequential binary layout.
///
/// Counts in the header are taken from the record vectors, not from the
/// header struct, so an encoded capture is always self-consistent.
pub fn encode(capture: &CaptureData) -> Vec<u8> {
    let mut out = Vec::new();

    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&capture.header.version.to_le_bytes());
    out.extend_from_slice(&capture.header.flags.0.to_le_bytes());
    out.extend_from_slice(&(capture.mesh_anchors.len() as u32).to_le_bytes());
    out.extend_from_slice(&(capture.texture_frames.len() as u32).to_le_bytes());
    out.extend_from_slice(&(capture.depth_frames.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 12]);

    let has_classifications = capture.header.flags.has_classifications();
    let has_confidence = capture.header.flags.has_confidence_maps();

    for anchor in &capture.mesh_anchors {
        encode_mesh_anchor(&mut out, anchor, has_classifications);
    }
    for frame in &capture.texture_frames {
        encode_texture_frame(&mut out, frame);
    }
    for frame in &capture.depth_frames {
        encode_depth_frame(&mut out, frame, has_confidence);
    }

    out
}

fn encode_transform(out: &mut Vec<u8>, transform: &Transform) {
    for value in transform.0 {
        out.extend_from_slice(&value.to_le_bytes());
    }
}

fn encode_mesh_anchor(out: &mut Vec<u8>, anchor: &MeshAnchor, file_has_classifications: bool) {
    out.extend_from_slice(&anchor.uuid);
    encode_transform(out, &anchor.transform);
    out.extend_from_slice(&(anchor.vertices.len() as u32).to_le_bytes());
    out.extend_from_slice(&(anchor.faces.len() as u32).to_le_bytes());

    let write_class = file_has_classifications && anchor.classifications.is_some();
    out.push(write_class as u8);

    for v in &anchor.vertices {
        for c in v {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
    for n in &anchor.normals {
        for c in n {
            out.extend_from_slice(&c.to_le_bytes());
        }
    }
    for f in &anchor.faces {
        for i in f {
            out.extend_from_slice(&i.to_le_bytes());
        }
    }
    if write_class {
        if let Some(classes) = &anchor.classifications {
            out.extend_from_slice(classes);
        }
    }
}

fn encode_texture_frame(out: &mut Vec<u8>, frame: &TextureFrame) {
    out.extend_from_slice(&frame.uuid);
    out.extend_from_slice(&frame.timestamp.to_le_bytes());
    encode_transform(out, &frame.transform);
    for value in frame.intrinsics {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&frame.width.to_le_bytes());
    out.extend_from_slice(&frame.height.to_le_bytes());
    out.extend_from_slice(&(frame.image_data.len() as u32).to_le_bytes());
    out.extend_from_slice(&frame.image_data);
}

fn encode_depth_frame(out: &mut Vec<u8>, frame: &DepthFrame, file_has_confidence: bool) {
    out.extend_from_slice(&frame.uuid);
    out.extend_from_slice(&frame.timestamp.to_le_bytes());
    encode_transform(out, &frame.transform);
    for value in frame.intrinsics {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out.extend_from_slice(&frame.width.to_le_bytes());
    out.extend_from_slice(&frame.height.to_le_bytes());
    for d in &frame.depth {
        out.extend_from_slice(&d.to_le_bytes());
    }
    if file_has_confidence {
        if let Some(confidence) = &frame.confidence {
            out.extend_from_slice(confidence);
        }
    }
}
