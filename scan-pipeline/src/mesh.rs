/// World-space mesh reconstruction from decoded mesh anchors.
use capture_codec::MeshAnchor;

/// A single merged mesh in world space.
#[derive(Debug, Clone, Default)]
pub struct WorldMesh {
    /// World-space vertex positions.
    pub positions: Vec<[f32; 3]>,
    /// World-space unit normals, one per vertex.
    pub normals: Vec<[f32; 3]>,
    /// Triangle faces as indices into the merged vertex buffer.
    pub faces: Vec<[u32; 3]>,
}

impl WorldMesh {
    /// Number of vertices in the merged mesh.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of faces in the merged mesh.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

/// Merge all anchors into one world-space mesh.
///
/// Each anchor's vertices are moved through its 4x4 transform (homogeneous,
/// w = 1) and its normals through the upper-left 3x3 rotation block only.
/// Face indices are offset by the running vertex count so they stay valid in
/// the merged buffer. Anchor order is preserved and overlapping anchors are
/// not deduplicated at this stage.
pub fn reconstruct(anchors: &[MeshAnchor]) -> WorldMesh {
    let total_vertices: usize = anchors.iter().map(|a| a.vertices.len()).sum();
    let total_faces: usize = anchors.iter().map(|a| a.faces.len()).sum();

    let mut mesh = WorldMesh {
        positions: Vec::with_capacity(total_vertices),
        normals: Vec::with_capacity(total_vertices),
        faces: Vec::with_capacity(total_faces),
    };

    let mut vertex_offset = 0u32;
    for anchor in anchors {
        for &v in &anchor.vertices {
            mesh.positions.push(anchor.transform.apply_point(v));
        }
        for &n in &anchor.normals {
            mesh.normals.push(anchor.transform.apply_direction(n));
        }
        for &[a, b, c] in &anchor.faces {
            mesh.faces
                .push([a + vertex_offset, b + vertex_offset, c + vertex_offset]);
        }
        vertex_offset += anchor.vertices.len() as u32;
    }

    mesh
}
