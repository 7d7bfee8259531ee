/// ASCII PLY writers for meshes and point clouds.
///
/// ASCII keeps the artefacts inspectable in any viewer or text editor;
/// these files are debugging and hand-off outputs, not a storage format.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use depth_fusion::ExtractedPointCloud;

use crate::mesh::WorldMesh;

/// Write a mesh with per-vertex normals and triangle faces.
pub fn write_mesh(path: &Path, mesh: &WorldMesh) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);

    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", mesh.vertex_count())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    writeln!(out, "property float nx")?;
    writeln!(out, "property float ny")?;
    writeln!(out, "property float nz")?;
    writeln!(out, "element face {}", mesh.face_count())?;
    writeln!(out, "property list uchar int vertex_indices")?;
    writeln!(out, "end_header")?;

    for (p, n) in mesh.positions.iter().zip(&mesh.normals) {
        writeln!(out, "{} {} {} {} {} {}", p[0], p[1], p[2], n[0], n[1], n[2])?;
    }
    for f in &mesh.faces {
        writeln!(out, "3 {} {} {}", f[0], f[1], f[2])?;
    }

    out.flush()
}

/// Write a point cloud; colour and normal properties are emitted only
/// when the cloud carries them.
pub fn write_point_cloud(path: &Path, cloud: &ExtractedPointCloud) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let colors = cloud.colors.as_deref();
    let normals = cloud.normals.as_deref();

    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", cloud.len())?;
    writeln!(out, "property float x")?;
    writeln!(out, "property float y")?;
    writeln!(out, "property float z")?;
    if normals.is_some() {
        writeln!(out, "property float nx")?;
        writeln!(out, "property float ny")?;
        writeln!(out, "property float nz")?;
    }
    if colors.is_some() {
        writeln!(out, "property uchar red")?;
        writeln!(out, "property uchar green")?;
        writeln!(out, "property uchar blue")?;
    }
    writeln!(out, "end_header")?;

    for (i, p) in cloud.positions.iter().enumerate() {
        write!(out, "{} {} {}", p[0], p[1], p[2])?;
        if let Some(normals) = normals {
            let n = normals[i];
            write!(out, " {} {} {}", n[0], n[1], n[2])?;
        }
        if let Some(colors) = colors {
            let c = colors[i];
            write!(out, " {} {} {}", c[0], c[1], c[2])?;
        }
        writeln!(out)?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn mesh_header_counts_match_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        let mesh = WorldMesh {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            faces: vec![[0, 1, 2]],
        };
        write_mesh(&path, &mesh).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines[0], "ply");
        assert!(lines.contains(&"element vertex 3".to_string()));
        assert!(lines.contains(&"element face 1".to_string()));
        assert_eq!(lines.last().unwrap(), "3 0 1 2");
    }

    #[test]
    fn cloud_without_colours_omits_colour_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.ply");
        let cloud = ExtractedPointCloud {
            positions: vec![[1.0, 2.0, 3.0]],
            colors: None,
            normals: None,
        };
        write_point_cloud(&path, &cloud).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("property uchar red"));
        assert!(!text.contains("property float nx"));
        assert!(text.contains("element vertex 1"));
        assert!(text.ends_with("1 2 3\n"));
    }

    #[test]
    fn cloud_with_colours_and_normals_writes_all_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("full.ply");
        let cloud = ExtractedPointCloud {
            positions: vec![[0.0, 0.0, 2.0]],
            colors: Some(vec![[10, 20, 30]]),
            normals: Some(vec![[0.0, 0.0, 1.0]]),
        };
        write_point_cloud(&path, &cloud).unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.last().unwrap(), "0 0 2 0 0 1 10 20 30");
    }
}
