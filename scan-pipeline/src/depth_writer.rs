/// Binary writer for per-frame fused depth records.
///
/// Each enhanced frame is dumped as a compact little-endian grid file so
/// downstream tooling can reload the fused depth and confidence without
/// re-running the pipeline.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use depth_fusion::FusionResult;

/// Magic signature at the start of every fused depth record.
pub const MAGIC: [u8; 4] = *b"FDEP";

/// Write one fused depth record.
///
/// Layout: magic, width u32, height u32, edge-map flag u8, then the
/// row-major fused depth grid (f32), the confidence grid (f32), and the
/// edge magnitude bytes when the flag is set. All numeric fields are
/// little-endian.
pub fn write_fused_depth(path: &Path, fusion: &FusionResult) -> std::io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    let (width, height) = fusion.output_resolution;

    out.write_all(&MAGIC)?;
    out.write_all(&(width as u32).to_le_bytes())?;
    out.write_all(&(height as u32).to_le_bytes())?;
    out.write_all(&[fusion.edge_map.is_some() as u8])?;

    for &d in &fusion.fused_depth.data {
        out.write_all(&d.to_le_bytes())?;
    }
    for &c in &fusion.confidence {
        out.write_all(&c.to_le_bytes())?;
    }
    if let Some(edges) = &fusion.edge_map {
        out.write_all(edges)?;
    }

    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use depth_fusion::{DepthMap, FusionStats};

    #[test]
    fn record_layout_is_self_describing() {
        let fusion = FusionResult {
            fused_depth: DepthMap::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]),
            confidence: vec![0.9; 4],
            edge_map: Some(vec![0, 255, 0, 0]),
            lidar_resolution: (2, 2),
            output_resolution: (2, 2),
            stats: FusionStats {
                lidar_coverage: 1.0,
                ai_contribution: 0.0,
                edge_pixels: 1,
                processing_time_ms: 0.0,
            },
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fused_0000.bin");
        write_fused_depth(&path, &fusion).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"FDEP");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 2);
        assert_eq!(bytes[12], 1);
        // Header, 4 depth f32s, 4 confidence f32s, 4 edge bytes.
        assert_eq!(bytes.len(), 13 + 16 + 16 + 4);
        assert_eq!(f32::from_le_bytes(bytes[13..17].try_into().unwrap()), 1.0);
    }

    #[test]
    fn edge_flag_clear_omits_edge_bytes() {
        let fusion = FusionResult {
            fused_depth: DepthMap::filled(3, 1, 2.0),
            confidence: vec![0.5; 3],
            edge_map: None,
            lidar_resolution: (3, 1),
            output_resolution: (3, 1),
            stats: FusionStats {
                lidar_coverage: 0.0,
                ai_contribution: 1.0,
                edge_pixels: 0,
                processing_time_ms: 0.0,
            },
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fused_0001.bin");
        write_fused_depth(&path, &fusion).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[12], 0);
        assert_eq!(bytes.len(), 13 + 12 + 12);
    }
}
