/// JSON run summary written next to the PLY artefacts.
use serde::Serialize;

use crate::pipeline::{FrameRecord, ScanResult, ScanStats};

/// Serializable summary of one processing run.
///
/// This is the machine-readable companion to the PLY files; downstream
/// tooling reads it to decide whether the enhanced cloud is worth loading.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Summary schema version.
    pub version: u32,
    /// Aggregate statistics.
    pub stats: ScanStats,
    /// Vertex count of the merged mesh.
    pub mesh_vertices: usize,
    /// Face count of the merged mesh.
    pub mesh_faces: usize,
    /// Point count of the base (mesh-derived) cloud.
    pub base_points: usize,
    /// Point count of the enhanced cloud, when one was produced.
    pub enhanced_points: Option<usize>,
    /// Per-frame enhancement records.
    pub frames: Vec<FrameRecord>,
}

impl ScanSummary {
    /// Current schema version.
    pub const VERSION: u32 = 1;

    /// Build a summary from a finished run.
    pub fn from_result(result: &ScanResult) -> Self {
        Self {
            version: Self::VERSION,
            stats: result.stats.clone(),
            mesh_vertices: result.mesh.vertex_count(),
            mesh_faces: result.mesh.face_count(),
            base_points: result.base_cloud.len(),
            enhanced_points: result.enhanced_cloud.as_ref().map(|c| c.len()),
            frames: result.frame_records.clone(),
        }
    }
}
