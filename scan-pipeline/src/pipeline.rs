/// Pipeline orchestrator: codec, reconstruction, fusion, extraction.
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use capture_codec::{CaptureData, DecodeError, DepthFrame, TextureFrame};
use depth_fusion::extract::RgbImage;
use depth_fusion::{
    CameraIntrinsics, ConfidenceMap, DepthFusionEngine, DepthMap, ExtractedPointCloud,
    FusionConfig, FusionResult, FusionStats, PointCloudExtractor,
};

use crate::depth_writer;
use crate::mesh::{self, WorldMesh};
use crate::model::{ModelError, ModelHandle};
use crate::ply;
use crate::progress::ProgressSink;
use crate::summary::ScanSummary;

/// Default colour assigned to mesh-derived points without texture data.
const DEFAULT_POINT_COLOUR: [u8; 3] = [200, 200, 200];

/// Fatal pipeline failures.
///
/// Per-frame enhancement failures are not represented here; they are
/// isolated and counted in [`ScanStats`] instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The capture file could not be decoded. No partial output is kept.
    #[error("capture decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Reading the capture or writing an artefact failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Processing was cancelled; in-flight frames were allowed to finish.
    #[error("processing cancelled")]
    Cancelled,
}

/// Shared cancellation flag.
///
/// Cancelling stops the pipeline from issuing new frame work; frames
/// already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone, Copy)]
pub struct ScanConfig {
    /// Depth fusion configuration.
    pub fusion: FusionConfig,
    /// Point cloud extraction configuration.
    pub extractor: PointCloudExtractor,
    /// Overall confidence assigned to AI predictions.
    pub ai_confidence: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            fusion: FusionConfig::default(),
            extractor: PointCloudExtractor::default(),
            ai_confidence: 0.7,
        }
    }
}

/// Per-frame enhancement record kept for the summary.
#[derive(Debug, Clone, Serialize)]
pub struct FrameRecord {
    /// Index of the texture frame in stream order.
    pub frame_index: usize,
    /// Texture frame timestamp in seconds.
    pub timestamp: f64,
    /// Points extracted from this frame.
    pub points: usize,
    /// Fusion statistics, absent for LiDAR-only fallback frames.
    pub fusion: Option<FusionStats>,
}

/// Full fusion output retained for one enhanced frame.
///
/// Kept so `process_file` can persist the fused depth grids; frames that
/// fell back to LiDAR-only extraction have no entry here.
#[derive(Debug, Clone)]
pub struct FusedFrame {
    /// Index of the source texture frame in stream order.
    pub frame_index: usize,
    /// Fusion output for the frame.
    pub fusion: FusionResult,
}

/// Aggregate statistics for one processing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    /// Number of mesh anchors decoded.
    pub mesh_anchors: usize,
    /// Total vertices across all anchors.
    pub total_vertices: usize,
    /// Total faces across all anchors.
    pub total_faces: usize,
    /// Number of texture frames decoded.
    pub texture_frames: usize,
    /// Number of depth frames decoded.
    pub depth_frames: usize,
    /// Frames enhanced with fused AI depth.
    pub frames_enhanced: usize,
    /// Frames that fell back to LiDAR-only extraction.
    pub frames_lidar_only: usize,
    /// Frames skipped due to per-frame failures.
    pub frames_failed: usize,
    /// Total points in the enhanced cloud.
    pub enhanced_points: usize,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: f32,
}

/// Result bundle for one capture file.
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Merged world-space mesh.
    pub mesh: WorldMesh,
    /// Plain point cloud built from the mesh anchor vertices.
    pub base_cloud: ExtractedPointCloud,
    /// Fused point cloud from AI-enhanced depth, when any frame produced
    /// points.
    pub enhanced_cloud: Option<ExtractedPointCloud>,
    /// Per-frame enhancement records.
    pub frame_records: Vec<FrameRecord>,
    /// Retained fusion output per enhanced frame.
    pub fused_frames: Vec<FusedFrame>,
    /// Aggregate statistics.
    pub stats: ScanStats,
}

/// Outcome of enhancing one texture/depth frame pair.
enum FrameOutcome {
    Enhanced {
        cloud: ExtractedPointCloud,
        fusion: FusionResult,
    },
    LidarOnly {
        cloud: ExtractedPointCloud,
    },
    Failed,
    Skipped,
}

/// Sequences the full pipeline for one capture file.
///
/// The processor owns no per-run state; a single instance can process any
/// number of captures, reusing the shared model handle.
pub struct ScanProcessor {
    config: ScanConfig,
    model: ModelHandle,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelFlag,
}

impl ScanProcessor {
    /// Create a processor with the given collaborators.
    pub fn new(config: ScanConfig, model: ModelHandle, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            config,
            model,
            progress,
            cancel: CancelFlag::new(),
        }
    }

    /// Cancellation flag shared with callers.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Process a complete capture held in memory.
    pub fn process(&self, bytes: &[u8]) -> Result<ScanResult, PipelineError> {
        let start = Instant::now();

        self.progress.report(0.0, "parsing_raw", Some("Parsing raw capture"));
        let capture = capture_codec::decode(bytes)?;
        tracing::info!(
            meshes = capture.mesh_anchors.len(),
            textures = capture.texture_frames.len(),
            depth = capture.depth_frames.len(),
            "parsed capture"
        );

        self.progress
            .report(0.1, "reconstructing_mesh", Some("Reconstructing mesh"));
        let mesh = mesh::reconstruct(&capture.mesh_anchors);

        self.progress
            .report(0.2, "extracting_pointcloud", Some("Extracting point cloud"));
        let base_cloud = anchor_point_cloud(&mesh);

        self.progress
            .report(0.3, "processing_textures", Some("Preparing texture frames"));
        self.progress
            .report(0.4, "processing_depth", Some("Preparing depth frames"));
        self.progress
            .report(0.5, "ai_depth_enhancement", Some("Running depth enhancement"));
        let (clouds, frame_records, fused_frames, mut stats) = self.enhance_frames(&capture);

        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let enhanced_cloud = merge_clouds(clouds);
        stats.mesh_anchors = capture.mesh_anchors.len();
        stats.total_vertices = capture.total_vertices();
        stats.total_faces = capture.total_faces();
        stats.texture_frames = capture.texture_frames.len();
        stats.depth_frames = capture.depth_frames.len();
        stats.enhanced_points = enhanced_cloud.as_ref().map_or(0, |c| c.len());
        stats.processing_time_ms = start.elapsed().as_secs_f32() * 1000.0;

        self.progress
            .report(1.0, "complete", Some("Processing complete"));

        Ok(ScanResult {
            mesh,
            base_cloud,
            enhanced_cloud,
            frame_records,
            fused_frames,
            stats,
        })
    }

    /// Process a capture file and write all artefacts to `output_dir`.
    ///
    /// Writes `reconstructed_mesh.ply`, `pointcloud.ply`, `summary.json`,
    /// and, when any frame was enhanced, `enhanced_pointcloud.ply` plus one
    /// fused depth record per frame under `enhanced_depth/`.
    pub fn process_file(&self, input: &Path, output_dir: &Path) -> Result<ScanResult, PipelineError> {
        let bytes = std::fs::read(input)?;
        let result = self.process(&bytes)?;

        std::fs::create_dir_all(output_dir)?;
        ply::write_mesh(&output_dir.join("reconstructed_mesh.ply"), &result.mesh)?;
        ply::write_point_cloud(&output_dir.join("pointcloud.ply"), &result.base_cloud)?;
        if let Some(enhanced) = &result.enhanced_cloud {
            ply::write_point_cloud(&output_dir.join("enhanced_pointcloud.ply"), enhanced)?;
        }

        if !result.fused_frames.is_empty() {
            let depth_dir = output_dir.join("enhanced_depth");
            std::fs::create_dir_all(&depth_dir)?;
            for frame in &result.fused_frames {
                let name = format!("fused_{:04}.bin", frame.frame_index);
                depth_writer::write_fused_depth(&depth_dir.join(name), &frame.fusion)?;
            }
        }

        let summary = ScanSummary::from_result(&result);
        let summary_json = serde_json::to_string_pretty(&summary)
            .expect("summary serialization is infallible");
        std::fs::write(output_dir.join("summary.json"), summary_json)?;

        Ok(result)
    }

    /// Enhance every texture frame against its nearest depth frame.
    ///
    /// Frames are independent and processed in parallel on the rayon pool;
    /// a failing frame is recorded in the statistics and skipped, never
    /// fatal for the capture.
    fn enhance_frames(
        &self,
        capture: &CaptureData,
    ) -> (
        Vec<ExtractedPointCloud>,
        Vec<FrameRecord>,
        Vec<FusedFrame>,
        ScanStats,
    ) {
        let mut stats = ScanStats::default();
        if capture.texture_frames.is_empty() || capture.depth_frames.is_empty() {
            tracing::info!("no texture/depth pairs, skipping depth enhancement");
            return (Vec::new(), Vec::new(), Vec::new(), stats);
        }

        let total = capture.texture_frames.len();
        let done = AtomicUsize::new(0);
        // Bounded-frequency progress: at most ~20 reports over the loop.
        let report_every = (total / 20).max(1);

        let outcomes: Vec<(usize, f64, FrameOutcome)> = capture
            .texture_frames
            .par_iter()
            .enumerate()
            .map(|(index, texture)| {
                // Stop issuing new frame work once cancelled; frames that
                // already started run to completion.
                let outcome = if self.cancel.is_cancelled() {
                    FrameOutcome::Skipped
                } else {
                    let depth_frame = nearest_depth_frame(&capture.depth_frames, texture.timestamp);
                    self.enhance_frame(index, texture, depth_frame)
                };

                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                if finished % report_every == 0 {
                    let fraction = 0.5 + 0.45 * finished as f32 / total as f32;
                    self.progress.report(
                        fraction,
                        "ai_depth_enhancement",
                        Some(&format!("Frame {finished}/{total}")),
                    );
                }

                (index, texture.timestamp, outcome)
            })
            .collect();

        let mut clouds = Vec::new();
        let mut records = Vec::new();
        let mut fused_frames = Vec::new();
        for (index, timestamp, outcome) in outcomes {
            match outcome {
                FrameOutcome::Enhanced { cloud, fusion } => {
                    stats.frames_enhanced += 1;
                    records.push(FrameRecord {
                        frame_index: index,
                        timestamp,
                        points: cloud.len(),
                        fusion: Some(fusion.stats),
                    });
                    fused_frames.push(FusedFrame {
                        frame_index: index,
                        fusion,
                    });
                    clouds.push(cloud);
                }
                FrameOutcome::LidarOnly { cloud } => {
                    stats.frames_lidar_only += 1;
                    records.push(FrameRecord {
                        frame_index: index,
                        timestamp,
                        points: cloud.len(),
                        fusion: None,
                    });
                    clouds.push(cloud);
                }
                FrameOutcome::Failed => stats.frames_failed += 1,
                FrameOutcome::Skipped => {}
            }
        }

        (clouds, records, fused_frames, stats)
    }

    /// Enhance one texture frame against a depth frame.
    fn enhance_frame(
        &self,
        index: usize,
        texture: &TextureFrame,
        depth_frame: &DepthFrame,
    ) -> FrameOutcome {
        // A depth grid with no pixels cannot anchor calibration or fallback
        // extraction; isolate the frame instead of fusing against nothing.
        if depth_frame.depth.is_empty() {
            tracing::warn!(frame = index, "depth frame has zero pixels");
            return FrameOutcome::Failed;
        }

        let lidar = DepthMap::new(
            depth_frame.width as usize,
            depth_frame.height as usize,
            depth_frame.depth.clone(),
        );
        let lidar_confidence = depth_frame.confidence.as_ref().map(|c| {
            ConfidenceMap::new(
                depth_frame.width as usize,
                depth_frame.height as usize,
                c.clone(),
            )
        });

        // Decode the colour frame; HEIC and corrupt payloads land here.
        let rgb = match decode_rgb(texture) {
            Ok(rgb) => rgb,
            Err(err) => {
                tracing::warn!(frame = index, %err, "failed to decode texture frame");
                return FrameOutcome::Failed;
            }
        };

        match self.model.predict(&rgb) {
            Ok(ai_depth) => {
                let engine = DepthFusionEngine::new(self.config.fusion);
                let fusion = engine.fuse(
                    &lidar,
                    &ai_depth,
                    lidar_confidence.as_ref(),
                    self.config.ai_confidence,
                );
                let cloud = self.config.extractor.extract(
                    &fusion.fused_depth,
                    &fusion.confidence,
                    CameraIntrinsics::from_matrix(&texture.intrinsics),
                    Some(&texture.transform.0),
                    Some(&rgb),
                );
                tracing::debug!(
                    frame = index,
                    points = cloud.len(),
                    lidar_coverage = fusion.stats.lidar_coverage,
                    "frame enhanced"
                );
                FrameOutcome::Enhanced { cloud, fusion }
            }
            Err(ModelError::Unavailable) => {
                // Logged once by the handle. Fall back to the raw LiDAR
                // frame so the capture still yields a metric cloud.
                FrameOutcome::LidarOnly {
                    cloud: self.lidar_only_cloud(depth_frame, &lidar, lidar_confidence.as_ref()),
                }
            }
            Err(err) => {
                tracing::warn!(frame = index, %err, "depth prediction failed");
                FrameOutcome::Failed
            }
        }
    }

    /// Extract a point cloud from the raw LiDAR frame alone.
    fn lidar_only_cloud(
        &self,
        depth_frame: &DepthFrame,
        lidar: &DepthMap,
        confidence: Option<&ConfidenceMap>,
    ) -> ExtractedPointCloud {
        // Confidence tiers map to [0, 1]; absent tiers count as trusted.
        let confidence: Vec<f32> = match confidence {
            Some(tiers) => tiers.data.iter().map(|&t| t.min(2) as f32 / 2.0).collect(),
            None => vec![1.0; lidar.data.len()],
        };
        self.config.extractor.extract(
            lidar,
            &confidence,
            CameraIntrinsics::from_matrix(&depth_frame.intrinsics),
            Some(&depth_frame.transform.0),
            None,
        )
    }
}

/// Nearest depth frame by timestamp.
fn nearest_depth_frame(frames: &[DepthFrame], timestamp: f64) -> &DepthFrame {
    frames
        .iter()
        .min_by(|a, b| {
            let da = (a.timestamp - timestamp).abs();
            let db = (b.timestamp - timestamp).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("caller checked depth frames are non-empty")
}

/// Plain point cloud from the merged mesh vertices.
fn anchor_point_cloud(mesh: &WorldMesh) -> ExtractedPointCloud {
    ExtractedPointCloud {
        positions: mesh.positions.clone(),
        colors: Some(vec![DEFAULT_POINT_COLOUR; mesh.positions.len()]),
        normals: Some(mesh.normals.clone()),
    }
}

/// Concatenate per-frame clouds into one, keeping array pairing.
///
/// Colour and normal arrays are kept only when every contributing cloud
/// has them, so the merged arrays stay the same length as the positions.
fn merge_clouds(clouds: Vec<ExtractedPointCloud>) -> Option<ExtractedPointCloud> {
    let clouds: Vec<_> = clouds.into_iter().filter(|c| !c.is_empty()).collect();
    if clouds.is_empty() {
        return None;
    }

    let all_colors = clouds.iter().all(|c| c.colors.is_some());
    let all_normals = clouds.iter().all(|c| c.normals.is_some());

    let mut merged = ExtractedPointCloud {
        positions: Vec::new(),
        colors: all_colors.then(Vec::new),
        normals: all_normals.then(Vec::new),
    };
    for cloud in clouds {
        merged.positions.extend(cloud.positions);
        if let (Some(into), Some(from)) = (merged.colors.as_mut(), cloud.colors) {
            into.extend(from);
        }
        if let (Some(into), Some(from)) = (merged.normals.as_mut(), cloud.normals) {
            into.extend(from);
        }
    }
    Some(merged)
}

/// Decode a texture frame payload into packed RGB bytes.
fn decode_rgb(texture: &TextureFrame) -> Result<RgbImage, image::ImageError> {
    let decoded = image::load_from_memory(&texture.image_data)?;
    let rgb = decoded.to_rgb8();
    Ok(RgbImage {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
        data: rgb.into_raw(),
    })
}
