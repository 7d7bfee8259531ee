/// LiDAR / AI depth fusion and point-cloud extraction.
///
/// Combines the metric accuracy of a sparse-coverage LiDAR depth map with
/// the dense completeness of a monocular depth estimate, producing a single
/// calibrated depth+confidence map and a bounded point cloud with normals.
pub mod calibrate;
pub mod edges;
pub mod extract;
pub mod fuse;
pub mod grid;

pub use calibrate::{Calibration, CalibrationError, DepthCalibrator};
pub use extract::{CameraIntrinsics, ExtractedPointCloud, PointCloudExtractor};
pub use fuse::{DepthFusionEngine, FusionConfig, FusionResult, FusionStats};
pub use grid::{ConfidenceMap, DepthMap};
