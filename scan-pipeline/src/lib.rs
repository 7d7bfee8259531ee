/// Capture processing pipeline.
///
/// Sequences the capture codec, mesh reconstruction, depth fusion, and
/// point-cloud extraction over one capture file, with parallel per-frame
/// AI enhancement, progress reporting, and cancellation.
pub mod depth_writer;
pub mod mesh;
pub mod model;
pub mod pipeline;
pub mod ply;
pub mod progress;
pub mod summary;

pub use mesh::{WorldMesh, reconstruct};
pub use model::{DepthEstimator, ModelError, ModelHandle};
pub use pipeline::{
    CancelFlag, FrameRecord, FusedFrame, PipelineError, ScanConfig, ScanProcessor, ScanResult,
    ScanStats,
};
pub use progress::{CallbackSink, NullSink, ProgressSink};
pub use summary::ScanSummary;
