/// Capture processing command line entry point.
use std::path::Path;
use std::sync::Arc;

use scan_pipeline::progress::BarSink;
use scan_pipeline::{ModelHandle, ScanConfig, ScanProcessor};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <capture.lraw> <output_dir>", args[0]);
        std::process::exit(1);
    }

    let input = Path::new(&args[1]);
    let output_dir = Path::new(&args[2]);

    let bar = Arc::new(BarSink::new());
    // No depth model backend ships with the CLI; frames fall back to
    // LiDAR-only extraction.
    let processor = ScanProcessor::new(ScanConfig::default(), ModelHandle::unavailable(), bar.clone());

    let result = processor.process_file(input, output_dir)?;
    bar.finish("done");

    println!("Processed {}", input.display());
    println!(
        "  mesh: {} vertices, {} faces ({} anchors)",
        result.mesh.vertex_count(),
        result.mesh.face_count(),
        result.stats.mesh_anchors
    );
    println!("  base point cloud: {} points", result.base_cloud.len());
    match &result.enhanced_cloud {
        Some(cloud) => println!(
            "  enhanced point cloud: {} points ({} frames enhanced, {} LiDAR-only, {} failed)",
            cloud.len(),
            result.stats.frames_enhanced,
            result.stats.frames_lidar_only,
            result.stats.frames_failed
        ),
        None => println!("  enhanced point cloud: none"),
    }
    println!(
        "  finished in {:.1} ms, artefacts in {}",
        result.stats.processing_time_ms,
        output_dir.display()
    );

    Ok(())
}
