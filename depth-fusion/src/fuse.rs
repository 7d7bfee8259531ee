/// Weighted fusion of LiDAR and calibrated AI depth maps.
use std::time::Instant;

use serde::Serialize;

use crate::calibrate::DepthCalibrator;
use crate::edges::edge_magnitude;
use crate::grid::{ConfidenceMap, DepthMap};

/// Fusion engine configuration.
///
/// The engine holds no mutable state between calls; every `fuse` is a pure
/// function of its inputs and this configuration.
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// Blend weight for LiDAR depth where it is valid.
    pub weight_lidar: f32,
    /// Blend weight for AI depth where LiDAR is valid.
    pub weight_ai: f32,
    /// Minimum valid depth in metres.
    pub min_depth: f32,
    /// Maximum valid depth in metres.
    pub max_depth: f32,
    /// Whether to compute the edge-magnitude map.
    pub detect_edges: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weight_lidar: 0.8,
            weight_ai: 0.2,
            min_depth: 0.1,
            max_depth: 5.0,
            detect_edges: true,
        }
    }
}

/// Statistics from one fusion run.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FusionStats {
    /// Fraction of output pixels covered by valid LiDAR.
    pub lidar_coverage: f32,
    /// Fraction of output pixels filled by AI depth alone.
    pub ai_contribution: f32,
    /// Number of strong edge pixels (magnitude > 128).
    pub edge_pixels: usize,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: f32,
}

/// Result of fusing one LiDAR/AI depth pair.
#[derive(Debug, Clone)]
pub struct FusionResult {
    /// Fused metric depth at the AI map's resolution.
    pub fused_depth: DepthMap,
    /// Per-pixel confidence in [0, 1], same resolution.
    pub confidence: Vec<f32>,
    /// Optional edge magnitude map (0-255).
    pub edge_map: Option<Vec<u8>>,
    /// Source LiDAR resolution (width, height).
    pub lidar_resolution: (usize, usize),
    /// Output resolution (width, height).
    pub output_resolution: (usize, usize),
    /// Run statistics.
    pub stats: FusionStats,
}

/// Blends LiDAR and calibrated AI depth into one depth+confidence map.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthFusionEngine {
    /// Blend configuration.
    pub config: FusionConfig,
}

impl DepthFusionEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Calibrator matching this engine's depth bounds.
    fn calibrator(&self) -> DepthCalibrator {
        DepthCalibrator {
            min_depth: self.config.min_depth,
            max_depth: self.config.max_depth,
            ..DepthCalibrator::default()
        }
    }

    /// Fuse a LiDAR depth map with an AI depth map.
    ///
    /// The AI map may be relative (max value <= 1.5) or already metric; a
    /// relative map is calibrated against the LiDAR reference first. The
    /// output is at the AI map's resolution.
    pub fn fuse(
        &self,
        lidar: &DepthMap,
        ai: &DepthMap,
        lidar_confidence: Option<&ConfidenceMap>,
        ai_confidence: f32,
    ) -> FusionResult {
        let start = Instant::now();
        let cfg = &self.config;
        let calibrator = self.calibrator();

        let lidar_resolution = (lidar.width, lidar.height);
        let output_resolution = (ai.width, ai.height);

        // 1-2. Align LiDAR to the output resolution and mask valid pixels.
        let (lidar_aligned, mask) =
            calibrator.validity_mask(lidar, lidar_confidence, ai.width, ai.height);
        let valid_count = mask.iter().filter(|&&m| m).count();
        let lidar_coverage = valid_count as f32 / mask.len() as f32;

        // 3. Calibrate relative AI depth to metric when possible. A relative
        // map that cannot be calibrated passes through with its confidence
        // knocked down to the fixed fallback.
        let ai_is_relative = ai.max_value() <= 1.5;
        let mut effective_ai_confidence = ai_confidence;
        let ai_metric = if ai_is_relative {
            if valid_count > calibrator.min_samples {
                match calibrator.fit(ai, &lidar_aligned, &mask) {
                    Ok(calibration) => calibrator.apply(&calibration, ai),
                    Err(err) => {
                        tracing::warn!(%err, "calibration failed, using mean-ratio scaling");
                        calibrator.mean_ratio_scale(ai, &lidar_aligned, &mask)
                    }
                }
            } else {
                effective_ai_confidence =
                    ai_confidence.min(DepthCalibrator::FALLBACK_CONFIDENCE);
                ai.clone()
            }
        } else {
            ai.clone()
        };

        // 4-5. Normalised per-pixel blend and clip to the metric range.
        let mut fused = Vec::with_capacity(mask.len());
        for i in 0..mask.len() {
            let (wl, wa) = if mask[i] {
                (cfg.weight_lidar, cfg.weight_ai)
            } else {
                (0.0, 1.0)
            };
            let total = wl + wa + 1e-6;
            let value = (wl * lidar_aligned.data[i] + wa * ai_metric.data[i]) / total;
            fused.push(value.clamp(cfg.min_depth, cfg.max_depth));
        }
        let fused_depth = DepthMap {
            width: ai.width,
            height: ai.height,
            data: fused,
        };

        // 6. Confidence: trusted where LiDAR agrees, discounted elsewhere.
        let confidence =
            self.confidence_map(&lidar_aligned, &ai_metric, &mask, effective_ai_confidence);

        // 7. Optional edge map for boundary-aware sampling downstream.
        let (edge_map, edge_pixels) = if cfg.detect_edges {
            let edges = edge_magnitude(&fused_depth);
            let strong = edges.iter().filter(|&&e| e > 128).count();
            (Some(edges), strong)
        } else {
            (None, 0)
        };

        FusionResult {
            fused_depth,
            confidence,
            edge_map,
            lidar_resolution,
            output_resolution,
            stats: FusionStats {
                lidar_coverage,
                ai_contribution: 1.0 - lidar_coverage,
                edge_pixels,
                processing_time_ms: start.elapsed().as_secs_f32() * 1000.0,
            },
        }
    }

    /// Per-pixel confidence map.
    ///
    /// Base 0.9 where LiDAR is valid, `ai_confidence * 0.7` elsewhere, then
    /// a disagreement penalty of `clamp(2|l - a| / l, 0, 0.5)` wherever
    /// LiDAR is valid. Final values clamped to [0, 1].
    fn confidence_map(
        &self,
        lidar: &DepthMap,
        ai: &DepthMap,
        mask: &[bool],
        ai_confidence: f32,
    ) -> Vec<f32> {
        mask.iter()
            .enumerate()
            .map(|(i, &valid)| {
                let base = if valid { 0.9 } else { ai_confidence * 0.7 };
                let value = if valid {
                    let l = lidar.data[i];
                    let relative_diff = (l - ai.data[i]).abs() / (l + 1e-6);
                    base - (relative_diff * 2.0).clamp(0.0, 0.5)
                } else {
                    base
                };
                value.clamp(0.0, 1.0)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relative_scene(w: usize, h: usize, scale: f32, offset: f32) -> (DepthMap, DepthMap) {
        let mut relative = Vec::with_capacity(w * h);
        let mut lidar = Vec::with_capacity(w * h);
        for i in 0..w * h {
            let rel = 0.1 + 0.7 * (i as f32 / (w * h) as f32);
            relative.push(rel);
            lidar.push(1.0 / (scale * rel + offset));
        }
        (DepthMap::new(w, h, relative), DepthMap::new(w, h, lidar))
    }

    #[test]
    fn fused_depth_stays_in_metric_range() {
        let (relative, lidar) = relative_scene(16, 16, 1.0, 0.3);
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &relative, None, 0.7);
        let cfg = engine.config;
        assert!(result
            .fused_depth
            .data
            .iter()
            .all(|&d| d >= cfg.min_depth && d <= cfg.max_depth));
    }

    #[test]
    fn confidence_always_within_unit_interval() {
        // Arbitrary finite inputs, including wild disagreement.
        let lidar = DepthMap::new(8, 8, (0..64).map(|i| (i % 7) as f32).collect());
        let ai = DepthMap::new(8, 8, (0..64).map(|i| (63 - i) as f32 * 10.0).collect());
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &ai, None, 0.95);
        assert!(result.confidence.iter().all(|&c| (0.0..=1.0).contains(&c)));
    }

    #[test]
    fn lidar_dominates_where_valid() {
        let (relative, lidar) = relative_scene(32, 32, 1.0, 0.25);
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &relative, None, 0.7);
        // With noiseless calibration, fused depth equals LiDAR everywhere
        // LiDAR is valid, regardless of the weight split.
        for (f, l) in result.fused_depth.data.iter().zip(&lidar.data) {
            assert!((f - l).abs() < 0.05, "fused {f} vs lidar {l}");
        }
        assert!(result.stats.lidar_coverage > 0.99);
        assert!(result.stats.ai_contribution < 0.01);
    }

    #[test]
    fn invalid_lidar_falls_back_to_ai_only() {
        // LiDAR entirely out of range: metric AI input passes through.
        let lidar = DepthMap::filled(8, 8, 50.0);
        let ai = DepthMap::filled(8, 8, 3.0);
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &ai, None, 0.6);
        assert!(result.fused_depth.data.iter().all(|&d| (d - 3.0).abs() < 1e-4));
        assert_eq!(result.stats.lidar_coverage, 0.0);
        // Confidence is the discounted AI confidence everywhere.
        assert!(result
            .confidence
            .iter()
            .all(|&c| (c - 0.6 * 0.7).abs() < 1e-6));
    }

    #[test]
    fn confidence_tiers_gate_lidar_validity() {
        let (relative, lidar) = relative_scene(16, 16, 1.0, 0.3);
        let tiers = ConfidenceMap::new(16, 16, vec![0u8; 256]);
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &relative, Some(&tiers), 0.7);
        assert_eq!(result.stats.lidar_coverage, 0.0);
    }

    #[test]
    fn uncalibratable_relative_map_drops_to_fallback_confidence() {
        // Relative AI depth with no valid LiDAR reference at all.
        let lidar = DepthMap::filled(8, 8, 100.0);
        let ai = DepthMap::filled(8, 8, 0.5);
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &ai, None, 0.9);
        let expected = DepthCalibrator::FALLBACK_CONFIDENCE * 0.7;
        assert!(result
            .confidence
            .iter()
            .all(|&c| (c - expected).abs() < 1e-6));
    }

    #[test]
    fn edge_map_toggle() {
        let (relative, lidar) = relative_scene(8, 8, 1.0, 0.3);
        let engine = DepthFusionEngine::new(FusionConfig {
            detect_edges: false,
            ..FusionConfig::default()
        });
        let result = engine.fuse(&lidar, &relative, None, 0.7);
        assert!(result.edge_map.is_none());
        assert_eq!(result.stats.edge_pixels, 0);
    }

    #[test]
    fn resolutions_are_recorded() {
        let lidar = DepthMap::filled(4, 3, 2.0);
        let ai = DepthMap::filled(8, 6, 0.5);
        let engine = DepthFusionEngine::default();
        let result = engine.fuse(&lidar, &ai, None, 0.7);
        assert_eq!(result.lidar_resolution, (4, 3));
        assert_eq!(result.output_resolution, (8, 6));
        assert_eq!(result.fused_depth.width, 8);
        assert_eq!(result.fused_depth.height, 6);
    }
}
