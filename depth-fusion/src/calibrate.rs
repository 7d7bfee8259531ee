/// Metric calibration of relative AI depth against sparse LiDAR reference.
use crate::grid::{ConfidenceMap, DepthMap};

/// Calibration failure modes.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// Fewer valid reference pixels than the configured minimum.
    ///
    /// Callers fall back to relative depth only and report the fixed low
    /// confidence [`DepthCalibrator::FALLBACK_CONFIDENCE`].
    #[error("insufficient LiDAR reference for calibration: {valid} valid pixels")]
    Insufficient {
        /// Number of valid calibration pixels found.
        valid: usize,
    },
}

/// A fitted affine transform of inverse depth.
///
/// The AI estimator is correct up to `1/metric = scale * relative + offset`;
/// this struct holds the recovered parameters and the fit quality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Fitted scale of the inverse-depth relation.
    pub scale: f32,
    /// Fitted offset of the inverse-depth relation.
    pub offset: f32,
    /// Confidence derived from the fit residual, in [0, 1].
    pub confidence: f32,
}

/// Fits a metric-depth calibration from LiDAR depth to a relative AI map.
#[derive(Debug, Clone, Copy)]
pub struct DepthCalibrator {
    /// Minimum valid LiDAR depth in metres.
    pub min_depth: f32,
    /// Maximum valid LiDAR depth in metres.
    pub max_depth: f32,
    /// Minimum confidence tier a LiDAR pixel must reach to count.
    pub min_confidence_tier: u8,
    /// Minimum number of valid pixels required for a fit.
    pub min_samples: usize,
}

impl Default for DepthCalibrator {
    fn default() -> Self {
        Self {
            min_depth: 0.1,
            max_depth: 5.0,
            min_confidence_tier: 1,
            min_samples: 100,
        }
    }
}

impl DepthCalibrator {
    /// Confidence reported when calibration is impossible and callers fall
    /// back to relative depth.
    pub const FALLBACK_CONFIDENCE: f32 = 0.3;

    /// Build the per-pixel validity mask at the AI map's resolution.
    ///
    /// LiDAR depth is aligned bilinearly, confidence tiers with nearest
    /// neighbour. A pixel is valid when its depth lies strictly inside the
    /// configured metric range and its tier reaches the minimum.
    pub fn validity_mask(
        &self,
        lidar: &DepthMap,
        confidence: Option<&ConfidenceMap>,
        width: usize,
        height: usize,
    ) -> (DepthMap, Vec<bool>) {
        let aligned = lidar.resize_bilinear(width, height);
        let tiers = confidence.map(|c| c.resize_nearest(width, height));

        let mask = aligned
            .data
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let in_range = d > self.min_depth && d < self.max_depth;
                let confident = tiers
                    .as_ref()
                    .map_or(true, |t| t.data[i] >= self.min_confidence_tier);
                in_range && confident
            })
            .collect();

        (aligned, mask)
    }

    /// Fit `1/lidar = scale * relative + offset` over valid pixels.
    ///
    /// Ordinary least squares with closed-form 2x2 normal equations. Fails
    /// with [`CalibrationError::Insufficient`] below `min_samples` valid
    /// pixels.
    pub fn fit(
        &self,
        ai_relative: &DepthMap,
        lidar_aligned: &DepthMap,
        mask: &[bool],
    ) -> Result<Calibration, CalibrationError> {
        let valid = mask.iter().filter(|&&m| m).count();
        if valid < self.min_samples {
            return Err(CalibrationError::Insufficient { valid });
        }

        // Accumulate normal equations for y = a*x + b with
        // x = relative depth, y = inverse LiDAR depth.
        let mut sum_x = 0.0f64;
        let mut sum_y = 0.0f64;
        let mut sum_xx = 0.0f64;
        let mut sum_xy = 0.0f64;
        let n = valid as f64;

        for (i, &m) in mask.iter().enumerate() {
            if !m {
                continue;
            }
            let x = ai_relative.data[i] as f64;
            let y = 1.0 / (lidar_aligned.data[i] as f64 + 1e-6);
            sum_x += x;
            sum_y += y;
            sum_xx += x * x;
            sum_xy += x * y;
        }

        let denom = n * sum_xx - sum_x * sum_x;
        if denom.abs() < 1e-12 {
            // Degenerate: the relative map is constant over the mask, so no
            // slope can be recovered.
            return Err(CalibrationError::Insufficient { valid });
        }
        let scale = (n * sum_xy - sum_x * sum_y) / denom;
        let offset = (sum_y - scale * sum_x) / n;

        // Residual RMSE of the inverse-depth fit drives the confidence.
        let mut sq_err = 0.0f64;
        for (i, &m) in mask.iter().enumerate() {
            if !m {
                continue;
            }
            let x = ai_relative.data[i] as f64;
            let y = 1.0 / (lidar_aligned.data[i] as f64 + 1e-6);
            let r = y - (scale * x + offset);
            sq_err += r * r;
        }
        let rmse = (sq_err / n).sqrt();
        let confidence = (1.0 - 2.0 * rmse).clamp(0.0, 1.0) as f32;

        tracing::debug!(
            scale,
            offset,
            rmse,
            confidence,
            valid,
            "fitted depth calibration"
        );

        Ok(Calibration {
            scale: scale as f32,
            offset: offset as f32,
            confidence,
        })
    }

    /// Apply a fitted calibration to a relative depth map.
    ///
    /// Output is clipped to `[min_depth, 2 * max_depth]`. The asymmetric
    /// upper bound is intentional: it suppresses blow-up near a zero
    /// denominator while still allowing the AI map to extend past the
    /// LiDAR's rated range.
    pub fn apply(&self, calibration: &Calibration, ai_relative: &DepthMap) -> DepthMap {
        let data = ai_relative
            .data
            .iter()
            .map(|&rel| {
                let metric = 1.0 / (calibration.scale * rel + calibration.offset + 1e-6);
                metric.clamp(self.min_depth, self.max_depth * 2.0)
            })
            .collect();
        DepthMap {
            width: ai_relative.width,
            height: ai_relative.height,
            data,
        }
    }

    /// Calibrate a relative map against LiDAR in one step.
    pub fn calibrate(
        &self,
        ai_relative: &DepthMap,
        lidar: &DepthMap,
        lidar_confidence: Option<&ConfidenceMap>,
    ) -> Result<(DepthMap, Calibration), CalibrationError> {
        let (aligned, mask) =
            self.validity_mask(lidar, lidar_confidence, ai_relative.width, ai_relative.height);
        let calibration = self.fit(ai_relative, &aligned, &mask)?;
        Ok((self.apply(&calibration, ai_relative), calibration))
    }

    /// Mean-ratio fallback scaling when the least-squares fit cannot run.
    ///
    /// Scales the relative map so its mean matches the mean valid LiDAR
    /// depth. Only meaningful when some valid pixels exist.
    pub fn mean_ratio_scale(
        &self,
        ai_relative: &DepthMap,
        lidar_aligned: &DepthMap,
        mask: &[bool],
    ) -> DepthMap {
        let mut lidar_sum = 0.0f64;
        let mut ai_sum = 0.0f64;
        let mut count = 0usize;
        for (i, &m) in mask.iter().enumerate() {
            if m {
                lidar_sum += lidar_aligned.data[i] as f64;
                ai_sum += ai_relative.data[i] as f64;
                count += 1;
            }
        }
        let scale = if count > 0 {
            ((lidar_sum / count as f64) / (ai_sum / count as f64 + 1e-6)) as f32
        } else {
            1.0
        };

        DepthMap {
            width: ai_relative.width,
            height: ai_relative.height,
            data: ai_relative.data.iter().map(|&v| v * scale).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Synthesise a noiseless scene where lidar = 1/(s*rel + o) exactly.
    fn synthetic_pair(scale: f32, offset: f32, w: usize, h: usize) -> (DepthMap, DepthMap) {
        let mut relative = Vec::with_capacity(w * h);
        let mut lidar = Vec::with_capacity(w * h);
        for i in 0..w * h {
            let rel = 0.1 + 0.8 * (i as f32 / (w * h) as f32);
            relative.push(rel);
            lidar.push(1.0 / (scale * rel + offset));
        }
        (DepthMap::new(w, h, relative), DepthMap::new(w, h, lidar))
    }

    #[test]
    fn recovers_exact_linear_relation() {
        let (relative, lidar) = synthetic_pair(0.9, 0.2, 32, 32);
        let calibrator = DepthCalibrator::default();
        let (_, calibration) = calibrator.calibrate(&relative, &lidar, None).unwrap();

        assert!((calibration.scale - 0.9).abs() < 1e-3, "scale {}", calibration.scale);
        assert!(
            (calibration.offset - 0.2).abs() < 1e-3,
            "offset {}",
            calibration.offset
        );
        assert!(
            calibration.confidence >= 0.95,
            "confidence {}",
            calibration.confidence
        );
    }

    #[test]
    fn calibrated_depth_matches_lidar_on_valid_pixels() {
        let (relative, lidar) = synthetic_pair(1.2, 0.3, 32, 32);
        let calibrator = DepthCalibrator::default();
        let (metric, _) = calibrator.calibrate(&relative, &lidar, None).unwrap();
        for (m, l) in metric.data.iter().zip(&lidar.data) {
            if *l > calibrator.min_depth && *l < calibrator.max_depth {
                assert!((m - l).abs() < 1e-2, "metric {m} vs lidar {l}");
            }
        }
    }

    #[test]
    fn insufficient_pixels_fail_with_count() {
        let relative = DepthMap::filled(8, 8, 0.5);
        // All LiDAR depth out of range, so zero valid pixels.
        let lidar = DepthMap::filled(8, 8, 100.0);
        let calibrator = DepthCalibrator::default();
        match calibrator.calibrate(&relative, &lidar, None).unwrap_err() {
            CalibrationError::Insufficient { valid } => assert_eq!(valid, 0),
        }
    }

    #[test]
    fn low_confidence_tiers_are_excluded() {
        let (relative, lidar) = synthetic_pair(1.0, 0.25, 16, 16);
        let tiers = ConfidenceMap::new(16, 16, vec![0u8; 256]);
        let calibrator = DepthCalibrator::default();
        assert!(matches!(
            calibrator.calibrate(&relative, &lidar, Some(&tiers)),
            Err(CalibrationError::Insufficient { .. })
        ));
    }

    #[test]
    fn applied_depth_respects_asymmetric_clip() {
        let calibrator = DepthCalibrator::default();
        let calibration = Calibration {
            scale: 0.0,
            offset: 0.0,
            confidence: 1.0,
        };
        // Zero denominator blows up to 1e6; the clip bounds it at 2*max.
        let relative = DepthMap::filled(4, 4, 0.5);
        let metric = calibrator.apply(&calibration, &relative);
        assert!(metric.data.iter().all(|&v| v <= calibrator.max_depth * 2.0));
        assert!(metric.data.iter().all(|&v| v >= calibrator.min_depth));
    }

    #[test]
    fn mean_ratio_fallback_matches_means() {
        let relative = DepthMap::filled(4, 4, 0.5);
        let lidar = DepthMap::filled(4, 4, 2.0);
        let mask = vec![true; 16];
        let calibrator = DepthCalibrator::default();
        let scaled = calibrator.mean_ratio_scale(&relative, &lidar, &mask);
        let mean: f32 = scaled.data.iter().sum::<f32>() / 16.0;
        assert!((mean - 2.0).abs() < 1e-3);
    }
}
