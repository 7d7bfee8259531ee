/// Point cloud extraction from a fused depth+confidence map.
use std::collections::HashMap;

use rand::seq::index::sample;

use crate::edges::sobel_gradients;
use crate::grid::DepthMap;

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length along x in pixels.
    pub fx: f32,
    /// Focal length along y in pixels.
    pub fy: f32,
    /// Principal point x in pixels.
    pub cx: f32,
    /// Principal point y in pixels.
    pub cy: f32,
}

impl CameraIntrinsics {
    /// Extract the pinhole parameters from a row-major 3x3 matrix.
    pub fn from_matrix(matrix: &[f32; 9]) -> Self {
        Self {
            fx: matrix[0],
            fy: matrix[4],
            cx: matrix[2],
            cy: matrix[5],
        }
    }
}

/// An RGB image used for colour sampling, row-major 3 bytes per pixel.
#[derive(Debug, Clone)]
pub struct RgbImage {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Packed RGB bytes, length `width * height * 3`.
    pub data: Vec<u8>,
}

impl RgbImage {
    /// Nearest-pixel colour lookup.
    fn at(&self, x: usize, y: usize) -> [u8; 3] {
        let idx = (y.min(self.height - 1) * self.width + x.min(self.width - 1)) * 3;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }
}

/// A bounded, deduplicated point cloud with optional colours and normals.
///
/// All present arrays share the same length.
#[derive(Debug, Clone, Default)]
pub struct ExtractedPointCloud {
    /// Point positions.
    pub positions: Vec<[f32; 3]>,
    /// Optional per-point RGB colours.
    pub colors: Option<Vec<[u8; 3]>>,
    /// Optional per-point unit normals.
    pub normals: Option<Vec<[f32; 3]>>,
}

impl ExtractedPointCloud {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the cloud is empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Back-projects a fused depth map into a bounded 3D point cloud.
#[derive(Debug, Clone, Copy)]
pub struct PointCloudExtractor {
    /// Minimum confidence a pixel needs to produce a point.
    pub min_confidence: f32,
    /// Voxel edge length in metres for grid deduplication.
    pub voxel_size: f32,
    /// Hard cap on the number of output points.
    pub max_points: usize,
}

impl Default for PointCloudExtractor {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            voxel_size: 0.005,
            max_points: 2_000_000,
        }
    }
}

impl PointCloudExtractor {
    /// Extract a point cloud from a depth+confidence map.
    ///
    /// Pixels below the confidence threshold are skipped; zero surviving
    /// pixels yield an empty cloud, not an error. If a world transform is
    /// supplied, points are moved into world space. When the cloud exceeds
    /// `max_points`, voxel-grid deduplication runs first and uniform random
    /// sampling trims the remainder to the exact cap. Output ordering is
    /// not stable across runs once random sampling kicks in.
    pub fn extract(
        &self,
        depth: &DepthMap,
        confidence: &[f32],
        intrinsics: CameraIntrinsics,
        transform: Option<&[f32; 16]>,
        rgb: Option<&RgbImage>,
    ) -> ExtractedPointCloud {
        let (w, h) = (depth.width, depth.height);
        let (gx, gy) = sobel_gradients(depth);

        let mut positions = Vec::new();
        let mut colors = rgb.map(|_| Vec::new());
        let mut normals = Vec::new();

        for v in 0..h {
            for u in 0..w {
                let idx = v * w + u;
                if confidence[idx] < self.min_confidence {
                    continue;
                }
                let z = depth.data[idx];
                if !z.is_finite() || z <= 0.0 {
                    continue;
                }

                // Inverse pinhole projection.
                let x = (u as f32 - intrinsics.cx) * z / intrinsics.fx;
                let y = (v as f32 - intrinsics.cy) * z / intrinsics.fy;
                let point = match transform {
                    Some(m) => transform_point(m, [x, y, z]),
                    None => [x, y, z],
                };
                positions.push(point);

                if let (Some(colors), Some(image)) = (colors.as_mut(), rgb) {
                    // Nearest-pixel lookup, scaled when the image resolution
                    // differs from the depth resolution.
                    let ix = u * image.width / w;
                    let iy = v * image.height / h;
                    colors.push(image.at(ix, iy));
                }

                // Tangent-based normal from the local depth gradients.
                let nx = -gx[idx] / intrinsics.fx;
                let ny = -gy[idx] / intrinsics.fy;
                let nz = 1.0f32;
                let len = (nx * nx + ny * ny + nz * nz).sqrt() + 1e-6;
                let normal = [nx / len, ny / len, nz / len];
                normals.push(match transform {
                    Some(m) => transform_direction(m, normal),
                    None => normal,
                });
            }
        }

        let mut cloud = ExtractedPointCloud {
            positions,
            colors,
            normals: Some(normals),
        };

        if cloud.len() > self.max_points {
            cloud = self.voxel_downsample(cloud);
        }
        if cloud.len() > self.max_points {
            cloud = self.random_downsample(cloud);
        }

        cloud
    }

    /// Voxel-grid deduplication: one representative per occupied voxel.
    pub fn voxel_downsample(&self, cloud: ExtractedPointCloud) -> ExtractedPointCloud {
        let mut occupied: HashMap<(i32, i32, i32), usize> = HashMap::new();
        let mut keep = Vec::new();

        for (i, p) in cloud.positions.iter().enumerate() {
            let key = (
                (p[0] / self.voxel_size).floor() as i32,
                (p[1] / self.voxel_size).floor() as i32,
                (p[2] / self.voxel_size).floor() as i32,
            );
            if let std::collections::hash_map::Entry::Vacant(entry) = occupied.entry(key) {
                entry.insert(i);
                keep.push(i);
            }
        }

        select_indices(cloud, &keep)
    }

    /// Uniform random sampling without replacement down to the exact cap.
    fn random_downsample(&self, cloud: ExtractedPointCloud) -> ExtractedPointCloud {
        let mut rng = rand::thread_rng();
        let keep: Vec<usize> = sample(&mut rng, cloud.len(), self.max_points).into_vec();
        select_indices(cloud, &keep)
    }
}

/// Keep only the points at the given indices, preserving array pairing.
fn select_indices(cloud: ExtractedPointCloud, keep: &[usize]) -> ExtractedPointCloud {
    ExtractedPointCloud {
        positions: keep.iter().map(|&i| cloud.positions[i]).collect(),
        colors: cloud
            .colors
            .map(|c| keep.iter().map(|&i| c[i]).collect()),
        normals: cloud
            .normals
            .map(|n| keep.iter().map(|&i| n[i]).collect()),
    }
}

/// Homogeneous transform of a point by a row-major 4x4 matrix.
fn transform_point(m: &[f32; 16], p: [f32; 3]) -> [f32; 3] {
    [
        m[0] * p[0] + m[1] * p[1] + m[2] * p[2] + m[3],
        m[4] * p[0] + m[5] * p[1] + m[6] * p[2] + m[7],
        m[8] * p[0] + m[9] * p[1] + m[10] * p[2] + m[11],
    ]
}

/// Rotation-only transform of a direction by a row-major 4x4 matrix.
fn transform_direction(m: &[f32; 16], d: [f32; 3]) -> [f32; 3] {
    [
        m[0] * d[0] + m[1] * d[1] + m[2] * d[2],
        m[4] * d[0] + m[5] * d[1] + m[6] * d[2],
        m[8] * d[0] + m[9] * d[1] + m[10] * d[2],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 10.0,
            fy: 10.0,
            cx: 2.0,
            cy: 2.0,
        }
    }

    #[test]
    fn constant_depth_back_projects_to_plane() {
        let depth = DepthMap::filled(5, 5, 2.0);
        let confidence = vec![1.0f32; 25];
        let extractor = PointCloudExtractor::default();
        let cloud = extractor.extract(&depth, &confidence, intrinsics(), None, None);

        assert_eq!(cloud.len(), 25);
        for (i, p) in cloud.positions.iter().enumerate() {
            let u = (i % 5) as f32;
            let v = (i / 5) as f32;
            let expected_x = (u - 2.0) * 2.0 / 10.0;
            let expected_y = (v - 2.0) * 2.0 / 10.0;
            assert!((p[0] - expected_x).abs() < 1e-6);
            assert!((p[1] - expected_y).abs() < 1e-6);
            assert!((p[2] - 2.0).abs() < 1e-6);
        }
        // A flat plane facing the camera has all normals on +Z.
        for n in cloud.normals.as_ref().unwrap() {
            assert!((n[2] - 1.0).abs() < 1e-4, "normal {n:?}");
        }
    }

    #[test]
    fn low_confidence_pixels_are_dropped() {
        let depth = DepthMap::filled(4, 4, 1.0);
        let mut confidence = vec![1.0f32; 16];
        confidence[0] = 0.0;
        confidence[5] = 0.1;
        let extractor = PointCloudExtractor::default();
        let cloud = extractor.extract(&depth, &confidence, intrinsics(), None, None);
        assert_eq!(cloud.len(), 14);
    }

    #[test]
    fn zero_survivors_yield_empty_cloud() {
        let depth = DepthMap::filled(4, 4, 1.0);
        let confidence = vec![0.0f32; 16];
        let extractor = PointCloudExtractor::default();
        let cloud = extractor.extract(&depth, &confidence, intrinsics(), None, None);
        assert!(cloud.is_empty());
    }

    #[test]
    fn world_transform_is_applied() {
        let depth = DepthMap::filled(2, 2, 1.0);
        let confidence = vec![1.0f32; 4];
        let mut m = [0.0f32; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m[3] = 10.0;
        let extractor = PointCloudExtractor::default();
        let cloud = extractor.extract(&depth, &confidence, intrinsics(), Some(&m), None);
        assert!(cloud.positions.iter().all(|p| p[0] > 9.0));
    }

    #[test]
    fn colours_sampled_at_matching_pixels() {
        let depth = DepthMap::filled(2, 2, 1.0);
        let confidence = vec![1.0f32; 4];
        let image = RgbImage {
            width: 2,
            height: 2,
            data: vec![
                255, 0, 0, 0, 255, 0, //
                0, 0, 255, 255, 255, 255,
            ],
        };
        let extractor = PointCloudExtractor::default();
        let cloud = extractor.extract(&depth, &confidence, intrinsics(), None, Some(&image));
        let colors = cloud.colors.unwrap();
        assert_eq!(colors[0], [255, 0, 0]);
        assert_eq!(colors[3], [255, 255, 255]);
    }

    #[test]
    fn voxel_downsample_monotone_in_voxel_size() {
        // A jittered grid of points; coarser voxels can only merge more.
        let mut cloud = ExtractedPointCloud::default();
        for i in 0..1000 {
            let f = i as f32;
            cloud.positions.push([
                (f * 0.013) % 1.0,
                (f * 0.029) % 1.0,
                (f * 0.007) % 1.0,
            ]);
        }
        let mut previous = usize::MAX;
        for voxel_size in [0.01f32, 0.05, 0.1, 0.5, 1.0] {
            let extractor = PointCloudExtractor {
                voxel_size,
                ..PointCloudExtractor::default()
            };
            let kept = extractor.voxel_downsample(cloud.clone()).len();
            assert!(
                kept <= previous,
                "voxel {voxel_size}: {kept} > previous {previous}"
            );
            previous = kept;
        }
    }

    #[test]
    fn point_budget_is_enforced_exactly() {
        let depth = DepthMap::filled(32, 32, 1.5);
        let confidence = vec![1.0f32; 32 * 32];
        let extractor = PointCloudExtractor {
            // Voxels far smaller than the pixel spacing, so the cap falls
            // through to random sampling.
            voxel_size: 1e-5,
            max_points: 100,
            ..PointCloudExtractor::default()
        };
        let cloud = extractor.extract(&depth, &confidence, intrinsics(), None, None);
        assert_eq!(cloud.len(), 100);
        assert_eq!(cloud.normals.as_ref().unwrap().len(), 100);
    }
}
