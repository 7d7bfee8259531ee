/// Sobel gradient helpers shared by the fusion engine and the extractor.
use crate::grid::DepthMap;

/// Horizontal and vertical Sobel gradients of a depth map.
///
/// Border pixels clamp to the edge sample (replicate border handling).
pub fn sobel_gradients(depth: &DepthMap) -> (Vec<f32>, Vec<f32>) {
    let (w, h) = (depth.width, depth.height);
    let mut gx = vec![0.0f32; w * h];
    let mut gy = vec![0.0f32; w * h];

    let sample = |x: isize, y: isize| -> f32 {
        let cx = x.clamp(0, w as isize - 1) as usize;
        let cy = y.clamp(0, h as isize - 1) as usize;
        depth.at(cx, cy)
    };

    for y in 0..h as isize {
        for x in 0..w as isize {
            let tl = sample(x - 1, y - 1);
            let tc = sample(x, y - 1);
            let tr = sample(x + 1, y - 1);
            let ml = sample(x - 1, y);
            let mr = sample(x + 1, y);
            let bl = sample(x - 1, y + 1);
            let bc = sample(x, y + 1);
            let br = sample(x + 1, y + 1);

            let idx = y as usize * w + x as usize;
            gx[idx] = (tr + 2.0 * mr + br) - (tl + 2.0 * ml + bl);
            gy[idx] = (bl + 2.0 * bc + br) - (tl + 2.0 * tc + tr);
        }
    }

    (gx, gy)
}

/// Edge magnitude of a depth map, normalised to the 8-bit range.
///
/// The depth is first rescaled to 0-255 so the magnitude threshold is
/// independent of the scene's metric depth range.
pub fn edge_magnitude(depth: &DepthMap) -> Vec<u8> {
    let min = depth
        .data
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::INFINITY, f32::min);
    let max = depth.max_value();
    let range = (max - min).max(0.0) + 1e-6;

    let normalised = DepthMap {
        width: depth.width,
        height: depth.height,
        data: depth
            .data
            .iter()
            .map(|&v| {
                if v.is_finite() {
                    (v - min) / range * 255.0
                } else {
                    0.0
                }
            })
            .collect(),
    };

    let (gx, gy) = sobel_gradients(&normalised);
    let magnitudes: Vec<f32> = gx
        .iter()
        .zip(&gy)
        .map(|(&x, &y)| (x * x + y * y).sqrt())
        .collect();
    let peak = magnitudes.iter().copied().fold(0.0f32, f32::max).max(1e-6);

    magnitudes
        .iter()
        .map(|&m| (m / peak * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect()
}
