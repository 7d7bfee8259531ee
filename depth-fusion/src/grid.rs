/// Dense row-major raster grids for depth and confidence data.

/// A dense depth map in metres, stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthMap {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Row-major depth values, length `width * height`.
    pub data: Vec<f32>,
}

impl DepthMap {
    /// Create a depth map from raw values.
    ///
    /// Panics if the buffer length does not match the dimensions; callers
    /// construct these from already-validated decoded frames.
    pub fn new(width: usize, height: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), width * height, "depth grid length mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    /// Create a map filled with a constant value.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Value at (x, y) without bounds checking beyond debug assertions.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Largest finite value in the map, or 0.0 when empty.
    pub fn max_value(&self) -> f32 {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max)
    }

    /// Resample to a new resolution with bilinear interpolation.
    ///
    /// Used to align LiDAR depth to the AI map's resolution. Edge pixels
    /// clamp to the border sample.
    pub fn resize_bilinear(&self, new_width: usize, new_height: usize) -> DepthMap {
        if new_width == self.width && new_height == self.height {
            return self.clone();
        }
        // A zero-pixel source has no samples to interpolate; the result is
        // all zeros, which downstream validity masks reject as out of range.
        if self.data.is_empty() {
            return DepthMap::filled(new_width, new_height, 0.0);
        }
        let mut data = Vec::with_capacity(new_width * new_height);
        let x_ratio = self.width as f32 / new_width as f32;
        let y_ratio = self.height as f32 / new_height as f32;

        for y in 0..new_height {
            let src_y = ((y as f32 + 0.5) * y_ratio - 0.5).max(0.0);
            let y0 = (src_y as usize).min(self.height - 1);
            let y1 = (y0 + 1).min(self.height - 1);
            let fy = src_y - y0 as f32;

            for x in 0..new_width {
                let src_x = ((x as f32 + 0.5) * x_ratio - 0.5).max(0.0);
                let x0 = (src_x as usize).min(self.width - 1);
                let x1 = (x0 + 1).min(self.width - 1);
                let fx = src_x - x0 as f32;

                let top = self.at(x0, y0) * (1.0 - fx) + self.at(x1, y0) * fx;
                let bottom = self.at(x0, y1) * (1.0 - fx) + self.at(x1, y1) * fx;
                data.push(top * (1.0 - fy) + bottom * fy);
            }
        }

        DepthMap {
            width: new_width,
            height: new_height,
            data,
        }
    }
}

/// A dense per-pixel confidence tier grid (0-2), stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceMap {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Row-major confidence tiers, length `width * height`.
    pub data: Vec<u8>,
}

impl ConfidenceMap {
    /// Create a confidence map from raw tiers.
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width * height, "confidence grid length mismatch");
        Self {
            width,
            height,
            data,
        }
    }

    /// Resample to a new resolution with nearest-neighbour lookup.
    ///
    /// Nearest-neighbour avoids inventing fractional confidence classes
    /// that no sensor ever produced.
    pub fn resize_nearest(&self, new_width: usize, new_height: usize) -> ConfidenceMap {
        if new_width == self.width && new_height == self.height {
            return self.clone();
        }
        // No source samples: emit the lowest tier everywhere.
        if self.data.is_empty() {
            return ConfidenceMap {
                width: new_width,
                height: new_height,
                data: vec![0; new_width * new_height],
            };
        }
        let mut data = Vec::with_capacity(new_width * new_height);
        for y in 0..new_height {
            let src_y = (y * self.height / new_height).min(self.height - 1);
            for x in 0..new_width {
                let src_x = (x * self.width / new_width).min(self.width - 1);
                data.push(self.data[src_y * self.width + src_x]);
            }
        }
        ConfidenceMap {
            width: new_width,
            height: new_height,
            data,
        }
    }
}
