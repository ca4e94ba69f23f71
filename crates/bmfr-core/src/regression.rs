//! Blockwise multi-order feature regression.
//!
//! The frame is cut into an aligned grid of square blocks. Inside each block
//! the (optionally albedo-demodulated) radiance is fitted as a linear
//! combination of per-pixel features: a constant, the world normal, and the
//! block-normalized world position to first and second order. Each pixel is
//! then replaced by the fitted value. Noise has no counterpart in the
//! features and is regressed away; geometry edges survive because the
//! features follow them.
//!
//! The `bmfr_fit.wgsl` and `bmfr_apply.wgsl` stages in `bmfr-gpu` solve and
//! evaluate the same model on the GPU.

use tracing::debug;

use crate::channel::{MATERIAL_DIFFUSE, WORLD_NORMAL, WORLD_POSITION};
use crate::error::PassError;
use crate::image_buf::ImageBuf;
use crate::params::DenoiseParams;

pub const FEATURE_COUNT: usize = 10;

/// The noisy frame plus the three guide buffers, all the same size.
#[derive(Clone, Copy, Debug)]
pub struct FeatureInputs<'a> {
    pub frame: &'a ImageBuf,
    pub position: &'a ImageBuf,
    pub normal: &'a ImageBuf,
    pub albedo: &'a ImageBuf,
}

impl FeatureInputs<'_> {
    pub fn validate(&self) -> Result<(), PassError> {
        let expected = self.frame.dimensions();
        for (name, buf) in [
            (WORLD_POSITION, self.position),
            (WORLD_NORMAL, self.normal),
            (MATERIAL_DIFFUSE, self.albedo),
        ] {
            if buf.dimensions() != expected {
                return Err(PassError::dimension_mismatch(
                    name,
                    expected,
                    buf.dimensions(),
                ));
            }
        }
        Ok(())
    }
}

/// Feature vector for one pixel. `position` must already be block-normalized.
pub fn features(position: [f32; 3], normal: [f32; 3]) -> [f32; FEATURE_COUNT] {
    let [px, py, pz] = position;
    let [nx, ny, nz] = normal;
    [1.0, nx, ny, nz, px, py, pz, px * px, py * py, pz * pz]
}

/// Denoise the whole frame. The result has the frame's dimensions.
pub fn denoise(inputs: &FeatureInputs<'_>, params: &DenoiseParams) -> Result<ImageBuf, PassError> {
    params.validate()?;
    inputs.validate()?;

    let (width, height) = inputs.frame.dimensions();
    let mut out = ImageBuf::new(width, height);
    let size = params.block_size;
    let mut fallbacks = 0usize;

    for y0 in (0..height).step_by(size as usize) {
        for x0 in (0..width).step_by(size as usize) {
            let block = Block {
                x0,
                y0,
                x1: (x0 + size).min(width),
                y1: (y0 + size).min(height),
            };
            if !fit_block(inputs, params, &block, &mut out) {
                fallbacks += 1;
            }
        }
    }

    debug!(width, height, block_size = size, fallbacks, "regression denoise");
    Ok(out)
}

/// Half-open pixel rectangle.
#[derive(Clone, Copy, Debug)]
struct Block {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl Block {
    fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y0..self.y1).flat_map(move |y| (self.x0..self.x1).map(move |x| (x, y)))
    }
}

/// Per-axis affine map taking the block's positions onto [0, 1].
struct PositionBounds {
    min: [f32; 3],
    inv_extent: [f32; 3],
}

impl PositionBounds {
    fn of(position: &ImageBuf, block: &Block) -> Self {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for (x, y) in block.pixels() {
            let p = sanitize(position.pixel(x, y));
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        let mut inv_extent = [0.0; 3];
        for axis in 0..3 {
            let extent = max[axis] - min[axis];
            if extent > 0.0 {
                inv_extent[axis] = 1.0 / extent;
            }
        }
        Self { min, inv_extent }
    }

    fn normalize(&self, p: [f32; 3]) -> [f32; 3] {
        std::array::from_fn(|axis| (p[axis] - self.min[axis]) * self.inv_extent[axis])
    }
}

fn sanitize(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(|v| if v.is_finite() { v } else { 0.0 })
}

fn albedo_floor(albedo: [f32; 3], epsilon: f32) -> [f32; 3] {
    albedo.map(|a| a.max(epsilon))
}

/// Accumulated XᵀX and Xᵀy for one block.
struct NormalEquations {
    ata: [[f64; FEATURE_COUNT]; FEATURE_COUNT],
    aty: [[f64; FEATURE_COUNT]; 3],
    count: usize,
}

impl NormalEquations {
    fn new() -> Self {
        Self {
            ata: [[0.0; FEATURE_COUNT]; FEATURE_COUNT],
            aty: [[0.0; FEATURE_COUNT]; 3],
            count: 0,
        }
    }

    fn accumulate(&mut self, f: &[f32; FEATURE_COUNT], y: [f32; 3]) {
        for i in 0..FEATURE_COUNT {
            let fi = f[i] as f64;
            for j in 0..=i {
                self.ata[i][j] += fi * f[j] as f64;
            }
            for c in 0..3 {
                self.aty[c][i] += fi * y[c] as f64;
            }
        }
        self.count += 1;
    }

    /// Cholesky solve of `(XᵀX + ridge * D) β = Xᵀy`, `D` = identity with the
    /// intercept entry zeroed. Returns `None` if the system is not positive
    /// definite.
    fn solve(&self, ridge: f64) -> Option<[[f64; FEATURE_COUNT]; 3]> {
        let mut l = [[0.0_f64; FEATURE_COUNT]; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            let penalty = if j == 0 { 0.0 } else { ridge };
            let mut diag = self.ata[j][j] + penalty;
            for k in 0..j {
                diag -= l[j][k] * l[j][k];
            }
            if diag.is_nan() || diag <= 0.0 {
                return None;
            }
            l[j][j] = diag.sqrt();
            for i in (j + 1)..FEATURE_COUNT {
                let mut sum = self.ata[i][j];
                for k in 0..j {
                    sum -= l[i][k] * l[j][k];
                }
                l[i][j] = sum / l[j][j];
            }
        }

        let mut beta = [[0.0_f64; FEATURE_COUNT]; 3];
        for c in 0..3 {
            let mut z = [0.0_f64; FEATURE_COUNT];
            for i in 0..FEATURE_COUNT {
                let mut sum = self.aty[c][i];
                for k in 0..i {
                    sum -= l[i][k] * z[k];
                }
                z[i] = sum / l[i][i];
            }
            for i in (0..FEATURE_COUNT).rev() {
                let mut sum = z[i];
                for k in (i + 1)..FEATURE_COUNT {
                    sum -= l[k][i] * beta[c][k];
                }
                beta[c][i] = sum / l[i][i];
            }
        }
        beta.iter()
            .flatten()
            .all(|b| b.is_finite())
            .then_some(beta)
    }

    /// Coefficients that predict the block mean everywhere.
    fn mean_fit(&self) -> [[f64; FEATURE_COUNT]; 3] {
        let n = self.count.max(1) as f64;
        let mut beta = [[0.0_f64; FEATURE_COUNT]; 3];
        for c in 0..3 {
            beta[c][0] = self.aty[c][0] / n;
        }
        beta
    }
}

/// Fit one block and write its pixels. Returns false if the solve fell back
/// to the block mean.
fn fit_block(
    inputs: &FeatureInputs<'_>,
    params: &DenoiseParams,
    block: &Block,
    out: &mut ImageBuf,
) -> bool {
    let bounds = PositionBounds::of(inputs.position, block);
    let pixel_features = |x: u32, y: u32| {
        let p = bounds.normalize(sanitize(inputs.position.pixel(x, y)));
        features(p, sanitize(inputs.normal.pixel(x, y)))
    };

    let mut equations = NormalEquations::new();
    for (x, y) in block.pixels() {
        let mut target = sanitize(inputs.frame.pixel(x, y));
        if params.demodulate_albedo {
            let albedo = albedo_floor(sanitize(inputs.albedo.pixel(x, y)), params.albedo_epsilon);
            for c in 0..3 {
                target[c] /= albedo[c];
            }
        }
        equations.accumulate(&pixel_features(x, y), target);
    }

    let solved = equations.solve(params.ridge as f64);
    let fitted = solved.is_some();
    let beta = solved.unwrap_or_else(|| equations.mean_fit());

    for (x, y) in block.pixels() {
        let f = pixel_features(x, y);
        let mut rgb = [0.0_f32; 3];
        for c in 0..3 {
            let value: f64 = f.iter().zip(&beta[c]).map(|(&fi, &b)| fi as f64 * b).sum();
            rgb[c] = value as f32;
        }
        if params.demodulate_albedo {
            let albedo = albedo_floor(sanitize(inputs.albedo.pixel(x, y)), params.albedo_epsilon);
            for c in 0..3 {
                rgb[c] *= albedo[c];
            }
        }
        out.set_pixel(x, y, rgb.map(|v| v.max(0.0)));
    }
    fitted
}
