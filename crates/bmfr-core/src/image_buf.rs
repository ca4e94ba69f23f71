use std::sync::LazyLock;

/// Linear f32 RGB image buffer.
///
/// All pixel data is stored as interleaved RGBRGBRGB... Values are
/// unbounded: radiance, world positions and normals all live here.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBuf {
    pub width: u32,
    pub height: u32,
    /// Flat pixel data: [R, G, B, R, G, B, ...] in linear f32.
    pub data: Vec<f32>,
}

impl ImageBuf {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; (width * height * 3) as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> anyhow::Result<Self> {
        let expected = (width * height * 3) as usize;
        anyhow::ensure!(
            data.len() == expected,
            "expected {expected} floats for {width}x{height} RGB, got {}",
            data.len()
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a buffer by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> [f32; 3]) -> Self {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Drop the alpha channel of tightly packed RGBA f32 data.
    pub fn from_rgba_f32(width: u32, height: u32, rgba: &[f32]) -> anyhow::Result<Self> {
        let expected = (width * height * 4) as usize;
        anyhow::ensure!(
            rgba.len() == expected,
            "expected {expected} floats for {width}x{height} RGBA, got {}",
            rgba.len()
        );
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for pixel in rgba.chunks_exact(4) {
            data.extend_from_slice(&pixel[..3]);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Convert to RGBA f32 with alpha = 1.0 (for GPU upload as Rgba32Float).
    pub fn to_rgba_f32(&self) -> Vec<f32> {
        let mut rgba = Vec::with_capacity(self.pixel_count() * 4);
        for pixel in self.data.chunks_exact(3) {
            rgba.extend_from_slice(pixel);
            rgba.push(1.0);
        }
        rgba
    }

    /// Convert to RGBA u8 with sRGB gamma for display output.
    pub fn to_rgba_u8_srgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixel_count() * 4);
        for pixel in self.data.chunks_exact(3) {
            out.push(linear_to_srgb_u8(pixel[0]));
            out.push(linear_to_srgb_u8(pixel[1]));
            out.push(linear_to_srgb_u8(pixel[2]));
            out.push(255);
        }
        out
    }

    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel(&self, x: u32, y: u32) -> [f32; 3] {
        let idx = ((y * self.width + x) * 3) as usize;
        [self.data[idx], self.data[idx + 1], self.data[idx + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [f32; 3]) {
        let idx = ((y * self.width + x) * 3) as usize;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Copy the overlapping top-left region of `src` into `self`.
    ///
    /// Pixels of `self` outside `src` are left untouched.
    pub fn copy_region_from(&mut self, src: &ImageBuf) {
        let w = self.width.min(src.width) as usize;
        let h = self.height.min(src.height);
        for row in 0..h {
            let dst_start = (row * self.width) as usize * 3;
            let src_start = (row * src.width) as usize * 3;
            self.data[dst_start..dst_start + w * 3]
                .copy_from_slice(&src.data[src_start..src_start + w * 3]);
        }
    }

    /// Mean of each channel over the whole image.
    pub fn mean(&self) -> [f32; 3] {
        let n = self.pixel_count().max(1) as f64;
        let mut sum = [0.0_f64; 3];
        for pixel in self.data.chunks_exact(3) {
            for c in 0..3 {
                sum[c] += pixel[c] as f64;
            }
        }
        [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
    }
}

const SRGB_LUT_SIZE: usize = 4096;

static SRGB_LUT: LazyLock<[u8; SRGB_LUT_SIZE]> = LazyLock::new(|| {
    let mut lut = [0u8; SRGB_LUT_SIZE];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = i as f32 / (SRGB_LUT_SIZE - 1) as f32;
        *entry = (linear_to_srgb(v) * 255.0 + 0.5) as u8;
    }
    lut
});

fn linear_to_srgb_u8(v: f32) -> u8 {
    let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
    let idx = (v * (SRGB_LUT_SIZE - 1) as f32) as usize;
    SRGB_LUT[idx]
}

/// Inverse sRGB EOTF (IEC 61966-2-1): linear light [0,1] -> perceptual sRGB [0,1].
pub fn linear_to_srgb(x: f32) -> f32 {
    if x <= 0.0031308 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

/// sRGB EOTF (IEC 61966-2-1): perceptual sRGB [0,1] -> linear light [0,1].
pub fn srgb_to_linear(x: f32) -> f32 {
    if x <= 0.04045 {
        x / 12.92
    } else {
        ((x + 0.055) / 1.055).powf(2.4)
    }
}
