use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use image::{ColorType, DynamicImage, Rgb32FImage, RgbaImage};
use tracing::{debug, info};

use crate::image_buf::{ImageBuf, srgb_to_linear};

/// Extensions written as linear float without a transfer curve.
pub const FLOAT_EXTENSIONS: &[&str] = &["exr", "hdr"];

/// How integer pixel values should be interpreted on load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Display-referred colour: undo the sRGB curve.
    Srgb,
    /// Data such as normals or positions: map the integer range to 0..1 as-is.
    Linear,
}

pub fn is_float_extension(ext: &str) -> bool {
    FLOAT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}

/// Load an image file into a linear f32 RGB ImageBuf.
///
/// Float pixels (EXR, HDR, float TIFF) are taken verbatim whatever the
/// extension; 8- and 16-bit pixels go through `encoding`.
pub fn load_image(path: &Path, encoding: Encoding) -> Result<ImageBuf> {
    info!(?path, ?encoding, "loading image file");
    let t0 = std::time::Instant::now();

    let img =
        image::open(path).with_context(|| format!("failed to open image: {}", path.display()))?;
    let color = img.color();
    debug!(
        elapsed_ms = t0.elapsed().as_millis(),
        width = img.width(),
        height = img.height(),
        ?color,
        "image decode"
    );

    let buf = match color {
        ColorType::Rgb32F | ColorType::Rgba32F => {
            let rgb = img.into_rgb32f();
            ImageBuf::from_data(rgb.width(), rgb.height(), rgb.into_raw())?
        }
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
            let rgb = img.into_rgb32f();
            let (width, height) = rgb.dimensions();
            let mut data = rgb.into_raw();
            if encoding == Encoding::Srgb {
                for v in &mut data {
                    *v = srgb_to_linear(*v);
                }
            }
            ImageBuf::from_data(width, height, data)?
        }
        _ => decode_8bit(img, encoding)?,
    };
    debug!(elapsed_ms = t0.elapsed().as_millis(), "total load_image");
    Ok(buf)
}

fn decode_8bit(img: DynamicImage, encoding: Encoding) -> Result<ImageBuf> {
    let rgb = img.into_rgb8();
    let lut = match encoding {
        Encoding::Srgb => &*SRGB_U8_TO_LINEAR,
        Encoding::Linear => &*U8_TO_UNIT,
    };
    let mut data = Vec::with_capacity((rgb.width() * rgb.height() * 3) as usize);
    for pixel in rgb.pixels() {
        data.push(lut[pixel.0[0] as usize]);
        data.push(lut[pixel.0[1] as usize]);
        data.push(lut[pixel.0[2] as usize]);
    }
    ImageBuf::from_data(rgb.width(), rgb.height(), data)
}

/// Write an ImageBuf to disk. Float formats keep linear values, everything
/// else is sRGB-encoded and quantized to 8 bits.
pub fn save_image(buf: &ImageBuf, path: &Path) -> Result<()> {
    if is_float_extension(extension(path)) {
        let img = Rgb32FImage::from_raw(buf.width, buf.height, buf.data.clone())
            .context("failed to create float image from buffer")?;
        DynamicImage::ImageRgb32F(img)
            .save(path)
            .with_context(|| format!("write image: {}", path.display()))?;
    } else {
        let img = RgbaImage::from_raw(buf.width, buf.height, buf.to_rgba_u8_srgb())
            .context("failed to create image from buffer")?;
        DynamicImage::ImageRgba8(img)
            .into_rgb8()
            .save(path)
            .with_context(|| format!("write image: {}", path.display()))?;
    }
    debug!(?path, width = buf.width, height = buf.height, "saved image");
    Ok(())
}

static SRGB_U8_TO_LINEAR: LazyLock<[f32; 256]> = LazyLock::new(|| {
    let mut lut = [0.0f32; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = srgb_to_linear(i as f32 / 255.0);
    }
    lut
});

static U8_TO_UNIT: LazyLock<[f32; 256]> = LazyLock::new(|| {
    let mut lut = [0.0f32; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = i as f32 / 255.0;
    }
    lut
});
