use anyhow::Result;
use bmfr_core::image_buf::ImageBuf;

/// A GPU texture holding RGBA f32 image data.
///
/// Every texture can be sampled, rendered to, and copied in both
/// directions, so any named resource may serve as a pass input, a pass
/// output, or a blit source.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
    const BYTES_PER_PIXEL: u32 = 16;

    /// Create a zero-filled texture.
    pub fn create(device: &wgpu::Device, width: u32, height: u32, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: Self::extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Upload an ImageBuf into a fresh texture.
    pub fn from_image_buf(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buf: &ImageBuf,
        label: &str,
    ) -> Self {
        let tex = Self::create(device, buf.width, buf.height, label);
        tex.write(queue, buf);
        tex
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn extent(width: u32, height: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// Overwrite the texture with `buf`, which must match its size.
    pub fn upload(&self, queue: &wgpu::Queue, buf: &ImageBuf) -> Result<()> {
        anyhow::ensure!(
            buf.dimensions() == self.size(),
            "upload of {}x{} image into {}x{} texture",
            buf.width,
            buf.height,
            self.width,
            self.height
        );
        self.write(queue, buf);
        Ok(())
    }

    fn write(&self, queue: &wgpu::Queue, buf: &ImageBuf) {
        let rgba = buf.to_rgba_f32();
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&rgba),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(buf.width * Self::BYTES_PER_PIXEL),
                rows_per_image: Some(buf.height),
            },
            Self::extent(buf.width, buf.height),
        );
    }

    /// Record a copy of the overlapping top-left region of `self` into `dst`.
    pub fn copy_region_to(&self, encoder: &mut wgpu::CommandEncoder, dst: &GpuTexture) {
        let width = self.width.min(dst.width);
        let height = self.height.min(dst.height);
        if width == 0 || height == 0 {
            return;
        }
        encoder.copy_texture_to_texture(
            self.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            Self::extent(width, height),
        );
    }

    /// Read texture data back to CPU as an ImageBuf (blocking).
    pub fn download(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<ImageBuf> {
        let bytes_per_row_unpadded = self.width * Self::BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let bytes_per_row_padded = bytes_per_row_unpadded.div_ceil(align) * align;

        let buffer_size = (bytes_per_row_padded * self.height) as u64;
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture_download_staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("texture_download"),
        });

        encoder.copy_texture_to_buffer(
            self.texture.as_image_copy(),
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row_padded),
                    rows_per_image: Some(self.height),
                },
            },
            Self::extent(self.width, self.height),
        );

        queue.submit(std::iter::once(encoder.finish()));

        let (sender, receiver) = std::sync::mpsc::channel();
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let _ = sender.send(result);
            });
        device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .map_err(|e| anyhow::anyhow!("GPU poll error: {e}"))?;
        receiver
            .recv()
            .map_err(|_| anyhow::anyhow!("buffer map cancelled"))??;

        let mapped = staging.slice(..).get_mapped_range();
        let mut rgba = Vec::with_capacity((self.width * self.height * 4) as usize);
        for row in 0..self.height {
            let row_offset = (row * bytes_per_row_padded) as usize;
            let row_bytes = &mapped[row_offset..row_offset + bytes_per_row_unpadded as usize];
            rgba.extend_from_slice(bytemuck::cast_slice::<u8, f32>(row_bytes));
        }

        drop(mapped);
        staging.unmap();

        ImageBuf::from_rgba_f32(self.width, self.height, &rgba)
    }
}
