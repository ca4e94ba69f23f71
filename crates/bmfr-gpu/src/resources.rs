use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use bmfr_core::image_buf::ImageBuf;
use bmfr_core::resources::ResourceManager;
use tracing::debug;

use crate::context::GpuContext;
use crate::texture::GpuTexture;

/// Named RGBA32F textures shared by the passes of a GPU pipeline.
#[derive(Default)]
pub struct GpuResources {
    requested: BTreeSet<String>,
    textures: HashMap<String, GpuTexture>,
    width: u32,
    height: u32,
}

impl GpuResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> impl Iterator<Item = &str> {
        self.requested.iter().map(String::as_str)
    }

    /// Copy host pixels into an allocated texture.
    pub fn upload(&self, ctx: &GpuContext, name: &str, buf: &ImageBuf) -> Result<()> {
        let tex = self
            .textures
            .get(name)
            .with_context(|| format!("texture `{name}` is not allocated"))?;
        tex.upload(&ctx.queue, buf)
            .with_context(|| format!("upload texture `{name}`"))
    }

    /// Read an allocated texture back to the host (blocking).
    pub fn download(&self, ctx: &GpuContext, name: &str) -> Result<ImageBuf> {
        let tex = self
            .textures
            .get(name)
            .with_context(|| format!("texture `{name}` is not allocated"))?;
        tex.download(&ctx.device, &ctx.queue)
            .with_context(|| format!("download texture `{name}`"))
    }
}

impl ResourceManager for GpuResources {
    type Context = GpuContext;
    type Texture = GpuTexture;

    fn request_texture_resource(&mut self, name: &str) {
        if self.requested.insert(name.to_string()) {
            debug!(name, "texture requested");
        }
    }

    fn is_requested(&self, name: &str) -> bool {
        self.requested.contains(name)
    }

    fn texture(&self, name: &str) -> Option<&GpuTexture> {
        self.textures.get(name)
    }

    fn texture_mut(&mut self, name: &str) -> Option<&mut GpuTexture> {
        self.textures.get_mut(name)
    }

    fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> Result<()> {
        ctx.check_texture_size(width, height)?;
        debug!(width, height, count = self.requested.len(), "allocating GPU textures");
        self.width = width;
        self.height = height;
        self.textures = self
            .requested
            .iter()
            .map(|name| {
                let tex = GpuTexture::create(&ctx.device, width, height, name);
                (name.clone(), tex)
            })
            .collect();
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
