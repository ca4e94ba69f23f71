use std::collections::{BTreeSet, HashMap};

use anyhow::Result;
use tracing::debug;

use crate::image_buf::ImageBuf;

/// Named image storage shared by every pass in a pipeline.
///
/// Passes request the textures they touch during `initialize`; the host
/// allocates every requested texture at viewport size on `resize`.
pub trait ResourceManager {
    /// Device handle needed to allocate textures.
    type Context;
    type Texture;

    fn request_texture_resource(&mut self, name: &str);

    fn request_texture_resources(&mut self, names: &[&str]) {
        for name in names {
            self.request_texture_resource(name);
        }
    }

    fn is_requested(&self, name: &str) -> bool;

    fn texture(&self, name: &str) -> Option<&Self::Texture>;

    fn texture_mut(&mut self, name: &str) -> Option<&mut Self::Texture>;

    /// (Re)allocate every requested texture at `width x height`.
    fn resize(&mut self, ctx: &Self::Context, width: u32, height: u32) -> Result<()>;

    fn size(&self) -> (u32, u32);
}

/// The CPU backend needs no device.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuContext;

/// Host-memory resource manager backed by [`ImageBuf`]s.
#[derive(Debug, Default)]
pub struct CpuResources {
    requested: BTreeSet<String>,
    textures: HashMap<String, ImageBuf>,
    width: u32,
    height: u32,
}

impl CpuResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents of a requested texture.
    ///
    /// The buffer must match the current viewport.
    pub fn upload(&mut self, name: &str, buf: ImageBuf) -> Result<()> {
        anyhow::ensure!(self.is_requested(name), "texture `{name}` was never requested");
        anyhow::ensure!(
            buf.dimensions() == self.size(),
            "texture `{name}` is {}x{}, viewport is {}x{}",
            buf.width,
            buf.height,
            self.width,
            self.height
        );
        self.textures.insert(name.to_string(), buf);
        Ok(())
    }

    pub fn requested(&self) -> impl Iterator<Item = &str> {
        self.requested.iter().map(String::as_str)
    }
}

impl ResourceManager for CpuResources {
    type Context = CpuContext;
    type Texture = ImageBuf;

    fn request_texture_resource(&mut self, name: &str) {
        if self.requested.insert(name.to_string()) {
            debug!(name, "texture requested");
        }
    }

    fn is_requested(&self, name: &str) -> bool {
        self.requested.contains(name)
    }

    fn texture(&self, name: &str) -> Option<&ImageBuf> {
        self.textures.get(name)
    }

    fn texture_mut(&mut self, name: &str) -> Option<&mut ImageBuf> {
        self.textures.get_mut(name)
    }

    fn resize(&mut self, _ctx: &CpuContext, width: u32, height: u32) -> Result<()> {
        debug!(width, height, count = self.requested.len(), "allocating textures");
        self.width = width;
        self.height = height;
        self.textures = self
            .requested
            .iter()
            .map(|name| (name.clone(), ImageBuf::new(width, height)))
            .collect();
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
