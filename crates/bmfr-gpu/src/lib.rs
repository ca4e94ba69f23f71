pub mod bindings;
pub mod compute;
pub mod context;
pub mod denoise;
pub mod fullscreen;
pub mod resources;
pub mod shader;
pub mod texture;

pub use context::GpuContext;
pub use denoise::GpuDenoisePass;
pub use resources::GpuResources;
pub use texture::GpuTexture;
