//! Well-known resource names shared between passes.

/// World-space hit position per pixel.
pub const WORLD_POSITION: &str = "WorldPosition";
/// World-space shading normal per pixel.
pub const WORLD_NORMAL: &str = "WorldNormal";
/// Diffuse albedo of the surface seen by each pixel.
pub const MATERIAL_DIFFUSE: &str = "MaterialDiffuse";

/// Feature buffers the denoiser reads alongside the noisy frame.
pub const FEATURE_CHANNELS: [&str; 3] = [WORLD_POSITION, WORLD_NORMAL, MATERIAL_DIFFUSE];
