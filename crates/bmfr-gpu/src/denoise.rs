use std::sync::Arc;

use anyhow::Result;
use bmfr_core::PassError;
use bmfr_core::channel::{FEATURE_CHANNELS, MATERIAL_DIFFUSE, WORLD_NORMAL, WORLD_POSITION};
use bmfr_core::params::DenoiseParams;
use bmfr_core::pass::{PassBase, RenderPass};
use bmfr_core::passes::denoise::{GUI_NAME, GUI_SIZE, PASS_NAME, render_toggle};
use bmfr_core::resources::ResourceManager;
use bmfr_core::scene::Scene;
use bmfr_core::ui::PassUi;
use bytemuck::{Pod, Zeroable};
use tracing::{debug, info};

use crate::bindings::BindingDesc;
use crate::compute::{ComputeDesc, ComputeLaunch};
use crate::context::GpuContext;
use crate::fullscreen::{FullscreenDesc, FullscreenLaunch};
use crate::resources::GpuResources;
use crate::shader::{BLOCK_FIT_SIZE, denoise_apply_fragment, denoise_fit_source};
use crate::texture::GpuTexture;

/// Texture variables in binding order, shared by both stages.
pub const SHADER_TEXTURES: [&str; 4] = ["gCurFrame", "gPos", "gNorm", "gDiffuseMatl"];
/// Per-block coefficients written by the fit stage, read by the apply stage.
pub const FITS_BUFFER: &str = "fits";

fn shader_bindings() -> BindingDesc<'static> {
    BindingDesc {
        textures: &SHADER_TEXTURES,
        uniform_size: Some(std::mem::size_of::<DenoiseUniforms>() as u64),
        buffers: &[FITS_BUFFER],
    }
}

/// Blocks per row and column, edge blocks included.
pub fn block_grid(size: (u32, u32), block_size: u32) -> (u32, u32) {
    (size.0.div_ceil(block_size), size.1.div_ceil(block_size))
}

/// Bytes of fits buffer needed for a `size` frame.
pub fn fits_buffer_size(size: (u32, u32), block_size: u32) -> u64 {
    let (bx, by) = block_grid(size, block_size);
    u64::from(bx) * u64::from(by) * BLOCK_FIT_SIZE
}

/// Mirrors `DenoiseParams` in `bmfr_common.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct DenoiseUniforms {
    size: [u32; 2],
    block_size: u32,
    demodulate: u32,
    ridge: f32,
    albedo_epsilon: f32,
    _pad: [f32; 2],
}

impl DenoiseUniforms {
    fn new(params: &DenoiseParams, size: (u32, u32)) -> Self {
        Self {
            size: [size.0, size.1],
            block_size: params.block_size,
            demodulate: params.demodulate_albedo as u32,
            ridge: params.ridge,
            albedo_epsilon: params.albedo_epsilon,
            _pad: [0.0; 2],
        }
    }
}

/// Shader state built on initialize.
struct Stages {
    fit: ComputeLaunch,
    apply: FullscreenLaunch,
}

/// GPU denoise pass: a compute dispatch solves each block once, a
/// fullscreen draw evaluates the fits into an internal target, and the
/// target is copied back into the denoised channel.
pub struct GpuDenoisePass {
    base: PassBase,
    channel: String,
    params: DenoiseParams,
    enabled: bool,
    stages: Option<Stages>,
    internal: Option<GpuTexture>,
    fits: Option<wgpu::Buffer>,
    scene: Option<Arc<Scene>>,
}

impl GpuDenoisePass {
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_params(channel, DenoiseParams::default())
    }

    pub fn with_params(channel: impl Into<String>, params: DenoiseParams) -> Self {
        Self {
            base: PassBase::new(PASS_NAME, GUI_NAME),
            channel: channel.into(),
            params,
            enabled: true,
            stages: None,
            internal: None,
            fits: None,
            scene: None,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn params(&self) -> &DenoiseParams {
        &self.params
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn scene(&self) -> Option<&Arc<Scene>> {
        self.scene.as_ref()
    }

    pub fn internal_size(&self) -> Option<(u32, u32)> {
        self.internal.as_ref().map(GpuTexture::size)
    }

    /// Make sure the fits buffer holds every block of a `size` frame.
    fn reserve_fits(&mut self, ctx: &GpuContext, size: (u32, u32)) -> Result<()> {
        let bytes = fits_buffer_size(size, self.params.block_size);
        if self.fits.as_ref().is_some_and(|b| b.size() >= bytes) {
            return Ok(());
        }
        ctx.check_storage_size(bytes)?;
        debug!(bytes, "denoise fits buffer");
        self.fits = Some(ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bmfr_fits"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        }));
        Ok(())
    }
}

impl RenderPass<GpuResources> for GpuDenoisePass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn initialize(&mut self, ctx: &GpuContext, resources: Option<&mut GpuResources>) -> Result<()> {
        let Some(resources) = resources else {
            return Err(PassError::MissingResourceManager {
                pass: self.base.name().to_string(),
            }
            .into());
        };
        self.params.validate()?;

        resources.request_texture_resource(&self.channel);
        resources.request_texture_resources(&FEATURE_CHANNELS);

        let fit_source = denoise_fit_source();
        let apply_fragment = denoise_apply_fragment();
        self.stages = Some(Stages {
            fit: ComputeLaunch::new(
                &ctx.device,
                &ComputeDesc {
                    label: "bmfr_fit",
                    source: &fit_source,
                    bindings: shader_bindings(),
                },
            ),
            apply: FullscreenLaunch::new(
                &ctx.device,
                &FullscreenDesc {
                    label: "bmfr_apply",
                    fragment: &apply_fragment,
                    bindings: shader_bindings(),
                    target_format: GpuTexture::FORMAT,
                },
            ),
        });

        self.base.set_gui_size(GUI_SIZE.0, GUI_SIZE.1);
        info!(channel = %self.channel, backend = "gpu", "denoise pass initialized");
        Ok(())
    }

    fn init_scene(&mut self, _ctx: &GpuContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
    }

    fn resize(&mut self, ctx: &GpuContext, width: u32, height: u32) -> Result<()> {
        ctx.check_texture_size(width, height)?;
        self.reserve_fits(ctx, (width, height))?;
        debug!(width, height, "denoise internal target");
        self.internal = Some(GpuTexture::create(
            &ctx.device,
            width,
            height,
            "bmfr_internal",
        ));
        Ok(())
    }

    fn render_gui(&mut self, ui: &mut dyn PassUi) {
        render_toggle(&mut self.base, ui, &mut self.enabled);
    }

    fn execute(&mut self, ctx: &GpuContext, resources: &mut GpuResources) -> Result<()> {
        if !self.enabled || self.stages.is_none() || self.internal.is_none() {
            return Ok(());
        }
        let Some(frame) = resources.texture(&self.channel) else {
            return Ok(());
        };
        // GpuResources allocates every texture at the viewport size, so the
        // features always match the frame.
        let (Some(position), Some(normal), Some(albedo)) = (
            resources.texture(WORLD_POSITION),
            resources.texture(WORLD_NORMAL),
            resources.texture(MATERIAL_DIFFUSE),
        ) else {
            debug!(channel = %self.channel, "feature buffers missing, skipping denoise");
            return Ok(());
        };

        self.reserve_fits(ctx, frame.size())?;
        let (Some(stages), Some(internal), Some(fits)) = (&self.stages, &self.internal, &self.fits)
        else {
            return Ok(());
        };

        let uniforms = DenoiseUniforms::new(&self.params, frame.size());
        let bytes = bytemuck::bytes_of(&uniforms);
        stages.fit.write_uniforms(&ctx.queue, bytes)?;
        stages.apply.write_uniforms(&ctx.queue, bytes)?;

        let inputs = [
            ("gCurFrame", &frame.view),
            ("gPos", &position.view),
            ("gNorm", &normal.view),
            ("gDiffuseMatl", &albedo.view),
        ];
        let mut fit_vars = stages.fit.vars();
        let mut apply_vars = stages.apply.vars();
        for (name, view) in inputs {
            fit_vars.set_texture(name, view)?;
            apply_vars.set_texture(name, view)?;
        }
        fit_vars.set_buffer(FITS_BUFFER, fits)?;
        apply_vars.set_buffer(FITS_BUFFER, fits)?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("bmfr_denoise_encoder"),
            });
        let grid = block_grid(frame.size(), self.params.block_size);
        stages.fit.execute(&ctx.device, &mut encoder, &fit_vars, grid)?;
        stages.apply.execute(&ctx.device, &mut encoder, &apply_vars, &internal.view)?;
        internal.copy_region_to(&mut encoder, frame);
        ctx.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn applies_postprocess(&self) -> bool {
        true
    }

    fn has_animation(&self) -> bool {
        false
    }
}
