use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bmfr_core::PassError;
use bmfr_core::channel::{MATERIAL_DIFFUSE, WORLD_NORMAL, WORLD_POSITION};
use bmfr_core::image_buf::ImageBuf;
use bmfr_core::io::{self, Encoding};
use bmfr_core::params::DenoiseParams;
use bmfr_core::pass::RenderPass;
use bmfr_core::passes::DenoisePass;
use bmfr_core::pipeline::PassPipeline;
use bmfr_core::resources::{CpuContext, CpuResources, ResourceManager};
use bmfr_core::scene::Scene;
use bmfr_core::ui::LogUi;
use bmfr_gpu::{GpuContext, GpuDenoisePass, GpuResources};
use tracing::{info, warn};

use crate::cli::{Args, Backend};

/// One frame of renderer output: the noisy colour and its feature buffers.
pub struct Frame {
    pub color: ImageBuf,
    pub position: ImageBuf,
    pub normal: ImageBuf,
    pub albedo: ImageBuf,
}

impl Frame {
    pub fn load(args: &Args) -> Result<Self> {
        Ok(Self {
            color: io::load_image(&args.color, Encoding::Srgb)?,
            position: io::load_image(&args.position, Encoding::Linear)?,
            normal: io::load_image(&args.normal, Encoding::Linear)?,
            albedo: io::load_image(&args.albedo, Encoding::Linear)?,
        })
    }

    fn inputs<'a>(&'a self, channel: &'a str) -> [(&'a str, &'a ImageBuf); 4] {
        [
            (channel, &self.color),
            (WORLD_POSITION, &self.position),
            (WORLD_NORMAL, &self.normal),
            (MATERIAL_DIFFUSE, &self.albedo),
        ]
    }
}

/// Host-side access to a backend's named textures.
trait HostResources: ResourceManager + Sized {
    fn put(&mut self, ctx: &Self::Context, name: &str, buf: &ImageBuf) -> Result<()>;
    fn get(&self, ctx: &Self::Context, name: &str) -> Result<ImageBuf>;
}

impl HostResources for CpuResources {
    fn put(&mut self, _ctx: &CpuContext, name: &str, buf: &ImageBuf) -> Result<()> {
        self.upload(name, buf.clone())
    }

    fn get(&self, _ctx: &CpuContext, name: &str) -> Result<ImageBuf> {
        self.texture(name)
            .cloned()
            .with_context(|| format!("texture `{name}` is not allocated"))
    }
}

impl HostResources for GpuResources {
    fn put(&mut self, ctx: &GpuContext, name: &str, buf: &ImageBuf) -> Result<()> {
        self.upload(ctx, name, buf)
    }

    fn get(&self, ctx: &GpuContext, name: &str) -> Result<ImageBuf> {
        self.download(ctx, name)
    }
}

/// Drive a single-pass pipeline through one frame and read the channel back.
fn run_pipeline<R: HostResources>(
    ctx: &R::Context,
    resources: R,
    pass: Box<dyn RenderPass<R>>,
    scene: Arc<Scene>,
    frame: &Frame,
    channel: &str,
) -> Result<ImageBuf> {
    let mut pipeline = PassPipeline::new(resources);
    pipeline.add_pass(pass);
    pipeline.initialize(ctx)?;
    pipeline.set_scene(ctx, Some(scene));
    pipeline.resize(ctx, frame.color.width, frame.color.height)?;

    for (name, buf) in frame.inputs(channel) {
        pipeline
            .resources_mut()
            .put(ctx, name, buf)
            .with_context(|| format!("publish `{name}`"))?;
    }

    if pipeline.render_gui(&mut LogUi::new()) {
        info!("pass options changed");
    }
    pipeline.execute(ctx)?;
    pipeline.resources().get(ctx, channel)
}

fn cpu_pass(args: &Args, params: DenoiseParams) -> DenoisePass {
    let mut pass = DenoisePass::with_params(&args.channel, params);
    pass.set_enabled(!args.no_denoise);
    pass
}

fn gpu_pass(args: &Args, params: DenoiseParams) -> GpuDenoisePass {
    let mut pass = GpuDenoisePass::with_params(&args.channel, params);
    pass.set_enabled(!args.no_denoise);
    pass
}

fn run_gpu(
    ctx: &GpuContext,
    args: &Args,
    params: DenoiseParams,
    scene: Arc<Scene>,
    frame: &Frame,
) -> Result<ImageBuf> {
    let pass: Box<dyn RenderPass<GpuResources>> = Box::new(gpu_pass(args, params));
    run_pipeline(ctx, GpuResources::new(), pass, scene, frame, &args.channel)
}

fn run_cpu(args: &Args, params: DenoiseParams, scene: Arc<Scene>, frame: &Frame) -> Result<ImageBuf> {
    let pass: Box<dyn RenderPass<CpuResources>> = Box::new(cpu_pass(args, params));
    run_pipeline(&CpuContext, CpuResources::new(), pass, scene, frame, &args.channel)
}

/// True when some cause in the chain is a device limit the CPU path does
/// not have.
fn exceeds_device_limits(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<PassError>(),
            Some(PassError::DeviceLimit { .. })
        )
    })
}

fn load_scene(args: &Args) -> Result<Arc<Scene>> {
    let scene = match &args.scene {
        Some(path) => Scene::load(path)?,
        None => Scene::new(
            args.color
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("frame"),
        ),
    };
    Ok(Arc::new(scene))
}

/// Denoise `frame` on the requested backend.
pub async fn denoise_frame(args: &Args, frame: &Frame) -> Result<ImageBuf> {
    let params = args.denoise_params()?;
    let scene = load_scene(args)?;
    let t0 = Instant::now();

    let gpu = match args.backend {
        Backend::Cpu => None,
        Backend::Gpu => Some(GpuContext::new().await?),
        Backend::Auto => match GpuContext::new().await {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                warn!("no usable GPU, falling back to CPU: {e:#}");
                None
            }
        },
    };

    let out = match gpu {
        Some(ctx) => {
            info!(adapter = %ctx.adapter_info.name, "denoising on GPU");
            match run_gpu(&ctx, args, params.clone(), Arc::clone(&scene), frame) {
                Err(e) if args.backend == Backend::Auto && exceeds_device_limits(&e) => {
                    warn!("frame exceeds GPU limits, falling back to CPU: {e:#}");
                    run_cpu(args, params, scene, frame)?
                }
                result => result?,
            }
        }
        None => {
            info!("denoising on CPU");
            run_cpu(args, params, scene, frame)?
        }
    };

    info!(
        elapsed_ms = t0.elapsed().as_millis(),
        width = out.width,
        height = out.height,
        "frame denoised"
    );
    Ok(out)
}

pub async fn run(args: Args) -> Result<()> {
    let frame = Frame::load(&args)?;
    let out = denoise_frame(&args, &frame).await?;
    save(&out, &args.output)
}

fn save(buf: &ImageBuf, path: &Path) -> Result<()> {
    io::save_image(buf, path)?;
    info!(path = %path.display(), "wrote denoised frame");
    Ok(())
}
