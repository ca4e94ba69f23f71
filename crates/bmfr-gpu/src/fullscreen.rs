use anyhow::Result;
use tracing::debug;

use crate::bindings::{BindingDesc, ShaderBindings, ShaderVars};
use crate::shader::{FRAGMENT_ENTRY, VERTEX_ENTRY, compose_fullscreen, load_shader};

/// What a fullscreen pass reads and where it writes.
pub struct FullscreenDesc<'a> {
    pub label: &'a str,
    /// Fragment stage source. It may use `FullscreenOut` from the shared
    /// vertex stage and must define `fs_main`.
    pub fragment: &'a str,
    /// Storage buffers are bound read-only.
    pub bindings: BindingDesc<'a>,
    pub target_format: wgpu::TextureFormat,
}

/// A fragment shader run over the whole render target.
pub struct FullscreenLaunch {
    label: String,
    bindings: ShaderBindings,
    pipeline: wgpu::RenderPipeline,
}

impl FullscreenLaunch {
    pub fn new(device: &wgpu::Device, desc: &FullscreenDesc<'_>) -> Self {
        debug!(
            label = desc.label,
            textures = desc.bindings.textures.len(),
            buffers = desc.bindings.buffers.len(),
            "creating fullscreen launch"
        );
        let module = load_shader(device, desc.label, &compose_fullscreen(desc.fragment));
        let bindings = ShaderBindings::new(
            device,
            desc.label,
            &desc.bindings,
            wgpu::ShaderStages::FRAGMENT,
            false,
        );

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_layout", desc.label)),
            bind_group_layouts: &[bindings.layout()],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(VERTEX_ENTRY),
                compilation_options: Default::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(FRAGMENT_ENTRY),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: desc.target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        });

        Self {
            label: desc.label.to_string(),
            bindings,
            pipeline,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vars(&self) -> ShaderVars<'_> {
        self.bindings.vars()
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, bytes: &[u8]) -> Result<()> {
        self.bindings.write_uniforms(queue, bytes)
    }

    /// Record one fullscreen draw into `target`.
    pub fn execute(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        vars: &ShaderVars<'_>,
        target: &wgpu::TextureView,
    ) -> Result<()> {
        let bind_group = self.bindings.bind_group(device, vars)?;

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}
