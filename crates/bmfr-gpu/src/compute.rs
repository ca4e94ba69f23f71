use anyhow::Result;
use tracing::debug;

use crate::bindings::{BindingDesc, ShaderBindings, ShaderVars};
use crate::shader::{COMPUTE_ENTRY, load_shader};

pub struct ComputeDesc<'a> {
    pub label: &'a str,
    /// Complete compute shader defining `cs_main`.
    pub source: &'a str,
    /// Storage buffers are bound read-write.
    pub bindings: BindingDesc<'a>,
}

/// A compute shader dispatched over a 2D grid of work items.
pub struct ComputeLaunch {
    label: String,
    bindings: ShaderBindings,
    pipeline: wgpu::ComputePipeline,
}

impl ComputeLaunch {
    /// Edge of the square workgroup every compute shader here declares.
    pub const WORKGROUP_SIZE: u32 = 8;

    pub fn new(device: &wgpu::Device, desc: &ComputeDesc<'_>) -> Self {
        debug!(label = desc.label, "creating compute launch");
        let module = load_shader(device, desc.label, desc.source);
        let bindings = ShaderBindings::new(
            device,
            desc.label,
            &desc.bindings,
            wgpu::ShaderStages::COMPUTE,
            true,
        );

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{}_layout", desc.label)),
            bind_group_layouts: &[bindings.layout()],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(COMPUTE_ENTRY),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            label: desc.label.to_string(),
            bindings,
            pipeline,
        }
    }

    pub fn vars(&self) -> ShaderVars<'_> {
        self.bindings.vars()
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, bytes: &[u8]) -> Result<()> {
        self.bindings.write_uniforms(queue, bytes)
    }

    /// Record a dispatch covering `items.0 x items.1` invocations.
    pub fn execute(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        vars: &ShaderVars<'_>,
        items: (u32, u32),
    ) -> Result<()> {
        let bind_group = self.bindings.bind_group(device, vars)?;

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&self.label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            items.0.div_ceil(Self::WORKGROUP_SIZE),
            items.1.div_ceil(Self::WORKGROUP_SIZE),
            1,
        );
        Ok(())
    }
}
