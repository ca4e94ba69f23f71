use anyhow::Result;
use bmfr_core::PassError;

/// Resources a shader reads, in `@binding` order: textures first, then the
/// uniform block if any, then storage buffers.
#[derive(Clone, Copy, Debug, Default)]
pub struct BindingDesc<'a> {
    pub textures: &'a [&'a str],
    pub uniform_size: Option<u64>,
    pub buffers: &'a [&'a str],
}

/// Bind-group layout plus the uniform buffer of one shader, addressed by
/// variable name.
pub struct ShaderBindings {
    shader: String,
    textures: Vec<String>,
    buffers: Vec<String>,
    layout: wgpu::BindGroupLayout,
    uniforms: Option<wgpu::Buffer>,
}

impl ShaderBindings {
    /// `writable` selects read-write storage buffers; fragment stages may
    /// only read them.
    pub fn new(
        device: &wgpu::Device,
        shader: &str,
        desc: &BindingDesc<'_>,
        visibility: wgpu::ShaderStages,
        writable: bool,
    ) -> Self {
        let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..desc.textures.len() as u32)
            .map(|binding| wgpu::BindGroupLayoutEntry {
                binding,
                visibility,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            })
            .collect();
        if desc.uniform_size.is_some() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: entries.len() as u32,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for _ in desc.buffers {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: entries.len() as u32,
                visibility,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage {
                        read_only: !writable,
                    },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{shader}_bgl")),
            entries: &entries,
        });

        let uniforms = desc.uniform_size.map(|size| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{shader}_params")),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        Self {
            shader: shader.to_string(),
            textures: desc.textures.iter().map(|s| s.to_string()).collect(),
            buffers: desc.buffers.iter().map(|s| s.to_string()).collect(),
            layout,
            uniforms,
        }
    }

    pub fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    /// Empty variable set for this shader.
    pub fn vars(&self) -> ShaderVars<'_> {
        ShaderVars {
            shader: &self.shader,
            textures: &self.textures,
            buffers: &self.buffers,
            views: vec![None; self.textures.len()],
            storage: vec![None; self.buffers.len()],
        }
    }

    /// Stage new uniform contents; takes effect for the next submission.
    pub fn write_uniforms(&self, queue: &wgpu::Queue, bytes: &[u8]) -> Result<()> {
        let buffer = self
            .uniforms
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("shader `{}` has no uniform block", self.shader))?;
        anyhow::ensure!(
            bytes.len() as u64 == buffer.size(),
            "uniform block of `{}` is {} bytes, got {}",
            self.shader,
            buffer.size(),
            bytes.len()
        );
        queue.write_buffer(buffer, 0, bytes);
        Ok(())
    }

    /// Build the bind group. Every named variable must be bound.
    pub fn bind_group(&self, device: &wgpu::Device, vars: &ShaderVars<'_>) -> Result<wgpu::BindGroup> {
        let missing = |name: &String| PassError::MissingShaderVar {
            shader: self.shader.clone(),
            var: name.clone(),
        };

        let mut entries = Vec::with_capacity(self.textures.len() + self.buffers.len() + 1);
        for (name, view) in self.textures.iter().zip(&vars.views) {
            let view = view.ok_or_else(|| missing(name))?;
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        if let Some(buffer) = &self.uniforms {
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: buffer.as_entire_binding(),
            });
        }
        for (name, buffer) in self.buffers.iter().zip(&vars.storage) {
            let buffer = buffer.ok_or_else(|| missing(name))?;
            entries.push(wgpu::BindGroupEntry {
                binding: entries.len() as u32,
                resource: buffer.as_entire_binding(),
            });
        }

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{}_bg", self.shader)),
            layout: &self.layout,
            entries: &entries,
        }))
    }
}

/// Resource bindings for one launch, looked up by variable name.
pub struct ShaderVars<'a> {
    shader: &'a str,
    textures: &'a [String],
    buffers: &'a [String],
    views: Vec<Option<&'a wgpu::TextureView>>,
    storage: Vec<Option<&'a wgpu::Buffer>>,
}

impl<'a> ShaderVars<'a> {
    pub fn set_texture(&mut self, name: &str, view: &'a wgpu::TextureView) -> Result<(), PassError> {
        let slot = self.slot(self.textures, name)?;
        self.views[slot] = Some(view);
        Ok(())
    }

    pub fn set_buffer(&mut self, name: &str, buffer: &'a wgpu::Buffer) -> Result<(), PassError> {
        let slot = self.slot(self.buffers, name)?;
        self.storage[slot] = Some(buffer);
        Ok(())
    }

    pub fn is_bound(&self, name: &str) -> bool {
        let texture = self
            .textures
            .iter()
            .position(|n| n == name)
            .is_some_and(|slot| self.views[slot].is_some());
        let buffer = self
            .buffers
            .iter()
            .position(|n| n == name)
            .is_some_and(|slot| self.storage[slot].is_some());
        texture || buffer
    }

    fn slot(&self, names: &[String], name: &str) -> Result<usize, PassError> {
        names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| PassError::UnknownShaderVar {
                shader: self.shader.to_string(),
                var: name.to_string(),
            })
    }
}
