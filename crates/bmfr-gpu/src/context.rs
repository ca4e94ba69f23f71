use anyhow::{Context, Result};
use bmfr_core::PassError;
use tracing::{debug, info};

/// Holds the wgpu device and queue the passes record into.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a headless device. Fails when the machine has no usable adapter.
    ///
    /// `WGPU_BACKEND` (e.g. `vulkan`, `metal`) narrows the backends tried.
    /// The device gets the largest texture size the adapter supports.
    pub async fn new() -> Result<Self> {
        let backends = wgpu::Backends::from_env().unwrap_or(wgpu::Backends::PRIMARY);
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .with_context(|| format!("no GPU adapter among {backends:?}"))?;

        let adapter_info = adapter.get_info();
        let required_limits = wgpu::Limits::default().using_resolution(adapter.limits());
        info!(
            adapter = adapter_info.name,
            backend = ?adapter_info.backend,
            max_texture = required_limits.max_texture_dimension_2d,
            "selected GPU adapter"
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("bmfr"),
                required_features: wgpu::Features::empty(),
                required_limits,
                ..Default::default()
            })
            .await
            .with_context(|| format!("create device on `{}`", adapter_info.name))?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Reject a `width x height` texture before wgpu's validation would
    /// abort on it.
    pub fn check_texture_size(&self, width: u32, height: u32) -> Result<(), PassError> {
        check_texture_size(width, height, self.max_texture_dimension())
    }

    /// Reject a storage buffer the device cannot bind in one piece.
    pub fn check_storage_size(&self, bytes: u64) -> Result<(), PassError> {
        let limits = self.device.limits();
        let max = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        check_limit("storage buffer size", bytes, max)
    }
}

pub fn check_texture_size(width: u32, height: u32, max: u32) -> Result<(), PassError> {
    check_limit("texture width", width.into(), max.into())?;
    check_limit("texture height", height.into(), max.into())
}

fn check_limit(what: &'static str, requested: u64, max: u64) -> Result<(), PassError> {
    if requested > max {
        debug!(what, requested, max, "device limit exceeded");
        return Err(PassError::DeviceLimit {
            what,
            requested,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_size_within_limit() {
        assert!(check_texture_size(8192, 8192, 8192).is_ok());
        assert!(check_texture_size(1, 1, 8192).is_ok());
    }

    #[test]
    fn oversized_texture_names_axis() {
        let err = check_texture_size(10000, 6000, 8192).unwrap_err();
        assert!(matches!(
            err,
            PassError::DeviceLimit {
                what: "texture width",
                requested: 10000,
                max: 8192,
            }
        ));

        let err = check_texture_size(4000, 9000, 8192).unwrap_err();
        assert!(matches!(
            err,
            PassError::DeviceLimit {
                what: "texture height",
                ..
            }
        ));
    }
}
