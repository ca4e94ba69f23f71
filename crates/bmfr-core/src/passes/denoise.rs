use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::channel::{FEATURE_CHANNELS, MATERIAL_DIFFUSE, WORLD_NORMAL, WORLD_POSITION};
use crate::error::PassError;
use crate::image_buf::ImageBuf;
use crate::params::DenoiseParams;
use crate::pass::{PassBase, RenderPass};
use crate::regression::{self, FeatureInputs};
use crate::resources::{CpuContext, CpuResources, ResourceManager};
use crate::scene::Scene;
use crate::ui::PassUi;

pub const PASS_NAME: &str = "BMFR Denoise Pass";
pub const GUI_NAME: &str = "BMFR Denoise Options";
pub const GUI_SIZE: (u32, u32) = (250, 135);
pub const LABEL_ENABLED: &str = "Do BMFR Denoise";
pub const LABEL_DISABLED: &str = "Ignore the denoise stage";

/// Checkbox label for the current toggle state.
pub fn toggle_label(enabled: bool) -> &'static str {
    if enabled { LABEL_ENABLED } else { LABEL_DISABLED }
}

/// Draw the enable toggle and raise the refresh flag when it changes.
pub fn render_toggle(base: &mut PassBase, ui: &mut dyn PassUi, enabled: &mut bool) {
    if ui.checkbox(toggle_label(*enabled), enabled) {
        debug!(pass = base.name(), enabled = *enabled, "denoise toggled");
        base.set_refresh_flag();
    }
}

/// CPU denoise pass: regresses the named channel against the G-buffer
/// features and writes the result back into the same channel.
pub struct DenoisePass {
    base: PassBase,
    channel: String,
    params: DenoiseParams,
    enabled: bool,
    initialized: bool,
    internal: Option<ImageBuf>,
    scene: Option<Arc<Scene>>,
}

impl DenoisePass {
    pub fn new(channel: impl Into<String>) -> Self {
        Self::with_params(channel, DenoiseParams::default())
    }

    pub fn with_params(channel: impl Into<String>, params: DenoiseParams) -> Self {
        Self {
            base: PassBase::new(PASS_NAME, GUI_NAME),
            channel: channel.into(),
            params,
            enabled: true,
            initialized: false,
            internal: None,
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

    /// Size of the internal target, once `resize` has run.
    pub fn internal_size(&self) -> Option<(u32, u32)> {
        self.internal.as_ref().map(ImageBuf::dimensions)
    }
}

impl RenderPass<CpuResources> for DenoisePass {
    fn base(&self) -> &PassBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut PassBase {
        &mut self.base
    }

    fn initialize(&mut self, _ctx: &CpuContext, resources: Option<&mut CpuResources>) -> Result<()> {
        let Some(resources) = resources else {
            return Err(PassError::MissingResourceManager {
                pass: self.base.name().to_string(),
            }
            .into());
        };
        self.params.validate()?;

        resources.request_texture_resource(&self.channel);
        resources.request_texture_resources(&FEATURE_CHANNELS);

        self.base.set_gui_size(GUI_SIZE.0, GUI_SIZE.1);
        self.initialized = true;
        info!(channel = %self.channel, backend = "cpu", "denoise pass initialized");
        Ok(())
    }

    fn init_scene(&mut self, _ctx: &CpuContext, scene: Option<Arc<Scene>>) {
        self.scene = scene;
    }

    fn resize(&mut self, _ctx: &CpuContext, width: u32, height: u32) -> Result<()> {
        debug!(width, height, "denoise internal target");
        self.internal = Some(ImageBuf::new(width, height));
        Ok(())
    }

    fn render_gui(&mut self, ui: &mut dyn PassUi) {
        render_toggle(&mut self.base, ui, &mut self.enabled);
    }

    fn execute(&mut self, _ctx: &CpuContext, resources: &mut CpuResources) -> Result<()> {
        if !self.initialized || !self.enabled {
            return Ok(());
        }
        let Some(frame) = resources.texture(&self.channel) else {
            return Ok(());
        };
        let (Some(position), Some(normal), Some(albedo)) = (
            resources.texture(WORLD_POSITION),
            resources.texture(WORLD_NORMAL),
            resources.texture(MATERIAL_DIFFUSE),
        ) else {
            debug!(channel = %self.channel, "feature buffers missing, skipping denoise");
            return Ok(());
        };
        let Some(internal) = self.internal.as_mut() else {
            return Ok(());
        };

        let inputs = FeatureInputs {
            frame,
            position,
            normal,
            albedo,
        };
        let denoised = regression::denoise(&inputs, &self.params)?;
        internal.copy_region_from(&denoised);

        if let Some(target) = resources.texture_mut(&self.channel) {
            target.copy_region_from(internal);
        }
        Ok(())
    }

    fn applies_postprocess(&self) -> bool {
        true
    }

    fn has_animation(&self) -> bool {
        false
    }
}
