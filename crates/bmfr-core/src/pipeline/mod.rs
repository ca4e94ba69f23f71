use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::error::PassError;
use crate::pass::RenderPass;
use crate::resources::ResourceManager;
use crate::scene::Scene;
use crate::ui::PassUi;

/// Ordered list of render passes sharing one resource manager.
///
/// ```text
/// G-buffer -> Lighting -> Denoise -> Tone Map -> Display
/// ```
///
/// The pipeline forwards each host lifecycle event to every pass in
/// insertion order. Resources are resized before the passes so a pass can
/// rely on its inputs matching the new viewport.
pub struct PassPipeline<R: ResourceManager> {
    passes: Vec<Box<dyn RenderPass<R>>>,
    resources: R,
    scene: Option<Arc<Scene>>,
    initialized: bool,
}

impl<R: ResourceManager> PassPipeline<R> {
    pub fn new(resources: R) -> Self {
        Self {
            passes: Vec::new(),
            resources,
            scene: None,
            initialized: false,
        }
    }

    /// Append a pass. Passes added after `initialize` take part from the
    /// next `initialize` call.
    pub fn add_pass(&mut self, pass: Box<dyn RenderPass<R>>) {
        debug!(pass = pass.name(), "pass added");
        self.passes.push(pass);
        self.initialized = false;
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn resources(&self) -> &R {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut R {
        &mut self.resources
    }

    pub fn scene(&self) -> Option<&Arc<Scene>> {
        self.scene.as_ref()
    }

    pub fn initialize(&mut self, ctx: &R::Context) -> Result<()> {
        for pass in &mut self.passes {
            pass.initialize(ctx, Some(&mut self.resources))
                .with_context(|| format!("initialize pass `{}`", pass.name()))?;
        }
        if let Some(scene) = &self.scene {
            for pass in &mut self.passes {
                pass.init_scene(ctx, Some(Arc::clone(scene)));
            }
        }
        self.initialized = true;
        info!(passes = self.passes.len(), "pipeline initialized");
        Ok(())
    }

    pub fn set_scene(&mut self, ctx: &R::Context, scene: Option<Arc<Scene>>) {
        debug!(
            scene = scene.as_ref().map(|s| s.name.as_str()),
            "scene changed"
        );
        for pass in &mut self.passes {
            pass.init_scene(ctx, scene.clone());
        }
        self.scene = scene;
    }

    pub fn resize(&mut self, ctx: &R::Context, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(PassError::EmptyViewport { width, height }.into());
        }
        self.resources
            .resize(ctx, width, height)
            .context("resize pipeline resources")?;
        for pass in &mut self.passes {
            pass.resize(ctx, width, height)
                .with_context(|| format!("resize pass `{}`", pass.name()))?;
        }
        info!(width, height, "pipeline resized");
        Ok(())
    }

    /// Draw every pass's options window. Returns true when any pass asked
    /// for a refresh.
    pub fn render_gui(&mut self, ui: &mut dyn PassUi) -> bool {
        let mut refresh = false;
        for pass in &mut self.passes {
            ui.begin_window(pass.gui_name(), pass.gui_size());
            pass.render_gui(ui);
            refresh |= pass.take_refresh();
        }
        refresh
    }

    pub fn execute(&mut self, ctx: &R::Context) -> Result<()> {
        if !self.initialized {
            return Err(PassError::NotInitialized("execute").into());
        }
        for pass in &mut self.passes {
            debug!(pass = pass.name(), "executing");
            pass.execute(ctx, &mut self.resources)
                .with_context(|| format!("execute pass `{}`", pass.name()))?;
        }
        Ok(())
    }

    pub fn has_animation(&self) -> bool {
        self.passes.iter().any(|p| p.has_animation())
    }
}
