use std::sync::Arc;

use anyhow::Result;

use crate::resources::ResourceManager;
use crate::scene::Scene;
use crate::ui::PassUi;

/// Display state every pass carries: names, options window size and the
/// refresh flag raised when a GUI edit invalidates accumulated results.
#[derive(Clone, Debug)]
pub struct PassBase {
    name: String,
    gui_name: String,
    gui_size: (u32, u32),
    refresh: bool,
}

impl PassBase {
    pub const DEFAULT_GUI_SIZE: (u32, u32) = (300, 200);

    pub fn new(name: impl Into<String>, gui_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gui_name: gui_name.into(),
            gui_size: Self::DEFAULT_GUI_SIZE,
            refresh: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gui_name(&self) -> &str {
        &self.gui_name
    }

    pub fn gui_size(&self) -> (u32, u32) {
        self.gui_size
    }

    pub fn set_gui_size(&mut self, width: u32, height: u32) {
        self.gui_size = (width, height);
    }

    pub fn set_refresh_flag(&mut self) {
        self.refresh = true;
    }

    /// Read and clear the refresh flag.
    pub fn take_refresh(&mut self) -> bool {
        std::mem::take(&mut self.refresh)
    }
}

/// A stage of the pass pipeline, driven by the host through lifecycle hooks.
///
/// Call order: `initialize` once, `init_scene` whenever the scene changes,
/// `resize` whenever the viewport changes (at least once before the first
/// frame), then `render_gui` and `execute` every frame.
pub trait RenderPass<R: ResourceManager>: Send {
    fn base(&self) -> &PassBase;
    fn base_mut(&mut self) -> &mut PassBase;

    fn name(&self) -> &str {
        self.base().name()
    }

    fn gui_name(&self) -> &str {
        self.base().gui_name()
    }

    fn gui_size(&self) -> (u32, u32) {
        self.base().gui_size()
    }

    fn take_refresh(&mut self) -> bool {
        self.base_mut().take_refresh()
    }

    /// Declare resources and build shader state.
    ///
    /// Fails with [`crate::PassError::MissingResourceManager`] when the host
    /// has no resource manager to offer.
    fn initialize(&mut self, ctx: &R::Context, resources: Option<&mut R>) -> Result<()>;

    fn init_scene(&mut self, _ctx: &R::Context, _scene: Option<Arc<Scene>>) {}

    fn resize(&mut self, ctx: &R::Context, width: u32, height: u32) -> Result<()>;

    fn render_gui(&mut self, _ui: &mut dyn PassUi) {}

    fn execute(&mut self, ctx: &R::Context, resources: &mut R) -> Result<()>;

    /// Whether the pass post-processes an image produced upstream.
    fn applies_postprocess(&self) -> bool {
        false
    }

    /// Whether the pass output changes over time on its own.
    fn has_animation(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_flag_is_cleared_on_take() {
        let mut base = PassBase::new("pass", "Pass Options");
        assert!(!base.take_refresh());
        base.set_refresh_flag();
        assert!(base.take_refresh());
        assert!(!base.take_refresh());
    }

    #[test]
    fn gui_size_defaults_and_overrides() {
        let mut base = PassBase::new("pass", "Pass Options");
        assert_eq!(base.gui_size(), PassBase::DEFAULT_GUI_SIZE);
        base.set_gui_size(250, 135);
        assert_eq!(base.gui_size(), (250, 135));
        assert_eq!(base.gui_name(), "Pass Options");
    }
}
