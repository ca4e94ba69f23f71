use tracing::info;

/// The widgets a pass may draw in its options window.
pub trait PassUi {
    /// Start the options window of the next pass.
    fn begin_window(&mut self, _title: &str, _size: (u32, u32)) {}

    /// Draw a checkbox bound to `value`. Returns true when the user changed it.
    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool;
}

/// Headless UI that reports widget state through the log and never edits it.
#[derive(Debug, Default)]
pub struct LogUi {
    pub window: Option<String>,
}

impl LogUi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PassUi for LogUi {
    fn begin_window(&mut self, title: &str, size: (u32, u32)) {
        info!(title, width = size.0, height = size.1, "pass options");
        self.window = Some(title.to_string());
    }

    fn checkbox(&mut self, label: &str, value: &mut bool) -> bool {
        info!(window = self.window.as_deref(), label, value = *value, "checkbox");
        false
    }
}
