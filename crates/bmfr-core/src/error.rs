use thiserror::Error;

/// Errors reported by render passes and the pass pipeline.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("pass `{pass}` was initialized without a resource manager")]
    MissingResourceManager { pass: String },

    #[error("invalid denoise parameter `{field}`: {reason}")]
    InvalidParams { field: &'static str, reason: String },

    #[error(
        "resource `{name}` is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        name: String,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("shader `{shader}` has no variable named `{var}`")]
    UnknownShaderVar { shader: String, var: String },

    #[error("shader `{shader}` variable `{var}` was not bound")]
    MissingShaderVar { shader: String, var: String },

    #[error("pipeline must be initialized before `{0}`")]
    NotInitialized(&'static str),

    #[error("viewport must be non-empty, got {width}x{height}")]
    EmptyViewport { width: u32, height: u32 },

    #[error("{what} of {requested} exceeds the device limit of {max}")]
    DeviceLimit {
        what: &'static str,
        requested: u64,
        max: u64,
    },
}

impl PassError {
    pub fn dimension_mismatch(name: &str, expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            name: name.to_string(),
            expected_width: expected.0,
            expected_height: expected.1,
            actual_width: actual.0,
            actual_height: actual.1,
        }
    }
}
