use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::PassError;

pub const MIN_BLOCK_SIZE: u32 = 2;
pub const MAX_BLOCK_SIZE: u32 = 64;

/// Tunables for the blockwise feature regression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseParams {
    /// Edge length of the square regression blocks, in pixels.
    pub block_size: u32,
    /// Ridge penalty added to the non-constant features.
    pub ridge: f32,
    /// Albedo floor used when dividing the frame by the surface color.
    pub albedo_epsilon: f32,
    /// Filter lighting only, then multiply the albedo back in.
    pub demodulate_albedo: bool,
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            block_size: 16,
            ridge: 1e-3,
            albedo_epsilon: 1e-3,
            demodulate_albedo: true,
        }
    }
}

impl DenoiseParams {
    /// Read params from a JSON file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read denoise params: {}", path.display()))?;
        let params: Self = serde_json::from_str(&text)
            .with_context(|| format!("parse denoise params: {}", path.display()))?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), PassError> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(PassError::InvalidParams {
                field: "block_size",
                reason: format!(
                    "{} is outside {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}",
                    self.block_size
                ),
            });
        }
        if !self.ridge.is_finite() || self.ridge <= 0.0 {
            return Err(PassError::InvalidParams {
                field: "ridge",
                reason: format!("{} must be finite and positive", self.ridge),
            });
        }
        if !self.albedo_epsilon.is_finite() || self.albedo_epsilon <= 0.0 {
            return Err(PassError::InvalidParams {
                field: "albedo_epsilon",
                reason: format!("{} must be finite and positive", self.albedo_epsilon),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let p = DenoiseParams::default();
        assert_eq!(p.block_size, 16);
        assert!(p.demodulate_albedo);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_block_size() {
        for block_size in [0, 1, 65, 1024] {
            let p = DenoiseParams {
                block_size,
                ..Default::default()
            };
            assert!(matches!(
                p.validate(),
                Err(PassError::InvalidParams {
                    field: "block_size",
                    ..
                })
            ));
        }
    }

    #[test]
    fn rejects_non_positive_ridge() {
        for ridge in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let p = DenoiseParams {
                ridge,
                ..Default::default()
            };
            assert!(p.validate().is_err(), "ridge {ridge} should be rejected");
        }
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: DenoiseParams = serde_json::from_str(r#"{ "block_size": 8 }"#).unwrap();
        assert_eq!(p.block_size, 8);
        assert_eq!(p.ridge, DenoiseParams::default().ridge);
        assert!(p.demodulate_albedo);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{ "ridge": 0.01, "demodulate_albedo": false }"#).unwrap();
        let p = DenoiseParams::load(&path).unwrap();
        assert!((p.ridge - 0.01).abs() < 1e-9);
        assert!(!p.demodulate_albedo);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{ "block_size": 1 }"#).unwrap();
        assert!(DenoiseParams::load(&path).is_err());
    }
}
