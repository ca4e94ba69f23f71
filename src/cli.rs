use std::path::PathBuf;

use anyhow::Result;
use bmfr_core::params::DenoiseParams;
use clap::{Parser, ValueEnum};
use tracing::debug;

/// Which implementation of the denoise pass drives the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Use the GPU when an adapter is available, the CPU otherwise.
    Auto,
    Gpu,
    Cpu,
}

/// Denoise one rendered frame with its G-buffer.
#[derive(Parser, Debug)]
#[command(name = "bmfr", version, about)]
pub struct Args {
    /// Noisy colour image (8-bit files are treated as sRGB).
    #[arg(long)]
    pub color: PathBuf,

    /// World-space position buffer.
    #[arg(long)]
    pub position: PathBuf,

    /// World-space normal buffer.
    #[arg(long)]
    pub normal: PathBuf,

    /// Diffuse material colour buffer.
    #[arg(long)]
    pub albedo: PathBuf,

    /// Where to write the denoised frame. `.exr` keeps full float range.
    #[arg(long, short)]
    pub output: PathBuf,

    #[arg(long, default_value = "auto", value_enum)]
    pub backend: Backend,

    /// Resource name the colour buffer is published under.
    #[arg(long, default_value = "HDRColor")]
    pub channel: String,

    /// JSON file with denoise parameters.
    #[arg(long)]
    pub params: Option<PathBuf>,

    /// JSON scene description handed to the passes.
    #[arg(long)]
    pub scene: Option<PathBuf>,

    /// Override the regression block size.
    #[arg(long)]
    pub block_size: Option<u32>,

    /// Keep the pass in the pipeline but leave the frame untouched.
    #[arg(long)]
    pub no_denoise: bool,
}

impl Args {
    /// Parameters from `--params`, then command-line overrides.
    pub fn denoise_params(&self) -> Result<DenoiseParams> {
        let mut params = match &self.params {
            Some(path) => DenoiseParams::load(path)?,
            None => DenoiseParams::default(),
        };
        if let Some(block_size) = self.block_size {
            params.block_size = block_size;
        }
        params.validate()?;
        debug!(?params, "denoise parameters");
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "bmfr",
            "--color",
            "c.png",
            "--position",
            "p.exr",
            "--normal",
            "n.exr",
            "--albedo",
            "a.png",
            "-o",
            "out.exr",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&[]);
        assert_eq!(args.backend, Backend::Auto);
        assert_eq!(args.channel, "HDRColor");
        assert!(!args.no_denoise);
        assert_eq!(args.denoise_params().unwrap(), DenoiseParams::default());
    }

    #[test]
    fn block_size_overrides_params_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        std::fs::write(&path, r#"{"block_size": 32, "ridge": 0.01}"#).unwrap();

        let path_str = path.to_str().unwrap();
        let args = parse(&["--params", path_str, "--block-size", "8"]);
        let params = args.denoise_params().unwrap();
        assert_eq!(params.block_size, 8);
        assert_eq!(params.ridge, 0.01);
    }

    #[test]
    fn invalid_block_size_is_rejected() {
        let args = parse(&["--block-size", "1"]);
        assert!(args.denoise_params().is_err());
    }

    #[test]
    fn missing_inputs_fail_to_parse() {
        assert!(Args::try_parse_from(["bmfr", "--color", "c.png"]).is_err());
    }
}
