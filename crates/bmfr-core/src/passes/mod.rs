pub mod denoise;

pub use denoise::DenoisePass;
