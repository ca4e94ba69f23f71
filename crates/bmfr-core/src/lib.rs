pub mod channel;
pub mod error;
pub mod image_buf;
pub mod io;
pub mod params;
pub mod pass;
pub mod passes;
pub mod pipeline;
pub mod regression;
pub mod resources;
pub mod scene;
pub mod ui;

pub use error::PassError;
