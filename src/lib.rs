//! Progressive GPU ray tracer.
//!
//! A compute kernel traces one jittered sample per pixel every frame and the
//! samples are averaged into an accumulation buffer until the camera or light
//! moves. [`frame::FrameDriver`] runs that loop against the [`gpu::GpuDevice`]
//! and [`gpu::Kernel`] traits; [`tracer::ProgressiveTracer`] hosts it in a window.

pub mod accumulation;
pub mod application;
pub mod buffer;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod gpu;
pub mod light;
pub mod resources;
pub mod scene;
pub mod texture;
pub mod tracer;
pub mod tracked;
pub mod util;

use application::Application;
use config::TracerConfig;
use tracer::ProgressiveTracer;

pub use error::{ConfigError, RenderError};

/// Open a window and render until it is closed.
pub async fn run(config: TracerConfig) -> error::Result<()> {
    Application::<ProgressiveTracer>::init(config).await
}
