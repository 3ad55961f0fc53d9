//! Error types for the progressive tracer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by scene generation, GPU resource management and frame dispatch.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Collision-avoiding placement ran out of attempts before the scene was full
    #[error(
        "scene generation exhausted after {attempts} attempts ({placed} of {requested} spheres placed)"
    )]
    SceneGenerationExhausted {
        attempts: u32,
        placed: usize,
        requested: usize,
    },

    /// Scene generation kept failing while no earlier scene was available
    #[error("scene generation failed {attempts} times in a row")]
    PersistentGenerationFailure { attempts: u32 },

    /// Render target or scene buffer could not be allocated
    #[error("failed to allocate {resource}: {reason}")]
    ResourceAllocationFailed {
        resource: &'static str,
        reason: String,
    },

    /// Allocation kept failing at the same output size
    #[error("allocation failed {attempts} times in a row at {width}x{height}")]
    PersistentAllocationFailure { width: u32, height: u32, attempts: u32 },

    /// The device rejected the tracing or composite dispatch
    #[error("kernel dispatch failed: {0}")]
    KernelDispatchFailed(String),

    /// No adapter, device or surface could be created
    #[error("graphics device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Skybox image could not be read or decoded
    #[error("failed to load skybox {}: {source}", path.display())]
    Skybox {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

impl RenderError {
    /// Fatal errors stop the render loop; everything else skips a single frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::PersistentAllocationFailure { .. }
                | RenderError::PersistentGenerationFailure { .. }
                | RenderError::DeviceUnavailable(_)
                | RenderError::Surface(wgpu::SurfaceError::OutOfMemory)
        )
    }
}

/// Errors raised while loading or validating a [`crate::config::TracerConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
