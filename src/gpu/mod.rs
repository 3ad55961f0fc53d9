//! Seam between the render loop and the graphics backend.
//!
//! [`GpuDevice`] owns allocation, compositing and presentation; [`Kernel`] is the
//! tracing routine. The frame driver is written against these traits only, the
//! wgpu implementation lives in [`wgpu_backend`].

pub mod wgpu_backend;

use crate::error::Result;
use crate::frame::FrameParameters;
use crate::scene::GpuSphere;
use crate::util::dispatch::DispatchGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

pub trait GpuDevice {
    /// Kernel output image paired with the running accumulation buffer.
    type Target;
    type SceneBuffer;
    /// Where a finished frame is presented, e.g. a swapchain view.
    type Destination: ?Sized;

    fn create_target(&mut self, extent: Extent) -> Result<Self::Target>;
    fn target_extent(&self, target: &Self::Target) -> Extent;
    fn release_target(&mut self, target: Self::Target);

    fn create_scene_buffer(&mut self, spheres: &[GpuSphere]) -> Result<Self::SceneBuffer>;
    fn release_scene_buffer(&mut self, buffer: Self::SceneBuffer);

    /// Fold the kernel's latest sample into the accumulation buffer with `1 / (n + 1)`
    /// weight, `n` being `sample_index`.
    fn composite(&mut self, target: &Self::Target, sample_index: u32) -> Result<()>;

    fn present(&mut self, target: &Self::Target, destination: &Self::Destination) -> Result<()>;
}

/// Buffers handed to the kernel for a single dispatch.
pub struct KernelBindings<'a, D: GpuDevice + ?Sized> {
    pub output: &'a D::Target,
    pub spheres: &'a D::SceneBuffer,
    pub sphere_count: u32,
}

pub trait Kernel<D: GpuDevice> {
    /// Trace one sample per pixel into `bindings.output`. Must complete before returning.
    fn dispatch(
        &mut self,
        device: &mut D,
        params: &FrameParameters,
        bindings: KernelBindings<'_, D>,
        grid: DispatchGrid,
    ) -> Result<()>;
}
