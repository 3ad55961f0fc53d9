use bytemuck::Zeroable;

use crate::error::{RenderError, Result};
use crate::gpu::{Extent, GpuDevice};
use crate::scene::{GpuSphere, Scene};

/// Whether [`ResourceManager::ensure_target`] had to allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Reused,
    /// Fresh target with undefined contents; accumulation must restart.
    Allocated,
}

/// Sole owner of the accumulation target and the scene buffer.
///
/// Resources are created through the device passed into each call and must be
/// handed back with [`ResourceManager::release`] before the manager is dropped.
pub struct ResourceManager<D: GpuDevice> {
    target: Option<D::Target>,
    target_extent: Option<Extent>,
    scene_buffer: Option<D::SceneBuffer>,
    sphere_count: u32,
}

impl<D: GpuDevice> ResourceManager<D> {
    pub fn new() -> Self {
        Self {
            target: None,
            target_extent: None,
            scene_buffer: None,
            sphere_count: 0,
        }
    }

    /// Keep the current target if it is `extent` sized, otherwise replace it.
    pub fn ensure_target(&mut self, device: &mut D, extent: Extent) -> Result<TargetStatus> {
        if self.target.is_some() && self.target_extent == Some(extent) {
            return Ok(TargetStatus::Reused);
        }

        self.release_target(device);
        let target = device.create_target(extent)?;
        let allocated = device.target_extent(&target);
        if allocated != extent {
            device.release_target(target);
            return Err(RenderError::ResourceAllocationFailed {
                resource: "render target",
                reason: format!(
                    "requested {}x{}, got {}x{}",
                    extent.width, extent.height, allocated.width, allocated.height
                ),
            });
        }
        tracing::debug!(width = extent.width, height = extent.height, "allocated render target");
        self.target = Some(target);
        self.target_extent = Some(extent);
        Ok(TargetStatus::Allocated)
    }

    /// Replace the scene buffer with a copy of `scene`.
    pub fn upload_scene(&mut self, device: &mut D, scene: &Scene) -> Result<()> {
        self.release_scene_buffer(device);

        let mut records = scene.to_gpu();
        if records.is_empty() {
            // zero sized bindings are rejected, the kernel is told the real count
            records.push(GpuSphere::zeroed());
        }
        let buffer = device.create_scene_buffer(&records)?;
        tracing::debug!(spheres = scene.len(), "uploaded scene buffer");
        self.scene_buffer = Some(buffer);
        self.sphere_count = scene.len() as u32;
        Ok(())
    }

    /// Drop the target only, forcing the next [`Self::ensure_target`] to reallocate.
    pub fn invalidate_target(&mut self, device: &mut D) {
        self.release_target(device);
    }

    /// Release both resources. Safe to call when either is absent.
    pub fn release(&mut self, device: &mut D) {
        self.release_target(device);
        self.release_scene_buffer(device);
    }

    pub fn target(&self) -> Option<&D::Target> {
        self.target.as_ref()
    }

    pub fn target_extent(&self) -> Option<Extent> {
        self.target_extent
    }

    pub fn scene_buffer(&self) -> Option<&D::SceneBuffer> {
        self.scene_buffer.as_ref()
    }

    pub fn sphere_count(&self) -> u32 {
        self.sphere_count
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn has_scene(&self) -> bool {
        self.scene_buffer.is_some()
    }

    fn release_target(&mut self, device: &mut D) {
        self.target_extent = None;
        if let Some(target) = self.target.take() {
            device.release_target(target);
        }
    }

    fn release_scene_buffer(&mut self, device: &mut D) {
        self.sphere_count = 0;
        if let Some(buffer) = self.scene_buffer.take() {
            device.release_scene_buffer(buffer);
        }
    }
}

impl<D: GpuDevice> Default for ResourceManager<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: GpuDevice> Drop for ResourceManager<D> {
    fn drop(&mut self) {
        if self.target.is_some() || self.scene_buffer.is_some() {
            tracing::warn!("resource manager dropped without release, GPU handles freed implicitly");
        }
    }
}
