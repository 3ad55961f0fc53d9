//! Per-frame orchestration of the progressive render loop.
//!
//! [`FrameDriver`] decides when accumulation restarts, marshals the kernel
//! parameters, dispatches, composites and presents. It owns no GPU device: the
//! caller passes one into every entry point, so the loop itself stays with the host.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::camera::Camera;
use crate::config::TracerConfig;
use crate::error::{RenderError, Result};
use crate::gpu::{Extent, GpuDevice, Kernel, KernelBindings};
use crate::light::DirectionalLight;
use crate::resources::{ResourceManager, TargetStatus};
use crate::scene::{self, SceneConfig};
use crate::tracked::Tracked;
use crate::util::dispatch::DispatchGrid;

/// Uniforms for a single kernel dispatch. Rebuilt every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameParameters {
    pub camera_to_world: glam::Mat4,
    pub camera_inverse_projection: glam::Mat4,
    /// Sub-pixel jitter, both components in `[0, 1)`.
    pub pixel_offset: glam::Vec2,
    /// `xyz` = direction, `w` = intensity.
    pub directional_light: glam::Vec4,
    pub ray_bounces: u32,
    pub sample_index: u32,
}

/// Everything the host hands over for one render tick.
pub struct FrameContext<'a, T: ?Sized> {
    pub width: u32,
    pub height: u32,
    pub destination: &'a T,
    pub camera: &'a mut Tracked<Camera>,
    pub light: &'a mut Tracked<DirectionalLight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// No render target held.
    Idle,
    Accumulating { sample_index: u32 },
}

#[derive(Debug)]
pub enum FrameOutcome {
    /// The sample at `sample_index` was folded in and presented.
    Rendered { sample_index: u32 },
    /// Nothing new was composited this tick.
    Skipped { reason: SkipReason },
}

#[derive(Debug)]
pub enum SkipReason {
    /// Output has a zero dimension, e.g. a minimized window.
    EmptyOutput,
    /// Called between [`FrameDriver::teardown`] and the next [`FrameDriver::init`].
    Disabled,
    /// The kernel or composite failed; the previous accumulation was presented.
    Dispatch(RenderError),
}

#[derive(Debug, Clone, Copy)]
struct AllocationFailures {
    extent: Extent,
    count: u32,
}

pub struct FrameDriver<D: GpuDevice> {
    scene_config: SceneConfig,
    ray_bounces: u32,
    allocation_retry_limit: u32,
    generation_retry_limit: u32,
    resources: ResourceManager<D>,
    state: DriverState,
    sample_index: u32,
    allocation_failures: Option<AllocationFailures>,
    /// Consecutive generation failures while no scene was uploaded.
    generation_failures: u32,
    /// Set by [`FrameDriver::teardown`], cleared by [`FrameDriver::init`].
    released: bool,
    rng: StdRng,
}

impl<D: GpuDevice> FrameDriver<D> {
    pub fn new(config: &TracerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            scene_config: config.scene(),
            ray_bounces: config.ray_bounces,
            allocation_retry_limit: config.allocation_retry_limit.max(1),
            generation_retry_limit: config.generation_retry_limit.max(1),
            resources: ResourceManager::new(),
            state: DriverState::Idle,
            sample_index: 0,
            allocation_failures: None,
            generation_failures: 0,
            released: false,
            rng,
        }
    }

    /// Enable: build a fresh scene and restart accumulation.
    pub fn init(&mut self, device: &mut D) -> Result<()> {
        tracing::info!("enabling progressive tracer");
        self.released = false;
        self.regenerate_scene(device)
    }

    /// Build and upload a new scene. Does nothing after [`Self::teardown`] until the
    /// next [`Self::init`], so no resources are held while disabled.
    ///
    /// A failure keeps the current scene, if any. Without one, the failure is
    /// counted and becomes [`RenderError::PersistentGenerationFailure`] once
    /// `generation_retry_limit` consecutive attempts have failed.
    pub fn regenerate_scene(&mut self, device: &mut D) -> Result<()> {
        if self.released {
            tracing::debug!("scene regeneration ignored while released");
            return Ok(());
        }
        let scene = match scene::generate(&self.scene_config, &mut self.rng) {
            Ok(scene) => scene,
            Err(err) => return Err(self.generation_failed(err)),
        };
        self.generation_failures = 0;
        self.resources.upload_scene(device, &scene)?;
        self.reset();
        tracing::info!(spheres = scene.len(), "scene regenerated");
        Ok(())
    }

    /// Disable: release every GPU resource and drop back to idle.
    pub fn teardown(&mut self, device: &mut D) {
        self.resources.release(device);
        self.state = DriverState::Idle;
        self.sample_index = 0;
        self.allocation_failures = None;
        self.generation_failures = 0;
        self.released = true;
        tracing::info!("progressive tracer released");
    }

    pub fn on_frame<K: Kernel<D>>(
        &mut self,
        device: &mut D,
        kernel: &mut K,
        context: &mut FrameContext<'_, D::Destination>,
    ) -> Result<FrameOutcome> {
        if self.released {
            return Ok(FrameOutcome::Skipped {
                reason: SkipReason::Disabled,
            });
        }
        if !self.resources.has_scene() {
            self.regenerate_scene(device)?;
        }

        // Both flags must be consumed every frame, hence no short-circuit.
        let camera_moved = context.camera.take_changed();
        let light_moved = context.light.take_changed();
        if camera_moved || light_moved {
            tracing::debug!(camera_moved, light_moved, "motion detected, restarting accumulation");
            self.reset();
        }

        let extent = Extent::new(context.width, context.height);
        if extent.is_empty() {
            return Ok(FrameOutcome::Skipped {
                reason: SkipReason::EmptyOutput,
            });
        }
        self.prepare_target(device, extent)?;

        let params = self.frame_parameters(context.camera.get(), context.light.get());
        let grid = DispatchGrid::for_extent(extent.width, extent.height);

        let Some(target) = self.resources.target() else {
            return Err(RenderError::ResourceAllocationFailed {
                resource: "render target",
                reason: "target missing after allocation".into(),
            });
        };
        if device.target_extent(target) != extent {
            self.resources.invalidate_target(device);
            self.reset_to_idle();
            return Err(RenderError::ResourceAllocationFailed {
                resource: "render target",
                reason: "target size does not match output".into(),
            });
        }

        let Some(spheres) = self.resources.scene_buffer() else {
            return Err(RenderError::ResourceAllocationFailed {
                resource: "scene buffer",
                reason: "scene buffer missing after upload".into(),
            });
        };

        let bindings = KernelBindings {
            output: target,
            spheres,
            sphere_count: self.resources.sphere_count(),
        };
        let traced = kernel
            .dispatch(device, &params, bindings, grid)
            .and_then(|()| device.composite(target, self.sample_index));
        if let Err(err) = traced {
            tracing::warn!(error = %err, "frame skipped");
            // the accumulation was not touched, so the last converged image is still valid
            let presented = if self.sample_index > 0 {
                device.present(target, context.destination)
            } else {
                Ok(())
            };
            self.resources.invalidate_target(device);
            self.reset_to_idle();
            if let Err(present_err) = presented {
                tracing::warn!(error = %present_err, "failed to present previous accumulation");
            }
            return Ok(FrameOutcome::Skipped {
                reason: SkipReason::Dispatch(err),
            });
        }

        device.present(target, context.destination)?;

        let rendered = self.sample_index;
        self.sample_index = self.sample_index.saturating_add(1);
        self.state = DriverState::Accumulating {
            sample_index: self.sample_index,
        };
        Ok(FrameOutcome::Rendered {
            sample_index: rendered,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Number of samples folded into the target since the last reset.
    pub fn sample_index(&self) -> u32 {
        self.sample_index
    }

    pub fn resources(&self) -> &ResourceManager<D> {
        &self.resources
    }

    fn reset_to_idle(&mut self) {
        self.state = DriverState::Idle;
        self.sample_index = 0;
    }

    fn generation_failed(&mut self, err: RenderError) -> RenderError {
        if self.resources.has_scene() {
            tracing::warn!(error = %err, "scene generation failed, keeping current scene");
            return err;
        }
        self.generation_failures += 1;
        tracing::error!(error = %err, attempt = self.generation_failures, "scene generation failed");
        if self.generation_failures >= self.generation_retry_limit {
            return RenderError::PersistentGenerationFailure {
                attempts: self.generation_failures,
            };
        }
        err
    }

    fn reset(&mut self) {
        self.sample_index = 0;
        if self.resources.has_target() {
            self.state = DriverState::Accumulating { sample_index: 0 };
        }
    }

    /// Make sure a target of `extent` exists. A fresh target and the sample reset
    /// happen in the same step so differently sized samples are never blended.
    fn prepare_target(&mut self, device: &mut D, extent: Extent) -> Result<()> {
        match self.resources.ensure_target(device, extent) {
            Ok(TargetStatus::Reused) => Ok(()),
            Ok(TargetStatus::Allocated) => {
                self.allocation_failures = None;
                self.state = DriverState::Accumulating { sample_index: 0 };
                self.sample_index = 0;
                Ok(())
            }
            Err(err) => {
                self.state = DriverState::Idle;
                self.sample_index = 0;
                let count = match self.allocation_failures {
                    Some(failures) if failures.extent == extent => failures.count + 1,
                    _ => 1,
                };
                self.allocation_failures = Some(AllocationFailures { extent, count });
                tracing::error!(error = %err, attempt = count, "render target allocation failed");

                if count >= self.allocation_retry_limit {
                    return Err(RenderError::PersistentAllocationFailure {
                        width: extent.width,
                        height: extent.height,
                        attempts: count,
                    });
                }
                Err(err)
            }
        }
    }

    fn frame_parameters(&mut self, camera: &Camera, light: &DirectionalLight) -> FrameParameters {
        FrameParameters {
            camera_to_world: camera.camera_to_world(),
            camera_inverse_projection: camera.inverse_projection(),
            pixel_offset: glam::Vec2::new(self.rng.gen(), self.rng.gen()),
            directional_light: light.as_vec4(),
            ray_bounces: self.ray_bounces,
            sample_index: self.sample_index,
        }
    }
}
