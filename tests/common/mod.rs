#![allow(dead_code)]

use std::cell::RefCell;

use glam::Vec4;
use ray_tracing_lib::accumulation::blend;
use ray_tracing_lib::camera::Camera;
use ray_tracing_lib::config::TracerConfig;
use ray_tracing_lib::error::{RenderError, Result};
use ray_tracing_lib::frame::{FrameContext, FrameParameters};
use ray_tracing_lib::gpu::{Extent, GpuDevice, Kernel, KernelBindings};
use ray_tracing_lib::light::DirectionalLight;
use ray_tracing_lib::scene::GpuSphere;
use ray_tracing_lib::tracked::Tracked;
use ray_tracing_lib::util::dispatch::DispatchGrid;

pub struct MockTarget {
    pub id: usize,
    pub extent: Extent,
    pub sample: RefCell<Vec<Vec4>>,
    pub accumulation: RefCell<Vec<Vec4>>,
}

pub struct MockSceneBuffer {
    pub id: usize,
    pub spheres: Vec<GpuSphere>,
}

/// Records every presented accumulation buffer.
#[derive(Default)]
pub struct MockSurface {
    pub frames: RefCell<Vec<Vec<Vec4>>>,
}

impl MockSurface {
    pub fn frame_count(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn last_frame(&self) -> Option<Vec<Vec4>> {
        self.frames.borrow().last().cloned()
    }
}

/// CPU stand-in for the GPU: counts allocations and composites on the host.
#[derive(Default)]
pub struct MockDevice {
    pub targets_allocated: usize,
    pub targets_released: usize,
    pub scene_buffers_allocated: usize,
    pub scene_buffers_released: usize,
    /// Number of upcoming target allocations that fail.
    pub failing_target_allocations: u32,
    pub fail_composite: bool,
    pub fail_present: bool,
    /// Extent reported for every target instead of its real one.
    pub reported_extent: Option<Extent>,
    next_id: usize,
}

impl MockDevice {
    pub fn live_targets(&self) -> usize {
        self.targets_allocated - self.targets_released
    }

    pub fn live_scene_buffers(&self) -> usize {
        self.scene_buffers_allocated - self.scene_buffers_released
    }

    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }
}

impl GpuDevice for MockDevice {
    type Target = MockTarget;
    type SceneBuffer = MockSceneBuffer;
    type Destination = MockSurface;

    fn create_target(&mut self, extent: Extent) -> Result<MockTarget> {
        if self.failing_target_allocations > 0 {
            self.failing_target_allocations -= 1;
            return Err(RenderError::ResourceAllocationFailed {
                resource: "render target",
                reason: "out of memory".into(),
            });
        }
        self.targets_allocated += 1;
        let pixels = extent.pixel_count() as usize;
        Ok(MockTarget {
            id: self.next_id(),
            extent,
            // fresh GPU memory holds garbage
            sample: RefCell::new(vec![Vec4::splat(f32::NAN); pixels]),
            accumulation: RefCell::new(vec![Vec4::splat(f32::NAN); pixels]),
        })
    }

    fn target_extent(&self, target: &MockTarget) -> Extent {
        self.reported_extent.unwrap_or(target.extent)
    }

    fn release_target(&mut self, _target: MockTarget) {
        self.targets_released += 1;
    }

    fn create_scene_buffer(&mut self, spheres: &[GpuSphere]) -> Result<MockSceneBuffer> {
        self.scene_buffers_allocated += 1;
        Ok(MockSceneBuffer {
            id: self.next_id(),
            spheres: spheres.to_vec(),
        })
    }

    fn release_scene_buffer(&mut self, _buffer: MockSceneBuffer) {
        self.scene_buffers_released += 1;
    }

    fn composite(&mut self, target: &MockTarget, sample_index: u32) -> Result<()> {
        if self.fail_composite {
            return Err(RenderError::KernelDispatchFailed("composite rejected".into()));
        }
        let sample = target.sample.borrow();
        let mut accumulation = target.accumulation.borrow_mut();
        for (accumulated, fresh) in accumulation.iter_mut().zip(sample.iter()) {
            *accumulated = blend(*accumulated, *fresh, sample_index);
        }
        Ok(())
    }

    fn present(&mut self, target: &MockTarget, destination: &MockSurface) -> Result<()> {
        if self.fail_present {
            return Err(RenderError::Surface(wgpu::SurfaceError::Lost));
        }
        destination
            .frames
            .borrow_mut()
            .push(target.accumulation.borrow().clone());
        Ok(())
    }
}

pub struct Dispatch {
    pub params: FrameParameters,
    pub grid: DispatchGrid,
    pub sphere_count: u32,
    pub target_id: usize,
}

/// Writes a uniform color per dispatch, taken from `values` (the last one repeats).
pub struct TestKernel {
    values: Vec<f32>,
    pub dispatches: Vec<Dispatch>,
    /// Dispatch numbers (0 based) that fail.
    pub failing: Vec<usize>,
}

impl TestKernel {
    pub fn constant(value: f32) -> Self {
        Self::sequence(vec![value])
    }

    pub fn sequence(values: Vec<f32>) -> Self {
        assert!(!values.is_empty());
        Self {
            values,
            dispatches: Vec::new(),
            failing: Vec::new(),
        }
    }

    pub fn last(&self) -> &Dispatch {
        self.dispatches.last().expect("no dispatch recorded")
    }
}

impl Kernel<MockDevice> for TestKernel {
    fn dispatch(
        &mut self,
        _device: &mut MockDevice,
        params: &FrameParameters,
        bindings: KernelBindings<'_, MockDevice>,
        grid: DispatchGrid,
    ) -> Result<()> {
        let number = self.dispatches.len();
        self.dispatches.push(Dispatch {
            params: params.clone(),
            grid,
            sphere_count: bindings.sphere_count,
            target_id: bindings.output.id,
        });
        if self.failing.contains(&number) {
            return Err(RenderError::KernelDispatchFailed("device lost".into()));
        }

        let value = self.values[number.min(self.values.len() - 1)];
        for pixel in bindings.output.sample.borrow_mut().iter_mut() {
            *pixel = Vec4::splat(value);
        }
        Ok(())
    }
}

/// Host-side state a window would own.
pub struct Host {
    pub width: u32,
    pub height: u32,
    pub surface: MockSurface,
    pub camera: Tracked<Camera>,
    pub light: Tracked<DirectionalLight>,
}

impl Host {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface: MockSurface::default(),
            camera: Tracked::new(Camera::default()),
            light: Tracked::new(DirectionalLight::default()),
        }
    }

    pub fn context(&mut self) -> FrameContext<'_, MockSurface> {
        FrameContext {
            width: self.width,
            height: self.height,
            destination: &self.surface,
            camera: &mut self.camera,
            light: &mut self.light,
        }
    }
}

pub fn test_config() -> TracerConfig {
    TracerConfig {
        seed: Some(17),
        max_sphere_count: 12,
        ..Default::default()
    }
}
