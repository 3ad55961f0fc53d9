use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent},
};

use crate::application::{AppState, Layer, Screen};
use crate::camera::{Camera, CameraController};
use crate::config::TracerConfig;
use crate::error::Result;
use crate::frame::{FrameContext, FrameDriver, FrameOutcome};
use crate::gpu::wgpu_backend::{WgpuDevice, WgpuKernel};
use crate::light::{self, DirectionalLight};
use crate::texture::Texture;
use crate::tracked::Tracked;
use crate::util::math::degree_to_radian;

const PROGRESS_LOG_INTERVAL: u64 = 240;

/// Window layer feeding the host's lifecycle and input into a [`FrameDriver`].
pub struct ProgressiveTracer {
    device: WgpuDevice,
    kernel: WgpuKernel,
    driver: FrameDriver<WgpuDevice>,
    camera: Tracked<Camera>,
    light: Tracked<DirectionalLight>,
    camera_controller: CameraController,
    light_step: f32,
    enabled: bool,
    regenerate_requested: bool,
}

impl Layer for ProgressiveTracer {
    type Config = TracerConfig;

    fn start(config: TracerConfig, screen: &mut Screen, _app: &AppState) -> Result<Self> {
        let skybox = Texture::skybox(&screen.device, &screen.queue, config.skybox.as_deref())?;
        let kernel = WgpuKernel::new(&screen.device, skybox)?;
        let mut device = WgpuDevice::new(
            screen.device.clone(),
            screen.queue.clone(),
            screen.config.format,
        )?;

        let mut camera = config.initial_camera();
        camera.aspect = aspect_ratio(screen.size());

        let mut driver = FrameDriver::new(&config);
        driver.init(&mut device)?;
        tracing::info!(
            bounces = config.ray_bounces,
            spheres = driver.resources().sphere_count(),
            "progressive tracer started"
        );

        Ok(Self {
            device,
            kernel,
            driver,
            camera: Tracked::new(camera),
            light: Tracked::new(config.initial_light()),
            camera_controller: CameraController::new(2.0),
            light_step: degree_to_radian(3.0),
            enabled: true,
            regenerate_requested: false,
        })
    }

    fn process_event(&mut self, event: &Event<()>, _screen: &mut Screen) {
        let Event::WindowEvent { event, .. } = event else {
            return;
        };
        if self.camera_controller.process_events(&mut self.camera, event) {
            return;
        }
        if let WindowEvent::KeyboardInput {
            input:
                KeyboardInput {
                    state: ElementState::Pressed,
                    virtual_keycode: Some(keycode),
                    ..
                },
            ..
        } = event
        {
            match keycode {
                VirtualKeyCode::F5 => self.regenerate_requested = true,
                keycode => {
                    light::process_key(&mut self.light, *keycode, self.light_step);
                }
            }
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, _screen: &mut Screen) {
        if new_size.width > 0 && new_size.height > 0 {
            self.camera.modify(|camera| camera.aspect = aspect_ratio(new_size));
        }
    }

    fn set_enabled(&mut self, enabled: bool, _screen: &mut Screen) -> Result<()> {
        if enabled == self.enabled {
            return Ok(());
        }
        self.enabled = enabled;
        self.regenerate_requested = false;
        if enabled {
            self.driver.init(&mut self.device)
        } else {
            self.driver.teardown(&mut self.device);
            Ok(())
        }
    }

    fn update(&mut self, app: &AppState, _screen: &mut Screen) {
        if std::mem::take(&mut self.regenerate_requested) && self.enabled {
            // a failed regeneration keeps the previous scene
            if let Err(err) = self.driver.regenerate_scene(&mut self.device) {
                tracing::warn!(error = %err, "scene regeneration failed");
            }
        }
        if app.frame % PROGRESS_LOG_INTERVAL == 0 {
            tracing::debug!(
                samples = self.driver.sample_index(),
                frame_time = app.elapsed_time,
                "accumulation progress"
            );
        }
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut context = FrameContext {
            width: screen.config.width,
            height: screen.config.height,
            destination: &view,
            camera: &mut self.camera,
            light: &mut self.light,
        };

        let outcome = self
            .driver
            .on_frame(&mut self.device, &mut self.kernel, &mut context);
        output.present();

        if let FrameOutcome::Skipped { reason } = outcome? {
            tracing::debug!(?reason, "frame skipped");
        }
        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<()> {
        self.driver.teardown(&mut self.device);
        tracing::info!("exiting");
        Ok(())
    }
}

fn aspect_ratio(size: PhysicalSize<u32>) -> f32 {
    size.width.max(1) as f32 / size.height.max(1) as f32
}
