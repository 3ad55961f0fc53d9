use std::sync::Arc;
use std::time::Instant;

use wgpu::SurfaceError;
use winit::{
    dpi::PhysicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window, WindowBuilder},
};

use crate::error::{RenderError, Result};

#[derive(Debug)]
pub struct AppState {
    previous_time: Instant,
    pub elapsed_time: f32,
    pub frame: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            previous_time: Instant::now(),
            elapsed_time: 0.0,
            frame: 0,
        }
    }

    pub fn update(&mut self) {
        let current_time = Instant::now();
        self.elapsed_time = current_time
            .duration_since(self.previous_time)
            .as_secs_f32();
        self.previous_time = current_time;
        self.frame += 1;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Application<L: Layer + 'static> {
    layer: Option<L>,
    config: Option<L::Config>,
    screen: Screen,
    state: AppState,
}

impl<L: Layer + 'static> Application<L> {
    pub fn new(screen: Screen, config: L::Config) -> Self {
        Self {
            screen,
            layer: None,
            config: Some(config),
            state: AppState::new(),
        }
    }

    fn run(
        &mut self,
        event: Event<()>,
        _event_loop: &EventLoopWindowTarget<()>,
        control_flow: &mut ControlFlow,
    ) {
        control_flow.set_poll();

        if let Some(layer) = self.layer.as_mut() {
            layer.process_event(&event, &mut self.screen);
        }

        match event {
            Event::NewEvents(StartCause::Init) => {
                let Some(config) = self.config.take() else {
                    return;
                };
                match L::start(config, &mut self.screen, &self.state) {
                    Ok(layer) => self.layer = Some(layer),
                    Err(err) => {
                        tracing::error!(error = %err, "failed to start");
                        control_flow.set_exit_with_code(1);
                    }
                }
            }
            Event::WindowEvent {
                window_id,
                ref event,
            } if self.screen.window().id() == window_id => match event {
                WindowEvent::CloseRequested
                | WindowEvent::KeyboardInput {
                    input:
                        KeyboardInput {
                            state: ElementState::Pressed,
                            virtual_keycode: Some(VirtualKeyCode::Escape),
                            ..
                        },
                    ..
                } => self.exit(control_flow, 0),
                WindowEvent::Resized(physical_size) => {
                    self.screen.resize(*physical_size);
                    if let Some(layer) = self.layer.as_mut() {
                        layer.resize(*physical_size, &self.state, &mut self.screen);
                    }
                }
                WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                    self.screen.resize(**new_inner_size);
                    if let Some(layer) = self.layer.as_mut() {
                        layer.resize(**new_inner_size, &self.state, &mut self.screen);
                    }
                }
                WindowEvent::Occluded(occluded) => {
                    if let Some(layer) = self.layer.as_mut() {
                        if let Err(err) = layer.set_enabled(!occluded, &mut self.screen) {
                            tracing::error!(error = %err, "failed to re-enable");
                        }
                    }
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                self.state.update();
                self.screen.window().request_redraw();
            }
            Event::RedrawRequested(window_id) if self.screen.window().id() == window_id => {
                let Some(layer) = self.layer.as_mut() else {
                    return;
                };
                layer.update(&self.state, &mut self.screen);

                match layer.render(&self.state, &mut self.screen) {
                    Ok(_) => {}
                    Err(RenderError::Surface(SurfaceError::Lost)) => self.screen.resize_to_current(),
                    Err(e) if e.is_fatal() => {
                        tracing::error!(error = %e, "fatal render error");
                        self.exit(control_flow, 137);
                    }
                    Err(e) => tracing::error!("{:?}", e),
                }
            }
            _ => {}
        }
    }

    fn exit(&mut self, control_flow: &mut ControlFlow, code: i32) {
        control_flow.set_exit_with_code(code);
        if let Some(mut layer) = self.layer.take() {
            if let Err(err) = layer.shutdown(&self.state, &mut self.screen) {
                tracing::error!(error = %err, "shutdown failed");
                control_flow.set_exit_with_code(1);
            }
        }
    }

    pub async fn init(config: L::Config) -> Result<()> {
        let event_loop = EventLoop::new();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let screen = Screen::new(&event_loop, &instance).await?;
        let mut application = Self::new(screen, config);
        event_loop.run(move |event, event_loop, control_flow| {
            application.run(event, event_loop, control_flow);
        });
    }
}

pub struct Screen {
    pub surface: wgpu::Surface,
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub config: wgpu::SurfaceConfiguration,
    window: Window,
}

impl Screen {
    pub async fn new(event_loop: &EventLoopWindowTarget<()>, instance: &wgpu::Instance) -> Result<Self> {
        let unavailable = |what: &str| RenderError::DeviceUnavailable(what.to_owned());
        let window = WindowBuilder::new()
            .with_title("ray_tracing")
            .build(event_loop)
            .map_err(|err| RenderError::DeviceUnavailable(err.to_string()))?;

        // SAFETY:
        // The surface needs to live as long as the window that created it.
        // Screen owns the window so this should be safe.
        let surface = unsafe { instance.create_surface(&window) }
            .map_err(|err| RenderError::DeviceUnavailable(err.to_string()))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| unavailable("no compatible adapter"))?;
        tracing::info!(adapter = ?adapter.get_info(), "adapter selected");
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    // the accumulation buffer grows with the window, take what the adapter offers
                    limits: adapter.limits(),
                    label: None,
                },
                None,
            )
            .await
            .map_err(|err| RenderError::DeviceUnavailable(err.to_string()))?;
        let size = window.inner_size();
        let config = surface
            .get_default_config(&adapter, size.width, size.height)
            .ok_or_else(|| unavailable("surface is not supported by the adapter"))?;
        surface.configure(&device, &config);

        Ok(Self {
            window,
            surface,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.config.width, self.config.height)
    }

    /// Resize the screen to new window size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Resize the screen to current window inner size.
    pub fn resize_to_current(&mut self) {
        self.resize(self.window.inner_size());
    }
}

/// Host lifecycle hooks driven by [`Application`].
pub trait Layer: Sized {
    type Config: 'static;

    fn start(config: Self::Config, screen: &mut Screen, app: &AppState) -> Result<Self>;
    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen);
    fn resize(&mut self, new_size: PhysicalSize<u32>, app: &AppState, screen: &mut Screen);
    /// Enable or disable the layer, e.g. when the window is hidden.
    fn set_enabled(&mut self, enabled: bool, screen: &mut Screen) -> Result<()>;
    fn update(&mut self, app: &AppState, screen: &mut Screen);
    fn render(&mut self, app: &AppState, screen: &mut Screen) -> Result<()>;
    fn shutdown(&mut self, app: &AppState, screen: &mut Screen) -> Result<()>;
}
