//! wgpu implementation of [`GpuDevice`] and [`Kernel`].
//!
//! Every allocation and submission runs inside an error scope so device errors come
//! back as [`RenderError`] values instead of tripping the uncaptured error handler.

use std::sync::Arc;

use bytemuck::Zeroable;
use wgpu::include_wgsl;

use crate::accumulation::sample_weight;
use crate::buffer::{StorageBuffer, UniformBuffer};
use crate::error::{RenderError, Result};
use crate::frame::FrameParameters;
use crate::gpu::{Extent, GpuDevice, Kernel, KernelBindings};
use crate::scene::GpuSphere;
use crate::texture::Texture;
use crate::util::dispatch::DispatchGrid;

const ACCUMULATION_TEXEL_SIZE: u64 = std::mem::size_of::<[f32; 4]>() as u64;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct KernelUniforms {
    camera_to_world: [[f32; 4]; 4],
    camera_inverse_projection: [[f32; 4]; 4],
    directional_light: [f32; 4],
    pixel_offset: [f32; 2],
    ray_bounces: u32,
    sphere_count: u32,
}

impl KernelUniforms {
    fn new(params: &FrameParameters, sphere_count: u32) -> Self {
        Self {
            camera_to_world: params.camera_to_world.to_cols_array_2d(),
            camera_inverse_projection: params.camera_inverse_projection.to_cols_array_2d(),
            directional_light: params.directional_light.to_array(),
            pixel_offset: params.pixel_offset.to_array(),
            ray_bounces: params.ray_bounces,
            sphere_count,
        }
    }
}

/// Shared by the composite and present shaders.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct TargetUniforms {
    sample_weight: f32,
    width: u32,
    height: u32,
    padding: u32,
}

/// Run `f` inside out-of-memory and validation error scopes.
fn scoped<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (value, out_of_memory.or(validation))
}

fn dispatch_error(stage: &str, error: wgpu::Error) -> RenderError {
    RenderError::KernelDispatchFailed(format!("{stage}: {error}"))
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: Texture::STORAGE_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn buffer_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Composite and present pipelines, created once per surface format.
struct WgpuPipelines {
    composite_layout: wgpu::BindGroupLayout,
    composite_pipeline: wgpu::ComputePipeline,
    present_layout: wgpu::BindGroupLayout,
    present_pipeline: wgpu::RenderPipeline,
}

impl WgpuPipelines {
    fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Result<Self> {
        let (pipelines, error) = scoped(device, || Self::create(device, surface_format));
        match error {
            Some(error) => Err(RenderError::DeviceUnavailable(format!(
                "pipeline creation failed: {error}"
            ))),
            None => Ok(pipelines),
        }
    }

    fn create(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let composite_shader = device.create_shader_module(include_wgsl!("../asset/shader/accumulate.wgsl"));
        let present_shader = device.create_shader_module(include_wgsl!("../asset/shader/present.wgsl"));

        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                buffer_entry(0, wgpu::ShaderStages::COMPUTE, wgpu::BufferBindingType::Uniform),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                buffer_entry(
                    2,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::BufferBindingType::Storage { read_only: false },
                ),
            ],
            label: Some("composite_bind_group_layout"),
        });
        let composite_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite Pipeline Layout"),
            bind_group_layouts: &[&composite_layout],
            push_constant_ranges: &[],
        });
        let composite_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Composite Pipeline"),
            layout: Some(&composite_pipeline_layout),
            module: &composite_shader,
            entry_point: "main",
        });

        let present_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                buffer_entry(0, wgpu::ShaderStages::FRAGMENT, wgpu::BufferBindingType::Uniform),
                buffer_entry(
                    1,
                    wgpu::ShaderStages::FRAGMENT,
                    wgpu::BufferBindingType::Storage { read_only: true },
                ),
            ],
            label: Some("present_bind_group_layout"),
        });
        let present_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Present Pipeline Layout"),
            bind_group_layouts: &[&present_layout],
            push_constant_ranges: &[],
        });
        let present_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Present Pipeline"),
            layout: Some(&present_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &present_shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &present_shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: surface_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        Self {
            composite_layout,
            composite_pipeline,
            present_layout,
            present_pipeline,
        }
    }
}

/// Kernel output image plus the running accumulation buffer.
pub struct WgpuTarget {
    extent: Extent,
    sample: Texture,
    accumulation: StorageBuffer,
    uniforms: UniformBuffer<TargetUniforms>,
    composite_bind_group: wgpu::BindGroup,
    present_bind_group: wgpu::BindGroup,
}

impl WgpuTarget {
    pub fn sample_view(&self) -> &wgpu::TextureView {
        &self.sample.view
    }
}

/// Device and queue shared with the window, plus the composite and present pipelines.
pub struct WgpuDevice {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pipelines: WgpuPipelines,
}

impl WgpuDevice {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        surface_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let pipelines = WgpuPipelines::new(&device, surface_format)?;
        Ok(Self {
            device,
            queue,
            pipelines,
        })
    }

    /// Submit one encoder and block until the GPU is done with it.
    fn submit(&self, stage: &str, encoder: wgpu::CommandEncoder) -> Result<()> {
        let ((), error) = scoped(&self.device, || {
            self.queue.submit(std::iter::once(encoder.finish()));
        });
        self.device.poll(wgpu::Maintain::Wait);
        match error {
            Some(error) => Err(dispatch_error(stage, error)),
            None => Ok(()),
        }
    }

    fn build_target(&self, extent: Extent) -> WgpuTarget {
        let sample = Texture::storage(&self.device, extent.width, extent.height, Some("Sample texture"));
        let accumulation = StorageBuffer::init(
            &self.device,
            extent.pixel_count() * ACCUMULATION_TEXEL_SIZE,
            Some("Accumulation buffer"),
        );
        let uniforms = UniformBuffer::init_immediate(
            &self.device,
            &TargetUniforms {
                sample_weight: 1.0,
                width: extent.width,
                height: extent.height,
                padding: 0,
            },
            Some("Target uniforms"),
        );

        let composite_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.pipelines.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&sample.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: accumulation.buffer().as_entire_binding(),
                },
            ],
            label: Some("composite_bind_group"),
        });
        let present_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.pipelines.present_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: accumulation.buffer().as_entire_binding(),
                },
            ],
            label: Some("present_bind_group"),
        });

        WgpuTarget {
            extent,
            sample,
            accumulation,
            uniforms,
            composite_bind_group,
            present_bind_group,
        }
    }
}

impl GpuDevice for WgpuDevice {
    type Target = WgpuTarget;
    type SceneBuffer = StorageBuffer;
    type Destination = wgpu::TextureView;

    fn create_target(&mut self, extent: Extent) -> Result<WgpuTarget> {
        let allocation_failed = |reason: String| RenderError::ResourceAllocationFailed {
            resource: "render target",
            reason,
        };
        if extent.is_empty() {
            return Err(allocation_failed(format!(
                "{}x{} has no pixels",
                extent.width, extent.height
            )));
        }
        let limits = self.device.limits();
        if extent.width.max(extent.height) > limits.max_texture_dimension_2d {
            return Err(allocation_failed(format!(
                "{}x{} exceeds the {} texel texture limit",
                extent.width, extent.height, limits.max_texture_dimension_2d
            )));
        }
        let accumulation_size = extent.pixel_count() * ACCUMULATION_TEXEL_SIZE;
        if accumulation_size > limits.max_storage_buffer_binding_size as u64 {
            return Err(allocation_failed(format!(
                "{accumulation_size} byte accumulation buffer exceeds the storage binding limit"
            )));
        }

        let (target, error) = scoped(&self.device, || self.build_target(extent));
        match error {
            Some(error) => {
                self.release_target(target);
                Err(allocation_failed(error.to_string()))
            }
            None => Ok(target),
        }
    }

    fn target_extent(&self, target: &WgpuTarget) -> Extent {
        target.extent
    }

    fn release_target(&mut self, target: WgpuTarget) {
        target.sample.destroy();
        target.accumulation.destroy();
        target.uniforms.destroy();
    }

    fn create_scene_buffer(&mut self, spheres: &[GpuSphere]) -> Result<StorageBuffer> {
        let (buffer, error) = scoped(&self.device, || {
            StorageBuffer::init_immediate(&self.device, bytemuck::cast_slice(spheres), Some("Sphere buffer"))
        });
        match error {
            Some(error) => {
                buffer.destroy();
                Err(RenderError::ResourceAllocationFailed {
                    resource: "scene buffer",
                    reason: error.to_string(),
                })
            }
            None => Ok(buffer),
        }
    }

    fn release_scene_buffer(&mut self, buffer: StorageBuffer) {
        buffer.destroy();
    }

    fn composite(&mut self, target: &WgpuTarget, sample_index: u32) -> Result<()> {
        target.uniforms.write(
            &self.queue,
            &TargetUniforms {
                sample_weight: sample_weight(sample_index),
                width: target.extent.width,
                height: target.extent.height,
                padding: 0,
            },
        );

        let grid = DispatchGrid::for_extent(target.extent.width, target.extent.height);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Composite Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Composite Pass"),
            });
            compute_pass.set_pipeline(&self.pipelines.composite_pipeline);
            compute_pass.set_bind_group(0, &target.composite_bind_group, &[]);
            compute_pass.dispatch_workgroups(grid.x, grid.y, grid.z);
        }
        self.submit("composite", encoder)
    }

    fn present(&mut self, target: &WgpuTarget, destination: &wgpu::TextureView) -> Result<()> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Present Encoder"),
        });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Present Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: destination,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            render_pass.set_pipeline(&self.pipelines.present_pipeline);
            render_pass.set_bind_group(0, &target.present_bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.submit("present", encoder)
    }
}

/// The ray tracing compute kernel and its skybox.
pub struct WgpuKernel {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
    uniforms: UniformBuffer<KernelUniforms>,
    skybox: Texture,
}

impl WgpuKernel {
    pub fn new(device: &wgpu::Device, skybox: Texture) -> Result<Self> {
        let (kernel, error) = scoped(device, || Self::create(device, skybox));
        match error {
            Some(error) => Err(RenderError::DeviceUnavailable(format!(
                "kernel creation failed: {error}"
            ))),
            None => Ok(kernel),
        }
    }

    fn create(device: &wgpu::Device, skybox: Texture) -> Self {
        let shader = device.create_shader_module(include_wgsl!("../asset/shader/ray_tracing.wgsl"));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                buffer_entry(0, wgpu::ShaderStages::COMPUTE, wgpu::BufferBindingType::Uniform),
                buffer_entry(
                    1,
                    wgpu::ShaderStages::COMPUTE,
                    wgpu::BufferBindingType::Storage { read_only: true },
                ),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                storage_texture_entry(4),
            ],
            label: Some("kernel_bind_group_layout"),
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Kernel Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
        });
        let uniforms = UniformBuffer::init_immediate(
            device,
            &KernelUniforms::zeroed(),
            Some("Kernel uniforms"),
        );

        Self {
            bind_group_layout,
            pipeline,
            uniforms,
            skybox,
        }
    }
}

impl Kernel<WgpuDevice> for WgpuKernel {
    fn dispatch(
        &mut self,
        device: &mut WgpuDevice,
        params: &FrameParameters,
        bindings: KernelBindings<'_, WgpuDevice>,
        grid: DispatchGrid,
    ) -> Result<()> {
        self.uniforms
            .write(&device.queue, &KernelUniforms::new(params, bindings.sphere_count));

        let (bind_group, error) = scoped(&device.device, || {
            device.device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.uniforms.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: bindings.spheres.buffer().as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&self.skybox.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.skybox.sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(bindings.output.sample_view()),
                    },
                ],
                label: Some("kernel_bind_group"),
            })
        });
        if let Some(error) = error {
            return Err(dispatch_error("kernel bind group", error));
        }

        let mut encoder = device.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Kernel Encoder"),
        });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Ray Tracing Pass"),
            });
            compute_pass.set_pipeline(&self.pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(grid.x, grid.y, grid.z);
        }
        device.submit("kernel", encoder)
    }
}
