use std::marker::PhantomData;

use wgpu::util::DeviceExt;

/// Read-only storage buffer, used for the sphere records.
pub struct StorageBuffer(wgpu::Buffer);

impl StorageBuffer {
    pub fn init_immediate<'label>(
        device: &wgpu::Device,
        content: &[u8],
        label: Option<&'label str>,
    ) -> Self {
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label,
            contents: content,
            usage: wgpu::BufferUsages::STORAGE,
        };
        let buffer = device.create_buffer_init(&init_descriptor);
        Self(buffer)
    }

    /// Uninitialized buffer the GPU can write into, e.g. the accumulation buffer.
    pub fn init<'label>(device: &wgpu::Device, size: u64, label: Option<&'label str>) -> Self {
        let wgt_descriptor = wgpu::BufferDescriptor {
            label,
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        };
        let buffer = device.create_buffer(&wgt_descriptor);
        Self(buffer)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.0
    }

    pub fn destroy(self) {
        self.0.destroy();
    }
}

/// Uniform buffer holding a single `T`, rewritten with [`UniformBuffer::write`].
pub struct UniformBuffer<T: bytemuck::Pod> {
    buffer: wgpu::Buffer,
    _content: PhantomData<T>,
}

impl<T: bytemuck::Pod> UniformBuffer<T> {
    pub fn init_immediate<'label>(
        device: &wgpu::Device,
        content: &T,
        label: Option<&'label str>,
    ) -> Self {
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label,
            contents: bytemuck::bytes_of(content),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        };
        let buffer = device.create_buffer_init(&init_descriptor);
        Self {
            buffer,
            _content: PhantomData,
        }
    }

    pub fn write(&self, queue: &wgpu::Queue, content: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(content));
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn destroy(self) {
        self.buffer.destroy();
    }
}
