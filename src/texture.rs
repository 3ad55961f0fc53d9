use std::path::Path;

use image::RgbaImage;

use crate::error::{RenderError, Result};

pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    /// Floating point image the kernel writes one sample per pixel into.
    pub const STORAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &RgbaImage,
        width: u32,
        height: u32,
        label: Option<&str>,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            img.as_raw(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // wrap around horizontally, the seam of an equirectangular map
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label,
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    pub fn storage(device: &wgpu::Device, width: u32, height: u32, label: Option<&str>) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::STORAGE_FORMAT,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Load the environment map, or build a gradient sky when no path is given.
    pub fn skybox(device: &wgpu::Device, queue: &wgpu::Queue, path: Option<&Path>) -> Result<Self> {
        let img = match path {
            Some(path) => image::open(path)
                .map_err(|source| RenderError::Skybox {
                    path: path.to_owned(),
                    source,
                })?
                .to_rgba8(),
            None => gradient_sky(512, 256),
        };
        tracing::info!(width = img.width(), height = img.height(), "skybox ready");
        Ok(Self::from_image(
            device,
            queue,
            &img,
            img.width(),
            img.height(),
            Some("Skybox texture"),
        ))
    }

    pub fn destroy(self) {
        self.texture.destroy();
    }
}

/// Horizon-to-zenith blue gradient with a dark ground half.
pub fn gradient_sky(width: u32, height: u32) -> RgbaImage {
    let horizon = glam::Vec3::new(0.85, 0.9, 1.0);
    let zenith = glam::Vec3::new(0.25, 0.45, 0.85);
    let ground = glam::Vec3::new(0.3, 0.28, 0.25);

    RgbaImage::from_fn(width, height, |_, y| {
        // v = 0 is straight up, v = 1 straight down
        let v = (y as f32 + 0.5) / height as f32;
        let color = if v < 0.5 {
            zenith.lerp(horizon, v * 2.0)
        } else {
            ground
        };
        let rgb = (color * 255.0).round();
        image::Rgba([rgb.x as u8, rgb.y as u8, rgb.z as u8, 255])
    })
}
