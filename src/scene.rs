use rand::Rng;

use crate::error::{RenderError, Result};
use crate::util::math::hsv_to_rgb;

/// Specular reflectance given to every dielectric sphere.
pub const DIELECTRIC_SPECULAR: f32 = 0.04;

#[derive(Debug, Default, Clone)]
pub struct Scene {
    spheres: Vec<Sphere>,
}

impl Scene {
    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    /// Pack the spheres in generation order for upload.
    pub fn to_gpu(&self) -> Vec<GpuSphere> {
        self.spheres.iter().map(GpuSphere::from).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub position: glam::Vec3,
    pub radius: f32,

    pub albedo: glam::Vec3,
    pub specular: glam::Vec3,
}

impl Sphere {
    /// Overlap test; touching spheres count as overlapping.
    pub fn overlaps(&self, other: &Sphere) -> bool {
        let min_distance = self.radius + other.radius;
        self.position.distance_squared(other.position) <= min_distance * min_distance
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self {
            position: glam::Vec3::ZERO,
            radius: 0.5,
            albedo: glam::Vec3::ONE,
            specular: glam::Vec3::splat(DIELECTRIC_SPECULAR),
        }
    }
}

/// Storage buffer record. Three `vec4<f32>` so the layout matches WGSL without padding rules.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSphere {
    pub position_radius: [f32; 4],
    pub albedo: [f32; 4],
    pub specular: [f32; 4],
}

impl From<&Sphere> for GpuSphere {
    fn from(sphere: &Sphere) -> Self {
        Self {
            position_radius: sphere.position.extend(sphere.radius).to_array(),
            albedo: sphere.albedo.extend(0.0).to_array(),
            specular: sphere.specular.extend(0.0).to_array(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    pub radius_range: (f32, f32),
    pub max_count: u32,
    pub placement_radius: f32,
    /// Total candidates drawn before generation gives up.
    pub max_attempts: u32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            radius_range: (3.0, 8.0),
            max_count: 100,
            placement_radius: 100.0,
            max_attempts: 10_000,
        }
    }
}

/// Rejection-sample `config.max_count` spheres resting on the ground plane.
///
/// Every accepted sphere is tested against all previously accepted ones; a
/// colliding candidate is thrown away and a new one drawn in its place. Either the
/// scene is filled completely or [`RenderError::SceneGenerationExhausted`] is
/// returned once `config.max_attempts` candidates have been drawn.
pub fn generate<R: Rng + ?Sized>(config: &SceneConfig, rng: &mut R) -> Result<Scene> {
    let requested = config.max_count as usize;
    let mut spheres: Vec<Sphere> = Vec::with_capacity(requested);
    let mut attempts = 0;

    while spheres.len() < requested {
        if attempts >= config.max_attempts {
            return Err(RenderError::SceneGenerationExhausted {
                attempts,
                placed: spheres.len(),
                requested,
            });
        }
        attempts += 1;

        let candidate = random_sphere(config, rng);
        if spheres.iter().any(|other| candidate.overlaps(other)) {
            continue;
        }
        spheres.push(candidate);
    }

    tracing::debug!(
        spheres = spheres.len(),
        attempts,
        "generated scene"
    );
    Ok(Scene { spheres })
}

fn random_sphere<R: Rng + ?Sized>(config: &SceneConfig, rng: &mut R) -> Sphere {
    let (min_radius, max_radius) = config.radius_range;
    let radius = min_radius + rng.gen::<f32>() * (max_radius - min_radius);

    // sqrt keeps the distribution uniform over the disk area
    let distance = config.placement_radius * rng.gen::<f32>().sqrt();
    let angle = rng.gen::<f32>() * std::f32::consts::TAU;
    let position = glam::Vec3::new(distance * angle.cos(), radius, distance * angle.sin());

    let color = hsv_to_rgb(rng.gen(), rng.gen(), rng.gen());
    let metallic = rng.gen_bool(0.5);
    let (albedo, specular) = if metallic {
        (glam::Vec3::ZERO, color)
    } else {
        (color, glam::Vec3::splat(DIELECTRIC_SPECULAR))
    };

    Sphere {
        position,
        radius,
        albedo,
        specular,
    }
}
