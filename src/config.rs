use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::camera::Camera;
use crate::error::ConfigError;
use crate::light::DirectionalLight;
use crate::scene::SceneConfig;

/// Host-exposed tunables. Every field has a default, so a config file only needs
/// the values it overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    pub ray_bounces: u32,
    pub sphere_radius_range: [f32; 2],
    pub max_sphere_count: u32,
    pub sphere_placement_radius: f32,
    /// Candidates drawn before scene generation gives up.
    pub max_placement_attempts: u32,
    /// Consecutive allocation failures at one size before giving up.
    pub allocation_retry_limit: u32,
    /// Consecutive failed scene generations, with no scene to fall back on, before giving up.
    pub generation_retry_limit: u32,
    pub seed: Option<u64>,
    /// Equirectangular environment map; a gradient sky is used when absent.
    pub skybox: Option<PathBuf>,
    pub light: LightConfig,
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub direction: [f32; 3],
    pub intensity: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: [f32; 3],
    pub target: [f32; 3],
    pub fov_y_degrees: f32,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            ray_bounces: 8,
            sphere_radius_range: [3.0, 8.0],
            max_sphere_count: 100,
            sphere_placement_radius: 100.0,
            max_placement_attempts: 10_000,
            allocation_retry_limit: 3,
            generation_retry_limit: 3,
            seed: None,
            skybox: None,
            light: LightConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        let light = DirectionalLight::default();
        Self {
            direction: light.direction.to_array(),
            intensity: light.intensity,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        let camera = Camera::default();
        Self {
            eye: camera.eye.to_array(),
            target: camera.target.to_array(),
            fov_y_degrees: 60.0,
        }
    }
}

impl TracerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config = Self::from_toml(&contents)?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let [min_radius, max_radius] = self.sphere_radius_range;
        if !(min_radius > 0.0 && min_radius <= max_radius) {
            return Err(ConfigError::Invalid(format!(
                "sphere_radius_range must satisfy 0 < min <= max, got {min_radius}..{max_radius}"
            )));
        }
        if !(self.sphere_placement_radius >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "sphere_placement_radius must be non-negative, got {}",
                self.sphere_placement_radius
            )));
        }
        if self.ray_bounces == 0 {
            return Err(ConfigError::Invalid("ray_bounces must be at least 1".into()));
        }
        if self.max_placement_attempts < self.max_sphere_count {
            return Err(ConfigError::Invalid(format!(
                "max_placement_attempts ({}) cannot place {} spheres",
                self.max_placement_attempts, self.max_sphere_count
            )));
        }
        if self.allocation_retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "allocation_retry_limit must be at least 1".into(),
            ));
        }
        if self.generation_retry_limit == 0 {
            return Err(ConfigError::Invalid(
                "generation_retry_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn scene(&self) -> SceneConfig {
        SceneConfig {
            radius_range: (self.sphere_radius_range[0], self.sphere_radius_range[1]),
            max_count: self.max_sphere_count,
            placement_radius: self.sphere_placement_radius,
            max_attempts: self.max_placement_attempts,
        }
    }

    pub fn initial_camera(&self) -> Camera {
        Camera::new(
            glam::Vec3::from_array(self.camera.eye),
            glam::Vec3::from_array(self.camera.target),
            self.camera.fov_y_degrees,
        )
    }

    pub fn initial_light(&self) -> DirectionalLight {
        DirectionalLight::new(glam::Vec3::from_array(self.light.direction), self.light.intensity)
    }
}
