pub mod math {
    pub fn degree_to_radian(degree: f32) -> f32 {
        degree * std::f32::consts::PI / 180.0
    }

    /// Convert a color in HSV (all channels in `[0, 1]`) to linear RGB.
    pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> glam::Vec3 {
        let h = (hue.fract() * 6.0).max(0.0);
        let sector = h.floor();
        let f = h - sector;
        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * f);
        let t = value * (1.0 - saturation * (1.0 - f));
        match sector as u32 {
            0 => glam::Vec3::new(value, t, p),
            1 => glam::Vec3::new(q, value, p),
            2 => glam::Vec3::new(p, value, t),
            3 => glam::Vec3::new(p, q, value),
            4 => glam::Vec3::new(t, p, value),
            _ => glam::Vec3::new(value, p, q),
        }
    }
}

pub mod dispatch {
    /// Workgroup edge length. Must match `@workgroup_size(8, 8, 1)` in the kernels.
    pub const TILE_SIZE: u32 = 8;

    /// Workgroup counts covering a `width` x `height` image.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DispatchGrid {
        pub x: u32,
        pub y: u32,
        pub z: u32,
    }

    impl DispatchGrid {
        pub fn for_extent(width: u32, height: u32) -> Self {
            Self {
                x: width.div_ceil(TILE_SIZE),
                y: height.div_ceil(TILE_SIZE),
                z: 1,
            }
        }

        pub fn as_tuple(&self) -> (u32, u32, u32) {
            (self.x, self.y, self.z)
        }
    }
}
