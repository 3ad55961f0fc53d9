//! Running-mean blend used to fold each new sample into the accumulation target.

/// Weight of the sample rendered at `sample_index`, i.e. `1 / (n + 1)`.
pub fn sample_weight(sample_index: u32) -> f32 {
    1.0 / (sample_index as f32 + 1.0)
}

/// `accumulated * n/(n+1) + sample * 1/(n+1)`.
///
/// Written as a lerp so that feeding the same value repeatedly never drifts. The
/// first sample replaces the target outright, since a fresh target holds undefined
/// contents.
pub fn blend(accumulated: glam::Vec4, sample: glam::Vec4, sample_index: u32) -> glam::Vec4 {
    if sample_index == 0 {
        return sample;
    }
    accumulated + (sample - accumulated) * sample_weight(sample_index)
}
