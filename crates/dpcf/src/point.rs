/// Number of `f32` components per point: x, y, z and confidence.
pub const FLOATS_PER_POINT: usize = 4;

pub const BYTES_PER_FLOAT: usize = std::mem::size_of::<f32>();

/// Stride of one record in the GPU vertex buffer.
pub const BYTES_PER_POINT: usize = BYTES_PER_FLOAT * FLOATS_PER_POINT;

/// A single world-space point with its sensor confidence.
///
/// Matches the instance layout consumed by `depth_point_cloud.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointRecord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Normalised to `[0, 1]`.
    pub confidence: f32,
}

impl PointRecord {
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        Self { x, y, z, confidence }
    }

    #[inline]
    pub fn position(&self) -> glam::Vec3 {
        glam::Vec3::new(self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_sixteen_bytes() {
        assert_eq!(std::mem::size_of::<PointRecord>(), BYTES_PER_POINT);
        assert_eq!(BYTES_PER_POINT, 16);
    }
}
