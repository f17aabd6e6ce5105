//! GPU-facing data layouts for the depth point pipeline.

pub use dpcf::PointRecord;

/// Per-draw uniform data, respecting std140 layout.
/// Must match the layout of `DepthUniform` in `depth_point_cloud.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct DepthUniformStd140 {
    /// World to clip space, already converted to wgpu's depth range.
    pub view_proj: [[f32; 4]; 4],
    /// Size of the viewport in physical pixels.
    pub viewport_size: [f32; 2],
    /// Edge length of a point sprite in pixels.
    pub point_size_px: f32,
    pub _pad0: f32,
}
