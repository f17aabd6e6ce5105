use crate::camera::CameraView;
use crate::data::types::{DepthUniformStd140 as DepthUniform, PointRecord};
use crate::renderer::error_scope::ErrorScope;
use anyhow::{bail, Context, Result};
use dpcf::BYTES_PER_POINT;
use std::path::PathBuf;
use wgpu::util::DeviceExt;

const BYTES_PER_POINT_U64: u64 = BYTES_PER_POINT as u64;

/// Where the point shader comes from.
#[derive(Debug, Clone, Default)]
pub enum ShaderSource {
    #[default]
    Embedded,
    File(PathBuf),
}

impl ShaderSource {
    fn load(&self) -> Result<String> {
        match self {
            ShaderSource::Embedded => {
                Ok(include_str!("../../../shaders/depth_point_cloud.wgsl").to_owned())
            }
            ShaderSource::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read shader {}", path.display())),
        }
    }

    fn label(&self) -> String {
        match self {
            ShaderSource::Embedded => "shaders/depth_point_cloud.wgsl".to_owned(),
            ShaderSource::File(path) => path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DepthPointsConfig {
    /// Vertex buffer capacity allocated up front, in points.
    pub initial_points: u32,
    pub point_size_px: f32,
    pub near: f32,
    pub far: f32,
    pub shader: ShaderSource,
}

impl Default for DepthPointsConfig {
    fn default() -> Self {
        Self {
            initial_points: 1000,
            point_size_px: 5.0,
            near: 0.1,
            far: 100.0,
            shader: ShaderSource::Embedded,
        }
    }
}

/// Smallest capacity reached by doubling `current` that holds `required`
/// bytes. Capacities that already fit are returned unchanged.
pub fn grown_capacity(current: u64, required: u64) -> u64 {
    let mut capacity = current.max(1);
    while required > capacity {
        capacity = capacity.saturating_mul(2);
    }
    capacity
}

/// Result of handing a point cloud to [`DepthPointsPipeline::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upload {
    /// Same frame as last time; nothing was uploaded.
    Unchanged,
    Uploaded {
        points: u32,
        /// The vertex buffer was re-allocated with this many bytes.
        grown_to: Option<u64>,
    },
}

/// What an upload of a given point count has to do to the vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPlan {
    /// Points that will be written; the rest are dropped.
    pub points: u32,
    pub dropped: u64,
    /// New buffer size in bytes when the current one is too small.
    pub grow_to: Option<u64>,
}

/// Size bookkeeping of the point vertex buffer, kept apart from the GPU
/// objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointBufferState {
    pub capacity_bytes: u64,
    /// Largest allocation allowed, a whole number of points.
    pub max_buffer_bytes: u64,
    pub num_points: u32,
    pub last_timestamp_ns: Option<u64>,
}

impl PointBufferState {
    pub fn new(initial_points: u32, device_max_buffer_size: u64) -> Self {
        let max_buffer_bytes = device_max_buffer_size / BYTES_PER_POINT_U64 * BYTES_PER_POINT_U64;
        Self {
            capacity_bytes: (initial_points.max(1) as u64 * BYTES_PER_POINT_U64)
                .min(max_buffer_bytes),
            max_buffer_bytes,
            num_points: 0,
            last_timestamp_ns: None,
        }
    }

    /// Whether the frame with this timestamp is what the buffer holds.
    pub fn is_current(&self, timestamp_ns: u64) -> bool {
        self.last_timestamp_ns == Some(timestamp_ns)
    }

    /// Plans an upload of `count` points. Points beyond what the largest
    /// allowed buffer holds are dropped; otherwise the buffer doubles until
    /// they fit.
    pub fn plan(&self, count: usize) -> UploadPlan {
        let max_points = (self.max_buffer_bytes / BYTES_PER_POINT_U64).min(u32::MAX as u64);
        let count = count as u64;
        let kept = count.min(max_points);

        let required = kept * BYTES_PER_POINT_U64;
        let grow_to = (required > self.capacity_bytes).then(|| {
            grown_capacity(self.capacity_bytes, required).min(self.max_buffer_bytes)
        });

        UploadPlan {
            points: kept as u32,
            dropped: count - kept,
            grow_to,
        }
    }

    pub fn commit(&mut self, timestamp_ns: u64, plan: &UploadPlan) {
        if let Some(capacity) = plan.grow_to {
            self.capacity_bytes = capacity;
        }
        self.num_points = plan.points;
        self.last_timestamp_ns = Some(timestamp_ns);
    }
}

/// Uploads per-frame depth points into a growable vertex buffer and draws
/// them as fixed-size sprites.
pub struct DepthPointsPipeline {
    pub pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    ubo: wgpu::Buffer,
    quad_vb: wgpu::Buffer,

    /// Point records, `state.capacity_bytes` long; the first
    /// `state.num_points` are live.
    vertex_buf: wgpu::Buffer,
    state: PointBufferState,

    pub point_size_px: f32,
    pub near: f32,
    pub far: f32,
}

impl DepthPointsPipeline {
    /// Allocates the initial vertex buffer and builds the pipeline.
    pub fn new(
        device: &wgpu::Device,
        color_fmt: wgpu::TextureFormat,
        depth_fmt: wgpu::TextureFormat,
        config: &DepthPointsConfig,
    ) -> Result<Self> {
        let source = config.shader.load()?;
        let shader_label = config.shader.label();

        let scope = ErrorScope::push(device, "create");

        let state = PointBufferState::new(config.initial_points, device.limits().max_buffer_size);
        let vertex_buf = create_vertex_buffer(device, state.capacity_bytes);

        let ubo = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Depth Points UBO"),
            size: std::mem::size_of::<DepthUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let ubo_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Depth Points UBO Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<DepthUniform>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Depth Points Bind Group"),
            layout: &ubo_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader_label.as_str()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        // Two triangles spanning a sprite.
        let quad_corners: [[f32; 2]; 6] = [
            [-1.0, -1.0],
            [1.0, -1.0],
            [1.0, 1.0],
            [-1.0, -1.0],
            [1.0, 1.0],
            [-1.0, 1.0],
        ];

        let quad_vb = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Depth Points Quad VB"),
            contents: bytemuck::cast_slice(&quad_corners),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let vbuf_layouts = [
            wgpu::VertexBufferLayout {
                array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[wgpu::VertexAttribute {
                    shader_location: 0,
                    offset: 0,
                    format: wgpu::VertexFormat::Float32x2,
                }],
            },
            // One record per sprite: position (xyz) + confidence (w).
            wgpu::VertexBufferLayout {
                array_stride: BYTES_PER_POINT_U64,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &[wgpu::VertexAttribute {
                    shader_location: 1,
                    offset: 0,
                    format: wgpu::VertexFormat::Float32x4,
                }],
            },
        ];

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Depth Points PipelineLayout"),
            bind_group_layouts: &[&ubo_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Depth Points Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &vbuf_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_fmt,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_fmt,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        if let Some(err) = scope.finish() {
            bail!("GPU error while creating the depth point pipeline: {}", err);
        }

        log::debug!(
            "Depth point buffer: {} bytes ({} points), limit {} bytes",
            state.capacity_bytes,
            state.capacity_bytes / BYTES_PER_POINT_U64,
            state.max_buffer_bytes
        );

        Ok(Self {
            pipeline,
            bind_group,
            ubo,
            quad_vb,
            vertex_buf,
            state,
            point_size_px: config.point_size_px,
            near: config.near,
            far: config.far,
        })
    }

    /// Replaces the buffer contents with `points`, growing the buffer by
    /// doubling when they do not fit. A frame whose timestamp matches the
    /// previous upload is ignored.
    pub fn update(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        timestamp_ns: u64,
        points: &[PointRecord],
    ) -> Upload {
        if self.state.is_current(timestamp_ns) {
            log::trace!("Frame {} already uploaded", timestamp_ns);
            return Upload::Unchanged;
        }

        let scope = ErrorScope::push(device, "update");

        let plan = self.state.plan(points.len());
        if plan.dropped > 0 {
            log::warn!(
                "Point cloud of {} points exceeds the buffer limit; dropping {}",
                points.len(),
                plan.dropped
            );
        }

        if let Some(capacity) = plan.grow_to {
            log::debug!(
                "Growing depth point buffer {} -> {} bytes",
                self.state.capacity_bytes,
                capacity
            );
            self.vertex_buf = create_vertex_buffer(device, capacity);
        }

        let live = &points[..plan.points as usize];
        if !live.is_empty() {
            queue.write_buffer(&self.vertex_buf, 0, bytemuck::cast_slice(live));
        }

        self.state.commit(timestamp_ns, &plan);
        scope.finish_and_log();

        Upload::Uploaded {
            points: plan.points,
            grown_to: plan.grow_to,
        }
    }

    /// Writes this frame's camera into the uniform buffer. Call before the
    /// render pass that draws the points is submitted.
    pub fn prepare(&self, queue: &wgpu::Queue, camera: &dyn CameraView, viewport_size: [f32; 2]) {
        let uniform = DepthUniform {
            view_proj: camera.view_proj(self.near, self.far).to_cols_array_2d(),
            viewport_size,
            point_size_px: self.point_size_px,
            _pad0: 0.0,
        };
        queue.write_buffer(&self.ubo, 0, bytemuck::bytes_of(&uniform));
    }

    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>) {
        let num_points = self.state.num_points;
        if num_points == 0 {
            return;
        }

        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.set_vertex_buffer(0, self.quad_vb.slice(..));
        rpass.set_vertex_buffer(
            1,
            self.vertex_buf
                .slice(..num_points as u64 * BYTES_PER_POINT_U64),
        );
        rpass.draw(0..6, 0..num_points);
    }

    pub fn num_points(&self) -> u32 {
        self.state.num_points
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.state.capacity_bytes
    }

    pub fn is_current(&self, timestamp_ns: u64) -> bool {
        self.state.is_current(timestamp_ns)
    }
}

fn create_vertex_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Depth Points VB"),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_that_fits_is_kept() {
        assert_eq!(grown_capacity(16_000, 0), 16_000);
        assert_eq!(grown_capacity(16_000, 16_000), 16_000);
        assert_eq!(grown_capacity(16_000, 800), 16_000);
    }

    #[test]
    fn capacity_doubles_until_it_fits() {
        assert_eq!(grown_capacity(16_000, 16_016), 32_000);
        assert_eq!(grown_capacity(16_000, 64_000), 64_000);
        assert_eq!(grown_capacity(16_000, 64_001), 128_000);

        // 50k points from the default 1000-point buffer.
        let required = 50_000 * BYTES_PER_POINT_U64;
        let capacity = grown_capacity(1000 * BYTES_PER_POINT_U64, required);
        assert_eq!(capacity, 64_000 * BYTES_PER_POINT_U64);
        assert!(capacity >= required && capacity / 2 < required);
    }

    #[test]
    fn capacity_growth_from_zero_and_near_overflow() {
        assert_eq!(grown_capacity(0, 3), 4);
        assert_eq!(grown_capacity(u64::MAX / 2 + 1, u64::MAX), u64::MAX);
    }

    // 256 MiB, the downlevel default.
    const DOWNLEVEL_MAX: u64 = 1 << 28;

    #[test]
    fn initial_buffer_holds_the_configured_points() {
        let state = PointBufferState::new(1000, DOWNLEVEL_MAX);
        assert_eq!(state.capacity_bytes, 16_000);
        assert_eq!(state.num_points, 0);
        assert_eq!(state.last_timestamp_ns, None);

        // Zero is bumped to one point; the limit rounds down to whole points.
        let state = PointBufferState::new(0, 100);
        assert_eq!(state.capacity_bytes, 16);
        assert_eq!(state.max_buffer_bytes, 96);

        let state = PointBufferState::new(1000, 100);
        assert_eq!(state.capacity_bytes, 96);
    }

    #[test]
    fn cloud_that_fits_does_not_reallocate() {
        let state = PointBufferState::new(1000, DOWNLEVEL_MAX);

        let plan = state.plan(1000);
        assert_eq!(
            plan,
            UploadPlan {
                points: 1000,
                dropped: 0,
                grow_to: None
            }
        );
        assert_eq!(state.plan(0).grow_to, None);
    }

    #[test]
    fn larger_cloud_doubles_the_buffer() {
        let mut state = PointBufferState::new(1000, DOWNLEVEL_MAX);

        let plan = state.plan(1001);
        assert_eq!(plan.points, 1001);
        assert_eq!(plan.grow_to, Some(32_000));

        state.commit(1, &plan);
        assert_eq!(state.capacity_bytes, 32_000);
        assert_eq!(state.num_points, 1001);

        // Shrinking clouds keep the grown buffer.
        let plan = state.plan(10);
        assert_eq!(plan.grow_to, None);
        state.commit(2, &plan);
        assert_eq!(state.capacity_bytes, 32_000);
        assert_eq!(state.num_points, 10);
    }

    #[test]
    fn growth_is_clamped_and_excess_points_dropped() {
        // Room for 100 points at most.
        let mut state = PointBufferState::new(10, 100 * BYTES_PER_POINT_U64 + 7);
        assert_eq!(state.max_buffer_bytes, 1600);

        // Doubling 160 -> 320 -> 640 -> 1280 -> 2560 would overshoot.
        let plan = state.plan(90);
        assert_eq!(plan.grow_to, Some(1600));
        assert_eq!(plan.dropped, 0);

        let plan = state.plan(250);
        assert_eq!(
            plan,
            UploadPlan {
                points: 100,
                dropped: 150,
                grow_to: Some(1600)
            }
        );

        state.commit(3, &plan);
        let again = state.plan(250);
        assert_eq!(again.points, 100);
        assert_eq!(again.grow_to, None);
    }

    #[test]
    fn committed_timestamp_marks_frame_current() {
        let mut state = PointBufferState::new(1000, DOWNLEVEL_MAX);
        assert!(!state.is_current(0));

        let plan = state.plan(5);
        state.commit(42, &plan);
        assert!(state.is_current(42));
        assert!(!state.is_current(43));

        let plan = state.plan(5);
        state.commit(43, &plan);
        assert!(!state.is_current(42));
    }

    #[test]
    fn default_config_matches_the_demo() {
        let config = DepthPointsConfig::default();
        assert_eq!(config.initial_points as u64 * BYTES_PER_POINT_U64, 16_000);
        assert_eq!(config.point_size_px, 5.0);
        assert_eq!((config.near, config.far), (0.1, 100.0));
    }

    #[test]
    fn shader_sources_load() {
        let embedded = ShaderSource::Embedded.load().unwrap();
        assert!(embedded.contains("fn vs_main"));

        let missing = ShaderSource::File(PathBuf::from("/nonexistent/points.wgsl"));
        assert!(missing.load().is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.wgsl");
        std::fs::write(&path, "// custom").unwrap();
        assert_eq!(ShaderSource::File(path).load().unwrap(), "// custom");
    }
}
