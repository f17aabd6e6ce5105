//! The rendering orchestrator. Owns the GPU context, the depth target and
//! the depth point pipeline.

pub mod context;
pub mod error_scope;
pub mod pipelines;
pub mod targets;

use self::{
    context::GfxContext,
    error_scope::ErrorScope,
    pipelines::depth_points::{DepthPointsConfig, DepthPointsPipeline, Upload},
    targets::Targets,
};
use crate::{camera::CameraView, data::types::PointRecord};
use std::sync::Arc;
use winit::window::Window;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

/// Owns all rendering-related state.
pub struct Renderer {
    pub gfx: GfxContext,
    pub targets: Targets,
    pub points: DepthPointsPipeline,
}

impl Renderer {
    pub async fn new(window: Arc<Window>, config: &DepthPointsConfig) -> anyhow::Result<Self> {
        let gfx = GfxContext::new(window).await?;
        let targets = Targets::new(&gfx.device, gfx.size);
        let points =
            DepthPointsPipeline::new(&gfx.device, gfx.config.format, targets.depth_fmt, config)?;

        Ok(Self {
            gfx,
            targets,
            points,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.targets.resize(&self.gfx.device, new_size);
        }
    }

    /// Hands a new point cloud to the GPU.
    pub fn update(&mut self, timestamp_ns: u64, points: &[PointRecord]) -> Upload {
        self.points
            .update(&self.gfx.device, &self.gfx.queue, timestamp_ns, points)
    }

    /// Draws the current point cloud through `camera` and presents the frame.
    pub fn render(&mut self, camera: &dyn CameraView) -> Result<(), wgpu::SurfaceError> {
        let frame = self.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let scope = ErrorScope::push(&self.gfx.device, "draw");

        self.points
            .prepare(&self.gfx.queue, camera, self.gfx.viewport_size());

        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Depth Points Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &swap_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.targets.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.points.draw(&mut pass);
        }

        self.gfx.queue.submit(std::iter::once(encoder.finish()));
        scope.finish_and_log();
        frame.present();

        Ok(())
    }
}
