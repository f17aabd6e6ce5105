use crate::{
    camera::{CameraController, CameraView, OrbitCamera, TrackedCamera},
    config::Config,
    data::point_cloud::{unproject_frame, UnprojectParams},
    renderer::{
        pipelines::depth_points::{DepthPointsConfig, ShaderSource, Upload},
        Renderer,
    },
    source::{FrameSource, RecordingSource, SyntheticSource},
};
use anyhow::Result;
use dpcf::{CameraIntrinsics, DepthFrame};
use glam::Vec3;
use std::sync::Arc;
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

/// Resolution of the synthetic depth sensor.
const SYNTHETIC_SIZE: (u32, u32) = (160, 120);

/// The orbit camera circles a point this far in front of the first pose.
const ORBIT_TARGET_DISTANCE_M: f32 = 2.5;

pub struct App {
    pub renderer: Renderer,
    source: Box<dyn FrameSource>,
    params: UnprojectParams,
    tracked_camera: TrackedCamera,
    orbit_camera: OrbitCamera,
    camera_controller: CameraController,
    free_camera: bool,
    orbit_placed: bool,
    /// Point count and buffer size shown in the window title.
    title_stats: Option<(u32, u64)>,
}

impl App {
    pub async fn new(window: Arc<Window>, config: &Config) -> Result<Self> {
        let points_config = DepthPointsConfig {
            initial_points: config.initial_points,
            point_size_px: config.point_size,
            near: config.near,
            far: config.far,
            shader: config
                .shader
                .clone()
                .map_or(ShaderSource::Embedded, ShaderSource::File),
        };

        let source: Box<dyn FrameSource> = match config.recording.as_ref() {
            Some(dir) => Box::new(RecordingSource::open(dir)?),
            None => {
                log::info!("No recording given; using the synthetic room scan");
                Box::new(SyntheticSource::new(SYNTHETIC_SIZE.0, SYNTHETIC_SIZE.1))
            }
        };

        let renderer = Renderer::new(window.clone(), &points_config).await?;
        let size = renderer.gfx.size;

        // Replaced by the first frame's intrinsics.
        let placeholder = CameraIntrinsics {
            fx: size.width.max(1) as f32,
            fy: size.width.max(1) as f32,
            cx: size.width as f32 * 0.5,
            cy: size.height as f32 * 0.5,
            width: size.width.max(1),
            height: size.height.max(1),
        };
        let tracked_camera = TrackedCamera::new(placeholder, [size.width, size.height]);
        let orbit_camera = OrbitCamera::new(
            Vec3::ZERO,
            ORBIT_TARGET_DISTANCE_M,
            size.width.max(1) as f32 / size.height.max(1) as f32,
        );

        Ok(Self {
            renderer,
            source,
            params: config.unproject_params(),
            tracked_camera,
            orbit_camera,
            camera_controller: CameraController::new(),
            free_camera: config.free_camera,
            orbit_placed: false,
            title_stats: None,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.tracked_camera
                .set_viewport(new_size.width, new_size.height);
            self.orbit_camera
                .set_aspect(new_size.width, new_size.height);
        }
    }

    /// Returns `true` when the event was consumed.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::Resized(physical_size) => {
                self.resize(*physical_size);
                false
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::KeyC) =>
            {
                self.free_camera = !self.free_camera;
                log::info!(
                    "Viewing through the {} camera",
                    if self.free_camera { "orbit" } else { "tracked" }
                );
                true
            }
            _ => {
                if self.free_camera {
                    self.camera_controller
                        .handle_event(event, &mut self.orbit_camera);
                }
                false
            }
        }
    }

    /// Pulls the next frame from the source and uploads its points.
    pub fn advance(&mut self) {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                log::error!("Frame source error: {:#}", e);
                return;
            }
        };

        self.tracked_camera.track(&frame);
        if !self.orbit_placed {
            self.place_orbit(&frame);
        }

        // Replays loop; skip the unprojection for a frame already on the GPU.
        if self.renderer.points.is_current(frame.timestamp_ns) {
            return;
        }

        match unproject_frame(&frame, &self.params) {
            Ok(points) => {
                if let Upload::Uploaded {
                    grown_to: Some(bytes),
                    ..
                } = self.renderer.update(frame.timestamp_ns, &points)
                {
                    log::info!("Point buffer grown to {} KiB", bytes / 1024);
                }
            }
            Err(e) => log::error!("Dropping frame {}: {:#}", frame.timestamp_ns, e),
        }
    }

    fn place_orbit(&mut self, frame: &DepthFrame) {
        let pose = frame.pose.to_matrix();
        let eye = pose.transform_point3(Vec3::ZERO);
        let forward = pose.transform_vector3(Vec3::NEG_Z);

        self.orbit_camera.target = eye + forward * ORBIT_TARGET_DISTANCE_M;
        self.orbit_placed = true;
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let camera: &dyn CameraView = if self.free_camera {
            &self.orbit_camera
        } else {
            &self.tracked_camera
        };

        self.renderer.render(camera)?;

        let stats = (
            self.renderer.points.num_points(),
            self.renderer.points.capacity_bytes(),
        );
        if self.title_stats != Some(stats) {
            window.set_title(&format!(
                "Depth Viewer | {} points | buffer {} KiB",
                stats.0,
                stats.1 / 1024
            ));
            self.title_stats = Some(stats);
        }

        Ok(())
    }
}
