use dpcf::{CameraIntrinsics, DepthFrame, Pose};
use glam::{Mat4, Vec3};
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};

/// Converts clip-space coordinates from OpenGL conventions (Z in [-1, 1])
/// to WebGPU conventions (Z in [0, 1]).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Mat4 = Mat4::from_cols_array(&[
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
]);

/// Anything the depth renderer can look through.
///
/// Projection matrices use OpenGL clip conventions, the form tracking
/// cameras hand them out in. The renderer remaps depth for wgpu.
pub trait CameraView {
    /// World to camera.
    fn view_matrix(&self) -> Mat4;

    /// Camera to OpenGL clip space.
    fn projection_matrix(&self, near: f32, far: f32) -> Mat4;

    /// World to wgpu clip space.
    fn view_proj(&self, near: f32, far: f32) -> Mat4 {
        OPENGL_TO_WGPU_MATRIX * self.projection_matrix(near, far) * self.view_matrix()
    }
}

/// The sensor's own camera, following the pose and intrinsics of the latest
/// depth frame.
#[derive(Debug, Clone)]
pub struct TrackedCamera {
    pub pose: Pose,
    pub intrinsics: CameraIntrinsics,
    /// Viewport size in physical pixels.
    pub viewport: [u32; 2],
}

impl TrackedCamera {
    pub fn new(intrinsics: CameraIntrinsics, viewport: [u32; 2]) -> Self {
        Self {
            pose: Pose::IDENTITY,
            intrinsics,
            viewport,
        }
    }

    /// Adopt the pose and intrinsics a frame was captured with.
    pub fn track(&mut self, frame: &DepthFrame) {
        self.pose = frame.pose;
        self.intrinsics = frame.intrinsics;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = [width.max(1), height.max(1)];
    }
}

impl CameraView for TrackedCamera {
    fn view_matrix(&self) -> Mat4 {
        self.pose.to_matrix().inverse()
    }

    /// Pinhole projection built from the intrinsics. The image spans the
    /// viewport width; the vertical extent follows the image aspect so
    /// points are not stretched.
    fn projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        let k = &self.intrinsics;
        let w = k.width.max(1) as f32;
        let h = k.height.max(1) as f32;

        let depth = far - near;

        #[rustfmt::skip]
        let proj = Mat4::from_cols_array(&[
            2.0 * k.fx / w,           0.0,                      0.0,                         0.0,
            0.0,                      2.0 * k.fy / h,           0.0,                         0.0,
            1.0 - 2.0 * k.cx / w,     2.0 * k.cy / h - 1.0,     -(far + near) / depth,       -1.0,
            0.0,                      0.0,                      -2.0 * far * near / depth,   0.0,
        ]);

        let image_aspect = w / h;
        let viewport_aspect = self.viewport[0].max(1) as f32 / self.viewport[1].max(1) as f32;

        Mat4::from_scale(Vec3::new(1.0, viewport_aspect / image_aspect, 1.0)) * proj
    }
}

/// A free orbit camera for inspecting the cloud from outside the sensor.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    /// World point the camera orbits around.
    pub target: Vec3,
    /// Distance from the camera to the target (metres).
    pub radius_m: f32,
    /// Rotation around world +y (radians).
    pub azimuth_rad: f32,
    /// Angle above the horizontal plane through the target (radians).
    pub elevation_rad: f32,
    pub fov_y_rad: f32,
    pub aspect: f32,
}

impl OrbitCamera {
    pub fn new(target: Vec3, radius_m: f32, aspect: f32) -> Self {
        Self {
            target,
            radius_m,
            azimuth_rad: 0.0,
            elevation_rad: 20f32.to_radians(),
            fov_y_rad: 60f32.to_radians(),
            aspect,
        }
    }

    /// Camera position in world space.
    pub fn eye(&self) -> Vec3 {
        let (sin_az, cos_az) = self.azimuth_rad.sin_cos();
        let (sin_el, cos_el) = self.elevation_rad.sin_cos();

        self.target
            + self.radius_m * Vec3::new(cos_el * sin_az, sin_el, cos_el * cos_az)
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }
}

impl CameraView for OrbitCamera {
    fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y)
    }

    fn projection_matrix(&self, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_rad, self.aspect, near, far)
    }
}

pub struct CameraController {
    mouse_down: bool,
    last_mouse: Option<(f64, f64)>,
}

impl CameraController {
    /// Creates a new controller with default state.
    pub fn new() -> Self {
        Self {
            mouse_down: false,
            last_mouse: None,
        }
    }

    /// Handles window events and updates the camera.
    pub fn handle_event(&mut self, event: &WindowEvent, camera: &mut OrbitCamera) {
        match event {
            WindowEvent::MouseInput { button, state, .. } => {
                if *button == MouseButton::Left {
                    self.mouse_down = *state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.handle_cursor_orbit((position.x, position.y), camera);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
                };

                self.handle_scroll(scroll, camera);
            }
            _ => {}
        }
    }

    /// Positive delta zooms in.
    fn handle_scroll(&mut self, delta: f32, camera: &mut OrbitCamera) {
        camera.radius_m *= 1.1_f32.powf(-delta);
        camera.radius_m = camera.radius_m.clamp(0.25, 50.0);
    }

    /// Rotates the camera around the target while the left mouse button is held.
    fn handle_cursor_orbit(&mut self, xy: (f64, f64), camera: &mut OrbitCamera) {
        if let Some(last) = self.last_mouse {
            if self.mouse_down {
                let dx = ((xy.0 - last.0) * 0.005) as f32;
                let dy = ((xy.1 - last.1) * 0.005) as f32;

                camera.azimuth_rad -= dx;
                camera.elevation_rad += dy;

                // Stay off the poles so look_at keeps a valid up vector.
                camera.elevation_rad = camera
                    .elevation_rad
                    .clamp(-89f32.to_radians(), 89f32.to_radians());
            }
        }
        self.last_mouse = Some(xy);
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{Quat, Vec4};

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 200.0,
            fy: 200.0,
            cx: 160.0,
            cy: 120.0,
            width: 320,
            height: 240,
        }
    }

    fn ndc(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * Vec4::new(p.x, p.y, p.z, 1.0);
        clip.truncate() / clip.w
    }

    #[test]
    fn depth_range_maps_to_zero_one() {
        let cam = TrackedCamera::new(intrinsics(), [320, 240]);
        let vp = cam.view_proj(0.1, 100.0);

        assert_relative_eq!(ndc(vp, Vec3::new(0.0, 0.0, -0.1)).z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc(vp, Vec3::new(0.0, 0.0, -100.0)).z, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn tracked_projection_matches_pixels() {
        let cam = TrackedCamera::new(intrinsics(), [320, 240]);
        let p = cam.projection_matrix(0.1, 100.0);

        // Principal point projects to the viewport center.
        let center = ndc(p, Vec3::new(0.0, 0.0, -2.0));
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-6);

        // Pixel (320, 0) is the top-right corner: x = (320-160)*z/fx, y up.
        let corner = ndc(p, Vec3::new(1.6, 1.2, -2.0));
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corner.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn wider_viewport_crops_vertically() {
        let cam = TrackedCamera::new(intrinsics(), [640, 240]);
        let corner = ndc(cam.projection_matrix(0.1, 100.0), Vec3::new(1.6, 1.2, -2.0));

        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corner.y, 2.0, epsilon = 1e-5);
    }

    #[test]
    fn tracked_view_inverts_pose() {
        let mut cam = TrackedCamera::new(intrinsics(), [320, 240]);
        cam.pose = Pose::from_rotation_translation(
            Quat::from_rotation_y(0.3),
            Vec3::new(1.0, 2.0, 3.0),
        );

        let eye = cam.view_matrix().transform_point3(Vec3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(eye.length(), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn orbit_camera_looks_at_target() {
        let mut cam = OrbitCamera::new(Vec3::new(0.0, 1.0, -2.0), 3.0, 1.5);
        cam.elevation_rad = 0.0;

        assert_relative_eq!(cam.eye().distance(cam.target), 3.0, epsilon = 1e-5);

        let target_in_view = cam.view_matrix().transform_point3(cam.target);
        assert_relative_eq!(target_in_view.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(target_in_view.z, -3.0, epsilon = 1e-5);

        cam.set_aspect(800, 0);
        assert_eq!(cam.aspect, 800.0);
    }

    #[test]
    fn scroll_zoom_is_clamped() {
        let mut cam = OrbitCamera::new(Vec3::ZERO, 1.0, 1.0);
        let mut controller = CameraController::new();

        controller.handle_scroll(100.0, &mut cam);
        assert_eq!(cam.radius_m, 0.25);

        controller.handle_scroll(-500.0, &mut cam);
        assert_eq!(cam.radius_m, 50.0);
    }
}
