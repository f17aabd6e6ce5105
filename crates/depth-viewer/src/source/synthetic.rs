use super::FrameSource;
use anyhow::Result;
use dpcf::{CameraIntrinsics, DepthFrame, Pose};
use glam::{Quat, Vec3};

/// Frame period of the simulated sensor (30 Hz).
const FRAME_PERIOD_NS: u64 = 33_333_333;

/// Room interior, metres.
const ROOM_MIN: Vec3 = Vec3::new(-3.0, 0.0, -4.0);
const ROOM_MAX: Vec3 = Vec3::new(3.0, 2.8, 4.0);

const EYE: Vec3 = Vec3::new(0.0, 1.5, 0.0);

const SPHERE_CENTER: Vec3 = Vec3::new(1.2, 1.0, -2.5);
const SPHERE_RADIUS: f32 = 0.6;

/// Confidence reaches its floor at this distance.
const CONFIDENCE_FALLOFF_M: f32 = 6.0;

/// Depth maps of a box-shaped room with a sphere in it, seen from a camera
/// that slowly pans around the vertical axis.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    intrinsics: CameraIntrinsics,
    /// Pan speed in radians per frame.
    yaw_step: f32,
    frame_index: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        // Roughly a 65 degree horizontal field of view.
        let f = width as f32 * 0.78;
        Self {
            width,
            height,
            intrinsics: CameraIntrinsics {
                fx: f,
                fy: f,
                cx: width as f32 * 0.5,
                cy: height as f32 * 0.5,
                width,
                height,
            },
            yaw_step: 0.01,
            frame_index: 0,
        }
    }

    pub fn with_yaw_step(mut self, yaw_step: f32) -> Self {
        self.yaw_step = yaw_step;
        self
    }

    fn render(&self, pose: &Pose) -> (Vec<u16>, Vec<u8>) {
        let k = &self.intrinsics;
        let rotation = pose.rotation();
        let pixels = (self.width * self.height) as usize;

        let mut depth_mm = Vec::with_capacity(pixels);
        let mut confidence = Vec::with_capacity(pixels);

        for v in 0..self.height {
            for u in 0..self.width {
                // Unit optical-axis component, so the hit distance is depth.
                let dir_cam = Vec3::new(
                    (u as f32 - k.cx) / k.fx,
                    -(v as f32 - k.cy) / k.fy,
                    -1.0,
                );
                let dir = rotation * dir_cam;

                let t = trace(EYE, dir);
                let mm = (t * 1000.0).round();

                if t.is_finite() && mm > 0.0 && mm <= u16::MAX as f32 {
                    depth_mm.push(mm as u16);
                    let c = (1.0 - t / CONFIDENCE_FALLOFF_M).clamp(0.1, 1.0);
                    confidence.push((c * 255.0).round() as u8);
                } else {
                    depth_mm.push(0);
                    confidence.push(0);
                }
            }
        }

        (depth_mm, confidence)
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>> {
        let yaw = self.frame_index as f32 * self.yaw_step;
        let pose = Pose::from_rotation_translation(Quat::from_rotation_y(yaw), EYE);
        let (depth_mm, confidence) = self.render(&pose);

        let frame = DepthFrame {
            timestamp_ns: self.frame_index * FRAME_PERIOD_NS,
            intrinsics: self.intrinsics,
            pose,
            width: self.width,
            height: self.height,
            depth_mm,
            confidence: Some(confidence),
        };

        self.frame_index += 1;
        Ok(Some(frame))
    }
}

/// Ray parameter of the first surface hit from inside the room.
fn trace(origin: Vec3, dir: Vec3) -> f32 {
    let mut t_wall = f32::INFINITY;
    for axis in 0..3 {
        let d = dir[axis];
        let t = if d > 0.0 {
            (ROOM_MAX[axis] - origin[axis]) / d
        } else if d < 0.0 {
            (ROOM_MIN[axis] - origin[axis]) / d
        } else {
            continue;
        };
        t_wall = t_wall.min(t);
    }

    match hit_sphere(origin, dir) {
        Some(t) if t < t_wall => t,
        _ => t_wall,
    }
}

fn hit_sphere(origin: Vec3, dir: Vec3) -> Option<f32> {
    let oc = origin - SPHERE_CENTER;
    let a = dir.length_squared();
    let half_b = oc.dot(dir);
    let c = oc.length_squared() - SPHERE_RADIUS * SPHERE_RADIUS;

    let disc = half_b * half_b - a * c;
    if disc < 0.0 {
        return None;
    }

    let t = (-half_b - disc.sqrt()) / a;
    (t > 0.0).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_are_valid_and_timestamped() {
        let mut source = SyntheticSource::new(32, 24);

        let first = source.next_frame().unwrap().unwrap();
        let second = source.next_frame().unwrap().unwrap();

        assert!(first.validate().is_ok());
        assert_eq!(first.timestamp_ns, 0);
        assert_eq!(second.timestamp_ns, FRAME_PERIOD_NS);
        assert_ne!(first.pose, second.pose);
    }

    #[test]
    fn optical_axis_hits_the_front_wall() {
        let mut source = SyntheticSource::new(32, 24).with_yaw_step(0.0);
        let frame = source.next_frame().unwrap().unwrap();

        // Eye at z = 0 looking down -z onto the wall at z = -4.
        assert_eq!(frame.depth_at(16, 12), 4000);
        assert!(frame.confidence_at(16, 12) > 0.3);
    }

    #[test]
    fn sphere_occludes_the_wall() {
        // Straight from the eye towards the sphere center.
        let dir = (SPHERE_CENTER - EYE).normalize();
        let t = trace(EYE, dir);
        let expected = (SPHERE_CENTER - EYE).length() - SPHERE_RADIUS;

        assert!((t - expected).abs() < 1e-4);
    }

    #[test]
    fn nearer_surfaces_are_more_confident() {
        let mut source = SyntheticSource::new(32, 24).with_yaw_step(0.0);
        let frame = source.next_frame().unwrap().unwrap();

        let near = frame.confidence_at(16, 23); // floor, close by
        let far = frame.confidence_at(16, 12); // front wall
        assert!(frame.depth_at(16, 23) < frame.depth_at(16, 12));
        assert!(near > far);
    }

    #[test]
    fn unprojected_points_stay_inside_the_room() {
        use crate::data::point_cloud::{unproject_frame, UnprojectParams};

        let mut source = SyntheticSource::new(40, 30).with_yaw_step(0.7);
        source.next_frame().unwrap();
        let frame = source.next_frame().unwrap().unwrap();

        let params = UnprojectParams {
            stride: 1,
            min_confidence: 0.0,
            max_depth_m: 100.0,
        };
        let points = unproject_frame(&frame, &params).unwrap();
        assert_eq!(points.len(), 40 * 30);

        let slack = Vec3::splat(0.01);
        for p in &points {
            let pos = p.position();
            assert!(pos.cmpge(ROOM_MIN - slack).all(), "{pos} below room");
            assert!(pos.cmple(ROOM_MAX + slack).all(), "{pos} above room");
        }
    }
}
