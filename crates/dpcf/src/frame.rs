use glam::{Mat4, Quat, Vec3};

/// Pinhole intrinsics, in pixels of the image they were measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// Width of the image the values refer to.
    pub width: u32,
    /// Height of the image the values refer to.
    pub height: u32,
}

impl CameraIntrinsics {
    pub fn validate(&self) -> Result<(), FrameError> {
        let usable = |f: f32| f.is_finite() && f > 0.0;
        if !usable(self.fx) || !usable(self.fy) {
            return Err(FrameError::FocalLength {
                fx: self.fx,
                fy: self.fy,
            });
        }
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(FrameError::PrincipalPoint {
                cx: self.cx,
                cy: self.cy,
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::IntrinsicsSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Rescales the intrinsics to an image of another resolution.
    ///
    /// Depth maps are usually much smaller than the colour image the
    /// tracking camera reports its intrinsics for.
    pub fn scaled_to(&self, width: u32, height: u32) -> Self {
        if self.width == width && self.height == height {
            return *self;
        }

        let sx = width as f32 / self.width.max(1) as f32;
        let sy = height as f32 / self.height.max(1) as f32;

        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
            width,
            height,
        }
    }
}

/// Camera-to-world rigid transform.
///
/// The camera frame follows OpenGL conventions: +x right, +y up, looking
/// down -z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Unit quaternion, `[x, y, z, w]`.
    pub rotation: [f32; 4],
    /// Metres.
    pub translation: [f32; 3],
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        rotation: [0.0, 0.0, 0.0, 1.0],
        translation: [0.0, 0.0, 0.0],
    };

    pub fn from_rotation_translation(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation: rotation.to_array(),
            translation: translation.to_array(),
        }
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        Quat::from_array(self.rotation).normalize()
    }

    #[inline]
    pub fn translation(&self) -> Vec3 {
        Vec3::from_array(self.translation)
    }

    /// Camera-to-world matrix.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation(), self.translation())
    }
}

impl Pose {
    /// Rotation must normalise to a unit quaternion; translation must be finite.
    pub fn validate(&self) -> Result<(), FrameError> {
        let q = Quat::from_array(self.rotation);
        if !q.is_finite() || q.length_squared() < 1e-12 {
            return Err(FrameError::Rotation(self.rotation));
        }
        if !self.translation().is_finite() {
            return Err(FrameError::Translation(self.translation));
        }
        Ok(())
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("focal length must be finite and positive (fx = {fx}, fy = {fy})")]
    FocalLength { fx: f32, fy: f32 },
    #[error("principal point is not finite (cx = {cx}, cy = {cy})")]
    PrincipalPoint { cx: f32, cy: f32 },
    #[error("intrinsics reference image has zero size ({width}x{height})")]
    IntrinsicsSize { width: u32, height: u32 },
    #[error("pose rotation {0:?} is not a usable quaternion")]
    Rotation([f32; 4]),
    #[error("pose translation {0:?} is not finite")]
    Translation([f32; 3]),
    #[error("depth plane holds {actual} samples, expected {expected}")]
    DepthSize { expected: usize, actual: usize },
    #[error("confidence plane holds {actual} samples, expected {expected}")]
    ConfidenceSize { expected: usize, actual: usize },
}

/// One depth capture as delivered by the sensor session.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    /// Capture time. Frames with equal timestamps carry the same data.
    pub timestamp_ns: u64,
    pub intrinsics: CameraIntrinsics,
    pub pose: Pose,
    pub width: u32,
    pub height: u32,
    /// Row-major depth in millimetres; 0 means "no measurement".
    pub depth_mm: Vec<u16>,
    /// Row-major confidence, 0 (none) to 255 (full).
    pub confidence: Option<Vec<u8>>,
}

impl DepthFrame {
    #[inline]
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn validate(&self) -> Result<(), FrameError> {
        if self.width == 0 || self.height == 0 {
            return Err(FrameError::EmptyImage {
                width: self.width,
                height: self.height,
            });
        }

        let expected = self.pixel_count();
        if self.depth_mm.len() != expected {
            return Err(FrameError::DepthSize {
                expected,
                actual: self.depth_mm.len(),
            });
        }

        if let Some(confidence) = self.confidence.as_ref() {
            if confidence.len() != expected {
                return Err(FrameError::ConfidenceSize {
                    expected,
                    actual: confidence.len(),
                });
            }
        }

        self.intrinsics.validate()?;
        self.pose.validate()
    }

    /// Depth in millimetres at pixel `(u, v)`.
    #[inline]
    pub fn depth_at(&self, u: u32, v: u32) -> u16 {
        self.depth_mm[v as usize * self.width as usize + u as usize]
    }

    /// Normalised confidence at pixel `(u, v)`; 1.0 when the frame has no
    /// confidence plane.
    #[inline]
    pub fn confidence_at(&self, u: u32, v: u32) -> f32 {
        match self.confidence.as_ref() {
            Some(c) => c[v as usize * self.width as usize + u as usize] as f32 / 255.0,
            None => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(width: u32, height: u32) -> DepthFrame {
        DepthFrame {
            timestamp_ns: 1,
            intrinsics: CameraIntrinsics {
                fx: 100.0,
                fy: 100.0,
                cx: 2.0,
                cy: 1.5,
                width,
                height,
            },
            pose: Pose::IDENTITY,
            width,
            height,
            depth_mm: vec![1000; (width * height) as usize],
            confidence: None,
        }
    }

    #[test]
    fn intrinsics_scale_with_resolution() {
        let k = CameraIntrinsics {
            fx: 500.0,
            fy: 480.0,
            cx: 320.0,
            cy: 240.0,
            width: 640,
            height: 480,
        };
        let s = k.scaled_to(160, 120);

        assert_relative_eq!(s.fx, 125.0);
        assert_relative_eq!(s.fy, 120.0);
        assert_relative_eq!(s.cx, 80.0);
        assert_relative_eq!(s.cy, 60.0);
        assert_eq!((s.width, s.height), (160, 120));
        assert_eq!(k.scaled_to(640, 480), k);
    }

    #[test]
    fn pose_matrix_moves_origin_to_translation() {
        let pose = Pose::from_rotation_translation(
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let m = pose.to_matrix();

        let origin = m.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 1.0);
        assert_relative_eq!(origin.y, 2.0);
        assert_relative_eq!(origin.z, 3.0);

        // Looking down -z, rotated a quarter turn about +y, now looks down -x.
        let forward = m.transform_vector3(Vec3::NEG_Z);
        assert_relative_eq!(forward.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(forward.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn validate_checks_plane_sizes() {
        let mut f = frame(4, 3);
        assert_eq!(f.validate(), Ok(()));

        f.confidence = Some(vec![255; 11]);
        assert_eq!(
            f.validate(),
            Err(FrameError::ConfidenceSize {
                expected: 12,
                actual: 11
            })
        );

        f.confidence = None;
        f.depth_mm.pop();
        assert_eq!(
            f.validate(),
            Err(FrameError::DepthSize {
                expected: 12,
                actual: 11
            })
        );

        let empty = frame(0, 3);
        assert!(matches!(empty.validate(), Err(FrameError::EmptyImage { .. })));
    }

    #[test]
    fn validate_rejects_degenerate_intrinsics() {
        let mut f = frame(4, 3);
        f.intrinsics.fx = 0.0;
        assert!(matches!(f.validate(), Err(FrameError::FocalLength { .. })));

        f.intrinsics.fx = 100.0;
        f.intrinsics.fy = f32::NAN;
        assert!(matches!(f.validate(), Err(FrameError::FocalLength { .. })));

        f.intrinsics.fy = -100.0;
        assert!(matches!(f.validate(), Err(FrameError::FocalLength { .. })));

        f.intrinsics.fy = 100.0;
        f.intrinsics.cx = f32::INFINITY;
        assert!(matches!(f.validate(), Err(FrameError::PrincipalPoint { .. })));

        f.intrinsics.cx = 2.0;
        f.intrinsics.height = 0;
        assert_eq!(
            f.validate(),
            Err(FrameError::IntrinsicsSize {
                width: 4,
                height: 0
            })
        );
    }

    #[test]
    fn validate_rejects_degenerate_pose() {
        let mut f = frame(4, 3);
        f.pose.rotation = [0.0; 4];
        assert_eq!(f.validate(), Err(FrameError::Rotation([0.0; 4])));

        f.pose.rotation = [0.0, f32::NAN, 0.0, 1.0];
        assert!(matches!(f.validate(), Err(FrameError::Rotation(_))));

        // Non-unit but non-zero quaternions normalise fine.
        f.pose.rotation = [0.0, 0.0, 0.0, 2.0];
        assert_eq!(f.validate(), Ok(()));

        f.pose.translation = [0.0, f32::INFINITY, 0.0];
        assert!(matches!(f.validate(), Err(FrameError::Translation(_))));
    }

    #[test]
    fn confidence_defaults_to_full() {
        let mut f = frame(2, 2);
        assert_eq!(f.confidence_at(1, 1), 1.0);

        f.confidence = Some(vec![0, 51, 102, 255]);
        assert_relative_eq!(f.confidence_at(1, 0), 0.2);
        assert_relative_eq!(f.confidence_at(1, 1), 1.0);
        assert_eq!(f.depth_at(1, 1), 1000);
    }
}
