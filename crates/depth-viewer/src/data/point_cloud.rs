use crate::data::types::PointRecord;
use anyhow::{ensure, Result};
use dpcf::DepthFrame;
use glam::Vec3;
use rayon::prelude::*;

const MILLIMETERS_TO_METERS: f32 = 0.001;

/// Controls which depth pixels become points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnprojectParams {
    /// Sample every `stride`-th pixel in both directions.
    pub stride: u32,
    /// Pixels with a lower normalised confidence are dropped.
    pub min_confidence: f32,
    /// Pixels farther than this (metres) are dropped.
    pub max_depth_m: f32,
}

impl Default for UnprojectParams {
    fn default() -> Self {
        Self {
            stride: 2,
            min_confidence: 0.0,
            max_depth_m: 8.0,
        }
    }
}

/// Convert a depth frame into world-space points.
///
/// Points come out in row-major pixel order. The fourth component of each
/// record is the pixel's normalised confidence.
pub fn unproject_frame(frame: &DepthFrame, params: &UnprojectParams) -> Result<Vec<PointRecord>> {
    frame.validate()?;
    ensure!(params.stride > 0, "unproject stride must be at least 1");

    let k = frame.intrinsics.scaled_to(frame.width, frame.height);
    let (inv_fx, inv_fy) = (k.fx.recip(), k.fy.recip());
    let camera_to_world = frame.pose.to_matrix();
    let stride = params.stride as usize;

    let points = (0..frame.height)
        .into_par_iter()
        .step_by(stride)
        .flat_map_iter(|v| {
            (0..frame.width).step_by(stride).filter_map(move |u| {
                let depth_mm = frame.depth_at(u, v);
                if depth_mm == 0 {
                    return None;
                }

                let z = depth_mm as f32 * MILLIMETERS_TO_METERS;
                if z > params.max_depth_m {
                    return None;
                }

                let confidence = frame.confidence_at(u, v);
                if confidence < params.min_confidence {
                    return None;
                }

                // Image axes (+y down, +z forward) to the camera frame the
                // pose is expressed in (+y up, -z forward).
                let x = (u as f32 - k.cx) * z * inv_fx;
                let y = (v as f32 - k.cy) * z * inv_fy;
                let world = camera_to_world.transform_point3(Vec3::new(x, -y, -z));

                Some(PointRecord::new(world.x, world.y, world.z, confidence))
            })
        })
        .collect();

    Ok(points)
}
