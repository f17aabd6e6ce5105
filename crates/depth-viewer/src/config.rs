use crate::data::point_cloud::UnprojectParams;
use anyhow::{ensure, Result};
use clap::Parser;
use std::path::PathBuf;

/// `depth_viewer` - renders the point cloud of a depth sensor session.
///
/// Frames come from a recorded session (a directory of `.dpcf` files) or,
/// when no recording is given, from a synthetic room scan.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// Directory holding a recorded session of `.dpcf` frames.
    #[arg(long, env = "DEPTH_RECORDING_DIR")]
    pub recording: Option<PathBuf>,

    /// Initial vertex buffer capacity, in points. The buffer doubles when a
    /// frame does not fit.
    #[arg(long, default_value_t = 1000)]
    pub initial_points: u32,

    /// Point sprite size in pixels.
    #[arg(long, default_value_t = 5.0)]
    pub point_size: f32,

    /// Near clip plane in metres.
    #[arg(long, default_value_t = 0.1)]
    pub near: f32,

    /// Far clip plane in metres.
    #[arg(long, default_value_t = 100.0)]
    pub far: f32,

    /// Sample every n-th depth pixel.
    #[arg(long, default_value_t = 2)]
    pub stride: u32,

    /// Drop depth pixels below this confidence (0..1).
    #[arg(long, default_value_t = 0.0)]
    pub min_confidence: f32,

    /// Drop depth pixels farther than this, in metres.
    #[arg(long, default_value_t = 8.0)]
    pub max_depth: f32,

    /// WGSL file replacing the built-in point shader.
    #[arg(long, env = "DEPTH_SHADER")]
    pub shader: Option<PathBuf>,

    /// Start with the free orbit camera instead of the sensor's viewpoint.
    #[arg(long, default_value_t = false)]
    pub free_camera: bool,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.stride > 0, "--stride must be at least 1");
        ensure!(
            self.point_size.is_finite() && self.point_size > 0.0,
            "--point-size must be positive"
        );
        ensure!(
            self.near > 0.0 && self.near < self.far,
            "clip planes must satisfy 0 < near < far (got {} / {})",
            self.near,
            self.far
        );
        ensure!(
            (0.0..=1.0).contains(&self.min_confidence),
            "--min-confidence must lie in [0, 1]"
        );
        ensure!(self.max_depth > 0.0, "--max-depth must be positive");
        Ok(())
    }

    pub fn unproject_params(&self) -> UnprojectParams {
        UnprojectParams {
            stride: self.stride,
            min_confidence: self.min_confidence,
            max_depth_m: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("depth_viewer").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_match_the_demo() {
        let config = parse(&[]);

        assert_eq!(config.initial_points, 1000);
        assert_eq!(config.point_size, 5.0);
        assert_eq!(config.near, 0.1);
        assert_eq!(config.far, 100.0);
        assert!(!config.free_camera);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--recording",
            "session",
            "--stride",
            "4",
            "--min-confidence",
            "0.5",
            "--free-camera",
        ]);

        assert_eq!(config.recording, Some(PathBuf::from("session")));
        assert_eq!(
            config.unproject_params(),
            UnprojectParams {
                stride: 4,
                min_confidence: 0.5,
                max_depth_m: 8.0,
            }
        );
        assert!(config.free_camera);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(parse(&["--stride", "0"]).validate().is_err());
        assert!(parse(&["--near", "5", "--far", "1"]).validate().is_err());
        assert!(parse(&["--point-size", "0"]).validate().is_err());
        assert!(parse(&["--min-confidence", "1.5"]).validate().is_err());
    }
}
