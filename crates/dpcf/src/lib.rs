//! DPCF: depth point-cloud frames for the depth viewer.
//!
//! - `point`: the `(x, y, z, confidence)` record uploaded to the GPU.
//! - `frame`: a single depth capture (depth map in millimetres, optional
//!   confidence map, camera intrinsics and camera-to-world pose).
//! - `format`: the little-endian `.dpcf` file holding one recorded frame.

pub mod format;
pub mod frame;
pub mod point;

pub use format::{encode, parse_dpcf_bytes, read_file, write_file, DPCF_MAGIC, DPCF_VERSION};
pub use frame::{CameraIntrinsics, DepthFrame, FrameError, Pose};
pub use point::{PointRecord, BYTES_PER_FLOAT, BYTES_PER_POINT, FLOATS_PER_POINT};
