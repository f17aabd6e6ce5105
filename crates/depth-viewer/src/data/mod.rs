//! Data handling modules for the depth viewer.
//!
//! This module provides functionality for:
//! - Turning depth frames into world-space points.
//! - Defining the data structures for GPU buffers.

pub mod point_cloud;
pub mod types;

pub use self::types::{DepthUniformStd140, PointRecord};
