//! Depth point cloud viewer library.
//!
//! Turns depth sensor frames into world-space point clouds, keeps them in a
//! growable GPU vertex buffer and draws them as confidence-coloured sprites.

pub mod app;
pub mod camera;
pub mod config;
pub mod data;
pub mod renderer;
pub mod source;
