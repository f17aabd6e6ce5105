//! Depth frame sources.
//!
//! The viewer does not talk to a sensor session directly. It pulls frames
//! from a `FrameSource`:
//! - `RecordingSource` replays a directory of `.dpcf` files.
//! - `SyntheticSource` renders depth maps of a procedural room.

pub mod recording;
pub mod synthetic;

pub use self::{recording::RecordingSource, synthetic::SyntheticSource};

use anyhow::Result;
use dpcf::DepthFrame;

pub trait FrameSource {
    /// Returns the next frame, or `None` when nothing new is available.
    fn next_frame(&mut self) -> Result<Option<DepthFrame>>;
}
