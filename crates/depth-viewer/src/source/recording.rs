use super::FrameSource;
use anyhow::{bail, Result};
use dpcf::DepthFrame;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Replays a recorded session in a loop, one file per frame, in file name
/// order.
///
/// A file that fails to decode is reported once and skipped on later loops.
/// Once no file is left, the source is exhausted and yields nothing.
pub struct RecordingSource {
    paths: Vec<PathBuf>,
    unreadable: Vec<bool>,
    cursor: usize,
    exhausted: bool,
}

impl RecordingSource {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();

        let mut paths: Vec<_> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("dpcf"))
            .map(|e| e.path().to_path_buf())
            .collect();

        if paths.is_empty() {
            bail!("no .dpcf files found in '{}'", root.display());
        }

        paths.sort();
        log::info!("Replaying {} frames from '{}'", paths.len(), root.display());

        Ok(Self {
            unreadable: vec![false; paths.len()],
            paths,
            cursor: 0,
            exhausted: false,
        })
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl FrameSource for RecordingSource {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>> {
        if self.exhausted {
            return Ok(None);
        }

        // One full pass at most; a session where nothing decodes is an error.
        for _ in 0..self.paths.len() {
            let index = self.cursor;
            self.cursor = (self.cursor + 1) % self.paths.len();
            if self.unreadable[index] {
                continue;
            }

            let path = &self.paths[index];
            match dpcf::read_file(path) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => {
                    log::error!("Failed to read frame {}: {}; skipping it", path.display(), e);
                    self.unreadable[index] = true;
                }
            }
        }

        self.exhausted = true;
        bail!("none of the {} recorded frames could be read", self.paths.len())
    }
}
