//! Per-request staging directory
//!
//! Each request gets an isolated temp directory holding copies of the
//! resolved material images under fixed names, so the transform invocation
//! never sees original filenames. The directory is removed when the job is
//! dropped, on every exit path including timeout cancellation.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::domain::visualization::ensure_source;
use crate::domain::VisualizationRequest;

use super::VisualizeError;

/// Fixed staged names, independent of the upload's original name
const FLOOR_TILE_NAME: &str = "tile.jpg";
const WALL_TILE_NAME: &str = "wall_tile.jpg";
const CORRECTED_ROOM_NAME: &str = "corrected_room.jpg";

/// Owns the temp directory for one request
#[derive(Debug)]
pub struct StagingJob {
    dir: TempDir,
    pub floor_tile: Option<PathBuf>,
    pub wall_tile: Option<PathBuf>,
}

impl StagingJob {
    /// Create the directory and copy the resolved materials into it.
    ///
    /// Missing or empty sources fail here, before any provider call is made.
    pub fn create(request: &VisualizationRequest) -> Result<Self, VisualizeError> {
        let prefix = format!("viz_{}_", chrono::Utc::now().timestamp_millis());
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir()?;

        let floor_tile = match &request.floor_tile {
            Some(source) => {
                ensure_source("Floor tile", source)?;
                let staged = dir.path().join(FLOOR_TILE_NAME);
                std::fs::copy(source, &staged)?;
                Some(staged)
            }
            None => None,
        };

        let wall_tile = match &request.wall_tile {
            Some(source) => {
                ensure_source("Wall tile", source)?;
                let staged = dir.path().join(WALL_TILE_NAME);
                std::fs::copy(source, &staged)?;
                Some(staged)
            }
            None => None,
        };

        debug!(dir = %dir.path().display(), "Created staging directory");

        Ok(StagingJob {
            dir,
            floor_tile,
            wall_tile,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the orientation-corrected room image is written
    pub fn corrected_room_path(&self) -> PathBuf {
        self.dir.path().join(CORRECTED_ROOM_NAME)
    }
}
