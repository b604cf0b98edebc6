//! Visualization request model and input validation
//!
//! One `VisualizationRequest` exists per HTTP call. It is built by the upload
//! intake after all sources are resolved to absolute paths, validated once,
//! consumed by the engine, and never persisted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::catalog::TileCatalog;

/// Which surfaces the transform should edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum VisualizationMode {
    Floor,
    Walls,
    Both,
}

impl Default for VisualizationMode {
    fn default() -> Self {
        VisualizationMode::Floor
    }
}

impl VisualizationMode {
    /// Parse the `visualizationType` form field. Absent or empty defaults to
    /// floor; anything else unrecognized is a client error.
    pub fn from_param(raw: Option<&str>) -> Result<Self, InputError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(VisualizationMode::Floor),
            Some("floor") => Ok(VisualizationMode::Floor),
            Some("walls") => Ok(VisualizationMode::Walls),
            Some("both") => Ok(VisualizationMode::Both),
            Some(other) => Err(InputError::InvalidMode(other.to_string())),
        }
    }

    pub fn needs_floor_material(self) -> bool {
        matches!(self, VisualizationMode::Floor | VisualizationMode::Both)
    }

    pub fn needs_wall_material(self) -> bool {
        matches!(self, VisualizationMode::Walls | VisualizationMode::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VisualizationMode::Floor => "floor",
            VisualizationMode::Walls => "walls",
            VisualizationMode::Both => "both",
        }
    }
}

/// Client-input failures. All of these map to HTTP 400 with a
/// machine-readable `error` string; some carry extra diagnostics for
/// debugging deployment path mismatches.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("No room image uploaded or render path provided")]
    MissingRoomImage,

    #[error("No tile ID provided")]
    MissingTileId,

    #[error("Invalid tile ID")]
    InvalidTileId { tile_id: String },

    #[error("Wall tile image is required for wall visualization")]
    WallTileRequired,

    #[error("Invalid visualization type: {0}")]
    InvalidMode(String),

    #[error("Only image files are allowed for {field}")]
    NotAnImage {
        field: String,
        content_type: Option<String>,
    },

    #[error("File too large for {field} (limit {limit_bytes} bytes)")]
    FileTooLarge { field: String, limit_bytes: u64 },

    #[error("{kind} file not found")]
    FileNotFound { kind: &'static str, path: PathBuf },

    #[error("{kind} file is empty")]
    FileEmpty { kind: &'static str, path: PathBuf },

    #[error("Render image not found")]
    RenderNotFound {
        render_path: String,
        attempted: Vec<PathBuf>,
        parent_listing: Vec<String>,
    },

    #[error("Invalid multipart payload: {0}")]
    Malformed(String),
}

impl InputError {
    /// Extra response fields for operator debugging, merged into the 400 body
    pub fn diagnostics(&self) -> Option<serde_json::Value> {
        match self {
            InputError::RenderNotFound {
                render_path,
                attempted,
                parent_listing,
            } => Some(serde_json::json!({
                "renderPath": render_path,
                "attemptedPaths": attempted,
                "directoryContents": parent_listing,
            })),
            InputError::FileNotFound { path, .. } | InputError::FileEmpty { path, .. } => {
                Some(serde_json::json!({ "path": path }))
            }
            InputError::NotAnImage { content_type, .. } => Some(serde_json::json!({
                "receivedType": content_type.as_deref().unwrap_or("unknown"),
            })),
            _ => None,
        }
    }
}

/// A fully resolved visualization request
#[derive(Debug, Clone)]
pub struct VisualizationRequest {
    /// Absolute path of the room image (upload or render)
    pub room_image: PathBuf,
    /// True when the room image came in as an upload rather than a render
    pub room_is_upload: bool,
    /// Resolved floor material source, when the mode edits the floor
    pub floor_tile: Option<PathBuf>,
    /// Resolved wall material source, when the mode edits walls
    pub wall_tile: Option<PathBuf>,
    pub mode: VisualizationMode,
}

impl VisualizationRequest {
    /// Check the mode/material invariant: floor requires a floor material,
    /// walls requires a wall material, both requires both.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.mode.needs_floor_material() && self.floor_tile.is_none() {
            return Err(InputError::MissingTileId);
        }
        if self.mode.needs_wall_material() && self.wall_tile.is_none() {
            return Err(InputError::WallTileRequired);
        }
        Ok(())
    }
}

/// Resolve the floor material for the request.
///
/// A `custom-tile-*` id selects the uploaded custom tile; any other id is a
/// catalog lookup. Modes that do not edit the floor resolve to `None` without
/// touching the id at all.
pub fn resolve_floor_tile(
    mode: VisualizationMode,
    tile_id: Option<&str>,
    custom_upload: Option<&Path>,
    catalog: &TileCatalog,
) -> Result<Option<PathBuf>, InputError> {
    if !mode.needs_floor_material() {
        return Ok(None);
    }

    let tile_id = match tile_id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return Err(InputError::MissingTileId),
    };

    if TileCatalog::is_custom_id(tile_id) {
        if let Some(path) = custom_upload {
            return Ok(Some(path.to_path_buf()));
        }
        // Custom id without an uploaded file falls through to the catalog,
        // which will not contain it.
    }

    match catalog.resolve(tile_id) {
        Some(path) => Ok(Some(path.to_path_buf())),
        None => Err(InputError::InvalidTileId {
            tile_id: tile_id.to_string(),
        }),
    }
}

/// Resolve the wall material: always an upload, never a catalog entry
pub fn resolve_wall_tile(
    mode: VisualizationMode,
    upload: Option<&Path>,
) -> Result<Option<PathBuf>, InputError> {
    if !mode.needs_wall_material() {
        return Ok(None);
    }
    match upload {
        Some(path) => Ok(Some(path.to_path_buf())),
        None => Err(InputError::WallTileRequired),
    }
}

/// Reject a source file that is missing or has no content. Used for the
/// room image at intake and again for materials at staging, before any
/// provider cost is incurred.
pub fn ensure_source(kind: &'static str, path: &Path) -> Result<(), InputError> {
    let metadata = std::fs::metadata(path).map_err(|_| InputError::FileNotFound {
        kind,
        path: path.to_path_buf(),
    })?;
    if metadata.len() == 0 {
        return Err(InputError::FileEmpty {
            kind,
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// Resolve a render reference (e.g. `/room_renders/kitchen/kitchen 1.jpg`)
/// against the candidate public roots.
///
/// On failure the error carries every attempted path plus a listing of the
/// nearest existing parent directory, so a deployment with a misplaced public
/// root can be diagnosed from the response alone.
pub fn resolve_render_path(render_path: &str, roots: &[PathBuf]) -> Result<PathBuf, InputError> {
    let relative = render_path.trim_start_matches('/');
    let mut attempted = Vec::new();

    for root in roots {
        let candidate = root.join(relative);
        if candidate.is_file() {
            return Ok(candidate);
        }
        attempted.push(candidate);
    }

    let parent_listing = attempted
        .first()
        .map(|p| list_nearest_parent(p))
        .unwrap_or_default();

    Err(InputError::RenderNotFound {
        render_path: render_path.to_string(),
        attempted,
        parent_listing,
    })
}

/// Walk up from a missing path to the first directory that exists and list it
fn list_nearest_parent(path: &Path) -> Vec<String> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.is_dir() {
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .map(|entries| {
                    entries
                        .filter_map(|e| e.ok())
                        .map(|e| e.file_name().to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_else(|_| vec!["(cannot read directory)".to_string()]);
            names.sort();
            return names;
        }
        current = dir.parent();
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_catalog() -> TileCatalog {
        TileCatalog::from_entries(vec![(
            "marble-white-001".to_string(),
            PathBuf::from("/public/tiles/marble-tile.jpg"),
        )])
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            VisualizationMode::from_param(None).unwrap(),
            VisualizationMode::Floor
        );
        assert_eq!(
            VisualizationMode::from_param(Some("walls")).unwrap(),
            VisualizationMode::Walls
        );
        assert!(matches!(
            VisualizationMode::from_param(Some("ceiling")),
            Err(InputError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_floor_resolution_catalog_hit() {
        let resolved =
            resolve_floor_tile(VisualizationMode::Floor, Some("marble-white-001"), None, &test_catalog())
                .unwrap();
        assert_eq!(resolved, Some(PathBuf::from("/public/tiles/marble-tile.jpg")));
    }

    #[test]
    fn test_floor_resolution_unknown_id() {
        let err =
            resolve_floor_tile(VisualizationMode::Floor, Some("granite-042"), None, &test_catalog())
                .unwrap_err();
        assert_eq!(err.to_string(), "Invalid tile ID");
    }

    #[test]
    fn test_floor_resolution_custom_upload() {
        let upload = PathBuf::from("/uploads/customTileFile-1.jpg");
        let resolved = resolve_floor_tile(
            VisualizationMode::Floor,
            Some("custom-tile-1700000000"),
            Some(&upload),
            &test_catalog(),
        )
        .unwrap();
        assert_eq!(resolved, Some(upload));
    }

    #[test]
    fn test_walls_mode_skips_floor() {
        let resolved =
            resolve_floor_tile(VisualizationMode::Walls, None, None, &test_catalog()).unwrap();
        assert!(resolved.is_none());
    }

    #[test]
    fn test_wall_tile_required_for_walls_and_both() {
        for mode in [VisualizationMode::Walls, VisualizationMode::Both] {
            let err = resolve_wall_tile(mode, None).unwrap_err();
            assert!(err.to_string().contains("Wall tile"));
        }
        assert!(resolve_wall_tile(VisualizationMode::Floor, None)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_request_invariants() {
        let request = VisualizationRequest {
            room_image: PathBuf::from("/tmp/room.jpg"),
            room_is_upload: true,
            floor_tile: None,
            wall_tile: None,
            mode: VisualizationMode::Both,
        };
        assert!(request.validate().is_err());

        let request = VisualizationRequest {
            floor_tile: Some(PathBuf::from("/tmp/tile.jpg")),
            wall_tile: Some(PathBuf::from("/tmp/wall.jpg")),
            ..request
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_render_resolution_success_and_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("public");
        std::fs::create_dir_all(root.join("room_renders")).unwrap();
        std::fs::write(root.join("room_renders/kitchen.jpg"), b"jpeg").unwrap();

        let roots = vec![root.clone()];
        let resolved = resolve_render_path("/room_renders/kitchen.jpg", &roots).unwrap();
        assert_eq!(resolved, root.join("room_renders/kitchen.jpg"));

        let err = resolve_render_path("/room_renders/missing.jpg", &roots).unwrap_err();
        match err {
            InputError::RenderNotFound {
                attempted,
                parent_listing,
                ..
            } => {
                assert_eq!(attempted.len(), 1);
                assert!(parent_listing.contains(&"kitchen.jpg".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
