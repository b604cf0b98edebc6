//! Domain types and models

pub mod catalog;
pub mod visualization;

pub use catalog::{TileCatalog, CUSTOM_TILE_PREFIX};
pub use visualization::{
    ensure_source, resolve_floor_tile, resolve_render_path, resolve_wall_tile,
    InputError, VisualizationMode, VisualizationRequest,
};
