//! Tile catalog: predefined material identifiers and their source images
//!
//! The catalog is built once at startup from configuration and injected into
//! the request handlers as a read-only structure, so tests can substitute
//! their own entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Tile ids carrying this prefix denote a custom upload rather than a
/// catalog entry.
pub const CUSTOM_TILE_PREFIX: &str = "custom-tile-";

/// Read-only mapping from tile id to the material image on disk
#[derive(Debug, Clone)]
pub struct TileCatalog {
    tiles: HashMap<String, PathBuf>,
}

impl TileCatalog {
    /// Build the catalog shipped with the marketing site, rooted at the
    /// given tiles directory (normally `<public>/tiles`).
    pub fn builtin(tiles_root: &Path) -> Self {
        let seed = [
            ("marble-white-001", "marble-tile.jpg"),
            ("oak-wood-002", "oak-wood.webp"),
            ("oak-wood-001", "wooden-tile.jpg"),
            ("slate-grey-003", "design-tile.jpg"),
            ("terracotta-004", "terracotta-004.jpg"),
            ("black-granite-005", "black-granite-005.jpg"),
            ("hexagon-white-006", "hexagon-white-006.jpg"),
        ];

        let tiles = seed
            .into_iter()
            .map(|(id, file)| (id.to_string(), tiles_root.join(file)))
            .collect();

        TileCatalog { tiles }
    }

    /// Build a catalog from explicit entries (used by tests and overrides)
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        TileCatalog {
            tiles: entries.into_iter().collect(),
        }
    }

    /// Resolve a tile id to its source image path
    pub fn resolve(&self, tile_id: &str) -> Option<&Path> {
        self.tiles.get(tile_id).map(PathBuf::as_path)
    }

    /// Whether the id denotes a custom-uploaded tile
    pub fn is_custom_id(tile_id: &str) -> bool {
        tile_id.starts_with(CUSTOM_TILE_PREFIX)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// All known tile ids (unordered)
    pub fn ids(&self) -> Vec<&str> {
        self.tiles.keys().map(String::as_str).collect()
    }
}
