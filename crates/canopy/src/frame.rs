//! Reference frame shared by all tiles of a run.

use crate::catalog::Tile;
use crate::config::CornerPolicy;
use crate::error::CatalogError;
use std::path::PathBuf;
use tracing::info;

/// The corner tile anchoring the local frame; grid indices, not metres.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFrame {
    pub min_east: i64,
    pub min_north: i64,
    pub corner: PathBuf,
}

impl ReferenceFrame {
    /// Pick the corner tile from `tiles` (scan order matters).
    ///
    /// With [`CornerPolicy::Conjunctive`] a tile replaces the current corner
    /// only when it is `<=` on *both* axes, so the result is the last tile in
    /// scan order that satisfied the test when visited. This is not the
    /// per-axis minimum when the two minima live on different tiles.
    ///
    /// With [`CornerPolicy::PerAxis`] east and north are minimised
    /// independently; `corner` then names the first tile with the minimum
    /// east (lowest north among those).
    pub fn build(tiles: &[Tile], policy: CornerPolicy) -> Result<Self, CatalogError> {
        let first = tiles.first().ok_or(CatalogError::EmptyCatalog)?;

        let frame = match policy {
            CornerPolicy::Conjunctive => {
                // Starts from +inf on both axes, so the first tile is always adopted.
                let mut best: Option<&Tile> = None;
                for tile in tiles {
                    let adopt = match best {
                        None => true,
                        Some(b) => tile.east <= b.east && tile.north <= b.north,
                    };
                    if adopt {
                        best = Some(tile);
                    }
                }
                let corner = best.unwrap_or(first);
                ReferenceFrame {
                    min_east: corner.east,
                    min_north: corner.north,
                    corner: corner.path.clone(),
                }
            }
            CornerPolicy::PerAxis => {
                let min_east = tiles.iter().map(|t| t.east).min().unwrap_or(first.east);
                let min_north = tiles.iter().map(|t| t.north).min().unwrap_or(first.north);
                let corner = tiles
                    .iter()
                    .filter(|t| t.east == min_east)
                    .min_by_key(|t| t.north)
                    .unwrap_or(first);
                ReferenceFrame {
                    min_east,
                    min_north,
                    corner: corner.path.clone(),
                }
            }
        };

        info!(
            corner = %frame.corner.display(),
            min_east = frame.min_east,
            min_north = frame.min_north,
            ?policy,
            "Reference frame established"
        );

        Ok(frame)
    }
}
