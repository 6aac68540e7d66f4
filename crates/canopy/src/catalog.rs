//! Tile discovery: walk the input directory and parse grid offsets from names.

use crate::error::CatalogError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One survey tile, named by its UTM grid offset (east, north).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub path: PathBuf,
    pub east: i64,
    pub north: i64,
    /// Set once the extractor produced points for this tile.
    pub valid: bool,
}

impl Tile {
    pub fn new(path: impl Into<PathBuf>, east: i64, north: i64) -> Self {
        Self {
            path: path.into(),
            east,
            north,
            valid: false,
        }
    }

    /// Build a tile from a path such as `4810E_54560N.las`.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let (east, north) = parse_grid_offset(&path)?;
        Ok(Self::new(path, east, north))
    }
}

/// Extract the two decimal integers embedded in a tile's file name, in order.
pub fn parse_grid_offset(path: &Path) -> Result<(i64, i64), CatalogError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let bad = || CatalogError::BadTileName {
        name: name.to_owned(),
    };

    let mut numbers = name
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty());

    let east = numbers.next().ok_or_else(bad)?;
    let north = numbers.next().ok_or_else(bad)?;
    if numbers.next().is_some() {
        return Err(bad());
    }

    let east = east.parse::<i64>().map_err(|_| bad())?;
    let north = north.parse::<i64>().map_err(|_| bad())?;

    Ok((east, north))
}

/// Enumerate tile files under `dir` with extension `ext` (case-insensitive).
///
/// Entries are visited in file-name order so that the scan order, and with it
/// the corner-tile choice, is stable across platforms. Files whose names do
/// not carry a grid offset are skipped with a warning.
pub fn collect_tiles(dir: &Path, ext: &str) -> Result<Vec<Tile>, CatalogError> {
    let mut tiles = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();

        let matches_ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case(ext))
            .unwrap_or(false);

        if !matches_ext {
            continue;
        }

        match Tile::from_path(&path) {
            Ok(tile) => {
                debug!(tile = %path.display(), east = tile.east, north = tile.north, "Discovered tile");
                tiles.push(tile);
            }
            Err(err) => warn!(tile = %path.display(), error = %err, "Skipping file"),
        }
    }

    info!(dir = %dir.display(), count = tiles.len(), "Found tiles");

    if tiles.is_empty() {
        return Err(CatalogError::EmptyCatalog);
    }

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_east_then_north() {
        assert_eq!(
            parse_grid_offset(Path::new("/data/2018/4810E_54560N.las")).unwrap(),
            (4810, 54560)
        );
        assert_eq!(
            parse_grid_offset(Path::new("tile-4800-54550.las")).unwrap(),
            (4800, 54550)
        );
    }

    #[test]
    fn rejects_names_without_exactly_two_numbers() {
        assert!(parse_grid_offset(Path::new("4810E.las")).is_err());
        assert!(parse_grid_offset(Path::new("v2_4810E_54560N.las")).is_err());
        assert!(parse_grid_offset(Path::new("campus.las")).is_err());
    }

    #[test]
    fn collects_matching_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("2018");
        fs::create_dir_all(&nested).unwrap();

        for name in ["4820E_54570N.las", "4810E_54560N.LAS", "notes.txt", "readme.las"] {
            fs::write(nested.join(name), b"").unwrap();
        }

        let tiles = collect_tiles(dir.path(), "las").unwrap();
        let coords: Vec<_> = tiles.iter().map(|t| (t.east, t.north)).collect();

        assert_eq!(coords, vec![(4810, 54560), (4820, 54570)]);
        assert!(tiles.iter().all(|t| !t.valid));
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            collect_tiles(dir.path(), "las"),
            Err(CatalogError::EmptyCatalog)
        ));
    }
}
