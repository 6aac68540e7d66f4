//! Point-cloud readers.

use crate::error::TileError;
use las::Read as _;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One raw survey return, in projected metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Surface-class code as stored in the file.
    pub class: u8,
}

/// Anything that can load the raw points of a tile file.
pub trait PointSource: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<RawPoint>, TileError>;
}

/// Reads ASPRS LAS files.
#[derive(Debug, Default, Clone, Copy)]
pub struct LasSource;

impl PointSource for LasSource {
    fn read(&self, path: &Path) -> Result<Vec<RawPoint>, TileError> {
        let read_err = |e: las::Error| TileError::Read {
            path: path.to_path_buf(),
            source: Box::new(e),
        };

        let mut reader = las::Reader::from_path(path).map_err(read_err)?;
        let count = reader.header().number_of_points() as usize;
        let mut out = Vec::with_capacity(count);

        for point in reader.points() {
            let point = point.map_err(read_err)?;
            out.push(RawPoint {
                x: point.x,
                y: point.y,
                z: point.z,
                class: u8::from(point.classification),
            });
        }

        Ok(out)
    }
}

/// Serves tiles from memory; handy for tests and synthetic runs.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    tiles: HashMap<PathBuf, Vec<RawPoint>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, points: Vec<RawPoint>) {
        self.tiles.insert(path.into(), points);
    }
}

impl PointSource for MemorySource {
    fn read(&self, path: &Path) -> Result<Vec<RawPoint>, TileError> {
        self.tiles
            .get(path)
            .cloned()
            .ok_or_else(|| TileError::Read {
                path: path.to_path_buf(),
                source: format!("no in-memory tile registered for {}", path.display()).into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use las::point::Classification;
    use las::{Builder, Point, Transform, Vector, Write as _, Writer};

    fn write_las(path: &Path, points: &[Point]) {
        let mut builder = Builder::from((1, 2));
        let cm = Transform {
            scale: 0.01,
            offset: 0.0,
        };
        builder.transforms = Vector { x: cm, y: cm, z: cm };

        let mut writer = Writer::from_path(path, builder.into_header().unwrap()).unwrap();
        for p in points {
            writer.write(p.clone()).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn las_source_reads_position_and_class() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("4810E_54565N.las");
        write_las(
            &path,
            &[
                Point {
                    x: 481_012.34,
                    y: 5_456_500.5,
                    z: 3.0,
                    classification: Classification::new(5).unwrap(),
                    ..Default::default()
                },
                Point {
                    x: 481_050.0,
                    y: 5_456_520.0,
                    z: 0.2,
                    classification: Classification::Ground,
                    ..Default::default()
                },
            ],
        );

        let points = LasSource.read(&path).unwrap();
        assert_eq!(points.len(), 2);

        let p = points[0];
        assert!((p.x - 481_012.34).abs() < 1e-6, "x {}", p.x);
        assert!((p.y - 5_456_500.5).abs() < 1e-6, "y {}", p.y);
        assert!((p.z - 3.0).abs() < 1e-6);
        assert_eq!(p.class, 5);
        assert_eq!(points[1].class, 2);
    }

    #[test]
    fn unreadable_tiles_are_read_errors() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("4810E_54560N.las");
        assert!(matches!(LasSource.read(&missing), Err(TileError::Read { .. })));

        let garbage = dir.path().join("4820E_54560N.las");
        std::fs::write(&garbage, b"not a point cloud").unwrap();
        assert!(matches!(LasSource.read(&garbage), Err(TileError::Read { .. })));
    }

    #[test]
    fn memory_source_serves_registered_tiles_only() {
        let mut source = MemorySource::new();
        let raw = RawPoint {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            class: 5,
        };
        source.insert("a.las", vec![raw]);

        assert_eq!(source.read(Path::new("a.las")).unwrap(), vec![raw]);
        assert!(matches!(source.read(Path::new("b.las")), Err(TileError::Read { .. })));
    }
}
