//! Memoizes the merged point set between runs.
//!
//! The cache never decides on its own that a snapshot is out of date beyond
//! two explicit checks: the caller's generation token and the reference-frame
//! anchor it was built against. Forcing a rebuild is the caller's `reload`.

use crate::error::CacheError;
use crate::frame::ReferenceFrame;
use crate::points::PointSet;
use ptcache::PointSnapshot;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct PointCache {
    path: PathBuf,
    generation: u64,
    units_per_meter: u32,
}

impl PointCache {
    pub fn new(path: impl Into<PathBuf>, generation: u64, units_per_meter: u32) -> Self {
        Self {
            path: path.into(),
            generation,
            units_per_meter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the full merged array, replacing any previous snapshot.
    pub fn write(&self, points: &PointSet, frame: &ReferenceFrame) -> Result<(), CacheError> {
        let (xs, ys) = points.clone().into_parts();
        let snap = PointSnapshot {
            units_per_meter: self.units_per_meter,
            anchor: [frame.min_east, frame.min_north],
            generation: Some(self.generation),
            xs,
            ys,
        };

        ptcache::write_file(&self.path, &snap).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!(cache = %self.path.display(), points = points.len(), generation = self.generation, "Wrote point cache");
        Ok(())
    }

    /// Load a snapshot built for `frame` with this cache's generation.
    pub fn read(&self, frame: &ReferenceFrame) -> Result<PointSet, CacheError> {
        let snap = match ptcache::read_file(&self.path) {
            Ok(snap) => snap,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CacheError::CacheMiss {
                    path: self.path.clone(),
                })
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let stale = |reason: String| CacheError::Stale {
            path: self.path.clone(),
            reason,
        };

        if snap.generation != Some(self.generation) {
            return Err(stale(format!(
                "generation {:?}, expected {}",
                snap.generation, self.generation
            )));
        }
        if snap.anchor != [frame.min_east, frame.min_north] {
            return Err(stale(format!(
                "anchored at {:?}, frame is at [{}, {}]",
                snap.anchor, frame.min_east, frame.min_north
            )));
        }
        if snap.units_per_meter != self.units_per_meter {
            return Err(stale(format!(
                "{} units/m, expected {}",
                snap.units_per_meter, self.units_per_meter
            )));
        }

        let points = PointSet::from_parts(snap.xs, snap.ys).ok_or_else(|| CacheError::Io {
            path: self.path.clone(),
            source: std::io::Error::new(ErrorKind::InvalidData, "axis length mismatch"),
        })?;

        info!(cache = %self.path.display(), points = points.len(), "Loaded point cache");
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> ReferenceFrame {
        ReferenceFrame {
            min_east: 4810,
            min_north: 54560,
            corner: PathBuf::from("4810E_54560N.las"),
        }
    }

    fn points() -> PointSet {
        [(0, 0), (5, 0), (5_000, 5_000), (-40, 99_999)].into_iter().collect()
    }

    #[test]
    fn missing_file_is_a_cache_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PointCache::new(dir.path().join("points.ptc"), 0, 100);

        assert!(matches!(cache.read(&frame()), Err(CacheError::CacheMiss { .. })));
    }

    #[test]
    fn read_returns_exactly_what_was_written() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PointCache::new(dir.path().join("points.ptc"), 3, 100);

        cache.write(&points(), &frame()).unwrap();
        assert_eq!(cache.read(&frame()).unwrap(), points());
    }

    #[test]
    fn generation_and_anchor_mismatches_are_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.ptc");
        PointCache::new(&path, 1, 100).write(&points(), &frame()).unwrap();

        let newer = PointCache::new(&path, 2, 100);
        assert!(matches!(newer.read(&frame()), Err(CacheError::Stale { .. })));

        let moved = ReferenceFrame {
            min_east: 4800,
            ..frame()
        };
        let same = PointCache::new(&path, 1, 100);
        assert!(matches!(same.read(&moved), Err(CacheError::Stale { .. })));
    }
}
