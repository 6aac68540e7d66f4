//! Per-tile extraction: class filter, density reduction and rescaling into
//! the shared local frame.

use crate::catalog::Tile;
use crate::config::{DownsizeConfig, FrameConfig};
use crate::error::TileError;
use crate::frame::ReferenceFrame;
use crate::points::PointSet;
use crate::source::{PointSource, RawPoint};
use rand::Rng;
use tracing::debug;

pub struct TileExtractor<'a> {
    frame_cfg: &'a FrameConfig,
    reference: &'a ReferenceFrame,
    downsize: &'a DownsizeConfig,
    class_code: u8,
}

impl<'a> TileExtractor<'a> {
    pub fn new(
        frame_cfg: &'a FrameConfig,
        reference: &'a ReferenceFrame,
        downsize: &'a DownsizeConfig,
        class_code: u8,
    ) -> Self {
        Self {
            frame_cfg,
            reference,
            downsize,
            class_code,
        }
    }

    /// Load `tile` through `source` and extract its local-frame points.
    pub fn load<S, R>(&self, source: &S, tile: &Tile, rng: &mut R) -> Result<PointSet, TileError>
    where
        S: PointSource + ?Sized,
        R: Rng + ?Sized,
    {
        debug!(tile = %tile.path.display(), "Loading tile");
        let raw = source.read(&tile.path)?;
        self.extract(tile, &raw, rng)
    }

    /// Filter, thin and rescale the raw points of one tile.
    ///
    /// The result is deterministic unless the matched count exceeds the
    /// downsizing threshold, in which case `count / divisor` points are drawn
    /// uniformly (without replacement) from `rng`.
    pub fn extract<R>(&self, tile: &Tile, raw: &[RawPoint], rng: &mut R) -> Result<PointSet, TileError>
    where
        R: Rng + ?Sized,
    {
        let matched: Vec<&RawPoint> = raw.iter().filter(|p| p.class == self.class_code).collect();

        if matched.is_empty() {
            return Err(TileError::NoPointsForClass {
                path: tile.path.clone(),
                class: self.class_code,
            });
        }

        let sample: Vec<&RawPoint> = if matched.len() > self.downsize.threshold {
            let amount = (matched.len() / self.downsize.divisor).clamp(1, matched.len());
            debug!(
                tile = %tile.path.display(),
                from = matched.len(),
                to = amount,
                "Downsizing tile"
            );
            rand::seq::index::sample(rng, matched.len(), amount)
                .into_iter()
                .map(|i| matched[i])
                .collect()
        } else {
            matched
        };

        let f = self.frame_cfg;
        let grid_m = f.grid_m();
        let upm = f.units_per_meter as f64;
        let scale = f.tile_scale as f64;

        // Record-space origin of this tile and its shift into the global frame.
        let tile_min_x = (tile.east - f.east_offset) as f64 * scale;
        let tile_min_y = (tile.north - f.north_offset) as f64 * scale;
        let shift_x = (tile.east - self.reference.min_east) as f64 * scale;
        let shift_y = (tile.north - self.reference.min_north) as f64 * scale;

        let mut out = PointSet::with_capacity(sample.len());

        for p in sample {
            // Dataset record units: centimetres past the record offset.
            let rec_x = (p.x - f.east_offset as f64 * grid_m) * upm;
            let rec_y = (p.y - f.north_offset as f64 * grid_m) * upm;

            let gx = (rec_x - tile_min_x + shift_x).round();
            let gy = (rec_y - tile_min_y + shift_y).round();

            let in_range = |v: f64| v.is_finite() && v >= i32::MIN as f64 && v <= i32::MAX as f64;
            if !in_range(gx) || !in_range(gy) {
                return Err(TileError::OutOfRange {
                    path: tile.path.clone(),
                });
            }

            out.push(gx as i32, gy as i32);
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::PathBuf;

    fn reference() -> ReferenceFrame {
        ReferenceFrame {
            min_east: 4810,
            min_north: 54560,
            corner: PathBuf::from("4810E_54560N.las"),
        }
    }

    fn point(x: f64, y: f64, class: u8) -> RawPoint {
        RawPoint { x, y, z: 12.0, class }
    }

    #[test]
    fn rescales_into_the_global_frame() {
        let frame_cfg = FrameConfig::default();
        let downsize = DownsizeConfig::default();
        let reference = reference();
        let extractor = TileExtractor::new(&frame_cfg, &reference, &downsize, 5);
        let mut rng = StdRng::seed_from_u64(1);

        let corner = Tile::new("4810E_54560N.las", 4810, 54560);
        let raw = vec![point(481_000.0, 5_456_000.0, 5), point(481_012.34, 5_456_500.5, 5)];
        let pts = extractor.extract(&corner, &raw, &mut rng).unwrap();
        assert_eq!(pts.iter().collect::<Vec<_>>(), vec![(0, 0), (1234, 50_050)]);

        // The neighbouring tile continues the plane without gaps or overlap.
        let next = Tile::new("4820E_54570N.las", 4820, 54570);
        let raw = vec![point(482_000.0, 5_457_000.0, 5)];
        let pts = extractor.extract(&next, &raw, &mut rng).unwrap();
        assert_eq!(pts.get(0), (100_000, 100_000));
    }

    #[test]
    fn filters_by_class_code() {
        let frame_cfg = FrameConfig::default();
        let downsize = DownsizeConfig::default();
        let reference = reference();
        let extractor = TileExtractor::new(&frame_cfg, &reference, &downsize, 5);
        let mut rng = StdRng::seed_from_u64(1);
        let tile = Tile::new("4810E_54560N.las", 4810, 54560);

        let raw = vec![point(481_001.0, 5_456_001.0, 4), point(481_002.0, 5_456_002.0, 5)];
        let pts = extractor.extract(&tile, &raw, &mut rng).unwrap();
        assert_eq!(pts.len(), 1);
        assert_eq!(pts.get(0), (200, 200));

        let raw = vec![point(481_001.0, 5_456_001.0, 2)];
        let err = extractor.extract(&tile, &raw, &mut rng).unwrap_err();
        assert!(matches!(err, TileError::NoPointsForClass { class: 5, .. }));
    }

    #[test]
    fn below_threshold_is_idempotent() {
        let frame_cfg = FrameConfig::default();
        let downsize = DownsizeConfig::default();
        let reference = reference();
        let extractor = TileExtractor::new(&frame_cfg, &reference, &downsize, 5);
        let tile = Tile::new("4810E_54560N.las", 4810, 54560);

        let raw: Vec<RawPoint> = (0..500)
            .map(|i| point(481_000.0 + i as f64 * 0.37, 5_456_000.0 + i as f64 * 1.1, 5))
            .collect();

        let mut source = MemorySource::new();
        source.insert(tile.path.clone(), raw);

        let a = extractor.load(&source, &tile, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = extractor.load(&source, &tile, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 500);
    }

    #[test]
    fn oversized_tiles_are_thinned_by_the_divisor() {
        let frame_cfg = FrameConfig::default();
        let downsize = DownsizeConfig {
            threshold: 100,
            divisor: 10,
            seed: None,
        };
        let reference = reference();
        let extractor = TileExtractor::new(&frame_cfg, &reference, &downsize, 5);
        let tile = Tile::new("4810E_54560N.las", 4810, 54560);

        let raw: Vec<RawPoint> = (0..1_000)
            .map(|i| point(481_000.0 + i as f64 * 0.5, 5_456_000.0, 5))
            .collect();

        let pts = extractor
            .extract(&tile, &raw, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(pts.len(), 100);

        // Sampling is without replacement.
        let mut xs = pts.xs().to_vec();
        xs.sort_unstable();
        xs.dedup();
        assert_eq!(xs.len(), 100);
    }
}
