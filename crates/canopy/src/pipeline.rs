//! End-to-end run: tiles -> merged points -> clusters -> polygons -> GeoJSON.

use crate::boundary::BoundaryFilter;
use crate::cache::PointCache;
use crate::cancel::CancelToken;
use crate::catalog::{collect_tiles, Tile};
use crate::cluster::{group_by_label, label_range, Clusterer};
use crate::config::{ClusterScope, Config};
use crate::error::{CacheError, ConfigError, ExportError, PipelineError};
use crate::export::export;
use crate::extract::TileExtractor;
use crate::fit::{FitOutcome, Footprint, PolygonFitter};
use crate::frame::ReferenceFrame;
use crate::metrics::{RunMetrics, RunSummary};
use crate::points::PointSet;
use crate::projection::LocalFrame;
use crate::source::PointSource;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub frame: ReferenceFrame,
    /// Discovered tiles with their `valid` flag; all false when the merged
    /// points came from the cache.
    pub tiles: Vec<Tile>,
    /// Emitted polygons in local units, in output order.
    pub polygons: Vec<Footprint>,
    pub summary: RunSummary,
    pub from_cache: bool,
}

/// Everything one stage needs besides the tiles themselves.
struct Stage<'a> {
    extractor: TileExtractor<'a>,
    boundary: Option<BoundaryFilter>,
    local: &'a LocalFrame,
    fitter: PolygonFitter,
    metrics: &'a RunMetrics,
    cancel: &'a CancelToken,
}

pub struct Pipeline<S, C> {
    config: Config,
    source: S,
    clusterer: C,
}

impl<S: PointSource, C: Clusterer> Pipeline<S, C> {
    pub fn new(config: Config, source: S, clusterer: C) -> Self {
        Self {
            config,
            source,
            clusterer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run(&self, cancel: &CancelToken) -> Result<RunReport, PipelineError> {
        let started = Instant::now();
        let cfg = &self.config;
        let metrics = RunMetrics::new()?;

        info!(
            tile_dir = %cfg.input.tile_dir.display(),
            class = cfg.input.class_code,
            scope = ?cfg.cluster.scope,
            "Starting run"
        );

        let mut tiles = collect_tiles(&cfg.input.tile_dir, &cfg.input.tile_ext)?;
        metrics.tiles_discovered_total.inc_by(tiles.len() as u64);

        let reference = ReferenceFrame::build(&tiles, cfg.frame.corner_policy)?;
        let local = LocalFrame::new(&cfg.frame, &reference)?;

        let boundary = cfg
            .input
            .boundary
            .as_deref()
            .map(BoundaryFilter::load)
            .transpose()?;

        let stage = Stage {
            extractor: TileExtractor::new(&cfg.frame, &reference, &cfg.downsize, cfg.input.class_code),
            boundary,
            local: &local,
            fitter: PolygonFitter::new(cfg.polygon.clone(), cfg.downsize.seed),
            metrics: &metrics,
            cancel,
        };
        let mut rng = match cfg.downsize.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let (polygons, from_cache) = match cfg.cluster.scope {
            ClusterScope::Map => {
                let (points, from_cache) = self.merged_points(&stage, &reference, &mut tiles, &mut rng)?;
                metrics.points_total.inc_by(points.len() as u64);
                (self.cluster_and_fit(&stage, &points)?, from_cache)
            }
            ClusterScope::Tile => (self.per_tile(&stage, &mut tiles, &mut rng)?, false),
        };
        drop(stage);

        metrics.polygons_emitted_total.inc_by(polygons.len() as u64);
        export(&cfg.output.path, &polygons, &local)?;

        if let Some(path) = &cfg.output.metrics {
            metrics.write_to(path).map_err(|source| ExportError::Io {
                path: path.clone(),
                source,
            })?;
        }

        metrics.log_summary();
        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Pipeline finished");

        Ok(RunReport {
            frame: reference,
            tiles,
            polygons,
            summary: metrics.summary(),
            from_cache,
        })
    }

    fn cache(&self) -> Result<PointCache, ConfigError> {
        let units = u32::try_from(self.config.frame.units_per_meter).map_err(|_| ConfigError::Invalid {
            field: "frame.units_per_meter",
            reason: "does not fit the cache header".into(),
        })?;
        Ok(PointCache::new(&self.config.cache.path, self.config.cache.generation, units))
    }

    /// Load or rebuild the merged (and boundary-filtered) point set.
    fn merged_points(
        &self,
        stage: &Stage<'_>,
        reference: &ReferenceFrame,
        tiles: &mut [Tile],
        rng: &mut StdRng,
    ) -> Result<(PointSet, bool), PipelineError> {
        let cache = self.cache()?;

        if self.config.cache.reload {
            info!(cache = %cache.path().display(), "Reload requested; rebuilding point cache");
        } else {
            match cache.read(reference) {
                Ok(points) => return Ok((points, true)),
                Err(CacheError::CacheMiss { .. }) => {
                    info!(cache = %cache.path().display(), "No point cache; building from tiles")
                }
                Err(e) => warn!(error = %e, "Ignoring unusable point cache"),
            }
        }

        let mut merged = PointSet::new();
        for tile in tiles.iter_mut() {
            if stage.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            if let Some(points) = self.load_tile(stage, tile, rng) {
                merged.extend_from(&points);
            }
        }

        let merged = match &stage.boundary {
            Some(filter) => filter.apply(&merged, stage.local)?,
            None => merged,
        };

        if let Err(e) = cache.write(&merged, reference) {
            warn!(cache = %cache.path().display(), error = %e, "Point cache not written; continuing");
        }
        Ok((merged, false))
    }

    /// Extract one tile, marking it valid; recoverable failures are logged
    /// and counted.
    fn load_tile(&self, stage: &Stage<'_>, tile: &mut Tile, rng: &mut StdRng) -> Option<PointSet> {
        match stage.extractor.load(&self.source, tile, rng) {
            Ok(points) => {
                tile.valid = true;
                stage.metrics.tiles_valid_total.inc();
                debug!(tile = %tile.path.display(), points = points.len(), "Tile extracted");
                Some(points)
            }
            Err(e) => {
                tile.valid = false;
                stage.metrics.tiles_skipped_total.inc();
                warn!(tile = %tile.path.display(), error = %e, "Skipping tile");
                None
            }
        }
    }

    /// Cluster and fit each tile on its own, concatenating the results.
    fn per_tile(&self, stage: &Stage<'_>, tiles: &mut [Tile], rng: &mut StdRng) -> Result<Vec<Footprint>, PipelineError> {
        let mut polygons = Vec::new();

        for tile in tiles.iter_mut() {
            if stage.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let Some(points) = self.load_tile(stage, tile, rng) else {
                continue;
            };

            let points = match &stage.boundary {
                Some(filter) => filter.apply(&points, stage.local)?,
                None => points,
            };
            stage.metrics.points_total.inc_by(points.len() as u64);

            let found = self.cluster_and_fit(stage, &points)?;
            info!(tile = %tile.path.display(), polygons = found.len(), "Tile processed");
            polygons.extend(found);
        }

        Ok(polygons)
    }

    fn cluster_and_fit(&self, stage: &Stage<'_>, points: &PointSet) -> Result<Vec<Footprint>, PipelineError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }

        let labels = self.clusterer.fit(points);
        let range = label_range(&labels, self.config.cluster.label_range);
        let clusters = group_by_label(points, &labels, range);
        stage.metrics.clusters_total.inc_by(clusters.len() as u64);

        let mut polygons = Vec::new();
        for (label, outcome) in stage.fitter.fit_all(&clusters, stage.cancel)? {
            match outcome {
                FitOutcome::Emitted { footprints, .. } => polygons.extend(footprints),
                FitOutcome::Rejected(reason) => {
                    stage.metrics.clusters_rejected_total.inc();
                    debug!(label, ?reason, "Cluster rejected");
                }
            }
        }

        Ok(polygons)
    }
}
