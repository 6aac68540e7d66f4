//! Per-cluster polygon fitting with size and area gates.

use crate::alpha::{AlphaShaper, Shape};
use crate::cancel::CancelToken;
use crate::config::PolygonConfig;
use crate::error::{FitError, PipelineError};
use crate::points::PointSet;
use geo::Polygon;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

/// One emitted polygon, in local units, with the label it was fitted to.
#[derive(Debug, Clone, PartialEq)]
pub struct Footprint {
    pub label: i32,
    pub polygon: Polygon<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// At most `min_size` distinct points.
    TooFewPoints,
    /// Initial shape larger than `max_area`.
    TooLarge,
    /// Triangulation or ring assembly failed.
    Degenerate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Emitted {
        footprints: Vec<Footprint>,
        /// Area of the initial fit, before any refinement.
        area: f64,
        refined: bool,
    },
    Rejected(Rejection),
}

impl FitOutcome {
    pub fn footprints(&self) -> &[Footprint] {
        match self {
            FitOutcome::Emitted { footprints, .. } => footprints,
            FitOutcome::Rejected(_) => &[],
        }
    }
}

pub struct PolygonFitter {
    cfg: PolygonConfig,
    seed: Option<u64>,
}

/// Sample size after repeatedly dividing `n` down to the threshold.
pub fn reduced_size(n: usize, threshold: usize, divisor: usize) -> usize {
    let mut size = n;
    while size > threshold {
        size /= divisor;
    }
    size
}

fn coords(points: &PointSet) -> Vec<[f64; 2]> {
    points.iter().map(|(x, y)| [x as f64, y as f64]).collect()
}

impl PolygonFitter {
    pub fn new(cfg: PolygonConfig, seed: Option<u64>) -> Self {
        Self { cfg, seed }
    }

    fn rng_for(&self, label: i32) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ (label as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)),
            None => StdRng::from_entropy(),
        }
    }

    /// Run one cluster through the gates and return what it produced.
    pub fn fit_cluster(&self, label: i32, points: &PointSet) -> FitOutcome {
        let distinct: HashSet<(i32, i32)> = points.iter().collect();
        if distinct.len() <= self.cfg.min_size {
            debug!(label, distinct = distinct.len(), "Cluster below size gate");
            return FitOutcome::Rejected(Rejection::TooFewPoints);
        }

        match self.fit_gated(label, points) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(label, error = %e, "Cluster fit failed");
                FitOutcome::Rejected(Rejection::Degenerate)
            }
        }
    }

    fn fit_gated(&self, label: i32, points: &PointSet) -> Result<FitOutcome, FitError> {
        let initial = AlphaShaper::new(&coords(points))?.shape(self.cfg.default_alpha)?;
        let area = initial.area();

        if area > self.cfg.max_area {
            debug!(label, area, "Cluster above max area");
            return Ok(FitOutcome::Rejected(Rejection::TooLarge));
        }

        let (shape, refined) = if area > self.cfg.min_area {
            (self.refine(label, points)?, true)
        } else {
            (initial, false)
        };

        let footprints = shape
            .into_polygons()
            .into_iter()
            .map(|polygon| Footprint { label, polygon })
            .collect();

        Ok(FitOutcome::Emitted {
            footprints,
            area,
            refined,
        })
    }

    /// Refit a random subsample with the tightest single-polygon alpha.
    fn refine(&self, label: i32, points: &PointSet) -> Result<Shape, FitError> {
        let size = reduced_size(points.len(), self.cfg.reduction_threshold, self.cfg.reduction_divisor);
        let mut rng = self.rng_for(label);

        let sample: Vec<[f64; 2]> = rand::seq::index::sample(&mut rng, points.len(), size)
            .into_iter()
            .map(|i| {
                let (x, y) = points.get(i);
                [x as f64, y as f64]
            })
            .collect();

        let (alpha, shape) = AlphaShaper::new(&sample)?.optimize()?;
        debug!(label, size, alpha, parts = shape.parts(), "Refined cluster");
        Ok(shape)
    }

    /// Fit every cluster in parallel. Clusters still queued when `cancel`
    /// fires are skipped and the whole call reports cancellation.
    pub fn fit_all(
        &self,
        clusters: &[(i32, PointSet)],
        cancel: &CancelToken,
    ) -> Result<Vec<(i32, FitOutcome)>, PipelineError> {
        let outcomes: Vec<Option<(i32, FitOutcome)>> = clusters
            .par_iter()
            .map(|(label, points)| {
                if cancel.is_cancelled() {
                    return None;
                }
                Some((*label, self.fit_cluster(*label, points)))
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(outcomes.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Points spread along the perimeter and interior of a `w` x `h` box.
    fn rect(w: i32, h: i32) -> PointSet {
        let mut pts = PointSet::new();
        for i in 0..=6 {
            for j in 0..=6 {
                pts.push(w * i / 6, h * j / 6);
            }
        }
        pts
    }

    fn fitter() -> PolygonFitter {
        PolygonFitter::new(PolygonConfig::default(), Some(7))
    }

    #[test]
    fn duplicates_do_not_pass_the_size_gate() {
        let same: PointSet = std::iter::repeat((10, 10)).take(20).collect();
        assert_eq!(
            fitter().fit_cluster(0, &same),
            FitOutcome::Rejected(Rejection::TooFewPoints)
        );

        let twenty: PointSet = (0..20).map(|i| (i * 100, (i % 5) * 300)).collect();
        assert_eq!(
            fitter().fit_cluster(0, &twenty),
            FitOutcome::Rejected(Rejection::TooFewPoints)
        );
    }

    #[test]
    fn twenty_one_distinct_points_pass_the_size_gate() {
        let pts: PointSet = (0..21).map(|i| (i * 10, (i % 3) * 10)).collect();
        assert!(matches!(fitter().fit_cluster(0, &pts), FitOutcome::Emitted { .. }));
    }

    #[test]
    fn small_shapes_are_emitted_without_refinement() {
        match fitter().fit_cluster(3, &rect(1_000, 1_000)) {
            FitOutcome::Emitted {
                footprints,
                area,
                refined,
            } => {
                assert!((area - 1_000_000.0).abs() < 1e-6);
                assert!(!refined);
                assert_eq!(footprints.len(), 1);
                assert_eq!(footprints[0].label, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn large_shapes_are_refined() {
        match fitter().fit_cluster(1, &rect(3_000, 1_000)) {
            FitOutcome::Emitted { area, refined, footprints } => {
                assert!((area - 3_000_000.0).abs() < 1e-6);
                assert!(refined);
                assert!(!footprints.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn runaway_shapes_are_rejected() {
        assert_eq!(
            fitter().fit_cluster(0, &rect(20_000, 10_000)),
            FitOutcome::Rejected(Rejection::TooLarge)
        );
    }

    #[test]
    fn collinear_clusters_fail_softly() {
        let line: PointSet = (0..40).map(|i| (i * 10, i * 10)).collect();
        assert_eq!(
            fitter().fit_cluster(0, &line),
            FitOutcome::Rejected(Rejection::Degenerate)
        );
    }

    #[test]
    fn reduction_divides_until_at_threshold() {
        assert_eq!(reduced_size(500, 1_000, 10), 500);
        assert_eq!(reduced_size(1_000, 1_000, 10), 1_000);
        assert_eq!(reduced_size(25_000, 1_000, 10), 250);
        assert_eq!(reduced_size(1_001, 1_000, 10), 100);
    }

    #[test]
    fn cancelled_batches_report_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let clusters = vec![(0, rect(1_000, 1_000))];
        assert!(matches!(
            fitter().fit_all(&clusters, &token),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn seeded_fits_are_reproducible() {
        let clusters: Vec<(i32, PointSet)> = (0..4).map(|l| (l, rect(3_000, 1_000))).collect();
        let a = fitter().fit_all(&clusters, &CancelToken::new()).unwrap();
        let b = fitter().fit_all(&clusters, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }
}
