//! Density-based clustering of the merged point set.

use crate::config::LabelRange;
use crate::points::PointSet;
use rayon::prelude::*;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use std::ops::Range;
use tracing::info;

/// Label for low-density points; never turned into a polygon.
pub const NOISE: i32 = -1;

/// Assigns one label per point; `NOISE` for unclustered points.
pub trait Clusterer: Send + Sync {
    fn fit(&self, points: &PointSet) -> Vec<i32>;
}

/// DBSCAN over an R-tree.
///
/// A point is *core* when at least `min_samples` points (itself included)
/// lie within `eps`. Core points within `eps` of each other chain into one
/// cluster; non-core points within `eps` of a core point join the first
/// cluster that reaches them.
#[derive(Debug, Clone, Copy)]
pub struct Dbscan {
    pub eps: f64,
    pub min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }
}

type Indexed = GeomWithData<[f64; 2], usize>;

impl Clusterer for Dbscan {
    fn fit(&self, points: &PointSet) -> Vec<i32> {
        let n = points.len();
        if n == 0 {
            return Vec::new();
        }

        let coords: Vec<[f64; 2]> = points.iter().map(|(x, y)| [x as f64, y as f64]).collect();
        let tree = RTree::bulk_load(
            coords
                .iter()
                .enumerate()
                .map(|(i, &c)| Indexed::new(c, i))
                .collect(),
        );
        let eps2 = self.eps * self.eps;

        // Neighbourhood sizes are independent per point.
        let is_core: Vec<bool> = coords
            .par_iter()
            .map(|&c| tree.locate_within_distance(c, eps2).take(self.min_samples).count() >= self.min_samples)
            .collect();

        let (labels, _) = expand(&tree, &coords, &is_core, eps2);
        let clusters = labels.iter().copied().max().map_or(0, |m| m + 1);

        info!(points = n, clusters, eps = self.eps, min_samples = self.min_samples, "Clustering finished");
        labels
    }
}

/// Chain core points into clusters, in order of the first core point by index.
///
/// A point is labelled when it is queued, so each index enters the stack at
/// most once. Returns the labels and the peak stack length.
fn expand(tree: &RTree<Indexed>, coords: &[[f64; 2]], is_core: &[bool], eps2: f64) -> (Vec<i32>, usize) {
    let mut labels = vec![NOISE; coords.len()];
    let mut next_label = 0i32;
    let mut stack = Vec::new();
    let mut peak = 0;

    for seed in 0..coords.len() {
        if labels[seed] != NOISE || !is_core[seed] {
            continue;
        }

        labels[seed] = next_label;
        stack.push(seed);
        while let Some(p) = stack.pop() {
            if !is_core[p] {
                continue;
            }
            for neighbour in tree.locate_within_distance(coords[p], eps2) {
                if labels[neighbour.data] == NOISE {
                    labels[neighbour.data] = next_label;
                    stack.push(neighbour.data);
                }
            }
            peak = peak.max(stack.len());
        }

        next_label += 1;
    }

    (labels, peak)
}

/// Labels to turn into polygons.
///
/// [`LabelRange::Legacy`] yields `0..max_label`, leaving out the highest
/// label as historical runs did; [`LabelRange::All`] yields `0..=max_label`.
pub fn label_range(labels: &[i32], range: LabelRange) -> Range<i32> {
    let max = labels.iter().copied().max().unwrap_or(NOISE);
    if max < 0 {
        return 0..0;
    }
    match range {
        LabelRange::Legacy => 0..max,
        LabelRange::All => 0..max + 1,
    }
}

/// Split `points` into one set per label in `range`, in label order.
pub fn group_by_label(points: &PointSet, labels: &[i32], range: Range<i32>) -> Vec<(i32, PointSet)> {
    let mut groups: Vec<PointSet> = range.clone().map(|_| PointSet::new()).collect();

    for ((x, y), &label) in points.iter().zip(labels) {
        if range.contains(&label) {
            groups[(label - range.start) as usize].push(x, y);
        }
    }

    range.zip(groups).collect()
}
