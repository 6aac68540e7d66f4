//! Alpha shapes over a Delaunay triangulation.
//!
//! A triangle belongs to the shape when `alpha == 0` or its circumradius is
//! below `1 / alpha`; `alpha = 0` therefore yields the convex hull and larger
//! values carve the outline tighter around the points.

use crate::error::FitError;
use geo::{Area, Coord, Intersects, LineString, MultiPolygon, Point, Polygon};
use spade::{DelaunayTriangulation, Point2, Triangulation};
use std::collections::{BTreeMap, HashMap};

/// Result of a fit: one polygon or several disjoint parts.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Shape {
    pub fn area(&self) -> f64 {
        match self {
            Shape::Polygon(p) => p.unsigned_area(),
            Shape::MultiPolygon(mp) => mp.unsigned_area(),
        }
    }

    pub fn parts(&self) -> usize {
        match self {
            Shape::Polygon(_) => 1,
            Shape::MultiPolygon(mp) => mp.0.len(),
        }
    }

    pub fn into_polygons(self) -> Vec<Polygon<f64>> {
        match self {
            Shape::Polygon(p) => vec![p],
            Shape::MultiPolygon(mp) => mp.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Tri {
    /// Vertex indices in counter-clockwise order.
    v: [usize; 3],
    /// `1 / circumradius`; the alpha above which the triangle is dropped.
    inv_radius: f64,
}

#[derive(Debug, Clone)]
pub struct AlphaShaper {
    vertices: Vec<[f64; 2]>,
    /// Sorted by ascending `inv_radius` (largest circles first).
    triangles: Vec<Tri>,
}

#[inline]
fn signed_area2(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])
}

#[inline]
fn dist(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

impl AlphaShaper {
    /// Triangulate `points`. Duplicates are merged.
    pub fn new(points: &[[f64; 2]]) -> Result<Self, FitError> {
        if points.iter().any(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Err(FitError::Degenerate("non-finite coordinate".into()));
        }

        let mut unique: Vec<[f64; 2]> = points.to_vec();
        unique.sort_unstable_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
        unique.dedup();

        if unique.len() < 3 {
            return Err(FitError::Degenerate(format!(
                "{} distinct points cannot bound an area",
                unique.len()
            )));
        }

        let triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::bulk_load(
            unique.iter().map(|p| Point2::new(p[0], p[1])).collect(),
        )
        .map_err(|e| FitError::Degenerate(format!("triangulation failed: {e:?}")))?;

        let mut vertices = vec![[0.0; 2]; triangulation.num_vertices()];
        for v in triangulation.vertices() {
            let p = v.position();
            vertices[v.fix().index()] = [p.x, p.y];
        }

        let mut triangles = Vec::new();
        for face in triangulation.inner_faces() {
            let [a, b, c] = face.vertices().map(|v| v.fix().index());
            let (pa, pb, pc) = (vertices[a], vertices[b], vertices[c]);

            let area2 = signed_area2(pa, pb, pc);
            if area2 == 0.0 {
                continue;
            }
            let v = if area2 > 0.0 { [a, b, c] } else { [a, c, b] };

            // R = abc / (4 * area), area = |area2| / 2
            let radius = dist(pa, pb) * dist(pb, pc) * dist(pc, pa) / (2.0 * area2.abs());
            triangles.push(Tri {
                v,
                inv_radius: radius.recip(),
            });
        }

        if triangles.is_empty() {
            return Err(FitError::Degenerate("all points are collinear".into()));
        }

        triangles.sort_by(|a, b| a.inv_radius.total_cmp(&b.inv_radius));

        Ok(Self {
            vertices,
            triangles,
        })
    }

    /// Number of distinct input points.
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Index of the first triangle kept at `alpha`.
    fn first_kept(&self, alpha: f64) -> usize {
        if alpha <= 0.0 {
            return 0;
        }
        self.triangles.partition_point(|t| t.inv_radius <= alpha)
    }

    /// The alpha shape for a given tightness.
    pub fn shape(&self, alpha: f64) -> Result<Shape, FitError> {
        let kept = &self.triangles[self.first_kept(alpha)..];
        if kept.is_empty() {
            return Err(FitError::Degenerate(format!("alpha {alpha} removes every triangle")));
        }
        self.assemble(kept)
    }

    /// Largest alpha whose shape is still a single polygon touching every
    /// input point, together with that shape.
    pub fn optimize(&self) -> Result<(f64, Shape), FitError> {
        // Dropping the k largest-circle triangles corresponds to
        // alpha = inv_radius[k - 1]. k = 0 (convex hull) always qualifies.
        let alpha_for = |k: usize| if k == 0 { 0.0 } else { self.triangles[k - 1].inv_radius };

        let mut lo = 0usize;
        let mut hi = self.triangles.len();
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            let kept = &self.triangles[self.first_kept(alpha_for(mid))..];
            if self.is_single_covering(kept) {
                lo = mid;
            } else {
                hi = mid;
            }
        }

        let alpha = alpha_for(lo);
        Ok((alpha, self.shape(alpha)?))
    }

    fn is_single_covering(&self, kept: &[Tri]) -> bool {
        if kept.is_empty() {
            return false;
        }

        let mut touched = vec![false; self.vertices.len()];
        for t in kept {
            for &v in &t.v {
                touched[v] = true;
            }
        }
        if touched.iter().any(|&t| !t) {
            return false;
        }

        let exteriors = trace_rings(kept)
            .iter()
            .filter(|ring| self.ring_area2(ring) > 0.0)
            .count();
        exteriors == 1
    }

    fn ring_area2(&self, ring: &[usize]) -> f64 {
        let n = ring.len();
        (0..n)
            .map(|i| {
                let a = self.vertices[ring[i]];
                let b = self.vertices[ring[(i + 1) % n]];
                a[0] * b[1] - b[0] * a[1]
            })
            .sum()
    }

    fn ring_line(&self, ring: &[usize]) -> LineString<f64> {
        ring.iter()
            .map(|&i| Coord {
                x: self.vertices[i][0],
                y: self.vertices[i][1],
            })
            .collect::<Vec<_>>()
            .into()
    }

    fn assemble(&self, kept: &[Tri]) -> Result<Shape, FitError> {
        let mut exteriors: Vec<(f64, LineString<f64>)> = Vec::new();
        let mut holes: Vec<Vec<usize>> = Vec::new();

        for ring in trace_rings(kept) {
            let area2 = self.ring_area2(&ring);
            if area2 > 0.0 {
                exteriors.push((area2, self.ring_line(&ring)));
            } else if area2 < 0.0 {
                holes.push(ring);
            }
        }

        if exteriors.is_empty() {
            return Err(FitError::Degenerate("no exterior ring".into()));
        }

        // Largest part first keeps the output order stable.
        exteriors.sort_by(|a, b| b.0.total_cmp(&a.0));

        let shells: Vec<Polygon<f64>> = exteriors
            .iter()
            .map(|(_, line)| Polygon::new(line.clone(), vec![]))
            .collect();
        let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); shells.len()];

        for hole in holes {
            let probe = self.vertices[hole[0]];
            let probe = Point::new(probe[0], probe[1]);
            // Smallest enclosing shell; shells are sorted largest first.
            if let Some(owner) = shells.iter().rposition(|s| s.intersects(&probe)) {
                interiors[owner].push(self.ring_line(&hole));
            }
        }

        let mut polygons: Vec<Polygon<f64>> = exteriors
            .into_iter()
            .zip(interiors)
            .map(|((_, line), holes)| Polygon::new(line, holes))
            .collect();

        if polygons.len() == 1 {
            Ok(Shape::Polygon(polygons.remove(0)))
        } else {
            Ok(Shape::MultiPolygon(MultiPolygon(polygons)))
        }
    }
}

/// Chain the boundary edges of `kept` into closed vertex rings.
///
/// Boundary edges are those used by exactly one kept triangle; taking them in
/// each triangle's counter-clockwise order makes outer rings counter-clockwise
/// and holes clockwise.
fn trace_rings(kept: &[Tri]) -> Vec<Vec<usize>> {
    let mut edge_use: HashMap<(usize, usize), u32> = HashMap::with_capacity(kept.len() * 3);
    for t in kept {
        for i in 0..3 {
            let (a, b) = (t.v[i], t.v[(i + 1) % 3]);
            *edge_use.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }

    let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for t in kept {
        for i in 0..3 {
            let (a, b) = (t.v[i], t.v[(i + 1) % 3]);
            if edge_use[&(a.min(b), a.max(b))] == 1 {
                outgoing.entry(a).or_default().push(b);
            }
        }
    }

    let mut rings = Vec::new();
    while let Some((&start, _)) = outgoing.iter().next() {
        let mut ring = vec![start];
        let mut current = start;

        loop {
            let Some(next) = outgoing.get_mut(&current).and_then(Vec::pop) else {
                break;
            };
            if outgoing.get(&current).is_some_and(Vec::is_empty) {
                outgoing.remove(&current);
            }
            if next == start {
                break;
            }
            ring.push(next);
            current = next;
        }

        if ring.len() >= 3 {
            rings.push(ring);
        }
    }

    rings
}
