//! Optional area-of-interest filter.

use crate::error::BoundaryError;
use crate::geojson::Document;
use crate::points::PointSet;
use crate::projection::LocalFrame;
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use std::path::Path;
use tracing::{debug, info};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Keeps only the points that fall inside a geographic boundary polygon.
#[derive(Debug, Clone)]
pub struct BoundaryFilter {
    area: MultiPolygon<f64>,
}

impl BoundaryFilter {
    /// `area` is in (lon, lat) degrees.
    pub fn new(area: MultiPolygon<f64>) -> Self {
        Self { area }
    }

    /// Read the first polygon of a GeoJSON file.
    pub fn load(path: &Path) -> Result<Self, BoundaryError> {
        let text = std::fs::read_to_string(path).map_err(|source| BoundaryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let doc: Document = serde_json::from_str(&text).map_err(|source| BoundaryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let area = doc.first_polygon().ok_or_else(|| BoundaryError::NoPolygon {
            path: path.to_path_buf(),
        })?;

        info!(boundary = %path.display(), parts = area.0.len(), "Loaded boundary");
        Ok(Self::new(area))
    }

    /// Drop every point outside the boundary.
    ///
    /// Points are projected to (lon, lat), bulk-loaded into an R-tree and
    /// narrowed by each part's bounding box; a candidate is kept only if the
    /// exact containment test passes. Survivors are mapped back to local
    /// units with the forward projection and rounded, in input order.
    pub fn apply(&self, points: &PointSet, frame: &LocalFrame) -> Result<PointSet, BoundaryError> {
        debug!(points = points.len(), "Filtering points outside boundary");

        let mut geo_points = Vec::with_capacity(points.len());
        for (i, (x, y)) in points.iter().enumerate() {
            let (lon, lat) = frame.local_to_geo(x as f64, y as f64)?;
            geo_points.push(IndexedPoint::new([lon, lat], i));
        }

        let tree = RTree::bulk_load(geo_points);

        let mut keep: Vec<(usize, [f64; 2])> = Vec::new();
        for part in &self.area.0 {
            let Some(rect) = part.bounding_rect() else {
                continue;
            };
            let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

            for candidate in tree.locate_in_envelope(&envelope) {
                let [lon, lat] = *candidate.geom();
                if part.contains(&Point::new(lon, lat)) {
                    keep.push((candidate.data, [lon, lat]));
                }
            }
        }

        // Restore input order; a point may match more than one part.
        keep.sort_unstable_by_key(|(i, _)| *i);
        keep.dedup_by_key(|(i, _)| *i);

        let mut out = PointSet::with_capacity(keep.len());
        for (_, [lon, lat]) in keep {
            let (x, y) = frame.geo_to_local(lon, lat)?;
            out.push(x.round() as i32, y.round() as i32);
        }

        info!(before = points.len(), after = out.len(), "Boundary filter applied");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FrameConfig;
    use crate::frame::ReferenceFrame;
    use geo::{LineString, Polygon};
    use std::path::PathBuf;

    fn frame() -> LocalFrame {
        let reference = ReferenceFrame {
            min_east: 4810,
            min_north: 54560,
            corner: PathBuf::from("4810E_54560N.las"),
        };
        LocalFrame::new(&FrameConfig::default(), &reference).unwrap()
    }

    /// A geographic box covering local [x0, x1] x [y0, y1] (slightly inset).
    fn geo_box(frame: &LocalFrame, x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)];
        let ring: Vec<(f64, f64)> = corners
            .iter()
            .map(|&(x, y)| frame.local_to_geo(x, y).unwrap())
            .collect();
        MultiPolygon(vec![Polygon::new(LineString::from(ring), vec![])])
    }

    #[test]
    fn keeps_only_contained_points() {
        let frame = frame();
        let filter = BoundaryFilter::new(geo_box(&frame, 0.0, 0.0, 10_000.0, 10_000.0));

        let points: PointSet = [(5_000, 5_000), (20_000, 5_000), (1_000, 9_000), (5_000, -3_000)]
            .into_iter()
            .collect();

        let kept = filter.apply(&points, &frame).unwrap();
        assert_eq!(kept.len(), 2);

        // Back-projection lands within a centimetre of the original.
        for ((x, y), (ox, oy)) in kept.iter().zip([(5_000, 5_000), (1_000, 9_000)]) {
            assert!((x - ox).abs() <= 1 && (y - oy).abs() <= 1, "({x}, {y})");
        }
    }

    #[test]
    fn loads_boundary_from_geojson() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("campus.geojson");
        std::fs::write(
            &path,
            r#"{"type":"Feature","properties":{},"geometry":{"type":"Polygon",
               "coordinates":[[[-123.26,49.25],[-123.24,49.25],[-123.24,49.27],[-123.26,49.25]]]}}"#,
        )
        .unwrap();

        assert!(BoundaryFilter::load(&path).is_ok());

        std::fs::write(&path, r#"{"type":"Point","coordinates":[0,0]}"#).unwrap();
        assert!(matches!(
            BoundaryFilter::load(&path),
            Err(BoundaryError::NoPolygon { .. })
        ));

        assert!(matches!(
            BoundaryFilter::load(&dir.path().join("missing.geojson")),
            Err(BoundaryError::Read { .. })
        ));
    }
}
