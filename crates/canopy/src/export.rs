//! Reprojects fitted polygons to (lon, lat) and writes the feature collection.

use crate::error::{ExportError, ProjectionError};
use crate::fit::Footprint;
use crate::geojson::{FeatureCollectionOut, FeatureOut};
use crate::projection::LocalFrame;
use geo::LineString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

fn ring_to_geo(ring: &LineString<f64>, frame: &LocalFrame) -> Result<Vec<[f64; 2]>, ProjectionError> {
    let mut out = Vec::with_capacity(ring.0.len() + 1);
    for c in &ring.0 {
        let (lon, lat) = frame.local_to_geo(c.x, c.y)?;
        out.push([lon, lat]);
    }
    if let (Some(&first), Some(&last)) = (out.first(), out.last()) {
        if first != last {
            out.push(first);
        }
    }
    Ok(out)
}

/// One feature per footprint. Only the exterior ring is written; holes
/// left by the alpha shape are filled.
pub fn to_feature(footprint: &Footprint, frame: &LocalFrame) -> Result<FeatureOut, ProjectionError> {
    let exterior = ring_to_geo(footprint.polygon.exterior(), frame)?;
    Ok(FeatureOut::polygon(vec![exterior], footprint.label))
}

pub fn to_collection(footprints: &[Footprint], frame: &LocalFrame) -> Result<FeatureCollectionOut, ProjectionError> {
    let features = footprints
        .iter()
        .map(|fp| to_feature(fp, frame))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FeatureCollectionOut::new(features))
}

/// Serialize `collection` next to `path` and rename it into place.
pub fn write_collection(path: &Path, collection: &FeatureCollectionOut) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let tmp = ptcache::temp_path_for(path);
    {
        let mut w = BufWriter::new(File::create(&tmp).map_err(io_err)?);
        serde_json::to_writer(&mut w, collection)?;
        w.flush().map_err(io_err)?;
    }
    std::fs::rename(&tmp, path).map_err(io_err)?;

    info!(output = %path.display(), features = collection.features.len(), "Wrote GeoJSON");
    Ok(())
}

/// Reproject and write every footprint; no filtering happens here.
pub fn export(path: &Path, footprints: &[Footprint], frame: &LocalFrame) -> Result<FeatureCollectionOut, ExportError> {
    let collection = to_collection(footprints, frame)?;
    write_collection(path, &collection)?;
    Ok(collection)
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

    fn square(label: i32, x0: f64) -> Footprint {
        Footprint {
            label,
            polygon: Polygon::new(
                LineString::from(vec![(x0, 0.0), (x0 + 1_000.0, 0.0), (x0 + 1_000.0, 1_000.0), (x0, 1_000.0)]),
                vec![],
            ),
        }
    }

    #[test]
    fn features_are_closed_and_geographic() {
        let frame = frame();
        let feature = to_feature(&square(4, 0.0), &frame).unwrap();

        assert_eq!(feature.properties.cluster, 4);
        let ring = &feature.geometry.coordinates[0];
        assert_eq!(ring.len(), 5);
        assert_eq!(ring.first(), ring.last());

        let (lon, lat) = frame.local_to_geo(0.0, 0.0).unwrap();
        assert_eq!(ring[0], [lon, lat]);
        assert!(ring.iter().all(|p| (-124.0..-123.0).contains(&p[0]) && (49.0..50.0).contains(&p[1])));
    }

    #[test]
    fn holes_are_not_exported() {
        let holed = Footprint {
            label: 2,
            polygon: Polygon::new(
                LineString::from(vec![(0.0, 0.0), (3_000.0, 0.0), (3_000.0, 3_000.0), (0.0, 3_000.0)]),
                vec![LineString::from(vec![
                    (1_000.0, 1_000.0),
                    (1_000.0, 2_000.0),
                    (2_000.0, 2_000.0),
                    (2_000.0, 1_000.0),
                ])],
            ),
        };

        let feature = to_feature(&holed, &frame()).unwrap();
        assert_eq!(feature.geometry.coordinates.len(), 1);
        assert_eq!(feature.geometry.coordinates[0].len(), 5);
    }

    #[test]
    fn writes_one_feature_per_footprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("map.geojson");

        let footprints = vec![square(0, 0.0), square(0, 5_000.0), square(1, 9_000.0)];
        export(&path, &footprints, &frame()).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        let features = value["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[2]["geometry"]["type"], "Polygon");
        assert_eq!(features[2]["properties"]["cluster"], 1);
        assert!(!ptcache::temp_path_for(&path).exists());
    }
}
