//! Minimal GeoJSON documents: polygon input for the boundary, feature
//! collection output for the footprints.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

type Ring = Vec<Vec<f64>>;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum Document {
    FeatureCollection { features: Vec<FeatureIn> },
    Feature(FeatureIn),
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct FeatureIn {
    pub geometry: Option<GeometryIn>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum GeometryIn {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

fn ring_to_line(ring: &Ring) -> LineString<f64> {
    ring.iter()
        .filter(|p| p.len() >= 2)
        .map(|p| Coord { x: p[0], y: p[1] })
        .collect::<Vec<_>>()
        .into()
}

fn rings_to_polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let (exterior, holes) = rings.split_first()?;
    let exterior = ring_to_line(exterior);
    if exterior.0.len() < 3 {
        return None;
    }
    Some(Polygon::new(exterior, holes.iter().map(ring_to_line).collect()))
}

impl GeometryIn {
    fn to_multi_polygon(&self) -> Option<MultiPolygon<f64>> {
        match self {
            GeometryIn::Polygon { coordinates } => {
                rings_to_polygon(coordinates).map(|p| MultiPolygon(vec![p]))
            }
            GeometryIn::MultiPolygon { coordinates } => {
                let polys: Vec<_> = coordinates.iter().filter_map(|r| rings_to_polygon(r)).collect();
                (!polys.is_empty()).then_some(MultiPolygon(polys))
            }
            GeometryIn::Other => None,
        }
    }
}

impl Document {
    /// The first polygonal geometry in the document, as (lon, lat) coordinates.
    pub fn first_polygon(&self) -> Option<MultiPolygon<f64>> {
        match self {
            Document::FeatureCollection { features } => features
                .iter()
                .filter_map(|f| f.geometry.as_ref())
                .find_map(GeometryIn::to_multi_polygon),
            Document::Feature(f) => f.geometry.as_ref().and_then(GeometryIn::to_multi_polygon),
            Document::Polygon { coordinates } => {
                rings_to_polygon(coordinates).map(|p| MultiPolygon(vec![p]))
            }
            Document::MultiPolygon { coordinates } => GeometryIn::MultiPolygon {
                coordinates: coordinates.clone(),
            }
            .to_multi_polygon(),
            Document::Other => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureCollectionOut {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<FeatureOut>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureOut {
    #[serde(rename = "type")]
    pub kind: String,
    pub geometry: PolygonOut,
    pub properties: PropertiesOut,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolygonOut {
    #[serde(rename = "type")]
    pub kind: String,
    /// Closed rings of `[lon, lat]`; canopy writes the exterior only.
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertiesOut {
    /// Label of the cluster the polygon was fitted to.
    pub cluster: i32,
}

impl FeatureCollectionOut {
    pub fn new(features: Vec<FeatureOut>) -> Self {
        Self {
            kind: "FeatureCollection".into(),
            features,
        }
    }
}

impl FeatureOut {
    pub fn polygon(rings: Vec<Vec<[f64; 2]>>, cluster: i32) -> Self {
        Self {
            kind: "Feature".into(),
            geometry: PolygonOut {
                kind: "Polygon".into(),
                coordinates: rings,
            },
            properties: PropertiesOut { cluster },
        }
    }
}
