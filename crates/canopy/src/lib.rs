//! Canopy: footprints of one surface class from classified LiDAR tiles.
//!
//! Stages, in run order:
//!   - `catalog`  : discover tiles and parse their grid offsets
//!   - `frame`    : pick the corner tile anchoring the local integer frame
//!   - `extract`  : class filter, downsizing and rescaling per tile
//!   - `boundary` : optional area-of-interest filter
//!   - `cache`    : snapshot of the merged points (`ptcache` format)
//!   - `cluster`  : DBSCAN labels and the label range to process
//!   - `fit`      : alpha-shape polygons with size and area gates
//!   - `export`   : UTM -> (lon, lat) and GeoJSON output
//!
//! [`pipeline::Pipeline`] wires them together.

pub mod alpha;
pub mod boundary;
pub mod cache;
pub mod cancel;
pub mod catalog;
pub mod cluster;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod fit;
pub mod frame;
pub mod geojson;
pub mod metrics;
pub mod pipeline;
pub mod points;
pub mod projection;
pub mod source;

pub use cancel::CancelToken;
pub use cluster::{Clusterer, Dbscan, NOISE};
pub use config::Config;
pub use error::PipelineError;
pub use pipeline::{Pipeline, RunReport};
pub use points::PointSet;
pub use source::{LasSource, MemorySource, PointSource, RawPoint};
