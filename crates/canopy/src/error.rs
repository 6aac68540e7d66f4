//! Error types for each stage of the pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum CatalogError {
    /// No tiles were found, so no reference frame can be derived.
    #[error("no tiles found to anchor the reference frame")]
    EmptyCatalog,

    #[error("tile name {name:?} does not contain exactly two grid integers")]
    BadTileName { name: String },
}

#[derive(Debug, Error)]
pub enum TileError {
    #[error("{path}: no points with class code {class}")]
    NoPointsForClass { path: PathBuf, class: u8 },

    #[error("{path}: failed to read tile: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{path}: point falls outside the i32 local frame")]
    OutOfRange { path: PathBuf },
}

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("invalid projection definition {definition:?}: {reason}")]
    Definition { definition: String, reason: String },

    #[error("projection of ({x}, {y}) failed: {reason}")]
    Transform { x: f64, y: f64, reason: String },
}

#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("failed to read boundary file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse boundary file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("boundary file {path} holds no polygon geometry")]
    NoPolygon { path: PathBuf },

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no point cache at {path}")]
    CacheMiss { path: PathBuf },

    #[error("point cache at {path} is stale: {reason}")]
    Stale { path: PathBuf, reason: String },

    #[error("point cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum FitError {
    #[error("degenerate geometry: {0}")]
    Degenerate(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode GeoJSON: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// Fatal failures that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("run cancelled")]
    Cancelled,
}
