//! Typed, validated run configuration.
//!
//! A [`Config`] is loaded once (TOML file plus command-line overrides),
//! validated, and then handed by value to every stage. Nothing mutates it
//! afterwards; the `with_*` helpers build a new validated instance instead.

use crate::error::ConfigError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the corner tile anchoring the local frame is chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum CornerPolicy {
    /// Adopt a tile only when it is `<=` the current best on both axes at
    /// once. Reproduces historical output frames.
    #[default]
    Conjunctive,
    /// Independent minimum east and minimum north.
    PerAxis,
}

/// Which cluster labels are turned into polygons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LabelRange {
    /// `0..max_label`: the highest label is skipped, matching historical output.
    #[default]
    Legacy,
    /// `0..=max_label`.
    All,
}

/// Whether tiles are clustered as one merged map or one at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterScope {
    #[default]
    Map,
    Tile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    pub tile_dir: PathBuf,
    /// File extension of tile files, without the dot.
    pub tile_ext: String,
    /// Effective surface-class code of the dataset (5 is high vegetation in
    /// the 2018 Vancouver tiles, where 4 and 5 are swapped).
    pub class_code: u8,
    /// Optional area-of-interest GeoJSON polygon.
    pub boundary: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tile_dir: PathBuf::from("data/2018"),
            tile_ext: "las".into(),
            class_code: 5,
            boundary: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    /// Grid index subtracted by the dataset's record offset on the east axis.
    pub east_offset: i64,
    pub north_offset: i64,
    /// Local units per grid index (10 000 cm = one 100 m grid step).
    pub tile_scale: i64,
    /// Local units per metre (100 = centimetres).
    pub units_per_meter: i64,
    pub utm_zone: u8,
    pub corner_policy: CornerPolicy,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            east_offset: 4_000,
            north_offset: 50_000,
            tile_scale: 10_000,
            units_per_meter: 100,
            utm_zone: 10,
            corner_policy: CornerPolicy::Conjunctive,
        }
    }
}

impl FrameConfig {
    /// Size of one grid index in metres.
    #[inline]
    pub fn grid_m(&self) -> f64 {
        self.tile_scale as f64 / self.units_per_meter as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownsizeConfig {
    /// Tiles with more matching points than this are randomly thinned.
    pub threshold: usize,
    pub divisor: usize,
    /// Seed for every random draw; `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for DownsizeConfig {
    fn default() -> Self {
        Self {
            threshold: 20_000,
            divisor: 100,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    /// Maximum neighbour distance, in local units.
    pub eps: f64,
    /// Neighbourhood size (including the point itself) for a core point.
    pub min_samples: usize,
    pub label_range: LabelRange,
    pub scope: ClusterScope,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: 300.0,
            min_samples: 10,
            label_range: LabelRange::Legacy,
            scope: ClusterScope::Map,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolygonConfig {
    /// Clusters with at most this many distinct points are dropped.
    pub min_size: usize,
    /// Area (local units squared) above which a shape is refined.
    pub min_area: f64,
    /// Area above which a shape is rejected as a runaway cluster.
    pub max_area: f64,
    /// Refinement sub-samples are reduced until at or below this size.
    pub reduction_threshold: usize,
    pub reduction_divisor: usize,
    /// Tightness of the initial fit; 0 is the convex hull.
    pub default_alpha: f64,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        Self {
            min_size: 20,
            min_area: (15.0_f64 * 100.0).powi(2),
            max_area: 100_000_000.0,
            reduction_threshold: 1_000,
            reduction_divisor: 10,
            default_alpha: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub path: PathBuf,
    /// Ignore any existing snapshot and rebuild it from the tiles.
    pub reload: bool,
    /// Caller-managed token; a snapshot with a different token is stale.
    pub generation: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("points.ptc"),
            reload: false,
            generation: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Optional Prometheus text dump of the run counters.
    pub metrics: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("map.geojson"),
            metrics: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub input: InputConfig,
    pub frame: FrameConfig,
    pub downsize: DownsizeConfig,
    pub cluster: ClusterConfig,
    pub polygon: PolygonConfig,
    pub cache: CacheConfig,
    pub output: OutputConfig,
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

impl Config {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text)?;
        cfg.validate()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Range-check every tunable, returning the config unchanged on success.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(1..=8).contains(&self.input.class_code) {
            return Err(invalid("input.class_code", "must be in 1..=8"));
        }
        if self.input.tile_ext.is_empty() || self.input.tile_ext.starts_with('.') {
            return Err(invalid("input.tile_ext", "expected an extension without the dot"));
        }

        let f = &self.frame;
        if f.tile_scale <= 0 {
            return Err(invalid("frame.tile_scale", "must be > 0"));
        }
        if f.units_per_meter <= 0 {
            return Err(invalid("frame.units_per_meter", "must be > 0"));
        }
        if !(1..=60).contains(&f.utm_zone) {
            return Err(invalid("frame.utm_zone", "must be in 1..=60"));
        }

        if self.downsize.divisor == 0 {
            return Err(invalid("downsize.divisor", "must be >= 1"));
        }

        let c = &self.cluster;
        if !c.eps.is_finite() || c.eps <= 0.0 {
            return Err(invalid("cluster.eps", format!("{} is not a positive distance", c.eps)));
        }
        if c.min_samples == 0 {
            return Err(invalid("cluster.min_samples", "must be >= 1"));
        }

        let p = &self.polygon;
        if !p.min_area.is_finite() || p.min_area < 0.0 {
            return Err(invalid("polygon.min_area", "must be finite and >= 0"));
        }
        if !p.max_area.is_finite() || p.max_area <= p.min_area {
            return Err(invalid("polygon.max_area", "must be finite and > polygon.min_area"));
        }
        if p.reduction_threshold < 3 {
            return Err(invalid("polygon.reduction_threshold", "must be >= 3"));
        }
        if p.reduction_divisor < 2 {
            return Err(invalid("polygon.reduction_divisor", "must be >= 2"));
        }
        if !p.default_alpha.is_finite() || p.default_alpha < 0.0 {
            return Err(invalid("polygon.default_alpha", "must be finite and >= 0"));
        }

        Ok(self)
    }

    pub fn with_cluster(&self, cluster: ClusterConfig) -> Result<Self, ConfigError> {
        Config {
            cluster,
            ..self.clone()
        }
        .validate()
    }

    pub fn with_polygon(&self, polygon: PolygonConfig) -> Result<Self, ConfigError> {
        Config {
            polygon,
            ..self.clone()
        }
        .validate()
    }

    pub fn with_cache(&self, cache: CacheConfig) -> Result<Self, ConfigError> {
        Config {
            cache,
            ..self.clone()
        }
        .validate()
    }
}
