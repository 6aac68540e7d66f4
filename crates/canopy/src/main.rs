use anyhow::{Context, Result};
use canopy::config::{CacheConfig, ClusterConfig, ClusterScope, Config, LabelRange};
use canopy::{CancelToken, Dbscan, LasSource, Pipeline, PipelineError, RunReport};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, EnvFilter};

/// `canopy` - turns classified LiDAR tiles into GeoJSON footprints.
///
/// Reads every tile under the tile directory, merges the points of one
/// surface class into a shared local frame, clusters them and writes one
/// polygon per cluster part.
#[derive(Parser, Debug)]
#[command(name = "canopy", version, about, long_about = None)]
struct Args {
    /// TOML configuration file; every key is optional.
    #[arg(long, env = "CANOPY_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the survey tiles.
    #[arg(long, env = "CANOPY_TILE_DIR")]
    tile_dir: Option<PathBuf>,

    /// GeoJSON output path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Area-of-interest polygon (GeoJSON).
    #[arg(long)]
    boundary: Option<PathBuf>,

    /// Rebuild the point cache from the tiles.
    #[arg(long, default_value_t = false)]
    reload: bool,

    #[arg(long)]
    eps: Option<f64>,

    #[arg(long)]
    min_samples: Option<usize>,

    #[arg(long, value_enum)]
    label_range: Option<LabelRange>,

    #[arg(long, value_enum)]
    scope: Option<ClusterScope>,

    /// Emit logs as JSON lines.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(dir) = &args.tile_dir {
        cfg.input.tile_dir = dir.clone();
    }
    if let Some(path) = &args.output {
        cfg.output.path = path.clone();
    }
    if let Some(path) = &args.boundary {
        cfg.input.boundary = Some(path.clone());
    }

    let cfg = cfg.with_cluster(ClusterConfig {
        eps: args.eps.unwrap_or(cfg.cluster.eps),
        min_samples: args.min_samples.unwrap_or(cfg.cluster.min_samples),
        label_range: args.label_range.unwrap_or(cfg.cluster.label_range),
        scope: args.scope.unwrap_or(cfg.cluster.scope),
    })?;

    let cfg = cfg.with_cache(CacheConfig {
        reload: args.reload || cfg.cache.reload,
        ..cfg.cache.clone()
    })?;

    Ok(cfg)
}

/// End-of-run line; tile validity is unknown when points came from the cache.
fn summary_line(report: &RunReport, output: &Path) -> String {
    let s = report.summary;
    let valid = if report.from_cache {
        "n/a (points from cache)".to_owned()
    } else {
        s.tiles_valid.to_string()
    };
    format!(
        "tiles discovered: {}  valid: {}  polygons: {}  -> {}",
        s.tiles_discovered,
        valid,
        s.polygons_emitted,
        output.display()
    )
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let cfg = load_config(&args)?;
    tracing::info!(config = ?cfg, "Configuration loaded");

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || {
            tracing::warn!("Interrupt received; stopping after the current tile or cluster");
            cancel.cancel();
        })
        .context("installing Ctrl-C handler")?;
    }

    let clusterer = Dbscan::new(cfg.cluster.eps, cfg.cluster.min_samples);
    let output = cfg.output.path.clone();
    let pipeline = Pipeline::new(cfg, LasSource, clusterer);

    let report = match pipeline.run(&cancel) {
        Ok(report) => report,
        Err(PipelineError::Cancelled) => {
            tracing::warn!("Run cancelled; output not written");
            std::process::exit(130);
        }
        Err(e) => return Err(e).context("pipeline failed"),
    };

    println!("{}", summary_line(&report, &output));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy::frame::ReferenceFrame;
    use canopy::metrics::RunSummary;

    fn report(from_cache: bool, tiles_valid: u64) -> RunReport {
        RunReport {
            frame: ReferenceFrame {
                min_east: 4810,
                min_north: 54560,
                corner: PathBuf::from("4810E_54560N.las"),
            },
            tiles: Vec::new(),
            polygons: Vec::new(),
            summary: RunSummary {
                tiles_discovered: 3,
                tiles_valid,
                polygons_emitted: 1,
                ..Default::default()
            },
            from_cache,
        }
    }

    #[test]
    fn cached_runs_do_not_report_zero_valid_tiles() {
        let line = summary_line(&report(true, 0), Path::new("map.geojson"));
        assert!(line.contains("valid: n/a (points from cache)"), "{line}");
        assert!(!line.contains("valid: 0"));
    }

    #[test]
    fn fresh_runs_report_the_valid_count() {
        let line = summary_line(&report(false, 2), Path::new("map.geojson"));
        assert_eq!(line, "tiles discovered: 3  valid: 2  polygons: 1  -> map.geojson");
    }
}
