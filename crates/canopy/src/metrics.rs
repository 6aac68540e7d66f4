use prometheus::{Encoder, IntCounter, Opts, Registry, TextEncoder};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Run counters, also exportable in Prometheus text format.
pub struct RunMetrics {
    pub registry: Registry,
    pub tiles_discovered_total: IntCounter,
    pub tiles_valid_total: IntCounter,
    pub tiles_skipped_total: IntCounter,
    pub points_total: IntCounter,
    pub clusters_total: IntCounter,
    pub clusters_rejected_total: IntCounter,
    pub polygons_emitted_total: IntCounter,
}

/// Plain snapshot of the counters, as reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub tiles_discovered: u64,
    pub tiles_valid: u64,
    pub tiles_skipped: u64,
    pub points: u64,
    pub clusters: u64,
    pub clusters_rejected: u64,
    pub polygons_emitted: u64,
}

impl RunMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("canopy".into()), None)?;

        macro_rules! reg {
            ($name:expr, $help:expr) => {{
                let counter = IntCounter::with_opts(Opts::new($name, $help))?;
                registry.register(Box::new(counter.clone()))?;
                counter
            }};
        }

        Ok(Self {
            tiles_discovered_total: reg!("tiles_discovered_total", "Tiles found in the tile directory"),
            tiles_valid_total: reg!("tiles_valid_total", "Tiles that contributed points"),
            tiles_skipped_total: reg!("tiles_skipped_total", "Tiles skipped after a recoverable error"),
            points_total: reg!("points_total", "Points handed to clustering"),
            clusters_total: reg!("clusters_total", "Clusters passed to the polygon fitter"),
            clusters_rejected_total: reg!("clusters_rejected_total", "Clusters that produced no polygon"),
            polygons_emitted_total: reg!("polygons_emitted_total", "Polygons written to the output"),
            registry,
        })
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            tiles_discovered: self.tiles_discovered_total.get(),
            tiles_valid: self.tiles_valid_total.get(),
            tiles_skipped: self.tiles_skipped_total.get(),
            points: self.points_total.get(),
            clusters: self.clusters_total.get(),
            clusters_rejected: self.clusters_rejected_total.get(),
            polygons_emitted: self.polygons_emitted_total.get(),
        }
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Write the text exposition to `path` via a temp file and rename.
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let text = self
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let tmp = ptcache::temp_path_for(path);
        {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;

        info!(metrics = %path.display(), "Wrote run metrics");
        Ok(())
    }

    pub fn log_summary(&self) {
        let s = self.summary();
        info!(
            tiles_discovered = s.tiles_discovered,
            tiles_valid = s.tiles_valid,
            tiles_skipped = s.tiles_skipped,
            points = s.points,
            clusters = s.clusters,
            clusters_rejected = s.clusters_rejected,
            polygons = s.polygons_emitted,
            "Run complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_namespaced_and_summarised() {
        let m = RunMetrics::new().unwrap();
        m.tiles_discovered_total.inc_by(3);
        m.tiles_valid_total.inc_by(2);
        m.polygons_emitted_total.inc();

        let s = m.summary();
        assert_eq!((s.tiles_discovered, s.tiles_valid, s.polygons_emitted), (3, 2, 1));

        let text = m.encode().unwrap();
        assert!(text.contains("canopy_tiles_discovered_total 3"));
        assert!(text.contains("canopy_polygons_emitted_total 1"));
    }

    #[test]
    fn text_dump_replaces_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.prom");
        std::fs::write(&path, "old").unwrap();

        RunMetrics::new().unwrap().write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("canopy_points_total 0"));
        assert!(!ptcache::temp_path_for(&path).exists());
    }
}
