//! UTM <-> geographic conversion and the local-frame transforms built on it.

use crate::config::FrameConfig;
use crate::error::ProjectionError;
use crate::frame::ReferenceFrame;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

const WGS84_LONLAT: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// Northern-hemisphere UTM zone on WGS84.
pub struct UtmProjection {
    zone: u8,
    utm: Proj,
    lonlat: Proj,
}

impl UtmProjection {
    pub fn new(zone: u8) -> Result<Self, ProjectionError> {
        let definition = format!("+proj=utm +zone={zone} +datum=WGS84 +units=m +no_defs");
        let utm = Proj::from_proj_string(&definition).map_err(|e| ProjectionError::Definition {
            definition: definition.clone(),
            reason: format!("{e:?}"),
        })?;
        let lonlat = Proj::from_proj_string(WGS84_LONLAT).map_err(|e| ProjectionError::Definition {
            definition: WGS84_LONLAT.to_owned(),
            reason: format!("{e:?}"),
        })?;

        Ok(Self { zone, utm, lonlat })
    }

    #[inline]
    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// Easting/northing in metres to (lon, lat) in degrees.
    pub fn to_lon_lat(&self, easting: f64, northing: f64) -> Result<(f64, f64), ProjectionError> {
        let mut point = (easting, northing, 0.0);
        transform(&self.utm, &self.lonlat, &mut point).map_err(|e| ProjectionError::Transform {
            x: easting,
            y: northing,
            reason: format!("{e:?}"),
        })?;

        // proj4rs reports geographic coordinates in radians.
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }

    /// (lon, lat) in degrees to easting/northing in metres.
    pub fn to_utm(&self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.lonlat, &self.utm, &mut point).map_err(|e| ProjectionError::Transform {
            x: lon,
            y: lat,
            reason: format!("{e:?}"),
        })?;

        Ok((point.0, point.1))
    }
}

/// Maps local-frame units to geographic coordinates and back.
///
/// Local `(x, y)` is in `units_per_meter` units measured from the south-west
/// corner of the reference tile, i.e. UTM metres are
/// `x / units_per_meter + min_east * grid_m`.
pub struct LocalFrame {
    projection: UtmProjection,
    units_per_meter: f64,
    origin_e: f64,
    origin_n: f64,
}

impl LocalFrame {
    pub fn new(cfg: &FrameConfig, reference: &ReferenceFrame) -> Result<Self, ProjectionError> {
        let grid_m = cfg.grid_m();
        Ok(Self {
            projection: UtmProjection::new(cfg.utm_zone)?,
            units_per_meter: cfg.units_per_meter as f64,
            origin_e: reference.min_east as f64 * grid_m,
            origin_n: reference.min_north as f64 * grid_m,
        })
    }

    /// Local units to UTM metres.
    #[inline]
    pub fn local_to_utm(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x / self.units_per_meter + self.origin_e,
            y / self.units_per_meter + self.origin_n,
        )
    }

    /// UTM metres to (real-valued) local units.
    #[inline]
    pub fn utm_to_local(&self, easting: f64, northing: f64) -> (f64, f64) {
        (
            (easting - self.origin_e) * self.units_per_meter,
            (northing - self.origin_n) * self.units_per_meter,
        )
    }

    pub fn local_to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        let (e, n) = self.local_to_utm(x, y);
        self.projection.to_lon_lat(e, n)
    }

    pub fn geo_to_local(&self, lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
        let (e, n) = self.projection.to_utm(lon, lat)?;
        Ok(self.utm_to_local(e, n))
    }
}
