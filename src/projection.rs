//! Map projections of WRF domains.
//!
//! [`MapProjection`] picks a low distortion projection for a domain center and
//! converts between lon/lat degrees and projected meters. [`WrfProjection`] turns the
//! map attributes of a WRF/WPS file into a PROJ.4 definition on the WRF sphere.

use crate::data_io::reader::FieldSource;
use crate::error::ConvertError;
use proj4rs::transform::transform;
use proj4rs::Proj;
use std::fmt;
use strum::Display;

/// Radius of the sphere WRF and WPS compute on (m)
pub const EARTH_RADIUS_M: f64 = 6_370_000.0;

const GEOGRAPHIC: &str = "+proj=longlat +ellps=WGS84";

/// Polar radius used to size Lambert true latitudes conservatively (km)
const POLAR_RADIUS_KM: f64 = 6357.0;

const MERCATOR_MAX_LAT: f64 = 30.0;
const LAMBERT_MAX_LAT: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProjectionKind {
    Mercator,
    Lambert,
    Polar,
}

/// Parameters of the projection chosen for a domain, in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    pub kind: ProjectionKind,
    pub ref_lat: f64,
    pub ref_lon: f64,
    pub truelat1: f64,
    pub truelat2: f64,
}

/// Forward and inverse projection between degrees and meters on the WGS84 ellipsoid
#[derive(Clone)]
pub struct MapProjection {
    params: ProjectionParams,
    definition: String,
    projected: Proj,
    geographic: Proj,
}

impl fmt::Debug for MapProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapProjection")
            .field("params", &self.params)
            .field("definition", &self.definition)
            .finish()
    }
}

impl MapProjection {
    /// Projection with the lowest distortion for a square domain of `extent_km` around the center.
    ///
    /// Mercator below 30° latitude, Lambert conformal below 60° with true latitudes a third
    /// of the latitudinal extent either side of the center, polar stereographic above.
    pub fn for_domain(center_lat: f64, center_lon: f64, extent_km: f64) -> Result<Self, ConvertError> {
        if !(-90.0..=90.0).contains(&center_lat) || !extent_km.is_finite() || extent_km <= 0.0 {
            return Err(ConvertError::configuration(format!(
                "invalid domain: lat {} extent {} km",
                center_lat, extent_km
            )));
        }

        let mut params = ProjectionParams {
            kind: ProjectionKind::Mercator,
            ref_lat: center_lat,
            ref_lon: center_lon,
            truelat1: center_lat,
            truelat2: center_lat,
        };

        if center_lat.abs() < MERCATOR_MAX_LAT {
            params.kind = ProjectionKind::Mercator;
        } else if center_lat.abs() < LAMBERT_MAX_LAT {
            params.kind = ProjectionKind::Lambert;
            let lat_extent = (extent_km / POLAR_RADIUS_KM).to_degrees();
            let ref_lat_dist = (lat_extent / 3.0 * 100.0).round() / 100.0;
            if center_lat > 0.0 {
                params.truelat1 = center_lat - ref_lat_dist;
                params.truelat2 = center_lat + ref_lat_dist;
            } else {
                params.truelat1 = center_lat + ref_lat_dist;
                params.truelat2 = center_lat - ref_lat_dist;
            }
        } else {
            params.kind = ProjectionKind::Polar;
        }

        Self::from_params(params)
    }

    pub fn from_params(params: ProjectionParams) -> Result<Self, ConvertError> {
        let definition = proj4(&params);
        Ok(Self {
            params,
            projected: Proj::from_proj_string(&definition)?,
            geographic: Proj::from_proj_string(GEOGRAPHIC)?,
            definition,
        })
    }

    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    /// PROJ.4 definition of this projection
    pub fn proj4(&self) -> &str {
        &self.definition
    }

    /// Degrees to meters
    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), ConvertError> {
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.geographic, &self.projected, &mut point)?;
        Ok((point.0, point.1))
    }

    /// Meters to degrees
    pub fn inverse(&self, x: f64, y: f64) -> Result<(f64, f64), ConvertError> {
        let mut point = (x, y, 0.0);
        transform(&self.projected, &self.geographic, &mut point)?;
        Ok((point.0.to_degrees(), point.1.to_degrees()))
    }

    /// Distance (km) in the projected plane between the center and the pole of its hemisphere.
    ///
    /// Infinite for Mercator, which maps the poles to infinity.
    pub fn pole_distance_km(&self) -> Result<f64, ConvertError> {
        let p = &self.params;
        if p.kind == ProjectionKind::Mercator {
            return Ok(f64::INFINITY);
        }
        let pole = if p.ref_lat > 0.0 { 90.0 } else { -90.0 };
        let (cx, cy) = self.forward(p.ref_lon, p.ref_lat)?;
        let (px, py) = self.forward(p.ref_lon, pole)?;
        Ok((cx - px).hypot(cy - py) / 1000.0)
    }

    /// Lon/lat bounding box of the 3×3 points spaced half an extent around the center
    pub fn extent_limits(&self, extent_km: f64) -> Result<ExtentLimits, ConvertError> {
        let p = &self.params;
        let (cx, cy) = self.forward(p.ref_lon, p.ref_lat)?;
        let offsets = [-0.5 * extent_km, 0.0, 0.5 * extent_km];

        let mut limits = ExtentLimits {
            lon_min: f64::INFINITY,
            lon_max: f64::NEG_INFINITY,
            lat_min: f64::INFINITY,
            lat_max: f64::NEG_INFINITY,
        };
        for dx in offsets {
            for dy in offsets {
                let (lon, lat) = self.inverse(cx + dx * 1000.0, cy + dy * 1000.0)?;
                limits.lon_min = limits.lon_min.min(lon);
                limits.lon_max = limits.lon_max.max(lon);
                limits.lat_min = limits.lat_min.min(lat);
                limits.lat_max = limits.lat_max.max(lat);
            }
        }
        Ok(limits)
    }
}

/// Mercator and polar stereographic keep the Greenwich central meridian
fn proj4(p: &ProjectionParams) -> String {
    match p.kind {
        ProjectionKind::Mercator => format!("+proj=merc +lat_ts={:.2} +ellps=WGS84", p.ref_lat),
        ProjectionKind::Lambert => format!(
            "+proj=lcc +lon_0={:.2} +lat_0={:.2} +lat_1={:.2} +lat_2={:.2} +ellps=WGS84",
            p.ref_lon, p.ref_lat, p.truelat1, p.truelat2
        ),
        ProjectionKind::Polar => format!(
            "+proj=stere +lat_0={} +lat_ts={:.2} +ellps=WGS84",
            if p.ref_lat > 0.0 { 90 } else { -90 },
            p.ref_lat
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtentLimits {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

/// Map projection of a WRF/WPS grid, from the `MAP_PROJ` family of global attributes
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WrfProjection {
    Lambert {
        truelat1: f64,
        truelat2: f64,
        moad_cen_lat: f64,
        stand_lon: f64,
    },
    PolarStereographic {
        truelat1: f64,
        stand_lon: f64,
    },
    Mercator {
        truelat1: f64,
        stand_lon: f64,
    },
    LatLon {
        stand_lon: f64,
    },
}

impl WrfProjection {
    /// `None` when the attributes are missing or `MAP_PROJ` is not supported
    pub fn from_source(source: &dyn FieldSource) -> Option<Self> {
        let map_proj = source.global_attribute("MAP_PROJ")?.round() as i64;
        let truelat1 = source.global_attribute("TRUELAT1").unwrap_or(0.0);
        let truelat2 = source.global_attribute("TRUELAT2").unwrap_or(truelat1);
        let stand_lon = source.global_attribute("STAND_LON").unwrap_or(0.0);
        let moad_cen_lat = source.global_attribute("MOAD_CEN_LAT").unwrap_or(0.0);

        match map_proj {
            1 => Some(WrfProjection::Lambert {
                truelat1,
                truelat2,
                moad_cen_lat,
                stand_lon,
            }),
            2 => Some(WrfProjection::PolarStereographic {
                truelat1,
                stand_lon,
            }),
            3 => Some(WrfProjection::Mercator {
                truelat1,
                stand_lon,
            }),
            6 => Some(WrfProjection::LatLon { stand_lon }),
            _ => None,
        }
    }

    pub fn proj4(&self) -> String {
        let r = EARTH_RADIUS_M;
        match *self {
            WrfProjection::Lambert {
                truelat1,
                truelat2,
                moad_cen_lat,
                stand_lon,
            } => format!(
                "+proj=lcc +units=meters +a={r} +b={r} +lat_1={truelat1} +lat_2={truelat2} +lat_0={moad_cen_lat} +lon_0={stand_lon} +nadgrids=@null"
            ),
            WrfProjection::PolarStereographic {
                truelat1,
                stand_lon,
            } => {
                let hemi = if truelat1 < 0.0 { -90 } else { 90 };
                format!(
                    "+proj=stere +units=meters +a={r} +b={r} +lat_0={hemi} +lon_0={stand_lon} +lat_ts={truelat1} +nadgrids=@null"
                )
            }
            WrfProjection::Mercator {
                truelat1,
                stand_lon,
            } => format!(
                "+proj=merc +units=meters +a={r} +b={r} +lon_0={stand_lon} +lat_ts={truelat1} +nadgrids=@null"
            ),
            WrfProjection::LatLon { stand_lon } => {
                format!("+proj=eqc +units=meters +a={r} +b={r} +lon_0={stand_lon} +nadgrids=@null")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_io::reader::MemorySource;

    fn assert_round_trip(projection: &MapProjection, lon: f64, lat: f64) {
        let (x, y) = projection.forward(lon, lat).unwrap();
        let (lon2, lat2) = projection.inverse(x, y).unwrap();
        assert!((lon - lon2).abs() < 1e-6, "lon {} vs {}", lon, lon2);
        assert!((lat - lat2).abs() < 1e-6, "lat {} vs {}", lat, lat2);
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 0.05, "{} vs {}", actual, expected);
    }

    #[test]
    fn test_projection_choice_by_latitude() {
        let tropics = MapProjection::for_domain(10.0, 100.0, 500.0).unwrap();
        assert_eq!(tropics.params().kind, ProjectionKind::Mercator);
        assert_eq!(tropics.proj4(), "+proj=merc +lat_ts=10.00 +ellps=WGS84");

        let alps = MapProjection::for_domain(46.5, 8.0, 600.0).unwrap();
        assert_eq!(alps.params().kind, ProjectionKind::Lambert);
        // 600 km on the polar radius spans about 5.41°, a third is 1.80°
        assert!((alps.params().truelat1 - 44.7).abs() < 1e-9);
        assert!((alps.params().truelat2 - 48.3).abs() < 1e-9);
        assert_eq!(
            alps.proj4(),
            "+proj=lcc +lon_0=8.00 +lat_0=46.50 +lat_1=44.70 +lat_2=48.30 +ellps=WGS84"
        );

        let south = MapProjection::for_domain(-46.5, 170.0, 600.0).unwrap();
        assert!(south.params().truelat1 > south.params().truelat2);

        let arctic = MapProjection::for_domain(75.0, 20.0, 300.0).unwrap();
        assert_eq!(arctic.params().kind, ProjectionKind::Polar);
        assert_eq!(arctic.proj4(), "+proj=stere +lat_0=90 +lat_ts=75.00 +ellps=WGS84");

        let antarctic = MapProjection::for_domain(-80.0, -60.0, 300.0).unwrap();
        assert!(antarctic.proj4().starts_with("+proj=stere +lat_0=-90 "));
    }

    #[test]
    fn test_invalid_domain() {
        assert!(matches!(
            MapProjection::for_domain(95.0, 0.0, 100.0),
            Err(ConvertError::Configuration(_))
        ));
        assert!(MapProjection::for_domain(45.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_forward_inverse_round_trip() {
        for (lat, lon) in [(10.0, 100.0), (46.5, 8.0), (-46.5, 170.0), (75.0, 20.0), (-80.0, -60.0)] {
            let projection = MapProjection::for_domain(lat, lon, 400.0).unwrap();
            assert_round_trip(&projection, lon + 1.5, lat - 1.0);
            assert_round_trip(&projection, lon, lat);
        }
    }

    #[test]
    fn test_extent_limits_surround_center() {
        let projection = MapProjection::for_domain(46.5, 8.0, 200.0).unwrap();
        let limits = projection.extent_limits(200.0).unwrap();
        assert!(limits.lon_min < 8.0 && limits.lon_max > 8.0);
        assert!(limits.lat_min < 46.5 && limits.lat_max > 46.5);
        // ±100 km is roughly ±0.9° of latitude
        assert!((limits.lat_max - limits.lat_min - 1.8).abs() < 0.1);
    }

    #[test]
    fn test_polar_limits_follow_greenwich_grid() {
        // The stereographic plane keeps lon_0 = 0, so a domain at 20°E sits rotated in it
        let projection = MapProjection::for_domain(70.0, 20.0, 600.0).unwrap();
        let limits = projection.extent_limits(600.0).unwrap();
        assert_close(limits.lon_min, 10.77);
        assert_close(limits.lon_max, 30.84);
        assert_close(limits.lat_min, 66.52);
        assert_close(limits.lat_max, 73.38);
    }

    #[test]
    fn test_pole_distance() {
        let projection = MapProjection::for_domain(85.0, 0.0, 1000.0).unwrap();
        let dist = projection.pole_distance_km().unwrap();
        assert!(dist < 0.5 * 1200.0 && dist > 500.0, "{}", dist);

        let tropics = MapProjection::for_domain(5.0, 0.0, 1000.0).unwrap();
        assert!(tropics.pole_distance_km().unwrap().is_infinite());
    }

    #[test]
    fn test_wrf_proj4_from_attributes() {
        let source = MemorySource::new("wrfout")
            .with_attribute("MAP_PROJ", 1.0)
            .with_attribute("TRUELAT1", 30.0)
            .with_attribute("TRUELAT2", 60.0)
            .with_attribute("STAND_LON", 8.5)
            .with_attribute("MOAD_CEN_LAT", 46.5);
        let proj = WrfProjection::from_source(&source).unwrap();
        assert_eq!(
            proj.proj4(),
            "+proj=lcc +units=meters +a=6370000 +b=6370000 +lat_1=30 +lat_2=60 +lat_0=46.5 +lon_0=8.5 +nadgrids=@null"
        );

        let unknown = MemorySource::new("geo").with_attribute("MAP_PROJ", 99.0);
        assert!(WrfProjection::from_source(&unknown).is_none());
        assert!(WrfProjection::from_source(&MemorySource::new("empty")).is_none());
    }
}
