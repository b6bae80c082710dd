use crate::error::ConvertError;
use crate::projection::{ExtentLimits, MapProjection};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Terrain patch to cut out of a global geotiff
#[derive(Debug, Clone)]
pub struct GeoPatchPlan {
    pub projection: MapProjection,
    pub limits: ExtentLimits,
    pub geotiff: PathBuf,
    pub output: PathBuf,
}

/// Pick the domain projection and the lon/lat window of the patch.
///
/// Domains containing a pole are rejected.
pub fn plan_geo_patch(
    lat: f64,
    lon: f64,
    extent_km: f64,
    geotiff: &Path,
    output: &Path,
) -> Result<GeoPatchPlan, ConvertError> {
    let projection = MapProjection::for_domain(lat, lon, extent_km)?;
    let pole_distance = projection.pole_distance_km()?;
    if pole_distance < 0.5 * extent_km {
        return Err(ConvertError::configuration(format!(
            "the domain contains a pole ({:.1} km from the center), which is not supported",
            pole_distance
        )));
    }

    Ok(GeoPatchPlan {
        limits: projection.extent_limits(extent_km)?,
        projection,
        geotiff: geotiff.to_path_buf(),
        output: output.to_path_buf(),
    })
}

impl GeoPatchPlan {
    /// `gdal_translate` arguments; values are unscaled since scaled geotiffs break the WPS converter
    pub fn gdal_args(&self) -> Vec<String> {
        let l = &self.limits;
        vec![
            "-unscale".to_string(),
            "-a_nodata".to_string(),
            "0.0".to_string(),
            "-projwin".to_string(),
            format!("{:.2}", l.lon_min),
            format!("{:.2}", l.lat_max),
            format!("{:.2}", l.lon_max),
            format!("{:.2}", l.lat_min),
            self.geotiff.display().to_string(),
            self.output.display().to_string(),
        ]
    }

    pub fn command_line(&self) -> String {
        format!("gdal_translate {}", self.gdal_args().join(" "))
    }

    /// Run `gdal_translate`
    pub fn execute(&self) -> Result<(), ConvertError> {
        info!(projection = %self.projection.proj4(), "extracting terrain patch");
        let status = Command::new("gdal_translate").args(self.gdal_args()).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ConvertError::source_data(format!(
                "gdal_translate failed with {}",
                status
            )))
        }
    }
}
