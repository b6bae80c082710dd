use crate::data_io::reader::{FieldSource, NetCdfSource, ReaderError};
use crate::error::ConvertError;
use ndarray::Axis;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Map scale factor variables of a geogrid file, on every stagger
pub const MAPFAC_VARIABLES: [&str; 9] = [
    "MAPFAC_M", "MAPFAC_MX", "MAPFAC_MY", "MAPFAC_U", "MAPFAC_UX", "MAPFAC_UY", "MAPFAC_V",
    "MAPFAC_VX", "MAPFAC_VY",
];

/// Default tolerated deviation of the map factors from 1
pub const DEFAULT_LIMIT: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct MapfacReport {
    /// Largest deviation per geo_em file
    pub files: Vec<(PathBuf, f32)>,
    pub max_deviation: f32,
}

impl MapfacReport {
    pub fn passes(&self, limit: f32) -> bool {
        self.max_deviation < limit
    }
}

/// Largest `|mapfac - 1|` over all map factor variables at the first time
pub fn max_deviation(source: &dyn FieldSource) -> Result<f32, ReaderError> {
    let mut deviation = 0.0f32;
    for name in MAPFAC_VARIABLES {
        let (data, _) = source.raw_variable(name)?;
        // Time was kept because it is longer than one
        let data = if data.ndim() == 3 {
            data.index_axis_move(Axis(0), 0)
        } else {
            data
        };
        deviation = data.iter().fold(deviation, |acc, &v| acc.max((v - 1.0).abs()));
    }
    Ok(deviation)
}

/// Check every `geo_em.d*` file in `folder`
pub fn check_mapfac_folder(folder: &Path) -> Result<MapfacReport, ConvertError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains("geo_em.d"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(ConvertError::configuration(format!(
            "no geo_em files in {}",
            folder.display()
        )));
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let deviation = max_deviation(&NetCdfSource::open(&path)?)?;
        debug!(file = %path.display(), deviation, "checked map factors");
        files.push((path, deviation));
    }
    let max_deviation = files.iter().map(|(_, d)| *d).fold(0.0, f32::max);

    Ok(MapfacReport {
        files,
        max_deviation,
    })
}
