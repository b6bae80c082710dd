use crate::config::StorageOptions;
use crate::fields::StorageType;
use crate::math::CLOUD_THRESHOLDS;
use chrono::Utc;
use ndarray::ArrayD;
use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use strum::{AsRefStr, Display};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Grid mismatch between subgroups: {0}")]
    GridMismatch(String),

    #[error("Group not found: {0}")]
    MissingGroup(String),

    #[error("Unknown dimension {dimension} for variable {variable}")]
    MissingDimension { dimension: String, variable: String },

    #[error("Variable not defined: {0}")]
    MissingVariable(String),

    #[error("Shape of {variable}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        variable: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("Archive already closed")]
    Closed,
}

/// Subgroup of the case group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Subgroup {
    /// Aggregated WRF output, one row per sub-window
    Wrf,
    /// Hourly reference fields from met_em files
    Era5,
}

/// Dimensions of a subgroup besides the unlimited `time`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubgroupLayout {
    pub lat: usize,
    pub lon: usize,
    pub z: usize,
    pub extra: Vec<(&'static str, usize)>,
}

/// Everything needed to create one archive variable
#[derive(Debug, Clone)]
pub struct VariableDef {
    pub name: String,
    pub dims: Vec<&'static str>,
    pub storage: StorageType,
    pub units: String,
    pub long_name: String,
    pub projection: Option<String>,
}

#[derive(Debug, Clone)]
struct VariableInfo {
    storage: StorageType,
    /// Dimension lengths without `time`
    shape: Vec<usize>,
    has_time: bool,
}

/// Streaming writer of the hierarchical conversion archive.
///
/// The archive is built at `<output>.partial` and renamed to the final path by
/// [`ArchiveWriter::close`]. Dropping an unclosed writer deletes the staging file.
pub struct ArchiveWriter {
    file: Option<netcdf::FileMut>,
    staging: PathBuf,
    target: PathBuf,
    case: String,
    deflate_level: Option<i32>,
    dims: HashMap<(Subgroup, String), usize>,
    variables: HashMap<(Subgroup, String), VariableInfo>,
    rows: HashMap<Subgroup, usize>,
}

impl ArchiveWriter {
    pub fn create(path: impl AsRef<Path>, case: &str, storage: &StorageOptions) -> Result<Self, WriteError> {
        let target = path.as_ref().to_path_buf();
        let staging = staging_path(&target);
        info!(file = %target.display(), case, "creating archive");

        let mut file = netcdf::create(&staging)?;
        file.add_attribute("title", "Aggregated WRF output")?;
        file.add_attribute("source", format!("wrfconv {}", env!("CARGO_PKG_VERSION")))?;
        let creation_time = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        file.add_attribute("history", format!("Created on {}", creation_time))?;

        {
            let mut group = file.add_group(case)?;
            group.add_dimension("str_dim", 1)?;
        }

        Ok(Self {
            file: Some(file),
            staging,
            target,
            case: case.to_string(),
            deflate_level: storage.deflate_level,
            dims: HashMap::new(),
            variables: HashMap::new(),
            rows: HashMap::new(),
        })
    }

    fn group_path(&self, sub: Subgroup) -> String {
        format!("{}/{}", self.case, sub.as_ref())
    }

    fn group_mut(&mut self, path: &str) -> Result<netcdf::GroupMut<'_>, WriteError> {
        let file = self.file.as_mut().ok_or(WriteError::Closed)?;
        file.group_mut(path)?
            .ok_or_else(|| WriteError::MissingGroup(path.to_string()))
    }

    /// Create a subgroup with its dimensions and `time` variable.
    ///
    /// The horizontal extent must agree with every subgroup created before.
    pub fn add_subgroup(&mut self, sub: Subgroup, layout: &SubgroupLayout) -> Result<(), WriteError> {
        for (&(other, ref name), &len) in &self.dims {
            let expected = match name.as_str() {
                "lat" => layout.lat,
                "lon" => layout.lon,
                _ => continue,
            };
            if other != sub && len != expected {
                return Err(WriteError::GridMismatch(format!(
                    "{} size of {} is {} but {} has {}",
                    name, sub, expected, other, len
                )));
            }
        }

        debug!(group = %sub, ?layout, "adding subgroup");
        let case = self.case.clone();
        {
            let mut case_group = self.group_mut(&case)?;
            let mut group = case_group.add_group(sub.as_ref())?;
            group.add_dimension("lat", layout.lat)?;
            group.add_dimension("lon", layout.lon)?;
            group.add_dimension("z", layout.z)?;
            for &(name, len) in &layout.extra {
                group.add_dimension(name, len)?;
            }
            group.add_unlimited_dimension("time")?;

            let mut time = group.add_variable::<u64>("time", &["time"])?;
            time.put_attribute("units", "s")?;
            time.put_attribute("long_name", "UTC time")?;
        }

        let mut sizes = vec![("lat", layout.lat), ("lon", layout.lon), ("z", layout.z)];
        sizes.extend(layout.extra.iter().copied());
        for (name, len) in sizes {
            self.dims.insert((sub, name.to_string()), len);
        }
        self.rows.insert(sub, 0);
        Ok(())
    }

    /// Length of a subgroup dimension
    pub fn dimension_len(&self, sub: Subgroup, name: &str) -> Option<usize> {
        self.dims.get(&(sub, name.to_string())).copied()
    }

    /// Chunk shape for a variable: `wrf` keeps whole horizontal slices, `era5` uses
    /// 9 points per axis. The time axis always gets 1.
    fn chunking(&self, sub: Subgroup, dims: &[&str], shape: &[usize]) -> Vec<usize> {
        let mut lens = shape.iter();
        dims.iter()
            .map(|&dim| {
                if dim == "time" {
                    return 1;
                }
                let len = lens.next().copied().unwrap_or(1).max(1);
                match sub {
                    Subgroup::Wrf if dim == "lat" || dim == "lon" => len,
                    Subgroup::Wrf => 1,
                    Subgroup::Era5 => len.min(9),
                }
            })
            .collect()
    }

    pub fn define_variable(&mut self, sub: Subgroup, def: &VariableDef) -> Result<(), WriteError> {
        let mut shape = Vec::with_capacity(def.dims.len());
        for &dim in def.dims.iter().filter(|&&d| d != "time") {
            let len = self
                .dimension_len(sub, dim)
                .ok_or_else(|| WriteError::MissingDimension {
                    dimension: dim.to_string(),
                    variable: def.name.clone(),
                })?;
            shape.push(len);
        }
        let chunks = self.chunking(sub, &def.dims, &shape);
        let deflate_level = self.deflate_level;
        let path = self.group_path(sub);

        {
            let mut group = self.group_mut(&path)?;
            let mut var = match def.storage {
                StorageType::F32 => group.add_variable::<f32>(&def.name, &def.dims)?,
                StorageType::U8 => group.add_variable::<u8>(&def.name, &def.dims)?,
            };
            var.set_chunking(&chunks)?;
            if let Some(level) = deflate_level {
                var.set_compression(level, true)?;
            }
            var.put_attribute("units", def.units.as_str())?;
            var.put_attribute("long_name", def.long_name.as_str())?;
            if let Some(projection) = &def.projection {
                var.put_attribute("projection", projection.as_str())?;
            }
        }

        debug!(group = %sub, variable = %def.name, ?chunks, "defined variable");
        self.variables.insert(
            (sub, def.name.clone()),
            VariableInfo {
                storage: def.storage,
                shape,
                has_time: def.dims.contains(&"time"),
            },
        );
        Ok(())
    }

    fn checked_info(&self, sub: Subgroup, name: &str, data: &ArrayD<f32>) -> Result<VariableInfo, WriteError> {
        let info = self
            .variables
            .get(&(sub, name.to_string()))
            .cloned()
            .ok_or_else(|| WriteError::MissingVariable(format!("{}/{}", sub, name)))?;
        if info.shape != data.shape() {
            return Err(WriteError::ShapeMismatch {
                variable: format!("{}/{}", sub, name),
                expected: info.shape,
                found: data.shape().to_vec(),
            });
        }
        Ok(info)
    }

    fn put(&mut self, sub: Subgroup, name: &str, info: &VariableInfo, data: &ArrayD<f32>, extents: Vec<Range<usize>>) -> Result<(), WriteError> {
        let path = self.group_path(sub);
        let mut group = self.group_mut(&path)?;
        let mut var = group
            .variable_mut(name)
            .ok_or_else(|| WriteError::MissingVariable(format!("{}/{}", sub, name)))?;

        match info.storage {
            StorageType::F32 => {
                let values: Vec<f32> = data.iter().copied().collect();
                var.put_values(&values, extents)?;
            }
            StorageType::U8 => {
                let values: Vec<u8> = data.iter().map(|&v| to_u8(v)).collect();
                var.put_values(&values, extents)?;
            }
        }
        Ok(())
    }

    /// Write a whole time invariant variable
    pub fn write_static(&mut self, sub: Subgroup, name: &str, data: &ArrayD<f32>) -> Result<(), WriteError> {
        let info = self.checked_info(sub, name, data)?;
        let extents = info.shape.iter().map(|&n| 0..n).collect();
        self.put(sub, name, &info, data, extents)
    }

    /// Write one time slice of a dynamic variable at the current row of the subgroup
    pub fn append(&mut self, sub: Subgroup, name: &str, data: &ArrayD<f32>) -> Result<(), WriteError> {
        let info = self.checked_info(sub, name, data)?;
        if !info.has_time {
            return self.write_static(sub, name, data);
        }
        let row = self.current_row(sub);
        let extents = std::iter::once(row..row + 1)
            .chain(info.shape.iter().map(|&n| 0..n))
            .collect();
        self.put(sub, name, &info, data, extents)
    }

    /// Rows written to a subgroup so far
    pub fn current_row(&self, sub: Subgroup) -> usize {
        self.rows.get(&sub).copied().unwrap_or(0)
    }

    /// Stamp the current row with `time` (seconds since the epoch) and advance
    pub fn commit_row(&mut self, sub: Subgroup, time: u64) -> Result<(), WriteError> {
        let row = self.current_row(sub);
        let path = self.group_path(sub);
        {
            let mut group = self.group_mut(&path)?;
            let mut var = group
                .variable_mut("time")
                .ok_or_else(|| WriteError::MissingVariable(format!("{}/time", sub)))?;
            var.put_value(time, [row])?;
        }
        self.rows.insert(sub, row + 1);
        Ok(())
    }

    /// Store a text document as a string variable of the case group
    pub fn write_text(&mut self, name: &str, long_name: &str, text: &str) -> Result<(), WriteError> {
        let case = self.case.clone();
        let mut group = self.group_mut(&case)?;
        let mut var = group.add_variable_with_type(name, &["str_dim"], &netcdf::types::NcVariableType::String)?;
        var.put_attribute("long_name", long_name)?;
        var.put_string(text, [0])?;
        Ok(())
    }

    /// Labels of the low, mid and high cloud classes
    pub fn write_cloud_levels(&mut self, sub: Subgroup) -> Result<(), WriteError> {
        let path = self.group_path(sub);
        let mut group = self.group_mut(&path)?;
        let mut var = group.add_variable_with_type("z_cloud", &["z_cloud"], &netcdf::types::NcVariableType::String)?;
        var.put_attribute("long_name", "low, mid, high cloud levels")?;
        var.put_attribute("low_thresh", CLOUD_THRESHOLDS[0])?;
        var.put_attribute("mid_thresh", CLOUD_THRESHOLDS[1])?;
        var.put_attribute("high_thresh", CLOUD_THRESHOLDS[2])?;
        for (i, thresh) in CLOUD_THRESHOLDS.iter().enumerate() {
            var.put_string(&thresh.to_string(), [i])?;
        }
        Ok(())
    }

    /// Flush and move the archive to its final path.
    ///
    /// A failed flush or rename discards the staging file, so nothing is left behind.
    pub fn close(mut self) -> Result<PathBuf, WriteError> {
        let file = self.file.take().ok_or(WriteError::Closed)?;
        if let Err(e) = file.close() {
            self.discard_staging();
            return Err(e.into());
        }
        if let Err(e) = std::fs::rename(&self.staging, &self.target) {
            self.discard_staging();
            return Err(e.into());
        }
        info!(file = %self.target.display(), rows_wrf = self.current_row(Subgroup::Wrf), rows_era5 = self.current_row(Subgroup::Era5), "archive closed");
        Ok(self.target.clone())
    }
}

impl ArchiveWriter {
    fn discard_staging(&self) {
        if let Err(e) = std::fs::remove_file(&self.staging) {
            warn!(file = %self.staging.display(), "could not remove staging file: {}", e);
        } else {
            warn!(file = %self.target.display(), "archive discarded");
        }
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            self.discard_staging();
        }
    }
}

/// `<output>.partial` next to the final output
pub fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    target.with_file_name(name)
}

/// Flags and categories are stored as bytes
fn to_u8(value: f32) -> u8 {
    if value.is_nan() {
        0
    } else {
        value.round().clamp(0.0, 255.0) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};
    use tempfile::tempdir;

    fn layout(lat: usize, lon: usize) -> SubgroupLayout {
        SubgroupLayout {
            lat,
            lon,
            z: 2,
            extra: vec![("z_cloud", 3)],
        }
    }

    fn def(name: &str, dims: &[&'static str], storage: StorageType) -> VariableDef {
        VariableDef {
            name: name.to_string(),
            dims: dims.to_vec(),
            storage,
            units: "1".to_string(),
            long_name: name.to_string(),
            projection: None,
        }
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/tmp/out/case.nc")),
            PathBuf::from("/tmp/out/case.nc.partial")
        );
    }

    #[test]
    fn test_u8_conversion_rounds_and_clamps() {
        assert_eq!(to_u8(0.6), 1);
        assert_eq!(to_u8(-3.0), 0);
        assert_eq!(to_u8(300.0), 255);
        assert_eq!(to_u8(f32::NAN), 0);
    }

    #[test]
    fn test_rows_and_close() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("archive.nc");
        let mut writer = ArchiveWriter::create(&out, "case", &StorageOptions::default()).unwrap();
        writer.add_subgroup(Subgroup::Wrf, &layout(3, 4)).unwrap();
        writer
            .define_variable(Subgroup::Wrf, &def("W", &["time", "z", "lat", "lon"], StorageType::F32))
            .unwrap();
        writer
            .define_variable(Subgroup::Wrf, &def("MASK", &["lat", "lon"], StorageType::U8))
            .unwrap();

        writer
            .write_static(Subgroup::Wrf, "MASK", &Array::from_elem(IxDyn(&[3, 4]), 1.0))
            .unwrap();
        for (row, value) in [1.0f32, 2.0].iter().enumerate() {
            assert_eq!(writer.current_row(Subgroup::Wrf), row);
            writer
                .append(Subgroup::Wrf, "W", &Array::from_elem(IxDyn(&[2, 3, 4]), *value))
                .unwrap();
            writer.commit_row(Subgroup::Wrf, 3600 * (row as u64 + 1)).unwrap();
        }

        let wrong = Array::from_elem(IxDyn(&[2, 4, 3]), 0.0);
        assert!(matches!(
            writer.append(Subgroup::Wrf, "W", &wrong),
            Err(WriteError::ShapeMismatch { .. })
        ));

        assert!(!out.exists());
        let path = writer.close().unwrap();
        assert_eq!(path, out);
        assert!(out.exists());
        assert!(!staging_path(&out).exists());

        let file = netcdf::open(&out).unwrap();
        let group = file.group("case/wrf").unwrap().unwrap();
        let time: Vec<u64> = group.variable("time").unwrap().get_values(..).unwrap();
        assert_eq!(time, vec![3600, 7200]);
        let w: Vec<f32> = group.variable("W").unwrap().get_values(..).unwrap();
        assert_eq!(w.len(), 2 * 2 * 3 * 4);
        assert_eq!(w[24], 2.0);
    }

    #[test]
    fn test_failed_finalize_is_not_reported_as_written() {
        let dir = tempdir().unwrap();
        // A non-empty directory cannot be replaced by the finished archive
        let out = dir.path().join("occupied.nc");
        std::fs::create_dir(&out).unwrap();
        std::fs::write(out.join("keep"), b"x").unwrap();

        let mut writer = ArchiveWriter::create(&out, "case", &StorageOptions::default()).unwrap();
        writer.add_subgroup(Subgroup::Wrf, &layout(3, 4)).unwrap();
        writer.commit_row(Subgroup::Wrf, 3600).unwrap();

        assert!(matches!(writer.close(), Err(WriteError::Io(_))));
        assert!(!staging_path(&out).exists());
        assert!(out.join("keep").exists());
    }

    #[test]
    fn test_grid_mismatch_between_subgroups() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("mismatch.nc");
        let mut writer = ArchiveWriter::create(&out, "case", &StorageOptions::default()).unwrap();
        writer.add_subgroup(Subgroup::Wrf, &layout(3, 4)).unwrap();
        let err = writer.add_subgroup(Subgroup::Era5, &layout(3, 5)).unwrap_err();
        assert!(matches!(err, WriteError::GridMismatch(_)));

        drop(writer);
        assert!(!out.exists());
        assert!(!staging_path(&out).exists());
    }
}
