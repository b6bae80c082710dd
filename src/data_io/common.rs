/// Discovery of the timestamped source files of one domain
use crate::error::ConvertError;
use crate::time_utils::{format_key, parse_file_timestamp};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name prefix of WRF history files
pub const WRFOUT_PREFIX: &str = "wrfout";
/// Name prefix of WPS metgrid output files
pub const MET_EM_PREFIX: &str = "met_em";

/// Files of one kind and domain, ordered by the timestamp in their names
#[derive(Debug, Clone, Default)]
pub struct FileCatalog {
    files: BTreeMap<DateTime<Utc>, PathBuf>,
}

impl FileCatalog {
    /// Collect every regular file in `folder` whose name contains both `prefix` and
    /// `domain`. A name that matches but carries no parseable timestamp is an error,
    /// as is a folder without any match.
    pub fn scan(folder: &Path, domain: &str, prefix: &str) -> Result<Self, ConvertError> {
        let entries = fs::read_dir(folder).map_err(|e| {
            ConvertError::configuration(format!("cannot list {}: {}", folder.display(), e))
        })?;

        let mut files = BTreeMap::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.contains(prefix) || !name.contains(domain) {
                continue;
            }
            let time = parse_file_timestamp(name, domain)?;
            if let Some(previous) = files.insert(time, path.clone()) {
                return Err(ConvertError::configuration(format!(
                    "{} and {} share the timestamp {}",
                    previous.display(),
                    path.display(),
                    format_key(time)
                )));
            }
        }

        if files.is_empty() {
            return Err(ConvertError::configuration(format!(
                "no {} files for domain {} in {}",
                prefix,
                domain,
                folder.display()
            )));
        }
        debug!("Found {} {} files in {}", files.len(), prefix, folder.display());
        Ok(Self { files })
    }

    /// Ascending file timestamps
    pub fn times(&self) -> Vec<DateTime<Utc>> {
        self.files.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Earliest file
    pub fn first(&self) -> Option<&PathBuf> {
        self.files.values().next()
    }

    /// Earliest and latest timestamp
    pub fn range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.files.keys().next()?;
        let last = self.files.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn as_map(&self) -> &BTreeMap<DateTime<Utc>, PathBuf> {
        &self.files
    }

    /// Path of the file stamped `time`, or a lookup error naming the time
    pub fn require(&self, time: DateTime<Utc>) -> Result<&PathBuf, ConvertError> {
        self.files.get(&time).ok_or_else(|| {
            ConvertError::source_data(format!("no source file for {}", format_key(time)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_scan_orders_by_timestamp() {
        let dir = tempdir().unwrap();
        for name in [
            "wrfout_d01_2024-05-01_00:10:00",
            "wrfout_d01_2024-05-01_00:05:00",
            "wrfout_d02_2024-05-01_00:05:00",
            "namelist.input",
        ] {
            File::create(dir.path().join(name)).unwrap();
        }

        let catalog = FileCatalog::scan(dir.path(), "d01", WRFOUT_PREFIX).unwrap();
        assert_eq!(catalog.len(), 2);
        let (first, last) = catalog.range().unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2024, 5, 1, 0, 5, 0).unwrap());
        assert_eq!(last, Utc.with_ymd_and_hms(2024, 5, 1, 0, 10, 0).unwrap());
        assert!(catalog
            .first()
            .unwrap()
            .ends_with("wrfout_d01_2024-05-01_00:05:00"));
    }

    #[test]
    fn test_scan_met_em_names() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("met_em.d01.2024-05-01_00:00:00.nc")).unwrap();
        File::create(dir.path().join("met_em.d01.2024-05-01_01:00:00.nc")).unwrap();

        let catalog = FileCatalog::scan(dir.path(), "d01", MET_EM_PREFIX).unwrap();
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        assert!(catalog.require(t).is_ok());
        assert!(catalog.require(t + chrono::Duration::hours(1)).is_err());
    }

    #[test]
    fn test_scan_errors() {
        let dir = tempdir().unwrap();
        let err = FileCatalog::scan(dir.path(), "d01", WRFOUT_PREFIX).unwrap_err();
        assert!(matches!(err, ConvertError::Configuration(_)));

        File::create(dir.path().join("wrfout_d01_garbage")).unwrap();
        let err = FileCatalog::scan(dir.path(), "d01", WRFOUT_PREFIX).unwrap_err();
        assert!(err.to_string().contains("cannot parse timestamp"));
    }
}
