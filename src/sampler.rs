//! Grouping of primary snapshots into hourly samples and sub-windows.

use crate::error::ConvertError;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One output row of the `wrf` subgroup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Snapshot times in `(start, end]`, ascending
    pub member_timestamps: Vec<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn is_empty(&self) -> bool {
        self.member_timestamps.is_empty()
    }

    /// `start` to `end`, used in log and error messages
    pub fn period(&self) -> String {
        format!(
            "{}to{}",
            self.start.format("%Y-%m-%d_%H:%M:%S"),
            self.end.format("%Y-%m-%d_%H:%M:%S")
        )
    }
}

/// One hour of output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub met_em_file: Option<PathBuf>,
    pub wrf_windows: Vec<TimeWindow>,
}

/// Number of sub-windows per hour, rejecting widths that do not divide 60
pub fn windows_per_hour(window_dt: u32) -> Result<u32, ConvertError> {
    if window_dt == 0 || 60 % window_dt != 0 {
        return Err(ConvertError::configuration(format!(
            "window width of {} minutes must divide an hour without remainder",
            window_dt
        )));
    }
    Ok(60 / window_dt)
}

/// Partition `[t_start, t_end)` into hourly samples.
///
/// `primary` must be sorted ascending. When a reference catalog is given every hour
/// must have a reference file stamped exactly at the hour.
pub fn build_samples(
    primary: &[DateTime<Utc>],
    reference: Option<&BTreeMap<DateTime<Utc>, PathBuf>>,
    t_start: DateTime<Utc>,
    t_end: DateTime<Utc>,
    window_dt: u32,
) -> Result<Vec<Sample>, ConvertError> {
    let num_windows = windows_per_hour(window_dt)?;
    let hour = Duration::hours(1);
    let width = Duration::minutes(i64::from(window_dt));

    let mut samples = Vec::new();
    let mut t = t_start;
    while t < t_end {
        let met_em_file = match reference {
            Some(catalog) => Some(catalog.get(&t).cloned().ok_or_else(|| {
                ConvertError::configuration(format!(
                    "no met_em file for {}",
                    t.format("%Y-%m-%d_%H:%M:%S")
                ))
            })?),
            None => None,
        };

        let in_hour: Vec<DateTime<Utc>> = primary
            .iter()
            .copied()
            .filter(|ts| *ts > t && *ts <= t + hour)
            .collect();

        let wrf_windows = (0..num_windows)
            .map(|i| {
                let start = t + width * i as i32;
                let end = start + width;
                TimeWindow {
                    start,
                    end,
                    member_timestamps: in_hour
                        .iter()
                        .copied()
                        .filter(|ts| *ts > start && *ts <= end)
                        .collect(),
                }
            })
            .collect();

        samples.push(Sample {
            timestamp: t,
            met_em_file,
            wrf_windows,
        });
        t += hour;
    }

    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
            .and_utc()
    }

    fn every_five_minutes(hours: u32) -> Vec<DateTime<Utc>> {
        (0..=hours * 12).map(|i| at(0, 0) + Duration::minutes(5 * i as i64)).collect()
    }

    #[test]
    fn test_window_width_must_divide_hour() {
        for bad in [0, 7, 45, 90] {
            assert!(matches!(
                windows_per_hour(bad),
                Err(ConvertError::Configuration(_))
            ));
        }
        assert_eq!(windows_per_hour(5).unwrap(), 12);
        assert_eq!(windows_per_hour(60).unwrap(), 1);
    }

    #[test]
    fn test_samples_partition_each_hour() {
        let times = every_five_minutes(3);
        let samples = build_samples(&times, None, at(0, 0), at(3, 0), 10).unwrap();
        assert_eq!(samples.len(), 3);

        for sample in &samples {
            assert_eq!(sample.wrf_windows.len(), 6);
            assert_eq!(sample.wrf_windows.first().unwrap().start, sample.timestamp);
            assert_eq!(
                sample.wrf_windows.last().unwrap().end,
                sample.timestamp + Duration::hours(1)
            );
            for pair in sample.wrf_windows.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
            for window in &sample.wrf_windows {
                assert!(window.start < window.end);
                assert_eq!(window.member_timestamps.len(), 2);
                assert!(window
                    .member_timestamps
                    .iter()
                    .all(|ts| *ts > window.start && *ts <= window.end));
            }
            assert!(sample.met_em_file.is_none());
        }
    }

    #[test]
    fn test_window_start_is_exclusive() {
        let times = vec![at(0, 0), at(0, 30), at(1, 0)];
        let samples = build_samples(&times, None, at(0, 0), at(1, 0), 30).unwrap();
        let windows = &samples[0].wrf_windows;
        assert_eq!(windows[0].member_timestamps, vec![at(0, 30)]);
        assert_eq!(windows[1].member_timestamps, vec![at(1, 0)]);
        assert_eq!(windows[0].period(), "2024-05-01_00:00:00to2024-05-01_00:30:00");
    }

    #[test]
    fn test_reference_files_are_attached_per_hour() {
        let times = every_five_minutes(2);
        let mut catalog = BTreeMap::new();
        catalog.insert(at(0, 0), PathBuf::from("met_em.d01.2024-05-01_00:00:00.nc"));
        catalog.insert(at(1, 0), PathBuf::from("met_em.d01.2024-05-01_01:00:00.nc"));

        let samples = build_samples(&times, Some(&catalog), at(0, 0), at(2, 0), 5).unwrap();
        assert_eq!(
            samples[1].met_em_file.as_deref(),
            Some(std::path::Path::new("met_em.d01.2024-05-01_01:00:00.nc"))
        );

        catalog.remove(&at(1, 0));
        let err = build_samples(&times, Some(&catalog), at(0, 0), at(2, 0), 5).unwrap_err();
        assert!(matches!(err, ConvertError::Configuration(_)));
    }

    #[test]
    fn test_empty_range_gives_no_samples() {
        let times = every_five_minutes(1);
        assert!(build_samples(&times, None, at(1, 0), at(1, 0), 5).unwrap().is_empty());
        assert!(build_samples(&times, None, at(2, 0), at(1, 0), 5).unwrap().is_empty());
    }
}
