use crate::error::ConvertError;
use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};

/// Timestamp layouts that follow the domain tag in WRF and WPS file names
const FILE_TIME_FORMATS: [&str; 3] = [
    "_%Y-%m-%d_%H:%M:%S",
    "_%Y-%m-%d_%H:%M:%S.nc",
    ".%Y-%m-%d_%H:%M:%S.nc",
];

/// Parse the timestamp encoded in a WRF (`wrfout_d01_2024-05-01_00:05:00`) or
/// WPS (`met_em.d01.2024-05-01_00:00:00.nc`) file name.
pub fn parse_file_timestamp(file_name: &str, domain: &str) -> Result<DateTime<Utc>, ConvertError> {
    let rest = file_name
        .rfind(domain)
        .map(|idx| &file_name[idx + domain.len()..])
        .ok_or_else(|| {
            ConvertError::configuration(format!(
                "file name {} does not contain domain {}",
                file_name, domain
            ))
        })?;

    FILE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(rest, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            ConvertError::configuration(format!(
                "cannot parse timestamp from file name {}",
                file_name
            ))
        })
}

/// Seconds since the Unix epoch, as stored in the archive `time` variables
pub fn epoch_seconds(time: DateTime<Utc>) -> Result<u64, ConvertError> {
    u64::try_from(time.timestamp()).map_err(|_| {
        ConvertError::configuration(format!("timestamp {} predates the Unix epoch", time))
    })
}

/// Drop minutes and seconds
pub fn truncate_to_hour(time: DateTime<Utc>) -> DateTime<Utc> {
    let secs = i64::from(time.minute()) * 60 + i64::from(time.second());
    time - Duration::seconds(secs) - Duration::nanoseconds(i64::from(time.nanosecond()))
}

/// Same layout WRF uses in its own file names
pub fn format_key(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d_%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_parse_wrfout_name() {
        let t = parse_file_timestamp("wrfout_d01_2024-05-01_00:05:00", "d01").unwrap();
        assert_eq!(t, utc(0, 5, 0));
    }

    #[test]
    fn test_parse_met_em_name() {
        let t = parse_file_timestamp("met_em.d02.2024-05-01_13:00:00.nc", "d02").unwrap();
        assert_eq!(t, utc(13, 0, 0));
    }

    #[test]
    fn test_parse_uses_last_domain_occurrence() {
        let t = parse_file_timestamp("d01_wrfout_d01_2024-05-01_01:00:00", "d01").unwrap();
        assert_eq!(t, utc(1, 0, 0));
    }

    #[test]
    fn test_unparseable_names_are_configuration_errors() {
        for name in ["wrfout_d01_latest", "wrfout_d02_2024-05-01_00:05:00", "wrfinput_d01"] {
            let err = parse_file_timestamp(name, "d01").unwrap_err();
            assert!(matches!(err, ConvertError::Configuration(_)), "{}", name);
        }
    }

    #[test]
    fn test_truncate_to_hour() {
        assert_eq!(truncate_to_hour(utc(5, 59, 59)), utc(5, 0, 0));
        assert_eq!(truncate_to_hour(utc(5, 0, 0)), utc(5, 0, 0));
    }

    #[test]
    fn test_epoch_seconds() {
        assert_eq!(epoch_seconds(Utc.timestamp_opt(3600, 0).unwrap()).unwrap(), 3600);
        assert!(epoch_seconds(Utc.timestamp_opt(-1, 0).unwrap()).is_err());
        assert_eq!(format_key(utc(0, 10, 0)), "2024-05-01_00:10:00");
    }
}
