use crate::error::ConvertError;
use crate::fields::{parse_field_list, AggregationMode, MetEmField, WrfField};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};

/// Output compression settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StorageOptions {
    /// Deflate level 1..=9, `None` writes uncompressed variables
    pub deflate_level: Option<i32>,
}

impl StorageOptions {
    /// Level 0 disables compression
    pub fn from_level(level: u32) -> Self {
        Self {
            deflate_level: (level > 0).then_some(level as i32),
        }
    }
}

/// Post-aggregation reduction of every dynamic field
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReduceOptions {
    /// Keep only the lowest `max_layers` model levels, 0 keeps all
    pub max_layers: usize,
    /// Cells dropped at each lateral edge
    pub lbc_offset: usize,
}

/// Conversion settings, validated once and then passed down unchanged
#[derive(Clone, Debug)]
pub struct ConvertConfig {
    /// Folder with the wrfout files
    pub wrfout_folder: PathBuf,
    /// Folder with the met_em files; no `era5` subgroup without it
    pub met_em_folder: Option<PathBuf>,
    pub case_name: String,
    /// Final archive path, always ending in `.nc`
    pub output_file: PathBuf,
    /// Domain tag in the file names, e.g. `d01`
    pub domain: String,
    pub properties_wrf: Vec<String>,
    pub properties_met_em: Vec<String>,
    /// Reductions written for the dynamic wrfout fields
    pub modes: Vec<AggregationMode>,
    pub storage: StorageOptions,
    pub reduce: ReduceOptions,
    /// Sub-window width in minutes
    pub window_dt: u32,
    /// Hours skipped at the start of the common time range
    pub time_offset: u32,
    pub namelist_input: Option<PathBuf>,
    pub namelist_wps: Option<PathBuf>,
    /// Draw a progress bar over the samples
    pub show_progress: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            wrfout_folder: PathBuf::from("."),
            met_em_folder: None,
            case_name: String::from("case"),
            output_file: PathBuf::from("output.nc"),
            domain: String::from("d01"),
            properties_wrf: ["U", "V", "W"].iter().map(|s| s.to_string()).collect(),
            properties_met_em: ["PRES", "UU", "VV", "TT", "RH", "LANDMASK"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            modes: vec![AggregationMode::Avg, AggregationMode::Max],
            storage: StorageOptions::default(),
            reduce: ReduceOptions {
                max_layers: 0,
                lbc_offset: 6,
            },
            window_dt: 5,
            time_offset: 1,
            namelist_input: None,
            namelist_wps: None,
            show_progress: true,
        }
    }
}

/// Arguments of the `convert` subcommand
pub fn convert_command() -> Command {
    Command::new("convert")
        .about("Aggregate wrfout snapshots and met_em fields into one netCDF-4 archive")
        .arg(
            Arg::new("wrfout-folder")
                .short('w')
                .long("wrfout-folder")
                .value_name("DIR")
                .help("Folder with the wrfout files")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("met-em-folder")
                .short('e')
                .long("met-em-folder")
                .value_name("DIR")
                .help("Folder with the met_em files")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("compress")
                .short('c')
                .long("compress")
                .value_name("LEVEL")
                .help("Deflate level, 0 disables compression")
                .default_value("0")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("max-layers")
                .short('l')
                .long("max-layers")
                .value_name("COUNT")
                .help("Maximum number of layers for 3D data, 0 converts all layers")
                .default_value("0")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("window-dt")
                .long("window-dt")
                .value_name("MINUTES")
                .help("Width of the windows the wrfout snapshots are aggregated over")
                .default_value("5")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("case-name")
                .short('n')
                .long("case-name")
                .value_name("NAME")
                .help("Case name, used as the top level group")
                .required(true),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .value_name("FILE")
                .help("Output file, .nc is appended if missing")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("domain")
                .short('d')
                .long("domain")
                .value_name("DOMAIN")
                .help("Domain identifier of the files to convert")
                .default_value("d01"),
        )
        .arg(
            Arg::new("properties-wrf")
                .long("properties-wrf")
                .value_name("FIELD")
                .help("Fields to store from the wrfout files")
                .num_args(1..)
                .default_values(["U", "V", "W"]),
        )
        .arg(
            Arg::new("properties-met-em")
                .long("properties-met-em")
                .value_name("FIELD")
                .help("Fields to store from the met_em files")
                .num_args(1..)
                .default_values(["PRES", "UU", "VV", "TT", "RH", "LANDMASK"]),
        )
        .arg(
            Arg::new("modes")
                .long("modes")
                .value_name("MODE")
                .help("Reductions over each window: avg, max")
                .num_args(1..)
                .default_values(["avg", "max"]),
        )
        .arg(
            Arg::new("namelist-input")
                .long("namelist-input")
                .value_name("FILE")
                .help("namelist.input of the WRF run, stored in the archive")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("namelist-wps")
                .long("namelist-wps")
                .value_name("FILE")
                .help("namelist.wps of the WPS run, stored in the archive")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("time-offset")
                .long("time-offset")
                .value_name("HOURS")
                .help("Hours skipped at the start of the simulation")
                .default_value("1")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("lbc-offset")
                .long("lbc-offset")
                .value_name("CELLS")
                .help("Cells cropped at each lateral boundary")
                .default_value("6")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("no-progress")
                .long("no-progress")
                .help("Do not draw a progress bar")
                .action(ArgAction::SetTrue),
        )
}

impl ConvertConfig {
    /// Build and validate the configuration from parsed `convert` arguments
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConvertError> {
        let required_path = |name: &str| {
            matches
                .get_one::<PathBuf>(name)
                .cloned()
                .ok_or_else(|| ConvertError::configuration(format!("missing --{}", name)))
        };
        let strings = |name: &str| -> Vec<String> {
            matches
                .get_many::<String>(name)
                .map(|values| values.cloned().collect())
                .unwrap_or_default()
        };
        let defaults = Self::default();

        let compress = matches.get_one::<u32>("compress").copied().unwrap_or(0);
        if compress > 9 {
            return Err(ConvertError::configuration(format!(
                "compression level {} outside 0..=9",
                compress
            )));
        }

        let modes = strings("modes")
            .iter()
            .map(|name| AggregationMode::parse(name))
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self {
            wrfout_folder: required_path("wrfout-folder")?,
            met_em_folder: matches.get_one::<PathBuf>("met-em-folder").cloned(),
            case_name: matches
                .get_one::<String>("case-name")
                .cloned()
                .ok_or_else(|| ConvertError::configuration("missing --case-name"))?,
            output_file: with_nc_suffix(&required_path("output-file")?),
            domain: matches
                .get_one::<String>("domain")
                .cloned()
                .unwrap_or(defaults.domain),
            properties_wrf: strings("properties-wrf"),
            properties_met_em: strings("properties-met-em"),
            modes,
            storage: StorageOptions::from_level(compress),
            reduce: ReduceOptions {
                max_layers: matches.get_one::<usize>("max-layers").copied().unwrap_or(0),
                lbc_offset: matches
                    .get_one::<usize>("lbc-offset")
                    .copied()
                    .unwrap_or(defaults.reduce.lbc_offset),
            },
            window_dt: matches
                .get_one::<u32>("window-dt")
                .copied()
                .unwrap_or(defaults.window_dt),
            time_offset: matches
                .get_one::<u32>("time-offset")
                .copied()
                .unwrap_or(defaults.time_offset),
            namelist_input: matches.get_one::<PathBuf>("namelist-input").cloned(),
            namelist_wps: matches.get_one::<PathBuf>("namelist-wps").cloned(),
            show_progress: !matches.get_flag("no-progress"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parsed wrfout field list
    pub fn wrf_fields(&self) -> Result<Vec<WrfField>, ConvertError> {
        parse_field_list(&self.properties_wrf, "WRF")
    }

    /// Parsed met_em field list
    pub fn met_em_fields(&self) -> Result<Vec<MetEmField>, ConvertError> {
        parse_field_list(&self.properties_met_em, "MET_EM")
    }

    /// Validate configuration parameters before any file is touched
    pub fn validate(&self) -> Result<(), ConvertError> {
        if self.window_dt == 0 || 60 % self.window_dt != 0 {
            return Err(ConvertError::configuration(format!(
                "window width of {} minutes must divide an hour without remainder",
                self.window_dt
            )));
        }
        if self.case_name.trim().is_empty() || self.case_name.contains('/') {
            return Err(ConvertError::configuration(format!(
                "invalid case name: {:?}",
                self.case_name
            )));
        }
        if self.domain.is_empty() {
            return Err(ConvertError::configuration("domain must not be empty"));
        }
        if self.modes.is_empty() {
            return Err(ConvertError::configuration("at least one aggregation mode is required"));
        }
        if let Some(level) = self.storage.deflate_level {
            if !(1..=9).contains(&level) {
                return Err(ConvertError::configuration(format!(
                    "compression level {} outside 1..=9",
                    level
                )));
            }
        }

        if !self.wrfout_folder.is_dir() {
            return Err(ConvertError::configuration(format!(
                "wrfout folder does not exist: {}",
                self.wrfout_folder.display()
            )));
        }
        if let Some(folder) = &self.met_em_folder {
            if !folder.is_dir() {
                return Err(ConvertError::configuration(format!(
                    "met_em folder does not exist: {}",
                    folder.display()
                )));
            }
        }
        for namelist in [&self.namelist_input, &self.namelist_wps].into_iter().flatten() {
            if !namelist.is_file() {
                return Err(ConvertError::configuration(format!(
                    "namelist file does not exist: {}",
                    namelist.display()
                )));
            }
        }

        self.wrf_fields()?;
        if self.met_em_folder.is_some() {
            self.met_em_fields()?;
        }
        Ok(())
    }
}

/// Append `.nc` unless the path already ends with it
pub fn with_nc_suffix(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(".nc") {
        path.to_path_buf()
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".nc");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(args: &[&str]) -> Result<ConvertConfig, ConvertError> {
        let matches = convert_command()
            .try_get_matches_from(std::iter::once("convert").chain(args.iter().copied()))
            .unwrap();
        ConvertConfig::from_matches(&matches)
    }

    #[test]
    fn test_defaults_from_cli() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        let config = parse(&["-w", folder, "-n", "alps", "-o", "/tmp/alps"]).unwrap();

        assert_eq!(config.output_file, PathBuf::from("/tmp/alps.nc"));
        assert_eq!(config.domain, "d01");
        assert_eq!(config.properties_wrf, vec!["U", "V", "W"]);
        assert_eq!(config.properties_met_em.len(), 6);
        assert_eq!(config.window_dt, 5);
        assert_eq!(config.time_offset, 1);
        assert_eq!(config.reduce, ReduceOptions { max_layers: 0, lbc_offset: 6 });
        assert_eq!(config.storage.deflate_level, None);
        assert!(config.show_progress);
        assert_eq!(config.modes, vec![AggregationMode::Avg, AggregationMode::Max]);
    }

    #[test]
    fn test_explicit_options() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();
        let config = parse(&[
            "-w", folder, "-e", folder, "-n", "alps", "-o", "out.nc", "-c", "4", "-l", "20",
            "--window-dt", "10", "--lbc-offset", "0", "--properties-wrf", "T", "PW", "CLOUDFRAC",
        ])
        .unwrap();

        assert_eq!(config.output_file, PathBuf::from("out.nc"));
        assert_eq!(config.storage.deflate_level, Some(4));
        assert_eq!(config.reduce.max_layers, 20);
        assert_eq!(config.reduce.lbc_offset, 0);
        assert_eq!(
            config.wrf_fields().unwrap(),
            vec![WrfField::T, WrfField::PW, WrfField::CLOUDFRAC]
        );
    }

    #[test]
    fn test_validation_failures() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();

        let err = parse(&["-w", folder, "-n", "c", "-o", "o", "--window-dt", "7"]).unwrap_err();
        assert!(matches!(err, ConvertError::Configuration(_)));

        let err = parse(&["-w", "/nonexistent/wrfout", "-n", "c", "-o", "o"]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));

        let err = parse(&["-w", folder, "-n", "c", "-o", "o", "-c", "12"]).unwrap_err();
        assert!(err.to_string().contains("compression level"));

        let err = parse(&["-w", folder, "-n", "c", "-o", "o", "--properties-wrf", "U", "XX", "YY"])
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("XX") && msg.contains("YY"));
    }

    #[test]
    fn test_aggregation_modes_from_cli() {
        let dir = tempdir().unwrap();
        let folder = dir.path().to_str().unwrap();

        let config = parse(&["-w", folder, "-n", "c", "-o", "o", "--modes", "max"]).unwrap();
        assert_eq!(config.modes, vec![AggregationMode::Max]);

        let err = parse(&["-w", folder, "-n", "c", "-o", "o", "--modes", "avg", "median"])
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedMode(ref m) if m == "median"));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_nc_suffix() {
        assert_eq!(with_nc_suffix(Path::new("a/b.nc")), PathBuf::from("a/b.nc"));
        assert_eq!(with_nc_suffix(Path::new("a/b")), PathBuf::from("a/b.nc"));
        assert_eq!(with_nc_suffix(Path::new("a/b.h5")), PathBuf::from("a/b.h5.nc"));
    }
}
