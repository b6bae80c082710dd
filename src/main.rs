use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use wrfconv::{
    config::{convert_command, ConvertConfig},
    convert,
    tools::{self, mapfac::DEFAULT_LIMIT, runtime::parse_runtime_file},
    ConvertError,
};

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    let result = match matches.subcommand() {
        Some(("convert", sub_matches)) => run_convert(sub_matches),
        Some(("check-mapfac", sub_matches)) => run_check_mapfac(sub_matches),
        Some(("wrf-runtime", sub_matches)) => run_wrf_runtime(sub_matches),
        Some(("fix-index", sub_matches)) => run_fix_index(sub_matches),
        Some(("geo-patch", sub_matches)) => run_geo_patch(sub_matches),
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// `RUST_LOG` wins over `-v`
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_convert(matches: &ArgMatches) -> Result<i32, ConvertError> {
    let config = ConvertConfig::from_matches(matches)?;
    let summary = convert::run(&config)?;
    println!(
        "Converted {} hours into {} ({} wrf rows, {} era5 rows)",
        summary.samples,
        summary.output.display(),
        summary.wrf_rows,
        summary.era5_rows
    );
    Ok(0)
}

fn run_check_mapfac(matches: &ArgMatches) -> Result<i32, ConvertError> {
    let folder = required::<PathBuf>(matches, "input-folder")?;
    let limit = matches.get_one::<f32>("limit").copied().unwrap_or(DEFAULT_LIMIT);

    let report = tools::check_mapfac_folder(&folder)?;
    for (file, deviation) in &report.files {
        info!(file = %file.display(), "MAPFAC deviation {:.5}", deviation);
    }
    println!("Maximum MAPFAC deviation from 1.0: {:.5}", report.max_deviation);
    Ok(if report.passes(limit) { 0 } else { 1 })
}

fn run_wrf_runtime(matches: &ArgMatches) -> Result<i32, ConvertError> {
    let file = required::<PathBuf>(matches, "file")?;
    let summary = parse_runtime_file(&file)?;
    println!("{}", summary);
    Ok(0)
}

fn run_fix_index(matches: &ArgMatches) -> Result<i32, ConvertError> {
    let index_file = required::<PathBuf>(matches, "index-file")?;
    let resolution = matches
        .get_one::<f64>("resolution")
        .copied()
        .unwrap_or(tools::DEFAULT_RESOLUTION);

    let replaced = tools::fix_index_file(&index_file, resolution)?;
    info!(file = %index_file.display(), replaced, "resolution updated");
    Ok(0)
}

fn run_geo_patch(matches: &ArgMatches) -> Result<i32, ConvertError> {
    let plan = tools::plan_geo_patch(
        required::<f64>(matches, "lat")?,
        required::<f64>(matches, "lon")?,
        required::<f64>(matches, "extent")?,
        &required::<PathBuf>(matches, "geotiff")?,
        &required::<PathBuf>(matches, "output")?,
    )?;
    info!(projection = %plan.projection.params().kind, "domain projection chosen");

    if matches.get_flag("dry-run") {
        println!("{}", plan.command_line());
    } else {
        plan.execute()?;
    }
    Ok(0)
}

fn required<T: Clone + Send + Sync + 'static>(
    matches: &ArgMatches,
    name: &str,
) -> Result<T, ConvertError> {
    matches
        .get_one::<T>(name)
        .cloned()
        .ok_or_else(|| ConvertError::configuration(format!("missing --{}", name)))
}

fn build_cli() -> Command {
    Command::new("wrfconv")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Conversion and helper utilities for WRF/WPS model output")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More log output (-v debug, -vv trace)")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(convert_command())
        .subcommand(
            Command::new("check-mapfac")
                .about("Check the map scale factors of the geogrid output")
                .arg(
                    Arg::new("input-folder")
                        .short('i')
                        .long("input-folder")
                        .value_name("DIR")
                        .help("Folder with the geo_em files")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("FLOAT")
                        .help("Maximum allowed deviation of the map factors from 1.0")
                        .default_value("0.01")
                        .value_parser(value_parser!(f32)),
                ),
        )
        .subcommand(
            Command::new("wrf-runtime")
                .about("Summarize the step timings of a WRF rsl log")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .help("rsl.out or rsl.error log file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("fix-index")
                .about("Correct the resolution of a geogrid index file in place")
                .arg(
                    Arg::new("index-file")
                        .short('i')
                        .long("index-file")
                        .value_name("FILE")
                        .help("Path to the index file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("resolution")
                        .short('r')
                        .long("resolution")
                        .value_name("DEGREES")
                        .help("Correct resolution")
                        .default_value("0.000277777777777")
                        .value_parser(value_parser!(f64)),
                ),
        )
        .subcommand(
            Command::new("geo-patch")
                .about("Extract the terrain patch of a domain from a geotiff")
                .arg(
                    Arg::new("lat")
                        .long("lat")
                        .value_name("DEG")
                        .help("Latitude of the domain center")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("lon")
                        .long("lon")
                        .value_name("DEG")
                        .help("Longitude of the domain center")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("extent")
                        .long("extent")
                        .value_name("KM")
                        .help("Extent of the grid")
                        .required(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("geotiff")
                        .short('t')
                        .long("geotiff")
                        .value_name("FILE")
                        .help("Input geotiff")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("Output geotiff")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .help("Print the gdal_translate command instead of running it")
                        .action(ArgAction::SetTrue),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_geo_patch_accepts_negative_coordinates() {
        let matches = build_cli()
            .try_get_matches_from([
                "wrfconv", "geo-patch", "--lat", "-45.5", "--lon", "-70", "--extent", "300", "-t",
                "in.tif", "-o", "out.tif", "--dry-run",
            ])
            .unwrap();
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<f64>("lat"), Some(&-45.5));
        assert!(sub.get_flag("dry-run"));
    }
}
