//! The wrfout → archive conversion run.
//!
//! Files are scanned and grouped into hourly samples first, so every configuration
//! and lookup problem surfaces before the output file is created. Rows are then
//! written in time order: one `era5` row per sample followed by one `wrf` row per
//! sub-window.

use crate::config::ConvertConfig;
use crate::data_io::common::{FileCatalog, MET_EM_PREFIX, WRFOUT_PREFIX};
use crate::data_io::reader::{extract, FieldSource, NetCdfSource};
use crate::data_io::writer::{ArchiveWriter, Subgroup, SubgroupLayout, VariableDef};
use crate::error::ConvertError;
use crate::fields::{FieldSpec, MetEmField, StorageType, WrfField};
use crate::math::{aggregate, crop_horizontal, reduce};
use crate::sampler::{build_samples, Sample, TimeWindow};
use crate::time_utils::{epoch_seconds, format_key, truncate_to_hour};
use chrono::{DateTime, Duration, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::ArrayD;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of cloud classes along `z_cloud`
const CLOUD_CLASSES: usize = 3;

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertSummary {
    pub output: PathBuf,
    pub samples: usize,
    pub wrf_rows: usize,
    pub era5_rows: usize,
}

/// `[t_start, t_end)` covered by the archive
pub fn select_time_range(
    wrfout: &FileCatalog,
    met_em: Option<&FileCatalog>,
    time_offset: u32,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ConvertError> {
    let (mut t_start, mut t_end) = wrfout
        .range()
        .ok_or_else(|| ConvertError::configuration("no wrfout files"))?;

    if let Some(catalog) = met_em {
        let (first, last) = catalog
            .range()
            .ok_or_else(|| ConvertError::configuration("no met_em files"))?;
        t_start = t_start.max(first);
        t_end = t_end.min(last);
    }

    t_end = truncate_to_hour(t_end);
    if time_offset > 0 {
        t_start += Duration::hours(i64::from(time_offset));
    }

    if t_start >= t_end {
        return Err(ConvertError::configuration(format!(
            "no full hour to convert between {} and {}",
            format_key(t_start),
            format_key(t_end)
        )));
    }
    Ok((t_start, t_end))
}

/// Every sub-window needs at least one wrfout snapshot
fn check_windows(samples: &[Sample]) -> Result<(), ConvertError> {
    let empty: Vec<String> = samples
        .iter()
        .flat_map(|s| s.wrf_windows.iter())
        .filter(|w| w.is_empty())
        .map(TimeWindow::period)
        .collect();
    if empty.is_empty() {
        Ok(())
    } else {
        Err(ConvertError::source_data(format!(
            "no wrfout snapshots in window(s) {}",
            empty.join(", ")
        )))
    }
}

/// Horizontal extent after cropping `lbc_offset` cells at each edge
fn cropped_extent(source: &dyn FieldSource, lbc_offset: usize) -> Result<(usize, usize), ConvertError> {
    let mut sizes = [0usize; 2];
    for (size, dim) in sizes.iter_mut().zip(["south_north", "west_east"]) {
        let len = source.dimension_len(dim)?;
        if 2 * lbc_offset >= len {
            return Err(ConvertError::configuration(format!(
                "lbc offset {} leaves nothing of {} = {} in {}",
                lbc_offset,
                dim,
                len,
                source.description()
            )));
        }
        *size = len - 2 * lbc_offset;
    }
    Ok((sizes[0], sizes[1]))
}

fn variable_def(name: String, spec: &FieldSpec, projection: &Option<String>) -> VariableDef {
    VariableDef {
        name,
        dims: spec.dims.to_vec(),
        storage: spec.storage,
        units: spec.unit.to_string(),
        long_name: spec.description.to_string(),
        projection: projection.clone(),
    }
}

fn coordinate_def(name: &str, dims: &[&'static str], units: &str, long_name: &str) -> VariableDef {
    VariableDef {
        name: name.to_string(),
        dims: dims.to_vec(),
        storage: StorageType::F32,
        units: units.to_string(),
        long_name: long_name.to_string(),
        projection: None,
    }
}

fn is_layered(spec: &FieldSpec) -> bool {
    spec.dims.contains(&"z")
}

/// Writes the `wrf` subgroup
struct WrfStage {
    fields: Vec<FieldSpec>,
}

impl WrfStage {
    fn setup(
        config: &ConvertConfig,
        writer: &mut ArchiveWriter,
        first_file: &Path,
        fields: &[WrfField],
    ) -> Result<Self, ConvertError> {
        let source = NetCdfSource::open(first_file)?;
        let (lat, lon) = cropped_extent(&source, config.reduce.lbc_offset)?;
        let bottom_top = source.dimension_len("bottom_top")?;
        let z = match config.reduce.max_layers {
            0 => bottom_top,
            n => bottom_top.min(n),
        };
        let specs: Vec<FieldSpec> = fields.iter().map(|f| f.spec()).collect();

        let mut extra = Vec::new();
        if fields.contains(&WrfField::CLOUDFRAC) {
            extra.push(("z_cloud", CLOUD_CLASSES));
        }
        writer.add_subgroup(Subgroup::Wrf, &SubgroupLayout { lat, lon, z, extra })?;

        write_coordinates(writer, Subgroup::Wrf, &source, config, true)?;
        if fields.contains(&WrfField::CLOUDFRAC) {
            writer.write_cloud_levels(Subgroup::Wrf)?;
        }

        // The first file fixes the projection attribute and the static fields
        for spec in &specs {
            let field = extract(&source, spec.source)?;
            let names = spec.variable_names(&config.modes);
            if names.is_empty() {
                warn!(field = spec.name, "no enabled aggregation mode, field skipped");
                continue;
            }
            debug!(field = spec.name, stagger = ?field.stagger, "defining wrf variable");
            for name in names {
                writer.define_variable(
                    Subgroup::Wrf,
                    &variable_def(name, spec, &field.projection),
                )?;
            }
            if spec.is_static() {
                let data = reduce(field.data, &config.reduce, is_layered(spec))?;
                writer.write_static(Subgroup::Wrf, spec.name, &data)?;
            }
        }

        Ok(Self {
            fields: specs
                .into_iter()
                .filter(|s| !s.is_static() && !s.modes_in(&config.modes).is_empty())
                .collect(),
        })
    }

    /// Aggregate one sub-window into one row
    fn write_window(
        &self,
        config: &ConvertConfig,
        writer: &mut ArchiveWriter,
        catalog: &FileCatalog,
        window: &TimeWindow,
    ) -> Result<(), ConvertError> {
        let mut snapshots: HashMap<&'static str, Vec<ArrayD<f32>>> = HashMap::new();
        for time in &window.member_timestamps {
            let source = NetCdfSource::open(catalog.require(*time)?)?;
            for spec in &self.fields {
                let data = extract(&source, spec.source)?.data;
                snapshots.entry(spec.name).or_default().push(data);
            }
        }

        for spec in &self.fields {
            let arrays = snapshots.get(spec.name).map(Vec::as_slice).unwrap_or(&[]);
            for mode in spec.modes_in(&config.modes) {
                let reduced = aggregate(arrays, mode).map_err(|e| {
                    ConvertError::source_data(format!(
                        "{} in window {}: {}",
                        spec.name,
                        window.period(),
                        e
                    ))
                })?;
                let reduced = reduce(reduced, &config.reduce, is_layered(spec))?;
                writer.append(Subgroup::Wrf, &mode.variable_name(spec.name), &reduced)?;
            }
        }

        writer.commit_row(Subgroup::Wrf, epoch_seconds(window.end)?)?;
        debug!(
            window = %window.period(),
            snapshots = window.member_timestamps.len(),
            "wrf row written"
        );
        Ok(())
    }
}

/// Writes the `era5` subgroup
struct Era5Stage {
    fields: Vec<FieldSpec>,
}

impl Era5Stage {
    fn setup(
        config: &ConvertConfig,
        writer: &mut ArchiveWriter,
        first_file: &Path,
        fields: &[MetEmField],
    ) -> Result<Self, ConvertError> {
        let source = NetCdfSource::open(first_file)?;
        let (lat, lon) = cropped_extent(&source, config.reduce.lbc_offset)?;
        let z = source.dimension_len("num_metgrid_levels")?;
        let layout = SubgroupLayout {
            lat,
            lon,
            z,
            extra: vec![("month", 12), ("category16", 16), ("category21", 21)],
        };
        writer.add_subgroup(Subgroup::Era5, &layout)?;

        write_coordinates(writer, Subgroup::Era5, &source, config, false)?;

        let specs: Vec<FieldSpec> = fields.iter().map(|f| f.spec()).collect();
        for spec in &specs {
            let field = extract(&source, spec.source)?;
            writer.define_variable(
                Subgroup::Era5,
                &variable_def(spec.name.to_string(), spec, &field.projection),
            )?;
            if spec.is_static() {
                let data = crop_horizontal(field.data, config.reduce.lbc_offset)?;
                writer.write_static(Subgroup::Era5, spec.name, &data)?;
            }
        }

        Ok(Self {
            fields: specs.into_iter().filter(|s| !s.is_static()).collect(),
        })
    }

    /// Copy the hourly fields of one met_em file
    fn write_hour(
        &self,
        config: &ConvertConfig,
        writer: &mut ArchiveWriter,
        file: &Path,
        time: DateTime<Utc>,
    ) -> Result<(), ConvertError> {
        let source = NetCdfSource::open(file)?;
        for spec in &self.fields {
            let data = extract(&source, spec.source)?.data;
            let data = crop_horizontal(data, config.reduce.lbc_offset)?;
            writer.append(Subgroup::Era5, spec.name, &data)?;
        }
        writer.commit_row(Subgroup::Era5, epoch_seconds(time)?)?;
        debug!(time = %format_key(time), "era5 row written");
        Ok(())
    }
}

/// `lat`, `lon` and `z` of a subgroup, cropped like every field
fn write_coordinates(
    writer: &mut ArchiveWriter,
    sub: Subgroup,
    source: &dyn FieldSource,
    config: &ConvertConfig,
    truncate_z: bool,
) -> Result<(), ConvertError> {
    let coordinates = [
        coordinate_def("lat", &["lat", "lon"], "degree_north", "latitude"),
        coordinate_def("lon", &["lat", "lon"], "degree_east", "longitude"),
        coordinate_def("z", &["z", "lat", "lon"], "m", "height above sea level"),
    ];
    for def in &coordinates {
        writer.define_variable(sub, def)?;
        let data = extract(source, &def.name)?.data;
        let data = if truncate_z {
            reduce(data, &config.reduce, def.name == "z")?
        } else {
            crop_horizontal(data, config.reduce.lbc_offset)?
        };
        writer.write_static(sub, &def.name, &data)?;
    }
    Ok(())
}

/// Domain name and namelists stored in the case group
fn write_case_metadata(config: &ConvertConfig, writer: &mut ArchiveWriter) -> Result<(), ConvertError> {
    writer.write_text("domain", "WRF domain", &config.domain)?;
    let namelists = [
        ("namelist.input", "WRF namelist", &config.namelist_input),
        ("namelist.wps", "WPS namelist", &config.namelist_wps),
    ];
    for (name, long_name, path) in namelists {
        if let Some(path) = path {
            let text = fs::read_to_string(path)?;
            writer.write_text(name, long_name, &text)?;
        }
    }
    Ok(())
}

fn progress_bar(config: &ConvertConfig, len: usize) -> ProgressBar {
    if !config.show_progress {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_prefix("Converted hours");
    bar
}

/// Convert the configured wrfout (and met_em) files into one archive.
///
/// Nothing exists at the output path unless the run succeeds.
pub fn run(config: &ConvertConfig) -> Result<ConvertSummary, ConvertError> {
    let started = Instant::now();
    let wrf_fields = config.wrf_fields()?;
    let met_em_fields = match config.met_em_folder {
        Some(_) => config.met_em_fields()?,
        None => Vec::new(),
    };

    let wrfout = FileCatalog::scan(&config.wrfout_folder, &config.domain, WRFOUT_PREFIX)?;
    let met_em = config
        .met_em_folder
        .as_deref()
        .map(|folder| FileCatalog::scan(folder, &config.domain, MET_EM_PREFIX))
        .transpose()?;
    info!(
        wrfout_files = wrfout.len(),
        met_em_files = met_em.as_ref().map_or(0, FileCatalog::len),
        "scanned input folders"
    );

    let (t_start, t_end) = select_time_range(&wrfout, met_em.as_ref(), config.time_offset)?;
    info!("Converting {} to {}", format_key(t_start), format_key(t_end));

    let samples = build_samples(
        &wrfout.times(),
        met_em.as_ref().map(FileCatalog::as_map),
        t_start,
        t_end,
        config.window_dt,
    )?;
    check_windows(&samples)?;

    let first_wrfout = wrfout
        .first()
        .ok_or_else(|| ConvertError::configuration("no wrfout files"))?;

    if let Some(parent) = config.output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if config.output_file.exists() {
        warn!(file = %config.output_file.display(), "output file will be replaced");
    }
    let mut writer = ArchiveWriter::create(&config.output_file, &config.case_name, &config.storage)?;

    let era5 = match (&met_em, met_em_fields.is_empty()) {
        (Some(catalog), false) => {
            let first = catalog
                .first()
                .ok_or_else(|| ConvertError::configuration("no met_em files"))?;
            Some(Era5Stage::setup(config, &mut writer, first, &met_em_fields)?)
        }
        _ => None,
    };
    let wrf = WrfStage::setup(config, &mut writer, first_wrfout, &wrf_fields)?;
    write_case_metadata(config, &mut writer)?;

    let bar = progress_bar(config, samples.len());
    for sample in &samples {
        bar.set_message(format_key(sample.timestamp));
        if let (Some(stage), Some(file)) = (&era5, &sample.met_em_file) {
            stage.write_hour(config, &mut writer, file, sample.timestamp)?;
        }
        for window in &sample.wrf_windows {
            wrf.write_window(config, &mut writer, &wrfout, window)?;
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    let wrf_rows = writer.current_row(Subgroup::Wrf);
    let era5_rows = writer.current_row(Subgroup::Era5);
    let output = writer.close()?;
    info!(
        "Wrote {} wrf and {} era5 rows to {} in {:.1}s",
        wrf_rows,
        era5_rows,
        output.display(),
        started.elapsed().as_secs_f64()
    );

    Ok(ConvertSummary {
        output,
        samples: samples.len(),
        wrf_rows,
        era5_rows,
    })
}
