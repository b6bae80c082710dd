//! Small synthetic wrfout and met_em files for the integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::path::{Path, PathBuf};

pub const NZ: usize = 3;
pub const NY: usize = 6;
pub const NX: usize = 7;
pub const NUM_METGRID_LEVELS: usize = 4;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
}

fn add_map_attributes(file: &mut netcdf::FileMut) {
    file.add_attribute("MAP_PROJ", 1i32).unwrap();
    file.add_attribute("TRUELAT1", 30.0f32).unwrap();
    file.add_attribute("TRUELAT2", 60.0f32).unwrap();
    file.add_attribute("STAND_LON", 8.5f32).unwrap();
    file.add_attribute("MOAD_CEN_LAT", 46.5f32).unwrap();
}

fn filled(len: usize, value: f32) -> Vec<f32> {
    vec![value; len]
}

/// Latitude increasing northwards, longitude eastwards
fn coordinates(ny: usize, nx: usize) -> (Vec<f32>, Vec<f32>) {
    let mut lat = Vec::with_capacity(ny * nx);
    let mut lon = Vec::with_capacity(ny * nx);
    for j in 0..ny {
        for i in 0..nx {
            lat.push(45.0 + 0.1 * j as f32);
            lon.push(8.0 + 0.1 * i as f32);
        }
    }
    (lat, lon)
}

/// wrfout file with a uniform vertical wind `w` and a flat 500 m terrain
pub fn write_wrfout(dir: &Path, time: DateTime<Utc>, w: f32, ny: usize, nx: usize) -> PathBuf {
    let path = dir.join(format!("wrfout_d01_{}", time.format("%Y-%m-%d_%H:%M:%S")));
    let mut file = netcdf::create(&path).unwrap();
    add_map_attributes(&mut file);

    file.add_dimension("Time", 1).unwrap();
    file.add_dimension("bottom_top", NZ).unwrap();
    file.add_dimension("bottom_top_stag", NZ + 1).unwrap();
    file.add_dimension("south_north", ny).unwrap();
    file.add_dimension("west_east", nx).unwrap();

    let (lat, lon) = coordinates(ny, nx);
    let horizontal = ["Time", "south_north", "west_east"];
    let staggered = ["Time", "bottom_top_stag", "south_north", "west_east"];

    let mut var = file.add_variable::<f32>("XLAT", &horizontal).unwrap();
    var.put_values(&lat, ..).unwrap();
    let mut var = file.add_variable::<f32>("XLONG", &horizontal).unwrap();
    var.put_values(&lon, ..).unwrap();
    let mut var = file.add_variable::<f32>("HGT", &horizontal).unwrap();
    var.put_values(&filled(ny * nx, 500.0), ..).unwrap();

    // Geopotential of 500 m + 100 m per staggered level
    let mut phb = Vec::with_capacity((NZ + 1) * ny * nx);
    for k in 0..=NZ {
        phb.extend(filled(ny * nx, 9.81 * (500.0 + 100.0 * k as f32)));
    }
    let mut var = file.add_variable::<f32>("PHB", &staggered).unwrap();
    var.put_attribute("stagger", "Z").unwrap();
    var.put_values(&phb, ..).unwrap();
    let mut var = file.add_variable::<f32>("PH", &staggered).unwrap();
    var.put_attribute("stagger", "Z").unwrap();
    var.put_values(&filled(phb.len(), 0.0), ..).unwrap();

    let mut var = file.add_variable::<f32>("W", &staggered).unwrap();
    var.put_attribute("stagger", "Z").unwrap();
    var.put_values(&filled((NZ + 1) * ny * nx, w), ..).unwrap();

    path
}

/// met_em file with pressure `pres` on every level
pub fn write_met_em(dir: &Path, time: DateTime<Utc>, pres: f32, ny: usize, nx: usize) -> PathBuf {
    let path = dir.join(format!("met_em.d01.{}.nc", time.format("%Y-%m-%d_%H:%M:%S")));
    let mut file = netcdf::create(&path).unwrap();
    add_map_attributes(&mut file);

    file.add_dimension("Time", 1).unwrap();
    file.add_dimension("num_metgrid_levels", NUM_METGRID_LEVELS).unwrap();
    file.add_dimension("south_north", ny).unwrap();
    file.add_dimension("west_east", nx).unwrap();

    let (lat, lon) = coordinates(ny, nx);
    let horizontal = ["Time", "south_north", "west_east"];
    let levels = ["Time", "num_metgrid_levels", "south_north", "west_east"];

    let mut var = file.add_variable::<f32>("XLAT_M", &horizontal).unwrap();
    var.put_values(&lat, ..).unwrap();
    let mut var = file.add_variable::<f32>("XLONG_M", &horizontal).unwrap();
    var.put_values(&lon, ..).unwrap();

    let mask: Vec<f32> = (0..ny * nx).map(|i| (i % 2) as f32).collect();
    let mut var = file.add_variable::<f32>("LANDMASK", &horizontal).unwrap();
    var.put_values(&mask, ..).unwrap();

    let mut ght = Vec::with_capacity(NUM_METGRID_LEVELS * ny * nx);
    for k in 0..NUM_METGRID_LEVELS {
        ght.extend(filled(ny * nx, 1000.0 * k as f32));
    }
    let mut var = file.add_variable::<f32>("GHT", &levels).unwrap();
    var.put_values(&ght, ..).unwrap();

    let mut var = file.add_variable::<f32>("PRES", &levels).unwrap();
    var.put_values(&filled(NUM_METGRID_LEVELS * ny * nx, pres), ..).unwrap();

    path
}

/// Snapshots every five minutes for `hours`, alternating `w` between 10 and 12
pub fn write_wrfout_series(dir: &Path, hours: i64) -> Vec<PathBuf> {
    (0..=hours * 12)
        .map(|i| {
            let time = start_time() + Duration::minutes(5 * i);
            let w = if i % 2 == 1 { 10.0 } else { 12.0 };
            write_wrfout(dir, time, w, NY, NX)
        })
        .collect()
}
