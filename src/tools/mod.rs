//! Helpers around a WPS/WRF run that do not touch the conversion archive.

pub mod geo_patch;
pub mod index_file;
pub mod mapfac;
pub mod runtime;

pub use geo_patch::{plan_geo_patch, GeoPatchPlan};
pub use index_file::{fix_index_file, rewrite_resolution, DEFAULT_RESOLUTION};
pub use mapfac::{check_mapfac_folder, MapfacReport};
pub use runtime::{parse_runtime_log, DomainRuntime, RuntimeSummary};
