//! Field tables for the conversion.
//!
//! Every field the converter can emit is a variant of [`WrfField`] or [`MetEmField`].
//! The attached [`FieldSpec`] is the schema contract shared by the reader, the
//! aggregator and the archive writer.

use crate::error::ConvertError;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

/// Reduction applied to the snapshots of one sub-window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AggregationMode {
    /// Elementwise arithmetic mean
    Avg,
    /// Signed extremum: the larger of |max| and |min| with its sign, ties go to max
    Max,
}

impl AggregationMode {
    /// Parse a mode name, rejecting anything but `avg` and `max`
    pub fn parse(name: &str) -> Result<Self, ConvertError> {
        name.parse()
            .map_err(|_| ConvertError::UnsupportedMode(name.to_string()))
    }

    pub fn variable_suffix(self) -> &'static str {
        match self {
            AggregationMode::Avg => "",
            AggregationMode::Max => "_max",
        }
    }

    /// Archive variable name of `field` reduced with this mode
    pub fn variable_name(self, field: &str) -> String {
        format!("{}{}", field, self.variable_suffix())
    }
}

/// Numeric type of an archive variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    F32,
    U8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Time invariant, written once when the archive is set up
    Static,
    /// Written once per row with every listed reduction
    Dynamic { modes: &'static [AggregationMode] },
}

/// Immutable description of one output field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Output variable name
    pub name: &'static str,
    /// Variable or diagnostic name in the source file
    pub source: &'static str,
    pub kind: FieldKind,
    pub unit: &'static str,
    pub description: &'static str,
    /// Output dimension order
    pub dims: &'static [&'static str],
    pub storage: StorageType,
}

impl FieldSpec {
    pub fn is_static(&self) -> bool {
        matches!(self.kind, FieldKind::Static)
    }

    pub fn modes(&self) -> &'static [AggregationMode] {
        match self.kind {
            FieldKind::Static => &[],
            FieldKind::Dynamic { modes } => modes,
        }
    }

    /// Reductions of this field that are among `enabled`
    pub fn modes_in(&self, enabled: &[AggregationMode]) -> Vec<AggregationMode> {
        self.modes().iter().copied().filter(|m| enabled.contains(m)).collect()
    }

    /// Names of every archive variable this field produces with the `enabled` reductions
    pub fn variable_names(&self, enabled: &[AggregationMode]) -> Vec<String> {
        if self.is_static() {
            vec![self.name.to_string()]
        } else {
            self.modes_in(enabled).iter().map(|m| m.variable_name(self.name)).collect()
        }
    }
}

const AVG: &[AggregationMode] = &[AggregationMode::Avg];
const AVG_MAX: &[AggregationMode] = &[AggregationMode::Avg, AggregationMode::Max];

const TIME_Z_LAT_LON: &[&str] = &["time", "z", "lat", "lon"];
const TIME_LAT_LON: &[&str] = &["time", "lat", "lon"];
const TIME_ZCLOUD_LAT_LON: &[&str] = &["time", "z_cloud", "lat", "lon"];
const Z_LAT_LON: &[&str] = &["z", "lat", "lon"];
const LAT_LON: &[&str] = &["lat", "lon"];
const MONTH_LAT_LON: &[&str] = &["month", "lat", "lon"];
const CAT16_LAT_LON: &[&str] = &["category16", "lat", "lon"];
const CAT21_LAT_LON: &[&str] = &["category21", "lat", "lon"];

/// Fields taken from the wrfout files
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter, IntoStaticStr)]
pub enum WrfField {
    T,
    P,
    U,
    V,
    W,
    RH,
    PW,
    ZREL,
    HGT,
    CLOUDFRAC,
    CLDFRA,
    QCLOUD,
    QRAIN,
    QICE,
    QSNOW,
    QGRAUP,
    QVAPOR,
}

impl WrfField {
    pub fn spec(self) -> FieldSpec {
        use WrfField::*;
        let (source, kind, unit, description, dims) = match self {
            T => ("tk", dynamic(AVG), "K", "Temperature", TIME_Z_LAT_LON),
            P => ("pressure", dynamic(AVG), "hPa", "Pressure", TIME_Z_LAT_LON),
            U => ("ua", dynamic(AVG_MAX), "m s-1", "U-wind component", TIME_Z_LAT_LON),
            V => ("va", dynamic(AVG_MAX), "m s-1", "V-wind component", TIME_Z_LAT_LON),
            W => ("wa", dynamic(AVG_MAX), "m s-1", "W-wind component", TIME_Z_LAT_LON),
            RH => ("rh", dynamic(AVG), "%", "Relative humidity", TIME_Z_LAT_LON),
            PW => ("pw", dynamic(AVG), "kg m-2", "Precipitable water", TIME_LAT_LON),
            ZREL => (
                "height_agl",
                FieldKind::Static,
                "m",
                "Model height - [AGL] (mass grid)",
                Z_LAT_LON,
            ),
            HGT => ("ter", FieldKind::Static, "m", "Terrain height", LAT_LON),
            CLOUDFRAC => (
                "cloudfrac",
                dynamic(AVG),
                "%",
                "Low, mid, high clouds",
                TIME_ZCLOUD_LAT_LON,
            ),
            CLDFRA => (
                "CLDFRA",
                dynamic(AVG),
                "%",
                "Cloud fraction at model levels",
                TIME_Z_LAT_LON,
            ),
            QCLOUD => ("QCLOUD", dynamic(AVG), "kg kg-1", "Cloud water mixing ratio", TIME_Z_LAT_LON),
            QRAIN => ("QRAIN", dynamic(AVG), "kg kg-1", "Rain water mixing ratio", TIME_Z_LAT_LON),
            QICE => ("QICE", dynamic(AVG), "kg kg-1", "Ice mixing ratio", TIME_Z_LAT_LON),
            QSNOW => ("QSNOW", dynamic(AVG), "kg kg-1", "Snow mixing ratio", TIME_Z_LAT_LON),
            QGRAUP => ("QGRAUP", dynamic(AVG), "kg kg-1", "Graupel mixing ratio", TIME_Z_LAT_LON),
            QVAPOR => ("QVAPOR", dynamic(AVG), "kg kg-1", "Water vapor mixing ratio", TIME_Z_LAT_LON),
        };
        FieldSpec {
            name: self.into(),
            source,
            kind,
            unit,
            description,
            dims,
            storage: StorageType::F32,
        }
    }
}

/// Fields taken from the met_em reference files
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr, EnumIter, IntoStaticStr)]
pub enum MetEmField {
    PRES,
    GHT,
    SM100289,
    SM028100,
    SM007028,
    SM000007,
    ST100289,
    ST028100,
    ST007028,
    ST000007,
    SNOW,
    SST,
    SEAICE,
    SKINTEMP,
    PMSL,
    PSFC,
    LANDSEA,
    RH,
    UU,
    VV,
    TT,
    SNOALB,
    LAI12M,
    GREENFRAC,
    ALBEDO12M,
    SCB_DOM,
    SOILCBOT,
    SCT_DOM,
    SOILCTOP,
    HGT_M,
    LU_INDEX,
    LANDUSEF,
    LANDMASK,
}

impl MetEmField {
    pub fn spec(self) -> FieldSpec {
        use MetEmField::*;
        use StorageType::{F32, U8};
        let stat = FieldKind::Static;
        let dynm = FieldKind::Dynamic { modes: AVG };
        let (kind, unit, description, dims, storage) = match self {
            PRES => (dynm, "Pa", "Pressure", TIME_Z_LAT_LON, F32),
            GHT => (stat, "m", "Height", Z_LAT_LON, F32),
            SM100289 => (dynm, "m3 m-3", "Soil moisture of 100-289 cm ground layer", TIME_LAT_LON, F32),
            SM028100 => (dynm, "m3 m-3", "Soil moisture of 28-100 cm ground layer", TIME_LAT_LON, F32),
            SM007028 => (dynm, "m3 m-3", "Soil moisture of 7-28 cm ground layer", TIME_LAT_LON, F32),
            SM000007 => (dynm, "m3 m-3", "Soil moisture of 0-7 cm ground layer", TIME_LAT_LON, F32),
            ST100289 => (dynm, "K", "Soil temperature of 100-289 cm ground layer", TIME_LAT_LON, F32),
            ST028100 => (dynm, "K", "Soil temperature of 28-100 cm ground layer", TIME_LAT_LON, F32),
            ST007028 => (dynm, "K", "Soil temperature of 7-28 cm ground layer", TIME_LAT_LON, F32),
            ST000007 => (dynm, "K", "Soil temperature of 0-7 cm ground layer", TIME_LAT_LON, F32),
            SNOW => (dynm, "kg m-2", "Water Equivalent of Accumulated Snow Depth", TIME_LAT_LON, F32),
            SST => (dynm, "K", "Sea-Surface Temperature", TIME_LAT_LON, F32),
            SEAICE => (dynm, "0/1 Flag", "Sea-Ice-Flag", TIME_LAT_LON, U8),
            SKINTEMP => (dynm, "K", "Skin Temperature", TIME_LAT_LON, F32),
            PMSL => (dynm, "Pa", "Sea-level Pressure", TIME_LAT_LON, F32),
            PSFC => (dynm, "Pa", "Surface Pressure", TIME_LAT_LON, F32),
            LANDSEA => (stat, "0/1 Flag", "Land/Sea flag", LAT_LON, U8),
            RH => (dynm, "%", "Relative Humidity", TIME_Z_LAT_LON, F32),
            UU => (dynm, "m s-1", "U-wind component", TIME_Z_LAT_LON, F32),
            VV => (dynm, "m s-1", "V-wind component", TIME_Z_LAT_LON, F32),
            TT => (dynm, "K", "Temperature", TIME_Z_LAT_LON, F32),
            SNOALB => (stat, "%", "MODIS maximum snow albedo", LAT_LON, F32),
            LAI12M => (stat, "m^2/m^2", "MODIS LAI", MONTH_LAT_LON, F32),
            GREENFRAC => (stat, "%", "MODIS FPAR", MONTH_LAT_LON, F32),
            ALBEDO12M => (stat, "%", "Monthly MODIS surface albedo", MONTH_LAT_LON, F32),
            SCB_DOM => (stat, "category", "Dominant soil category bottom", LAT_LON, U8),
            SOILCBOT => (stat, "category", "16-category bottom-layer soil type", CAT16_LAT_LON, U8),
            SCT_DOM => (stat, "category", "Dominant soil category top", LAT_LON, U8),
            SOILCTOP => (stat, "category", "16-category top-layer soil type", CAT16_LAT_LON, U8),
            HGT_M => (stat, "meter MSL", "Ensemble DTM 1-arc-second topography height", LAT_LON, F32),
            LU_INDEX => (stat, "category", "Dominant category", LAT_LON, U8),
            LANDUSEF => (stat, "category", "Noah-modified 21-category IGBP-MODIS landuse", CAT21_LAT_LON, U8),
            LANDMASK => (stat, "0/1 Flag", "Landmask : 1=land, 0=water", LAT_LON, U8),
        };
        FieldSpec {
            name: self.into(),
            source: self.into(),
            kind,
            unit,
            description,
            dims,
            storage,
        }
    }
}

const fn dynamic(modes: &'static [AggregationMode]) -> FieldKind {
    FieldKind::Dynamic { modes }
}

/// Parse a list of field names, reporting every unsupported name at once
pub fn parse_field_list<F: FromStr>(names: &[String], label: &str) -> Result<Vec<F>, ConvertError> {
    let mut fields = Vec::with_capacity(names.len());
    let mut unsupported = Vec::new();

    for name in names {
        match name.parse::<F>() {
            Ok(field) => fields.push(field),
            Err(_) => unsupported.push(name.as_str()),
        }
    }

    if unsupported.is_empty() {
        Ok(fields)
    } else {
        Err(ConvertError::configuration(format!(
            "{} property not supported: {}",
            label,
            unsupported.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_aggregation_mode_parse() {
        assert_eq!(AggregationMode::parse("avg").unwrap(), AggregationMode::Avg);
        assert_eq!(AggregationMode::parse("max").unwrap(), AggregationMode::Max);
        assert!(matches!(
            AggregationMode::parse("median"),
            Err(ConvertError::UnsupportedMode(m)) if m == "median"
        ));
    }

    #[test]
    fn test_variable_names_follow_modes() {
        let all = [AggregationMode::Avg, AggregationMode::Max];
        assert_eq!(WrfField::U.spec().variable_names(&all), vec!["U", "U_max"]);
        assert_eq!(WrfField::QVAPOR.spec().variable_names(&all), vec!["QVAPOR"]);
        assert_eq!(WrfField::HGT.spec().variable_names(&all), vec!["HGT"]);

        let max_only = [AggregationMode::Max];
        assert_eq!(WrfField::U.spec().variable_names(&max_only), vec!["U_max"]);
        assert!(WrfField::QVAPOR.spec().variable_names(&max_only).is_empty());
        assert_eq!(WrfField::HGT.spec().variable_names(&max_only), vec!["HGT"]);
    }

    #[test]
    fn test_dynamic_fields_lead_with_time() {
        for field in WrfField::iter() {
            let spec = field.spec();
            assert_eq!(spec.dims.first() == Some(&"time"), !spec.is_static(), "{}", spec.name);
            assert_eq!(spec.dims[spec.dims.len() - 2..], ["lat", "lon"]);
        }
        for field in MetEmField::iter() {
            let spec = field.spec();
            assert_eq!(spec.dims.first() == Some(&"time"), !spec.is_static(), "{}", spec.name);
            assert_eq!(spec.source, spec.name);
        }
    }

    #[test]
    fn test_parse_field_list_reports_all_unsupported() {
        let names: Vec<String> = ["U", "FOO", "W", "BAR"].iter().map(|s| s.to_string()).collect();
        let err = parse_field_list::<WrfField>(&names, "WRF").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("FOO") && msg.contains("BAR"));
        assert!(matches!(err, ConvertError::Configuration(_)));

        let names: Vec<String> = ["PRES", "LANDMASK"].iter().map(|s| s.to_string()).collect();
        let fields = parse_field_list::<MetEmField>(&names, "MET_EM").unwrap();
        assert_eq!(fields, vec![MetEmField::PRES, MetEmField::LANDMASK]);
        assert_eq!(MetEmField::LANDMASK.spec().storage, StorageType::U8);
    }
}
