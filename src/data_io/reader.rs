use crate::math::{self, Constants, MathError, Stagger};
use crate::projection::WrfProjection;
use ndarray::{Array, ArrayD, Axis, IxDyn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("NetCDF error: {0}")]
    Netcdf(#[from] netcdf::Error),

    #[error("Field {field} not found in {file}")]
    FieldNotFound { field: String, file: String },

    #[error("Dimension {dimension} not found in {file}")]
    MissingDimension { dimension: String, file: String },

    #[error("Data conversion error: {0}")]
    ConversionError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Cannot derive field: {0}")]
    Math(#[from] MathError),
}

/// A field on the unstaggered grid, ready for aggregation
#[derive(Debug, Clone)]
pub struct GriddedArray {
    pub data: ArrayD<f32>,
    /// Stagger of the source variable before destaggering
    pub stagger: Option<Stagger>,
    /// PROJ.4 definition of the model grid, when the source carries WRF map attributes
    pub projection: Option<String>,
}

/// Read access to the variables of one gridded WRF or WPS file.
///
/// Raw variables are returned without their leading `Time` axis.
pub trait FieldSource {
    /// Name used in error messages, usually the file path
    fn description(&self) -> String;

    fn has_variable(&self, name: &str) -> bool;

    /// Raw variable data together with its `stagger` attribute
    fn raw_variable(&self, name: &str) -> Result<(ArrayD<f32>, Option<Stagger>), ReaderError>;

    fn dimension_len(&self, name: &str) -> Result<usize, ReaderError>;

    /// Numeric global attribute (first element for array attributes)
    fn global_attribute(&self, name: &str) -> Option<f64>;

    fn field_not_found(&self, field: &str) -> ReaderError {
        ReaderError::FieldNotFound {
            field: field.to_string(),
            file: self.description(),
        }
    }
}

/// Read-only netCDF file. The handle is closed when the source is dropped.
pub struct NetCdfSource {
    path: PathBuf,
    file: netcdf::File,
}

impl NetCdfSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ReaderError::FileNotFound(path.display().to_string()));
        }
        trace!(file = %path.display(), "opening source file");
        Ok(Self {
            path: path.to_path_buf(),
            file: netcdf::open(path)?,
        })
    }
}

impl FieldSource for NetCdfSource {
    fn description(&self) -> String {
        self.path.display().to_string()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.file.variable(name).is_some()
    }

    fn raw_variable(&self, name: &str) -> Result<(ArrayD<f32>, Option<Stagger>), ReaderError> {
        let var = self
            .file
            .variable(name)
            .ok_or_else(|| self.field_not_found(name))?;

        let raw_data: Vec<f32> = var.get_values(..)?;
        let dims = var.dimensions();
        let shape: Vec<usize> = dims.iter().map(|d| d.len()).collect();
        let mut array = Array::from_shape_vec(IxDyn(&shape), raw_data)
            .map_err(|e| ReaderError::ConversionError(format!("{}: {}", name, e)))?;

        if dims.first().map(|d| d.name() == "Time").unwrap_or(false) && shape[0] == 1 {
            array = array.index_axis_move(Axis(0), 0);
        }

        let stagger = var
            .attribute("stagger")
            .and_then(|attr| attr.value().ok())
            .and_then(|value| match value {
                netcdf::AttributeValue::Str(s) => Stagger::from_attr(&s),
                _ => None,
            });

        Ok((array, stagger))
    }

    fn dimension_len(&self, name: &str) -> Result<usize, ReaderError> {
        self.file
            .dimension(name)
            .map(|d| d.len())
            .ok_or_else(|| ReaderError::MissingDimension {
                dimension: name.to_string(),
                file: self.description(),
            })
    }

    fn global_attribute(&self, name: &str) -> Option<f64> {
        use netcdf::AttributeValue as V;
        let value = self.file.attribute(name)?.value().ok()?;
        match value {
            V::Uchar(v) => Some(f64::from(v)),
            V::Schar(v) => Some(f64::from(v)),
            V::Ushort(v) => Some(f64::from(v)),
            V::Short(v) => Some(f64::from(v)),
            V::Uint(v) => Some(f64::from(v)),
            V::Int(v) => Some(f64::from(v)),
            V::Float(v) => Some(f64::from(v)),
            V::Double(v) => Some(v),
            V::Ints(v) => v.first().map(|&x| f64::from(x)),
            V::Floats(v) => v.first().map(|&x| f64::from(x)),
            V::Doubles(v) => v.first().copied(),
            _ => None,
        }
    }
}

/// In-memory source, handy for exercising the diagnostics without files
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    pub name: String,
    pub variables: HashMap<String, (ArrayD<f32>, Option<Stagger>)>,
    pub dimensions: HashMap<String, usize>,
    pub attributes: HashMap<String, f64>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, name: &str, data: ArrayD<f32>, stagger: Option<Stagger>) -> Self {
        self.variables.insert(name.to_string(), (data, stagger));
        self
    }

    pub fn with_dimension(mut self, name: &str, len: usize) -> Self {
        self.dimensions.insert(name.to_string(), len);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: f64) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }
}

impl FieldSource for MemorySource {
    fn description(&self) -> String {
        self.name.clone()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    fn raw_variable(&self, name: &str) -> Result<(ArrayD<f32>, Option<Stagger>), ReaderError> {
        self.variables
            .get(name)
            .cloned()
            .ok_or_else(|| self.field_not_found(name))
    }

    fn dimension_len(&self, name: &str) -> Result<usize, ReaderError> {
        self.dimensions
            .get(name)
            .copied()
            .ok_or_else(|| ReaderError::MissingDimension {
                dimension: name.to_string(),
                file: self.description(),
            })
    }

    fn global_attribute(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).copied()
    }
}

/// Names `extract` computes from raw variables instead of reading them directly
pub const DIAGNOSTICS: [&str; 13] = [
    "ua", "va", "wa", "pressure", "tk", "z", "ter", "height_agl", "rh", "pw", "cloudfrac", "lat",
    "lon",
];

/// Read `name` from `source` on the unstaggered grid.
///
/// `name` is either a diagnostic from [`DIAGNOSTICS`] or a raw variable, which is
/// destaggered according to its `stagger` attribute.
pub fn extract(source: &dyn FieldSource, name: &str) -> Result<GriddedArray, ReaderError> {
    let (data, stagger) = if DIAGNOSTICS.contains(&name) {
        (diagnostic(source, name)?, None)
    } else {
        let (raw, stagger) = source.raw_variable(name)?;
        (math::destagger(raw, stagger)?, stagger)
    };

    Ok(GriddedArray {
        data,
        stagger,
        projection: WrfProjection::from_source(source).map(|p| p.proj4()),
    })
}

fn destaggered(source: &dyn FieldSource, name: &str) -> Result<ArrayD<f32>, ReaderError> {
    let (raw, stagger) = source.raw_variable(name)?;
    Ok(math::destagger(raw, stagger)?)
}

/// First variable of `candidates` present in the source
fn first_present<'a>(
    source: &dyn FieldSource,
    field: &str,
    candidates: &[&'a str],
) -> Result<&'a str, ReaderError> {
    candidates
        .iter()
        .copied()
        .find(|c| source.has_variable(c))
        .ok_or_else(|| source.field_not_found(field))
}

fn full_pressure_pa(source: &dyn FieldSource) -> Result<ArrayD<f32>, ReaderError> {
    let p = destaggered(source, "P")?;
    let pb = destaggered(source, "PB")?;
    Ok(math::pressure_hpa(&p, &pb)? * 100.0)
}

fn temperature(source: &dyn FieldSource, constants: &Constants) -> Result<ArrayD<f32>, ReaderError> {
    let t = destaggered(source, "T")?;
    let p = destaggered(source, "P")?;
    let pb = destaggered(source, "PB")?;
    Ok(math::temperature_k(&t, &p, &pb, constants)?)
}

fn staggered_height(source: &dyn FieldSource, constants: &Constants) -> Result<ArrayD<f32>, ReaderError> {
    let (ph, _) = source.raw_variable("PH")?;
    let (phb, _) = source.raw_variable("PHB")?;
    Ok(math::geopotential_height(&ph, &phb, constants)?)
}

fn height(source: &dyn FieldSource, constants: &Constants) -> Result<ArrayD<f32>, ReaderError> {
    if source.has_variable("GHT") {
        return destaggered(source, "GHT");
    }
    Ok(math::destagger(staggered_height(source, constants)?, Some(Stagger::Z))?)
}

fn terrain(source: &dyn FieldSource) -> Result<ArrayD<f32>, ReaderError> {
    destaggered(source, first_present(source, "ter", &["HGT", "HGT_M"])?)
}

fn height_agl(source: &dyn FieldSource, constants: &Constants) -> Result<ArrayD<f32>, ReaderError> {
    let z = height(source, constants)?;
    let ter = terrain(source)?;
    Ok(math::height_above_ground(&z, &ter)?)
}

fn relative_humidity(source: &dyn FieldSource, constants: &Constants) -> Result<ArrayD<f32>, ReaderError> {
    if !source.has_variable("QVAPOR") && source.has_variable("RH") {
        return destaggered(source, "RH");
    }
    let qv = destaggered(source, "QVAPOR")?;
    let p = full_pressure_pa(source)?;
    let tk = temperature(source, constants)?;
    Ok(math::relative_humidity(&qv, &p, &tk, constants)?)
}

fn diagnostic(source: &dyn FieldSource, name: &str) -> Result<ArrayD<f32>, ReaderError> {
    let constants = Constants::default();
    trace!(field = name, file = %source.description(), "computing diagnostic");

    match name {
        "ua" => destaggered(source, first_present(source, name, &["U", "UU"])?),
        "va" => destaggered(source, first_present(source, name, &["V", "VV"])?),
        "wa" => destaggered(source, "W"),
        "pressure" => {
            if source.has_variable("PRES") && !source.has_variable("PB") {
                Ok(destaggered(source, "PRES")? * 0.01)
            } else {
                let p = destaggered(source, "P")?;
                let pb = destaggered(source, "PB")?;
                Ok(math::pressure_hpa(&p, &pb)?)
            }
        }
        "tk" => {
            if source.has_variable("TT") && !source.has_variable("T") {
                destaggered(source, "TT")
            } else {
                temperature(source, &constants)
            }
        }
        "z" => height(source, &constants),
        "ter" => terrain(source),
        "height_agl" => height_agl(source, &constants),
        "rh" => relative_humidity(source, &constants),
        "pw" => {
            let qv = destaggered(source, "QVAPOR")?;
            let p = full_pressure_pa(source)?;
            let tk = temperature(source, &constants)?;
            let z_stag = staggered_height(source, &constants)?;
            Ok(math::precipitable_water(&qv, &p, &tk, &z_stag, &constants)?)
        }
        "cloudfrac" => {
            let rh = relative_humidity(source, &constants)?;
            let agl = height_agl(source, &constants)?;
            Ok(math::cloud_fraction(&rh, &agl)?)
        }
        "lat" => destaggered(source, first_present(source, name, &["XLAT", "XLAT_M"])?),
        "lon" => destaggered(source, first_present(source, name, &["XLONG", "XLONG_M"])?),
        _ => Err(source.field_not_found(name)),
    }
}
