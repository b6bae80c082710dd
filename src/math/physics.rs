//! Diagnostic fields derived from raw WRF variables.
//!
//! All 3-D inputs are `(bottom_top, south_north, west_east)` arrays on the mass grid
//! unless stated otherwise.

use super::{check_same_shape, MathError};
use ndarray::{Array2, Array3, ArrayD, Axis, Ix3, Zip};

/// Physical constants matching the ones used by the WRF diagnostics
#[derive(Debug, Clone, Copy)]
pub struct Constants {
    /// Gravitational acceleration (m/s²)
    pub g: f32,
    /// Gas constant for dry air (J/(kg·K))
    pub r_dry: f32,
    /// Specific heat at constant pressure (J/(kg·K))
    pub cp: f32,
    /// Reference pressure (Pa)
    pub p0: f32,
    /// Rd/Rv
    pub eps: f32,
    /// Base state potential temperature added to the perturbation `T` (K)
    pub theta_base: f32,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            g: 9.81,
            r_dry: 287.0,
            cp: 1004.5,
            p0: 100000.0,
            eps: 0.622,
            theta_base: 300.0,
        }
    }
}

/// Height above ground bands of the low, mid and high cloud classes (m)
pub const CLOUD_THRESHOLDS: [f32; 3] = [300.0, 2000.0, 6000.0];

/// Full pressure in hPa from the perturbation and base state pressure (Pa)
pub fn pressure_hpa(p: &ArrayD<f32>, pb: &ArrayD<f32>) -> Result<ArrayD<f32>, MathError> {
    check_same_shape(p.shape(), pb.shape())?;
    Ok((p + pb) * 0.01)
}

/// Temperature in K from perturbation potential temperature and pressure
pub fn temperature_k(
    theta_pert: &ArrayD<f32>,
    p: &ArrayD<f32>,
    pb: &ArrayD<f32>,
    constants: &Constants,
) -> Result<ArrayD<f32>, MathError> {
    check_same_shape(theta_pert.shape(), p.shape())?;
    check_same_shape(theta_pert.shape(), pb.shape())?;

    let kappa = constants.r_dry / constants.cp;
    Ok(Zip::from(theta_pert)
        .and(p)
        .and(pb)
        .map_collect(|&t, &p, &pb| (t + constants.theta_base) * ((p + pb) / constants.p0).powf(kappa)))
}

/// Geopotential height (m) on the staggered vertical grid
pub fn geopotential_height(
    ph: &ArrayD<f32>,
    phb: &ArrayD<f32>,
    constants: &Constants,
) -> Result<ArrayD<f32>, MathError> {
    check_same_shape(ph.shape(), phb.shape())?;
    Ok((ph + phb) / constants.g)
}

/// Relative humidity (%) from water vapor mixing ratio, full pressure (Pa) and temperature (K)
pub fn relative_humidity(
    qv: &ArrayD<f32>,
    pressure_pa: &ArrayD<f32>,
    tk: &ArrayD<f32>,
    constants: &Constants,
) -> Result<ArrayD<f32>, MathError> {
    check_same_shape(qv.shape(), pressure_pa.shape())?;
    check_same_shape(qv.shape(), tk.shape())?;

    let eps = constants.eps;
    Ok(Zip::from(qv)
        .and(pressure_pa)
        .and(tk)
        .map_collect(|&qv, &p, &t| {
            let es = 6.112 * (17.67 * (t - 273.15) / (t - 29.65)).exp();
            let qvs = eps * es / (0.01 * p - (1.0 - eps) * es);
            100.0 * (qv.max(0.0) / qvs).clamp(0.0, 1.0)
        }))
}

/// Column precipitable water (kg m-2).
///
/// `z_stag` holds the heights of the layer interfaces and has one more level than
/// the mass grid inputs.
pub fn precipitable_water(
    qv: &ArrayD<f32>,
    pressure_pa: &ArrayD<f32>,
    tk: &ArrayD<f32>,
    z_stag: &ArrayD<f32>,
    constants: &Constants,
) -> Result<ArrayD<f32>, MathError> {
    check_same_shape(qv.shape(), pressure_pa.shape())?;
    check_same_shape(qv.shape(), tk.shape())?;

    let qv = qv.view().into_dimensionality::<Ix3>()?;
    let p = pressure_pa.view().into_dimensionality::<Ix3>()?;
    let tk = tk.view().into_dimensionality::<Ix3>()?;
    let zs = z_stag.view().into_dimensionality::<Ix3>()?;

    let (nz, ny, nx) = qv.dim();
    check_same_shape(&[nz + 1, ny, nx], zs.shape())?;

    let eps = constants.eps;
    let mut pw = Array2::<f32>::zeros((ny, nx));
    for ((j, i), out) in pw.indexed_iter_mut() {
        let mut column = 0.0;
        for k in 0..nz {
            let q = qv[[k, j, i]];
            let tv = tk[[k, j, i]] * (eps + q) / (eps * (1.0 + q));
            let rho = p[[k, j, i]] / (constants.r_dry * tv);
            let dz = zs[[k + 1, j, i]] - zs[[k, j, i]];
            column += rho * q * dz;
        }
        *out = column;
    }
    Ok(pw.into_dyn())
}

/// Low, mid and high cloud fraction from relative humidity per height-above-ground band.
///
/// Returns a `(3, south_north, west_east)` array.
pub fn cloud_fraction(rh: &ArrayD<f32>, height_agl: &ArrayD<f32>) -> Result<ArrayD<f32>, MathError> {
    check_same_shape(rh.shape(), height_agl.shape())?;

    let rh = rh.view().into_dimensionality::<Ix3>()?;
    let h = height_agl.view().into_dimensionality::<Ix3>()?;
    let (nz, ny, nx) = rh.dim();
    let [low, mid, high] = CLOUD_THRESHOLDS;

    let mut max_rh = Array3::<f32>::zeros((3, ny, nx));
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let band = match h[[k, j, i]] {
                    z if z > low && z <= mid => 0,
                    z if z > mid && z <= high => 1,
                    z if z > high => 2,
                    _ => continue,
                };
                let cell = &mut max_rh[[band, j, i]];
                *cell = cell.max(rh[[k, j, i]]);
            }
        }
    }

    max_rh.mapv_inplace(|v| (4.0 * v / 100.0 - 3.0).clamp(0.0, 1.0));
    Ok(max_rh.into_dyn())
}

/// Height above ground of every level: `z - ter` broadcast over the vertical axis
pub fn height_above_ground(z: &ArrayD<f32>, ter: &ArrayD<f32>) -> Result<ArrayD<f32>, MathError> {
    let ter = ter.view().into_dimensionality::<ndarray::Ix2>()?;
    let z = z.view().into_dimensionality::<Ix3>()?;
    check_same_shape(&z.shape()[1..], ter.shape())?;

    let mut out = z.to_owned();
    for mut level in out.axis_iter_mut(Axis(0)) {
        level -= &ter;
    }
    Ok(out.into_dyn())
}
