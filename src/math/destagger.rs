use super::MathError;
use ndarray::{ArrayD, Axis, Slice};

/// Grid a WRF/WPS variable lives on, read from its `stagger` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stagger {
    X,
    Y,
    Z,
    U,
    V,
    W,
}

impl Stagger {
    /// `None` for the mass grid (empty attribute, `M` in met_em files, or anything unknown)
    pub fn from_attr(value: &str) -> Option<Self> {
        match value.trim() {
            "X" => Some(Stagger::X),
            "Y" => Some(Stagger::Y),
            "Z" => Some(Stagger::Z),
            "U" => Some(Stagger::U),
            "V" => Some(Stagger::V),
            "W" => Some(Stagger::W),
            _ => None,
        }
    }

    /// Position of the staggered axis counted from the last axis (1 = last)
    pub fn axis_from_end(self) -> usize {
        match self {
            Stagger::X | Stagger::U => 1,
            Stagger::Y | Stagger::V => 2,
            Stagger::Z | Stagger::W => 3,
        }
    }
}

/// Average adjacent points along the staggered axis, shrinking it by one.
///
/// Without a stagger tag the array is returned as is.
pub fn destagger(array: ArrayD<f32>, stagger: Option<Stagger>) -> Result<ArrayD<f32>, MathError> {
    let Some(stagger) = stagger else {
        return Ok(array);
    };

    let ndim = array.ndim();
    let from_end = stagger.axis_from_end();
    if from_end > ndim {
        return Err(MathError::AxisOutOfRange {
            axis: from_end,
            ndim,
        });
    }

    let axis = Axis(ndim - from_end);
    let len = array.len_of(axis);
    if len < 2 {
        return Err(MathError::TooShort { len });
    }

    let lower = array.slice_axis(axis, Slice::from(..len - 1));
    let upper = array.slice_axis(axis, Slice::from(1..));
    Ok((&lower + &upper) * 0.5)
}
