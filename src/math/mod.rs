pub mod aggregate;
pub mod destagger;
pub mod physics;


pub use aggregate::*;
pub use destagger::*;
pub use physics::*;

use thiserror::Error;

/// Shape problems raised by the array kernels
#[derive(Error, Debug)]
pub enum MathError {
    #[error("axis {axis} out of range for a {ndim}-D array")]
    AxisOutOfRange { axis: usize, ndim: usize },

    #[error("staggered axis of length {len} cannot be destaggered")]
    TooShort { len: usize },

    #[error("no snapshots to aggregate")]
    EmptyInput,

    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("boundary offset {offset} leaves nothing of an axis of length {len}")]
    CropTooLarge { offset: usize, len: usize },

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub(crate) fn check_same_shape(expected: &[usize], found: &[usize]) -> Result<(), MathError> {
    if expected == found {
        Ok(())
    } else {
        Err(MathError::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        })
    }
}
