use super::{check_same_shape, MathError};
use crate::config::ReduceOptions;
use crate::fields::AggregationMode;
use ndarray::{ArrayD, Axis, Slice, Zip};

/// Reduce the snapshots of one sub-window to a single array.
///
/// A single snapshot is returned unchanged for both modes.
pub fn aggregate(snapshots: &[ArrayD<f32>], mode: AggregationMode) -> Result<ArrayD<f32>, MathError> {
    let (first, rest) = snapshots.split_first().ok_or(MathError::EmptyInput)?;
    for snapshot in rest {
        check_same_shape(first.shape(), snapshot.shape())?;
    }

    if rest.is_empty() {
        return Ok(first.clone());
    }

    let reduced = match mode {
        AggregationMode::Avg => {
            let mut sum = first.clone();
            for snapshot in rest {
                sum += snapshot;
            }
            sum / snapshots.len() as f32
        }
        AggregationMode::Max => {
            let mut max = first.clone();
            let mut min = first.clone();
            for snapshot in rest {
                Zip::from(&mut max)
                    .and(&mut min)
                    .and(snapshot)
                    .for_each(|hi, lo, &v| {
                        // NaN sticks once seen, like in the average
                        if v.is_nan() || v > *hi {
                            *hi = v;
                        }
                        if v.is_nan() || v < *lo {
                            *lo = v;
                        }
                    });
            }
            Zip::from(&max)
                .and(&min)
                .map_collect(|&hi, &lo| signed_extremum(hi, lo))
        }
    };

    Ok(reduced)
}

/// Whichever of `max` and `min` is larger in magnitude. Ties go to `max`.
///
/// NaN in either propagates, so a missing value in any snapshot yields NaN in both
/// modes.
pub fn signed_extremum(max: f32, min: f32) -> f32 {
    if max.is_nan() || min.is_nan() {
        f32::NAN
    } else if min.abs() > max.abs() {
        min
    } else {
        max
    }
}

/// Keep the first `max_layers` layers of a 3-D array; 0 keeps everything
pub fn truncate_layers(array: ArrayD<f32>, max_layers: usize) -> ArrayD<f32> {
    if max_layers == 0 || array.ndim() != 3 || array.len_of(Axis(0)) <= max_layers {
        return array;
    }
    array.slice_axis(Axis(0), Slice::from(..max_layers)).to_owned()
}

/// Drop `offset` cells from each edge of the two horizontal (last) axes
pub fn crop_horizontal(array: ArrayD<f32>, offset: usize) -> Result<ArrayD<f32>, MathError> {
    if offset == 0 {
        return Ok(array);
    }

    let ndim = array.ndim();
    if ndim < 2 {
        return Err(MathError::AxisOutOfRange { axis: 2, ndim });
    }

    let mut view = array.view();
    for axis in [Axis(ndim - 2), Axis(ndim - 1)] {
        let len = view.len_of(axis);
        if 2 * offset >= len {
            return Err(MathError::CropTooLarge { offset, len });
        }
        view.slice_axis_inplace(axis, Slice::from(offset..len - offset));
    }
    Ok(view.to_owned())
}

/// Layer truncation (only for fields with a model-level axis) followed by boundary cropping
pub fn reduce(array: ArrayD<f32>, options: &ReduceOptions, layered: bool) -> Result<ArrayD<f32>, MathError> {
    let array = if layered {
        truncate_layers(array, options.max_layers)
    } else {
        array
    };
    crop_horizontal(array, options.lbc_offset)
}
