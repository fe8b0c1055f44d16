//! # Utility module

use crate::error::MotionError;
use anyhow::Result;
use ndarray::{Array1, Array2, Array3, ArrayView2, Axis};
use std::cmp::Ordering;

/// Rescale an image to the full `[0, 255]` 8-bit range.
///
/// The image's own minimum maps to 0 and its maximum to 255. A constant image maps to all zeros.
pub fn to_uint8(image: ArrayView2<f64>) -> Array2<u8> {
    let (lo, hi) = image
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    let range = hi - lo;

    if !range.is_finite() || range <= 0.0 {
        return Array2::zeros(image.raw_dim());
    }

    image.mapv(|v| ((v - lo) / range * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Verify that every frame has the spatial shape of the reference image.
pub fn check_frame_dimensions(frames: &Array3<f64>, reference: ArrayView2<f64>) -> Result<()> {
    let (h, w) = reference.dim();
    let (fh, fw, _) = frames.dim();

    if (fh, fw) != (h, w) {
        return Err(MotionError::DimensionMismatch {
            expected: vec![h, w, frames.len_of(Axis(2))],
            found: frames.shape().to_vec(),
        }
        .into());
    }

    Ok(())
}

/// Verify that there is one time stamp per frame, and that stamps strictly increase.
pub fn check_time_stamps(time_stamps: &Array1<f64>, num_frames: usize) -> Result<()> {
    if time_stamps.len() != num_frames {
        return Err(MotionError::DimensionMismatch {
            expected: vec![num_frames],
            found: vec![time_stamps.len()],
        }
        .into());
    }

    match time_stamps
        .windows(2)
        .into_iter()
        .position(|w| w[1].partial_cmp(&w[0]) != Some(Ordering::Greater))
    {
        Some(i) => Err(MotionError::NonIncreasingTimeStamps { index: i + 1 }.into()),
        None => Ok(()),
    }
}
