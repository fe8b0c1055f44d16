//! # Dense flow capability
//!
//! Algorithms that produce a full resolution field straight from a pair of images delegate the
//! per-pair computation to a [`DenseFlow`] provider. This module drives such a provider over a
//! whole frame stack.

use crate::error::MotionError;
use crate::flow::stack_fields;
use crate::utils::{check_frame_dimensions, check_time_stamps, to_uint8};
use anyhow::Result;
use log::*;
use ndarray::{Array1, Array3, Array4, ArrayView2, Axis};
use rayon::prelude::*;

/// Dense optical flow capability, parameterised by the algorithm's settings.
pub trait DenseFlow<P>: Send + Sync {
    /// Compute the flow from `reference` to `image`.
    ///
    /// Returns a `(height, width, 2)` array, x displacement first.
    fn calc(&self, reference: ArrayView2<u8>, image: ArrayView2<u8>, params: &P) -> Result<Array3<f64>>;
}

fn check_field(field: &Array3<f64>, (h, w): (usize, usize)) -> Result<()> {
    if field.dim() != (h, w, 2) {
        return Err(MotionError::DimensionMismatch {
            expected: vec![h, w, 2],
            found: field.shape().to_vec(),
        }
        .into());
    }
    Ok(())
}

/// Flow of a single pair, checked for shape.
pub(crate) fn pair<P>(
    provider: &dyn DenseFlow<P>,
    params: &P,
    image: ArrayView2<f64>,
    reference: ArrayView2<f64>,
) -> Result<Array3<f64>> {
    let field = provider.calc(to_uint8(reference).view(), to_uint8(image).view(), params)?;
    check_field(&field, reference.dim())?;
    Ok(field)
}

/// Flow of every frame relative to the reference, `(height, width, 2, time)`.
pub(crate) fn displacements<P: Sync>(
    provider: &dyn DenseFlow<P>,
    params: &P,
    frames: &Array3<f64>,
    reference: ArrayView2<f64>,
) -> Result<Array4<f64>> {
    check_frame_dimensions(frames, reference)?;

    let size = reference.dim();
    let reference = to_uint8(reference);

    let fields = (0..frames.len_of(Axis(2)))
        .into_par_iter()
        .map(|i| {
            let image = to_uint8(frames.index_axis(Axis(2), i));
            provider
                .calc(reference.view(), image.view(), params)
                .and_then(|f| check_field(&f, size).map(|_| f))
                .map_err(|e| worker_failed(i, e))
        })
        .collect::<Result<Vec<_>>>()?;

    stack_fields(&fields, size)
}

/// Flow between consecutive frames divided by their time interval, `(height, width, 2, time - 1)`.
pub(crate) fn velocities<P: Sync>(
    provider: &dyn DenseFlow<P>,
    params: &P,
    frames: &Array3<f64>,
    time_stamps: &Array1<f64>,
) -> Result<Array4<f64>> {
    let (h, w, num_frames) = frames.dim();

    check_time_stamps(time_stamps, num_frames)?;

    debug!("Velocities over {} frame pairs", num_frames.saturating_sub(1));

    let images = frames
        .axis_iter(Axis(2))
        .map(to_uint8)
        .collect::<Vec<_>>();

    let fields = (1..num_frames)
        .into_par_iter()
        .map(|i| {
            let dt = time_stamps[i] - time_stamps[i - 1];
            provider
                .calc(images[i - 1].view(), images[i].view(), params)
                .and_then(|f| check_field(&f, (h, w)).map(|_| f / dt))
                .map_err(|e| worker_failed(i, e))
        })
        .collect::<Result<Vec<_>>>()?;

    stack_fields(&fields, (h, w))
}

fn worker_failed(frame: usize, err: anyhow::Error) -> anyhow::Error {
    MotionError::WorkerFailed {
        frame,
        message: err.to_string(),
    }
    .into()
}
