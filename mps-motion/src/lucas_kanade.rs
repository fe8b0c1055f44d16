//! # Sparse Lucas-Kanade tracking
//!
//! Lucas, B. D., & Kanade, T. (1981). An iterative image registration technique with an
//! application to stereo vision.
//!
//! A regular grid of points is laid over the reference image and every frame is tracked against
//! it. The resulting sparse displacements are then reconstructed into a dense field, either by
//! reshaping them into the grid (optionally upsampling it to full resolution), or by RBF
//! interpolation.

use crate::error::MotionError;
use crate::flow::{stack_fields, Flow, FlowField};
use crate::properties::*;
use crate::pyr_lk::PyramidalLk;
use crate::scaling::{rbfinterp2d, reshape_grid, resize_flow, ReferenceGrid};
use crate::utils::{check_frame_dimensions, to_uint8};
use anyhow::Result;
use log::*;
use nalgebra as na;
use ndarray::{Array2, Array3, Array4, ArrayView2, Axis};
use rayon::prelude::*;
use std::sync::Arc;

/// Output of a point tracking pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackedPoints {
    /// Tracked positions in the next image.
    pub points: Vec<na::Point2<f32>>,
    /// 1 if the point was found, 0 otherwise.
    pub status: Vec<u8>,
    /// Tracking error of each point.
    pub error: Vec<f32>,
}

impl TrackedPoints {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: Vec::with_capacity(capacity),
            status: Vec::with_capacity(capacity),
            error: Vec::with_capacity(capacity),
        }
    }
}

/// Pyramidal tracking parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LkParams {
    /// Side length of the square search window.
    pub win_size: usize,
    /// Highest pyramid level, 0 disables the pyramid.
    pub max_level: usize,
    /// Iteration cap per pyramid level.
    pub max_iter: usize,
    /// Stop iterating once the update is shorter than this.
    pub epsilon: f32,
}

impl Default for LkParams {
    fn default() -> Self {
        Self {
            win_size: 15,
            max_level: 2,
            max_iter: 10,
            epsilon: 0.03,
        }
    }
}

/// Sparse point tracking capability.
pub trait PointTracker: Send + Sync {
    /// Track points from `prev` into `next`.
    ///
    /// The output holds exactly one entry per input point, in input order.
    fn track(
        &self,
        prev: ArrayView2<u8>,
        next: ArrayView2<u8>,
        points: &[na::Point2<f32>],
        params: &LkParams,
    ) -> Result<TrackedPoints>;
}

/// Grid based Lucas-Kanade flow.
#[derive(Clone)]
pub struct LucasKanade {
    params: LkParams,
    step: usize,
    interpolate: bool,
    resize: bool,
    tracker: Arc<dyn PointTracker>,
}

impl Default for LucasKanade {
    fn default() -> Self {
        Self::new(Arc::new(PyramidalLk))
    }
}

impl Properties for LucasKanade {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            (
                "win_size",
                PropertyMut::usize(&mut self.params.win_size, 3, 101),
            ),
            (
                "max_level",
                PropertyMut::usize(&mut self.params.max_level, 0, 8),
            ),
            (
                "max_iter",
                PropertyMut::usize(&mut self.params.max_iter, 1, 1000),
            ),
            (
                "epsilon",
                PropertyMut::float(&mut self.params.epsilon, 0.0, 10.0),
            ),
            ("step", PropertyMut::usize(&mut self.step, 1, 1024)),
            ("interpolate", PropertyMut::bool(&mut self.interpolate)),
            ("resize", PropertyMut::bool(&mut self.resize)),
        ]
    }
}

impl LucasKanade {
    pub fn new(tracker: Arc<dyn PointTracker>) -> Self {
        Self {
            params: LkParams::default(),
            step: 16,
            interpolate: false,
            resize: true,
            tracker,
        }
    }

    pub fn params(&self) -> &LkParams {
        &self.params
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn interpolate(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    pub fn resize(mut self, resize: bool) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = step.max(1);
        self
    }

    /// Track grid points from the reference into the image.
    ///
    /// Returns `(n, 2)` displacements, tracked position minus grid position.
    fn track_grid(
        &self,
        image: ArrayView2<u8>,
        reference: ArrayView2<u8>,
        grid: &ReferenceGrid,
    ) -> Result<Array2<f64>> {
        let tracked = self
            .tracker
            .track(reference, image, &grid.points, &self.params)?;

        if tracked.points.len() != grid.len() {
            return Err(MotionError::DimensionMismatch {
                expected: vec![grid.len(), 2],
                found: vec![tracked.points.len(), 2],
            }
            .into());
        }

        let lost = tracked.status.iter().filter(|&&s| s == 0).count();
        if lost > 0 {
            warn!("{lost} of {} points lost", grid.len());
        }

        Ok(Array2::from_shape_fn((grid.len(), 2), |(i, c)| {
            let d = tracked.points[i] - grid.points[i];
            d[c] as f64
        }))
    }

    /// Turn grid displacements into a field.
    fn reconstruct(
        &self,
        grid: &ReferenceGrid,
        flow: ArrayView2<f64>,
        size: (usize, usize),
    ) -> Result<Array3<f64>> {
        if self.interpolate {
            return rbfinterp2d(&grid.points, flow, size.0, size.1);
        }

        let coarse = reshape_grid(grid, flow)?;

        if self.resize {
            Ok(resize_flow(&coarse, size))
        } else {
            Ok(coarse)
        }
    }
}

impl Flow for LucasKanade {
    fn name(&self) -> &'static str {
        "lucas_kanade"
    }

    fn flow(&self, image: ArrayView2<f64>, reference: ArrayView2<f64>) -> Result<FlowField> {
        let size = reference.dim();
        let grid = ReferenceGrid::uniform(size.0, size.1, self.step);
        let flow = self.track_grid(to_uint8(image).view(), to_uint8(reference).view(), &grid)?;

        if self.interpolate || self.resize {
            self.reconstruct(&grid, flow.view(), size)
                .map(FlowField::Dense)
        } else {
            Ok(FlowField::Sparse {
                points: grid.points,
                flow,
            })
        }
    }

    fn get_displacements(
        &self,
        frames: &Array3<f64>,
        reference: ArrayView2<f64>,
    ) -> Result<Array4<f64>> {
        info!("Get displacements using Lucas Kanade");

        check_frame_dimensions(frames, reference)?;

        let size = reference.dim();
        let grid = ReferenceGrid::uniform(size.0, size.1, self.step);
        let reference = to_uint8(reference);
        let num_frames = frames.len_of(Axis(2));

        debug!(
            "Tracking {} grid points ({}x{}) over {num_frames} frames",
            grid.len(),
            grid.nx,
            grid.ny
        );

        let flows = (0..num_frames)
            .into_par_iter()
            .map(|i| {
                let image = to_uint8(frames.index_axis(Axis(2), i));
                self.track_grid(image.view(), reference.view(), &grid)
                    .map_err(|e| worker_failed(i, e))
            })
            .collect::<Result<Vec<_>>>()?;

        if self.interpolate {
            info!("Interpolate");
        }

        let fields = flows
            .par_iter()
            .enumerate()
            .map(|(i, flow)| {
                self.reconstruct(&grid, flow.view(), size)
                    .map_err(|e| worker_failed(i, e))
            })
            .collect::<Result<Vec<_>>>()?;

        let out_size = if self.interpolate || self.resize {
            size
        } else {
            (grid.ny, grid.nx)
        };

        stack_fields(&fields, out_size)
    }
}

fn worker_failed(frame: usize, err: anyhow::Error) -> anyhow::Error {
    MotionError::WorkerFailed {
        frame,
        message: err.to_string(),
    }
    .into()
}
