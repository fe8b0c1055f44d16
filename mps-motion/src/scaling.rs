//! # Dense field reconstruction
//!
//! Sparse displacements tracked on a regular grid are turned into full resolution fields in one of
//! two ways:
//!
//! * [`reshape_grid`] + [`resize`] - reshape the per-point values back into the coarse grid they
//!   were sampled on, then upsample each displacement channel bilinearly.
//! * [`rbfinterp2d`] - treat the points as scattered samples and evaluate a radial basis function
//!   surface at every pixel.

use crate::error::MotionError;
use anyhow::Result;
use log::*;
use nalgebra as na;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

/// Regular grid of tracking points.
///
/// Points are stored x-major: point `ix * ny + iy` lies at column `ix` and row `iy` of the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceGrid {
    pub points: Vec<na::Point2<f32>>,
    /// Number of grid columns.
    pub nx: usize,
    /// Number of grid rows.
    pub ny: usize,
}

impl ReferenceGrid {
    /// Lay a grid over an image of given size.
    ///
    /// Points sit at the centres of `step` sized cells, starting at `step / 2`.
    pub fn uniform(height: usize, width: usize, step: usize) -> Self {
        let step = step.max(1);
        let xs = (step / 2..width).step_by(step).collect::<Vec<_>>();
        let ys = (step / 2..height).step_by(step).collect::<Vec<_>>();

        let points = xs
            .iter()
            .flat_map(|&x| ys.iter().map(move |&y| na::Point2::new(x as f32, y as f32)))
            .collect();

        Self {
            points,
            nx: xs.len(),
            ny: ys.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Reshape per-point displacements `(n, 2)` into a `(ny, nx, 2)` grid.
pub fn reshape_grid(grid: &ReferenceGrid, flow: ArrayView2<f64>) -> Result<Array3<f64>> {
    if flow.dim() != (grid.len(), 2) {
        return Err(MotionError::DimensionMismatch {
            expected: vec![grid.len(), 2],
            found: flow.shape().to_vec(),
        }
        .into());
    }

    Ok(Array3::from_shape_fn((grid.ny, grid.nx, 2), |(iy, ix, c)| {
        flow[[ix * grid.ny + iy, c]]
    }))
}

/// Bilinearly resize an image.
///
/// Pixel centres are aligned (`src = (dst + 0.5) * in / out - 0.5`), samples outside of the source
/// are clamped to the border.
pub fn resize(image: ArrayView2<f64>, (height, width): (usize, usize)) -> Array2<f64> {
    let (ih, iw) = image.dim();

    if ih == 0 || iw == 0 {
        return Array2::zeros((height, width));
    }

    let coords = |out: usize, inp: usize| {
        let ratio = inp as f64 / out as f64;
        (0..out)
            .map(|o| {
                let src = ((o as f64 + 0.5) * ratio - 0.5).clamp(0.0, (inp - 1) as f64);
                let lo = src.floor() as usize;
                let hi = (lo + 1).min(inp - 1);
                (lo, hi, src - lo as f64)
            })
            .collect::<Vec<_>>()
    };

    let rows = coords(height, ih);
    let cols = coords(width, iw);

    Array2::from_shape_fn((height, width), |(y, x)| {
        let (y0, y1, fy) = rows[y];
        let (x0, x1, fx) = cols[x];
        // Written as lerps so that constant regions stay exact.
        let lerp = |a: f64, b: f64, t: f64| a + (b - a) * t;
        let top = lerp(image[[y0, x0]], image[[y0, x1]], fx);
        let bottom = lerp(image[[y1, x0]], image[[y1, x1]], fx);
        lerp(top, bottom, fy)
    })
}

/// Resize every frame of a `(height, width, time)` stack.
pub fn resize_frames(frames: &Array3<f64>, size: (usize, usize)) -> Array3<f64> {
    let mut out = Array3::zeros((size.0, size.1, frames.len_of(Axis(2))));

    for (mut dst, src) in out
        .axis_iter_mut(Axis(2))
        .zip(frames.axis_iter(Axis(2)))
    {
        dst.assign(&resize(src, size));
    }

    out
}

/// Upsample a `(ny, nx, 2)` grid to `(height, width, 2)`, one channel at a time.
pub fn resize_flow(flow: &Array3<f64>, size: (usize, usize)) -> Array3<f64> {
    let mut out = Array3::zeros((size.0, size.1, 2));

    for c in 0..2 {
        out.slice_mut(s![.., .., c])
            .assign(&resize(flow.slice(s![.., .., c]), size));
    }

    out
}

/// Multiquadric radial basis function interpolator.
///
/// The shape parameter defaults to the average point spacing over the bounding box of the nodes.
pub struct Rbf {
    nodes: Vec<na::Point2<f64>>,
    weights: na::DMatrix<f64>,
    epsilon: f64,
}

impl Rbf {
    /// Fit the interpolator.
    ///
    /// # Arguments
    ///
    /// * `points` - node positions.
    /// * `values` - `(n, k)` node values, one interpolated surface per column.
    pub fn fit(points: &[na::Point2<f32>], values: ArrayView2<f64>) -> Result<Self> {
        let n = points.len();

        if values.nrows() != n {
            return Err(MotionError::DimensionMismatch {
                expected: vec![n, values.ncols()],
                found: values.shape().to_vec(),
            }
            .into());
        }

        let nodes = points
            .iter()
            .map(|p| na::Point2::new(p.x as f64, p.y as f64))
            .collect::<Vec<_>>();

        let epsilon = Self::default_epsilon(&nodes);

        let phi = na::DMatrix::from_fn(n, n, |i, j| {
            Self::kernel(na::distance(&nodes[i], &nodes[j]), epsilon)
        });
        let rhs = na::DMatrix::from_fn(n, values.ncols(), |i, j| values[[i, j]]);

        let weights = phi
            .lu()
            .solve(&rhs)
            .ok_or_else(|| anyhow::anyhow!("singular RBF system"))?;

        Ok(Self {
            nodes,
            weights,
            epsilon,
        })
    }

    fn default_epsilon(nodes: &[na::Point2<f64>]) -> f64 {
        let (lo, hi) = nodes.iter().fold(
            (
                na::Point2::new(f64::INFINITY, f64::INFINITY),
                na::Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
            ),
            |(lo, hi), p| (lo.inf(p), hi.sup(p)),
        );

        let area = (hi.x - lo.x) * (hi.y - lo.y);
        let epsilon = (area / nodes.len() as f64).sqrt();

        if epsilon.is_finite() && epsilon > 0.0 {
            epsilon
        } else {
            1.0
        }
    }

    fn kernel(r: f64, epsilon: f64) -> f64 {
        ((r / epsilon).powi(2) + 1.0).sqrt()
    }

    /// Evaluate all surfaces at a point.
    pub fn eval(&self, x: f64, y: f64) -> na::RowDVector<f64> {
        let p = na::Point2::new(x, y);
        let phi = na::RowDVector::from_iterator(
            self.nodes.len(),
            self.nodes
                .iter()
                .map(|n| Self::kernel(na::distance(n, &p), self.epsilon)),
        );
        phi * &self.weights
    }
}

/// Interpolate sparse 2-D displacements over a full pixel grid.
///
/// # Arguments
///
/// * `points` - positions of the sparse samples.
/// * `flow` - `(n, 2)` displacement at each point.
/// * `height` - output height.
/// * `width` - output width.
///
/// Returns a `(height, width, 2)` field.
pub fn rbfinterp2d(
    points: &[na::Point2<f32>],
    flow: ArrayView2<f64>,
    height: usize,
    width: usize,
) -> Result<Array3<f64>> {
    let rbf = Rbf::fit(points, flow)?;
    trace!("RBF fit over {} nodes, epsilon {}", points.len(), rbf.epsilon);

    let mut out = Array3::zeros((height, width, 2));

    for y in 0..height {
        for x in 0..width {
            let v = rbf.eval(x as f64, y as f64);
            out[[y, x, 0]] = v[0];
            out[[y, x, 1]] = v[1];
        }
    }

    Ok(out)
}
