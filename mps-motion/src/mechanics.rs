//! # Continuum mechanics of displacement fields
//!
//! Kinematic quantities derived from a `(height, width, time, 2)` displacement field. Every
//! quantity is built through the field's backend, so a deferred displacement yields deferred
//! strains.

use crate::frame_sequence::{TensorFrameSequence, VectorFrameSequence};
use crate::utils::check_time_stamps;
use anyhow::Result;
use ndarray::{Array1, ArrayD, IxDyn};

/// Derived quantities of a displacement field.
#[derive(Clone, Debug)]
pub struct Mechanics {
    u: VectorFrameSequence,
}

impl Mechanics {
    pub fn new(u: VectorFrameSequence) -> Self {
        Self { u }
    }

    pub fn displacement(&self) -> &VectorFrameSequence {
        &self.u
    }

    fn tensor_shape(&self) -> Vec<usize> {
        let mut shape = self.u.shape().to_vec();
        shape.push(2);
        shape
    }

    /// Displacement gradient, `du[.., i, j] = ∂u_i / ∂a_j`.
    ///
    /// `a_0` runs along rows and `a_1` along columns, both with spacing `dx`. Interior points use
    /// central differences, edges one-sided ones.
    pub fn du(&self) -> TensorFrameSequence {
        let dx = self.u.dx();
        let array = self
            .u
            .array()
            .map(self.tensor_shape(), move |u| gradient(u, dx));
        self.u.derive(array)
    }

    /// Deformation gradient `F = I + ∇u`.
    pub fn deformation_gradient(&self) -> TensorFrameSequence {
        let du = self.du();
        let array = du.array().map(du.shape().to_vec(), |du| {
            let mut f = du.clone();
            add_identity(&mut f, 1.0);
            f
        });
        self.u.derive(array)
    }

    /// Green-Lagrange strain `E = (FᵀF - I) / 2`.
    pub fn green_lagrange_strain(&self) -> TensorFrameSequence {
        let f = self.deformation_gradient();
        let array = f.array().map(f.shape().to_vec(), |f| {
            let mut e = ArrayD::zeros(f.raw_dim());
            let s = f.shape();

            for y in 0..s[0] {
                for x in 0..s[1] {
                    for t in 0..s[2] {
                        let at = |k: usize, l: usize| f[[y, x, t, k, l]];
                        for i in 0..2 {
                            for j in 0..2 {
                                let ftf = at(0, i) * at(0, j) + at(1, i) * at(1, j);
                                let delta = if i == j { 1.0 } else { 0.0 };
                                e[[y, x, t, i, j]] = 0.5 * (ftf - delta);
                            }
                        }
                    }
                }
            }

            e
        });
        self.u.derive(array)
    }

    /// Principal strains, the ascending eigenvalues of [`Mechanics::green_lagrange_strain`].
    pub fn principal_strain(&self) -> VectorFrameSequence {
        self.green_lagrange_strain().compute_eigenvalues()
    }

    /// Forward difference velocity `(u[i + 1] - u[i]) / (t[i + 1] - t[i])`.
    ///
    /// The result has one frame less than the displacement.
    pub fn velocity(&self, time_stamps: &Array1<f64>) -> Result<VectorFrameSequence> {
        let num_frames = self.u.num_frames();

        check_time_stamps(time_stamps, num_frames)?;

        let mut shape = self.u.shape().to_vec();
        shape[2] = num_frames.saturating_sub(1);

        let stamps = time_stamps.clone();
        let out_shape = shape.clone();

        let array = self.u.array().map(shape, move |u| {
            ArrayD::from_shape_fn(IxDyn(&out_shape), |idx| {
                let (y, x, t, c) = (idx[0], idx[1], idx[2], idx[3]);
                let du = u[[y, x, t + 1, c]] - u[[y, x, t, c]];
                du / (stamps[t + 1] - stamps[t])
            })
        });

        Ok(self.u.derive(array))
    }
}

/// Spatial gradient of a `(h, w, t, 2)` array, `(h, w, t, 2, 2)`.
fn gradient(u: &ArrayD<f64>, dx: f64) -> ArrayD<f64> {
    let s = u.shape();
    let (h, w) = (s[0], s[1]);
    let shape = [s[0], s[1], s[2], 2, 2];

    ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        let (y, x, t, i, j) = (idx[0], idx[1], idx[2], idx[3], idx[4]);

        let (n, p) = if j == 0 { (h, y) } else { (w, x) };

        if n < 2 {
            return 0.0;
        }

        let (lo, hi) = (p.saturating_sub(1), (p + 1).min(n - 1));
        let get = |q: usize| {
            if j == 0 {
                u[[q, x, t, i]]
            } else {
                u[[y, q, t, i]]
            }
        };

        (get(hi) - get(lo)) / ((hi - lo) as f64 * dx)
    })
}

/// Add `value` to the diagonal of every trailing 2x2 matrix.
fn add_identity(a: &mut ArrayD<f64>, value: f64) {
    let s = a.shape().to_vec();

    for y in 0..s[0] {
        for x in 0..s[1] {
            for t in 0..s[2] {
                a[[y, x, t, 0, 0]] += value;
                a[[y, x, t, 1, 1]] += value;
            }
        }
    }
}
