//! # Frame sequences
//!
//! Per-pixel time series of scalars, vectors and tensors. Axis order is fixed:
//!
//! * scalar - `(height, width, time)`
//! * vector - `(height, width, time, component)`
//! * tensor - `(height, width, time, row, col)`
//!
//! A sequence may be backed by a materialised array or by a deferred graph (see
//! [`FieldArray`]). Every operation here preserves the backend of its input, so reductions on a
//! deferred sequence return deferred values and nothing is evaluated until the caller asks for it.

mod array;
mod io;
mod lazy;

pub use array::FieldArray;
pub use lazy::LazyArray;

pub(crate) use io::{has_member, read_member};

use crate::error::MotionError;
use anyhow::Result;
use nalgebra as na;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use std::marker::PhantomData;
use std::path::Path;

/// Rank marker of a field sequence.
pub trait Kind: Send + Sync + 'static {
    /// Shape of the per-pixel value.
    const COMPONENTS: &'static [usize];
    const NAME: &'static str;
}

/// One value per pixel.
pub struct Scalar;
/// Two-component vector per pixel.
pub struct Vector;
/// 2x2 tensor per pixel.
pub struct Tensor;

impl Kind for Scalar {
    const COMPONENTS: &'static [usize] = &[];
    const NAME: &'static str = "FrameSequence";
}

impl Kind for Vector {
    const COMPONENTS: &'static [usize] = &[2];
    const NAME: &'static str = "VectorFrameSequence";
}

impl Kind for Tensor {
    const COMPONENTS: &'static [usize] = &[2, 2];
    const NAME: &'static str = "TensorFrameSequence";
}

/// Scalar field sequence.
pub type FrameSequence = FieldSeries<Scalar>;
/// Vector field sequence.
pub type VectorFrameSequence = FieldSeries<Vector>;
/// Tensor field sequence.
pub type TensorFrameSequence = FieldSeries<Tensor>;

/// Time series of per-pixel values of rank given by `K`.
pub struct FieldSeries<K: Kind> {
    array: FieldArray,
    dx: f64,
    scale: f64,
    _kind: PhantomData<K>,
}

impl<K: Kind> Clone for FieldSeries<K> {
    fn clone(&self) -> Self {
        Self {
            array: self.array.clone(),
            dx: self.dx,
            scale: self.scale,
            _kind: PhantomData,
        }
    }
}

impl<K: Kind> std::fmt::Debug for FieldSeries<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct(K::NAME)
            .field("shape", &self.shape())
            .field("lazy", &self.is_lazy())
            .field("dx", &self.dx)
            .field("scale", &self.scale)
            .finish()
    }
}

impl<K: Kind> PartialEq for FieldSeries<K> {
    /// Exact element-wise equality of the materialised values.
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.array.computed() == other.array.computed()
    }
}

impl<K: Kind> FieldSeries<K> {
    /// Wrap a materialised array.
    pub fn new(array: ArrayD<f64>) -> Result<Self> {
        Self::from_field_array(array.into())
    }

    /// Wrap an array in the deferred backend.
    pub fn lazy(array: ArrayD<f64>) -> Result<Self> {
        Self::from_field_array(FieldArray::lazy(array))
    }

    /// Wrap an array of either backend, validating its rank.
    pub fn from_field_array(array: FieldArray) -> Result<Self> {
        let expected = 3 + K::COMPONENTS.len();

        if array.ndim() != expected {
            return Err(MotionError::InvalidRank {
                expected,
                found: array.ndim(),
            }
            .into());
        }

        if &array.shape()[3..] != K::COMPONENTS {
            let mut expected = array.shape()[..3].to_vec();
            expected.extend_from_slice(K::COMPONENTS);
            return Err(MotionError::DimensionMismatch {
                expected,
                found: array.shape().to_vec(),
            }
            .into());
        }

        Ok(Self {
            array,
            dx: 1.0,
            scale: 1.0,
            _kind: PhantomData,
        })
    }

    /// Set the physical size of one pixel.
    pub fn with_dx(self, dx: f64) -> Self {
        Self { dx, ..self }
    }

    /// Set the spatial scale the field was computed at.
    pub fn with_scale(self, scale: f64) -> Self {
        Self { scale, ..self }
    }

    /// Build a field of another rank that shares this one's metadata.
    pub(crate) fn derive<O: Kind>(&self, array: FieldArray) -> FieldSeries<O> {
        FieldSeries {
            array,
            dx: self.dx,
            scale: self.scale,
            _kind: PhantomData,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    pub fn num_frames(&self) -> usize {
        self.shape()[2]
    }

    pub fn dx(&self) -> f64 {
        self.dx
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn is_lazy(&self) -> bool {
        self.array.is_lazy()
    }

    /// Underlying backend value.
    pub fn array(&self) -> &FieldArray {
        &self.array
    }

    /// Materialise the values.
    pub fn compute(&self) -> ArrayD<f64> {
        self.array.to_array()
    }

    pub fn into_lazy(self) -> Self {
        Self {
            array: self.array.into_lazy(),
            ..self
        }
    }

    pub fn into_eager(self) -> Self {
        Self {
            array: self.array.into_eager(),
            ..self
        }
    }

    /// Shape after reducing both spatial axes.
    fn reduced_shape(&self) -> Vec<usize> {
        self.shape()[2..].to_vec()
    }

    /// Spatial mean per time step (and component).
    pub fn mean(&self) -> FieldArray {
        self.array.map(self.reduced_shape(), |a| {
            let n = (a.shape()[0] * a.shape()[1]) as f64;
            a.sum_axis(Axis(0)).sum_axis(Axis(0)) / n
        })
    }

    /// Spatial maximum per time step (and component).
    pub fn max(&self) -> FieldArray {
        self.array.map(self.reduced_shape(), |a| {
            fold_spatial(a, f64::NEG_INFINITY, f64::max)
        })
    }

    /// Spatial minimum per time step (and component).
    pub fn min(&self) -> FieldArray {
        self.array
            .map(self.reduced_shape(), |a| fold_spatial(a, f64::INFINITY, f64::min))
    }

    /// Average over square blocks laid out in `n` columns.
    ///
    /// The block side is `width / n`. The output has shape `(height / side, n, time, ...)`.
    /// Fails if `width` is not divisible by `n` into non-empty blocks, or `height` is not
    /// divisible by the block side.
    pub fn local_averages(&self, n: usize) -> Result<Self> {
        let (height, width) = (self.shape()[0], self.shape()[1]);

        if n == 0 || n > width || width % n != 0 {
            return Err(MotionError::Indivisible {
                extent: width,
                divisor: n,
            }
            .into());
        }

        let side = width / n;

        if height % side != 0 {
            return Err(MotionError::Indivisible {
                extent: height,
                divisor: side,
            }
            .into());
        }

        let rows = height / side;
        let mut shape = vec![rows, n];
        shape.extend_from_slice(&self.shape()[2..]);

        let array = self.array.map(shape.clone(), move |a| {
            let mut out = ArrayD::zeros(IxDyn(&shape));

            for bi in 0..rows {
                for bj in 0..n {
                    let block = a.slice_each_axis(|ad| match ad.axis.index() {
                        0 => Slice::from(bi * side..(bi + 1) * side),
                        1 => Slice::from(bj * side..(bj + 1) * side),
                        _ => Slice::from(..),
                    });
                    let mean = block.sum_axis(Axis(0)).sum_axis(Axis(0)) / (side * side) as f64;

                    out.index_axis_mut(Axis(0), bi)
                        .index_axis_move(Axis(0), bj)
                        .assign(&mean);
                }
            }

            out
        });

        Ok(self.derive(array))
    }

    /// Save to a `.npy` or `.npz` file.
    ///
    /// Forces evaluation of a deferred sequence.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        io::save(path.as_ref(), self.array.computed(), self.dx, self.scale)
    }

    /// Load a sequence saved by [`FieldSeries::save`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let stored = io::load(path.as_ref())?;
        Ok(Self::new(stored.array)?
            .with_dx(stored.dx)
            .with_scale(stored.scale))
    }

    /// Select one per-pixel component as a scalar sequence.
    fn component(&self, index: &'static [usize]) -> FrameSequence {
        let shape = self.shape()[..3].to_vec();

        let array = self.array.map(shape, move |a| {
            let mut view = a.view();
            for &i in index {
                view = view.index_axis_move(Axis(3), i);
            }
            view.to_owned()
        });

        self.derive(array)
    }

    /// Euclidean norm over all component axes.
    fn component_norm(&self) -> FrameSequence {
        let shape = self.shape()[..3].to_vec();
        let axes = K::COMPONENTS.len();

        let array = self.array.map(shape, move |a| {
            let mut sq = a.mapv(|v| v * v);
            for _ in 0..axes {
                sq = sq.sum_axis(Axis(3));
            }
            sq.mapv_into(f64::sqrt)
        });

        self.derive(array)
    }
}

fn fold_spatial(a: &ArrayD<f64>, init: f64, f: fn(f64, f64) -> f64) -> ArrayD<f64> {
    a.fold_axis(Axis(0), init, |&acc, &v| f(acc, v))
        .fold_axis(Axis(0), init, |&acc, &v| f(acc, v))
}

fn check_bounds(vmin: Option<f64>, vmax: Option<f64>) -> Result<()> {
    match (vmin, vmax) {
        (Some(vmin), Some(vmax)) if vmin > vmax => {
            Err(MotionError::InvalidThreshold { vmin, vmax }.into())
        }
        _ => Ok(()),
    }
}

impl FieldSeries<Scalar> {
    /// Clip values into `[vmin, vmax]`.
    ///
    /// An omitted bound leaves that side unclipped, which is the same as bounding by the
    /// sequence's own minimum or maximum.
    pub fn threshold(&self, vmin: Option<f64>, vmax: Option<f64>) -> Result<Self> {
        check_bounds(vmin, vmax)?;

        let (lo, hi) = (
            vmin.unwrap_or(f64::NEG_INFINITY),
            vmax.unwrap_or(f64::INFINITY),
        );

        let array = self
            .array
            .map(self.shape().to_vec(), move |a| a.mapv(|v| v.max(lo).min(hi)));

        Ok(self.derive(array))
    }
}

impl FieldSeries<Vector> {
    /// Component 1 of each vector.
    pub fn x(&self) -> FrameSequence {
        self.component(&[1])
    }

    /// Component 0 of each vector.
    pub fn y(&self) -> FrameSequence {
        self.component(&[0])
    }

    /// Pixel-wise Euclidean norm.
    pub fn norm(&self) -> FrameSequence {
        self.component_norm()
    }

    /// Clip vector magnitudes into `[vmin, vmax]`, preserving direction.
    ///
    /// Vectors outside of the bounds are rescaled to the nearer bound. Zero vectors have no
    /// direction and are left untouched.
    pub fn threshold_norm(&self, vmin: Option<f64>, vmax: Option<f64>) -> Result<Self> {
        check_bounds(vmin, vmax)?;

        let (lo, hi) = (
            vmin.unwrap_or(f64::NEG_INFINITY),
            vmax.unwrap_or(f64::INFINITY),
        );

        let norm = self.norm();

        let array = self.array.zip(norm.array(), self.shape().to_vec(), move |a, n| {
            let mut out = a.clone();

            for (mut lane, &norm) in out.lanes_mut(Axis(3)).into_iter().zip(n.iter()) {
                if norm > 0.0 {
                    let target = norm.max(lo).min(hi);
                    if target != norm {
                        lane *= target / norm;
                    }
                }
            }

            out
        });

        Ok(self.derive(array))
    }
}

impl FieldSeries<Tensor> {
    /// Element `[1, 1]` of each tensor.
    pub fn x(&self) -> FrameSequence {
        self.component(&[1, 1])
    }

    /// Element `[0, 0]` of each tensor.
    pub fn y(&self) -> FrameSequence {
        self.component(&[0, 0])
    }

    /// Element `[1, 0]` of each tensor.
    pub fn xy(&self) -> FrameSequence {
        self.component(&[1, 0])
    }

    /// Pixel-wise Frobenius norm.
    pub fn norm(&self) -> FrameSequence {
        self.component_norm()
    }

    /// Eigenvalues of each (symmetric) tensor in ascending order.
    ///
    /// Only the lower triangle of each tensor is read.
    pub fn compute_eigenvalues(&self) -> VectorFrameSequence {
        let mut shape = self.shape()[..3].to_vec();
        shape.push(2);

        let array = self.array.map(shape.clone(), move |a| {
            let mut out = ArrayD::zeros(IxDyn(&shape));

            for (mut dst, src) in out
                .lanes_mut(Axis(3))
                .into_iter()
                .zip(a.exact_chunks(IxDyn(&[1, 1, 1, 2, 2])))
            {
                let m = na::Matrix2::new(
                    src[[0, 0, 0, 0, 0]],
                    src[[0, 0, 0, 1, 0]],
                    src[[0, 0, 0, 1, 0]],
                    src[[0, 0, 0, 1, 1]],
                );
                let eig = m.symmetric_eigenvalues();
                let (lo, hi) = if eig[0] <= eig[1] {
                    (eig[0], eig[1])
                } else {
                    (eig[1], eig[0])
                };
                dst[0] = lo;
                dst[1] = hi;
            }

            out
        });

        self.derive(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const HEIGHT: usize = 10;
    const WIDTH: usize = 15;
    const FRAMES: usize = 14;

    fn random(shape: &[usize], seed: u64) -> ArrayD<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array::from_shape_simple_fn(IxDyn(shape), || rng.gen::<f64>())
    }

    fn backends<K: Kind>(array: ArrayD<f64>) -> [FieldSeries<K>; 2] {
        [
            FieldSeries::new(array.clone()).unwrap(),
            FieldSeries::lazy(array).unwrap(),
        ]
    }

    fn global(a: &FieldArray, init: f64, f: fn(f64, f64) -> f64) -> f64 {
        a.computed().iter().copied().fold(init, f)
    }

    #[test]
    fn scalar_reductions() {
        for x in backends::<Scalar>(random(&[HEIGHT, WIDTH, FRAMES], 0)) {
            let mean = x.mean();
            assert_eq!(mean.is_lazy(), x.is_lazy());
            assert_eq!(mean.shape(), &[FRAMES]);
            assert_eq!(x.max().shape(), &[FRAMES]);
            assert_eq!(x.min().shape(), &[FRAMES]);
        }
    }

    #[test]
    fn vector_reductions() {
        let arr = random(&[HEIGHT, WIDTH, FRAMES, 2], 1);

        for x in backends::<Vector>(arr.clone()) {
            assert_eq!(x.mean().shape(), &[FRAMES, 2]);
            assert_eq!(x.max().shape(), &[FRAMES, 2]);
            assert_eq!(x.max().is_lazy(), x.is_lazy());

            let norm = x.norm();
            assert_eq!(norm.shape(), &[HEIGHT, WIDTH, FRAMES]);

            let xs = arr.index_axis(Axis(3), 1).to_owned();
            let ys = arr.index_axis(Axis(3), 0).to_owned();
            assert_eq!(x.x(), FrameSequence::new(xs).unwrap());
            assert_eq!(x.y(), FrameSequence::new(ys).unwrap());
        }
    }

    #[test]
    fn tensor_components() {
        let arr = random(&[HEIGHT, WIDTH, FRAMES, 2, 2], 2);

        for x in backends::<Tensor>(arr.clone()) {
            let pick = |i, j| {
                FrameSequence::new(
                    arr.index_axis(Axis(3), i)
                        .index_axis_move(Axis(3), j)
                        .to_owned(),
                )
                .unwrap()
            };

            assert_eq!(x.x(), pick(1, 1));
            assert_eq!(x.y(), pick(0, 0));
            assert_eq!(x.xy(), pick(1, 0));
            assert_eq!(x.norm().shape(), &[HEIGHT, WIDTH, FRAMES]);
            assert_eq!(x.mean().shape(), &[FRAMES, 2, 2]);
            assert_eq!(x.max().shape(), &[FRAMES, 2, 2]);
        }
    }

    #[test]
    fn tensor_eigenvalues() {
        let mut arr = random(&[HEIGHT, WIDTH, FRAMES, 2, 2], 3);
        for mut m in arr.exact_chunks_mut(IxDyn(&[1, 1, 1, 2, 2])) {
            m[[0, 0, 0, 0, 1]] = m[[0, 0, 0, 1, 0]];
        }

        for x in backends::<Tensor>(arr.clone()) {
            let eig = x.compute_eigenvalues();
            assert_eq!(eig.shape(), &[HEIGHT, WIDTH, FRAMES, 2]);
            let eig = eig.compute();

            for (idx, m) in arr.exact_chunks(IxDyn(&[1, 1, 1, 2, 2])).into_iter().enumerate() {
                let (i, j, t) = (idx / (WIDTH * FRAMES), idx / FRAMES % WIDTH, idx % FRAMES);
                let (a, b, d) = (m[[0, 0, 0, 0, 0]], m[[0, 0, 0, 1, 0]], m[[0, 0, 0, 1, 1]]);
                let mid = (a + d) / 2.0;
                let r = (((a - d) / 2.0).powi(2) + b * b).sqrt();
                assert_approx_eq!(eig[[i, j, t, 0]], mid - r, 1e-9);
                assert_approx_eq!(eig[[i, j, t, 1]], mid + r, 1e-9);
            }
        }
    }

    #[test]
    fn norm_of_ones() {
        let arr = ArrayD::from_elem(IxDyn(&[HEIGHT, WIDTH, FRAMES, 2]), 1.0);

        for x in backends::<Vector>(arr) {
            let norm = x.norm();
            assert_eq!(norm.is_lazy(), x.is_lazy());
            assert!(norm
                .compute()
                .iter()
                .all(|&v| (v - std::f64::consts::SQRT_2).abs() < 1e-12));
        }
    }

    #[test]
    fn threshold() {
        let limits = [
            (Some(0.4), Some(0.6)),
            (None, Some(0.6)),
            (Some(0.4), None),
            (Some(0.5), Some(0.5)),
            (None, None),
        ];

        let mut values = random(&[HEIGHT, WIDTH, FRAMES], 4);
        values[[0, 0, 0]] = 0.5;

        let vmin_all = values.iter().copied().fold(f64::INFINITY, f64::min);
        let vmax_all = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        for (vmin, vmax) in limits {
            for x in backends::<Scalar>(values.clone()) {
                let th = x.threshold(vmin, vmax).unwrap();
                assert_eq!(th.is_lazy(), x.is_lazy());

                assert_approx_eq!(
                    global(&th.max(), f64::NEG_INFINITY, f64::max),
                    vmax.unwrap_or(vmax_all)
                );
                assert_approx_eq!(
                    global(&th.min(), f64::INFINITY, f64::min),
                    vmin.unwrap_or(vmin_all)
                );
                assert_eq!(th.compute()[[0, 0, 0]], 0.5);
            }
        }
    }

    #[test]
    fn invalid_threshold() {
        for x in backends::<Scalar>(random(&[HEIGHT, WIDTH, FRAMES], 5)) {
            let err = x.threshold(Some(0.7), Some(0.2)).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MotionError>(),
                Some(MotionError::InvalidThreshold { .. })
            ));
        }
    }

    #[test]
    fn threshold_norm() {
        let limits = [
            (Some(0.4), Some(0.6)),
            (None, Some(0.6)),
            (Some(0.4), None),
            (Some(0.5), Some(0.5)),
            (None, None),
        ];

        let special = 0.125f64.sqrt();
        let mut values = random(&[HEIGHT, WIDTH, FRAMES, 2], 6);
        values[[0, 0, 0, 0]] = special;
        values[[0, 0, 0, 1]] = special;

        for (vmin, vmax) in limits {
            for x in backends::<Vector>(values.clone()) {
                let norm = x.norm();
                let th = x.threshold_norm(vmin, vmax).unwrap();
                let th_norm = th.norm();

                assert_approx_eq!(
                    global(&th_norm.max(), f64::NEG_INFINITY, f64::max),
                    vmax.unwrap_or_else(|| global(&norm.max(), f64::NEG_INFINITY, f64::max))
                );
                assert_approx_eq!(
                    global(&th_norm.min(), f64::INFINITY, f64::min),
                    vmin.unwrap_or_else(|| global(&norm.min(), f64::INFINITY, f64::min))
                );

                let th = th.compute();
                assert_approx_eq!(th[[0, 0, 0, 0]], special);
                assert_approx_eq!(th[[0, 0, 0, 1]], special);
            }
        }
    }

    #[test]
    fn threshold_norm_keeps_direction() {
        let mut values = ArrayD::zeros(IxDyn(&[1, 1, 1, 2]));
        values[[0, 0, 0, 0]] = 3.0;
        values[[0, 0, 0, 1]] = 4.0;

        let x = VectorFrameSequence::new(values).unwrap();
        let th = x.threshold_norm(None, Some(1.0)).unwrap().compute();

        assert_approx_eq!(th[[0, 0, 0, 0]], 0.6);
        assert_approx_eq!(th[[0, 0, 0, 1]], 0.8);
    }

    #[test]
    fn threshold_norm_backends_agree() {
        let [eager, lazy] = backends::<Vector>(random(&[HEIGHT, WIDTH, FRAMES, 2], 11));

        let a = eager.threshold_norm(Some(0.2), Some(0.6)).unwrap();
        let b = lazy.threshold_norm(Some(0.2), Some(0.6)).unwrap();

        assert!(!a.is_lazy());
        assert!(b.is_lazy());

        for (x, y) in a.compute().iter().zip(b.compute().iter()) {
            assert_approx_eq!(x, y);
        }
    }

    #[test]
    fn local_averages() {
        let arr = ArrayD::from_elem(IxDyn(&[HEIGHT, WIDTH, FRAMES]), 1.0);

        for x in backends::<Scalar>(arr.clone()) {
            let la = x.local_averages(3).unwrap();
            assert_eq!(la.shape(), &[HEIGHT / (WIDTH / 3), 3, FRAMES]);
            assert!(la.compute().iter().all(|&v| (v - 1.0).abs() < 1e-12));
        }
    }

    #[test]
    fn local_averages_block_means() {
        // Two 2x2 blocks side by side with distinct values.
        let mut arr = ArrayD::zeros(IxDyn(&[2, 4, 1]));
        for i in 0..2 {
            for j in 0..4 {
                arr[[i, j, 0]] = (i * 4 + j) as f64;
            }
        }

        let la = FrameSequence::new(arr)
            .unwrap()
            .local_averages(2)
            .unwrap()
            .compute();

        assert_eq!(la.shape(), &[1, 2, 1]);
        assert_approx_eq!(la[[0, 0, 0]], (0.0 + 1.0 + 4.0 + 5.0) / 4.0);
        assert_approx_eq!(la[[0, 1, 0]], (2.0 + 3.0 + 6.0 + 7.0) / 4.0);
    }

    #[test]
    fn local_averages_indivisible() {
        let x = FrameSequence::new(ArrayD::zeros(IxDyn(&[HEIGHT, WIDTH, FRAMES]))).unwrap();

        for n in [0, 4, 7] {
            let err = x.local_averages(n).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<MotionError>(),
                Some(MotionError::Indivisible { .. })
            ));
        }

        // Width splits evenly, but the resulting block side does not divide the height.
        let err = x.local_averages(5).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::Indivisible { extent: HEIGHT, divisor: 3 })
        ));

        // An empty width splits into blocks of side zero.
        let empty = FrameSequence::new(ArrayD::zeros(IxDyn(&[4, 0, 2]))).unwrap();
        let err = empty.local_averages(2).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::Indivisible { extent: 0, divisor: 2 })
        ));
    }

    #[test]
    fn save_load() {
        let dir = tempfile::tempdir().unwrap();

        for suffix in ["npy", "npz"] {
            for (i, x) in backends::<Vector>(random(&[HEIGHT, WIDTH, FRAMES, 2], 7))
                .into_iter()
                .enumerate()
            {
                let x = x.with_dx(0.25);
                let path = dir.path().join(format!("field{i}.{suffix}"));
                x.save(&path).unwrap();

                let loaded = VectorFrameSequence::from_file(&path).unwrap();
                assert_eq!(x, loaded);
                if suffix == "npz" {
                    assert_eq!(loaded.dx(), 0.25);
                }
            }
        }
    }

    #[test]
    fn load_checks_rank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalar.npy");

        FrameSequence::new(random(&[HEIGHT, WIDTH, FRAMES], 8))
            .unwrap()
            .save(&path)
            .unwrap();

        let err = VectorFrameSequence::from_file(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MotionError>(),
            Some(MotionError::InvalidRank {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn unknown_format() {
        let x = FrameSequence::new(random(&[2, 2, 2], 9)).unwrap();
        assert!(x.save("field.txt").is_err());
    }

    #[test]
    fn reductions_stay_deferred() {
        let x = VectorFrameSequence::lazy(random(&[HEIGHT, WIDTH, FRAMES, 2], 10)).unwrap();
        let norm = x.norm();
        let mean = norm.mean();

        match (&norm.array, &mean) {
            (FieldArray::Lazy(n), FieldArray::Lazy(m)) => {
                assert!(!n.is_computed());
                assert!(!m.is_computed());
                mean.computed();
                assert!(n.is_computed());
                assert!(m.is_computed());
            }
            _ => panic!("expected deferred values"),
        }
    }
}
