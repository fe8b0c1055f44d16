//! # Pyramidal Lucas-Kanade point tracker
//!
//! Pure Rust implementation of sparse iterative Lucas-Kanade tracking over Gaussian image
//! pyramids. Tracking runs coarse to fine: the displacement found at one level seeds the next,
//! finer one.

use crate::lucas_kanade::{LkParams, PointTracker, TrackedPoints};
use anyhow::Result;
use nalgebra as na;
use ndarray::{Array2, ArrayView2};

/// Minimal eigenvalue of the (window normalised) structure tensor below which a point is lost.
const MIN_EIG_THRESHOLD: f32 = 1e-4;

/// Built-in pyramidal Lucas-Kanade tracker.
#[derive(Clone, Copy, Debug, Default)]
pub struct PyramidalLk;

struct Level {
    prev: Array2<f32>,
    next: Array2<f32>,
    grad_x: Array2<f32>,
    grad_y: Array2<f32>,
}

impl PointTracker for PyramidalLk {
    fn track(
        &self,
        prev: ArrayView2<u8>,
        next: ArrayView2<u8>,
        points: &[na::Point2<f32>],
        params: &LkParams,
    ) -> Result<TrackedPoints> {
        if prev.dim() != next.dim() {
            return Err(crate::error::MotionError::DimensionMismatch {
                expected: prev.shape().to_vec(),
                found: next.shape().to_vec(),
            }
            .into());
        }

        let levels = build_levels(prev, next, params.max_level);
        let half = (params.win_size / 2) as isize;
        let area = ((2 * half + 1) * (2 * half + 1)) as f32;
        let eps2 = params.epsilon * params.epsilon;

        let mut out = TrackedPoints::with_capacity(points.len());

        for &pt in points {
            let mut guess = na::Vector2::<f32>::zeros();
            let mut status = 1u8;

            for (lvl, level) in levels.iter().enumerate().rev() {
                let scale = (1 << lvl) as f32;
                let p = pt.coords / scale;

                if lvl + 1 < levels.len() {
                    guess *= 2.0;
                }

                // Structure tensor of the reference window.
                let (mut gxx, mut gxy, mut gyy) = (0f32, 0f32, 0f32);
                let mut window = Vec::with_capacity(area as usize);

                for wy in -half..=half {
                    for wx in -half..=half {
                        let (x, y) = (p.x + wx as f32, p.y + wy as f32);
                        let ix = sample(&level.grad_x, x, y);
                        let iy = sample(&level.grad_y, x, y);
                        let i = sample(&level.prev, x, y);
                        gxx += ix * ix;
                        gxy += ix * iy;
                        gyy += iy * iy;
                        window.push((wx as f32, wy as f32, i, ix, iy));
                    }
                }

                let g = na::Matrix2::new(gxx, gxy, gxy, gyy);
                let min_eig =
                    ((gxx + gyy) - ((gxx - gyy).powi(2) + 4.0 * gxy * gxy).sqrt()) / (2.0 * area);

                let inv = match g.try_inverse() {
                    Some(inv) if min_eig >= MIN_EIG_THRESHOLD => inv,
                    _ => {
                        if lvl == 0 {
                            status = 0;
                        }
                        continue;
                    }
                };

                let mut d = na::Vector2::<f32>::zeros();

                for _ in 0..params.max_iter {
                    let q = p + guess + d;
                    let mut b = na::Vector2::<f32>::zeros();

                    for &(wx, wy, i, ix, iy) in &window {
                        let j = sample(&level.next, q.x + wx, q.y + wy);
                        let diff = i - j;
                        b.x += diff * ix;
                        b.y += diff * iy;
                    }

                    let delta = inv * b;
                    d += delta;

                    if delta.norm_squared() <= eps2 {
                        break;
                    }
                }

                guess += d;
            }

            let next_pt = na::Point2::from(pt.coords + guess);
            let level = &levels[0];
            let err = window_error(level, pt, next_pt, half);

            out.points.push(next_pt);
            out.status.push(status);
            out.error.push(err);
        }

        Ok(out)
    }
}

/// Mean absolute intensity difference between the two tracked windows at full resolution.
fn window_error(level: &Level, from: na::Point2<f32>, to: na::Point2<f32>, half: isize) -> f32 {
    let mut err = 0.0;
    let mut n = 0.0;

    for wy in -half..=half {
        for wx in -half..=half {
            let (ox, oy) = (wx as f32, wy as f32);
            let i = sample(&level.prev, from.x + ox, from.y + oy);
            let j = sample(&level.next, to.x + ox, to.y + oy);
            err += (i - j).abs();
            n += 1.0;
        }
    }

    err / n
}

fn build_levels(prev: ArrayView2<u8>, next: ArrayView2<u8>, max_level: usize) -> Vec<Level> {
    let mut prev = prev.mapv(f32::from);
    let mut next = next.mapv(f32::from);
    let mut levels = vec![];

    loop {
        let (grad_x, grad_y) = gradients(&prev);
        let (h, w) = prev.dim();

        let (down_prev, down_next) = if levels.len() < max_level && h >= 2 && w >= 2 {
            (Some(pyr_down(&prev)), Some(pyr_down(&next)))
        } else {
            (None, None)
        };

        levels.push(Level {
            prev,
            next,
            grad_x,
            grad_y,
        });

        match (down_prev, down_next) {
            (Some(p), Some(n)) => {
                prev = p;
                next = n;
            }
            _ => break,
        }
    }

    levels
}

/// Clamp-to-border pixel lookup.
fn at(img: &Array2<f32>, x: isize, y: isize) -> f32 {
    let (h, w) = img.dim();
    let x = x.clamp(0, w as isize - 1) as usize;
    let y = y.clamp(0, h as isize - 1) as usize;
    img[[y, x]]
}

/// Bilinear sample with border clamping.
fn sample(img: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as isize, y0 as isize);

    let top = at(img, x0, y0) * (1.0 - fx) + at(img, x0 + 1, y0) * fx;
    let bottom = at(img, x0, y0 + 1) * (1.0 - fx) + at(img, x0 + 1, y0 + 1) * fx;

    top * (1.0 - fy) + bottom * fy
}

/// Scharr derivatives, normalised to unit gain.
fn gradients(img: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
    let (h, w) = img.dim();

    let gx = Array2::from_shape_fn((h, w), |(y, x)| {
        let (x, y) = (x as isize, y as isize);
        let d = |oy| at(img, x + 1, y + oy) - at(img, x - 1, y + oy);
        (3.0 * d(-1) + 10.0 * d(0) + 3.0 * d(1)) / 32.0
    });

    let gy = Array2::from_shape_fn((h, w), |(y, x)| {
        let (x, y) = (x as isize, y as isize);
        let d = |ox| at(img, x + ox, y + 1) - at(img, x + ox, y - 1);
        (3.0 * d(-1) + 10.0 * d(0) + 3.0 * d(1)) / 32.0
    });

    (gx, gy)
}

/// Gaussian blur with a 5-tap binomial kernel followed by 2x decimation.
fn pyr_down(img: &Array2<f32>) -> Array2<f32> {
    const K: [f32; 5] = [1.0, 4.0, 6.0, 4.0, 1.0];

    let (h, w) = img.dim();

    let horizontal = Array2::from_shape_fn((h, w), |(y, x)| {
        K.iter()
            .enumerate()
            .map(|(i, k)| k * at(img, x as isize + i as isize - 2, y as isize))
            .sum::<f32>()
            / 16.0
    });

    Array2::from_shape_fn(((h + 1) / 2, (w + 1) / 2), |(y, x)| {
        K.iter()
            .enumerate()
            .map(|(i, k)| k * at(&horizontal, 2 * x as isize, 2 * y as isize + i as isize - 2))
            .sum::<f32>()
            / 16.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::ReferenceGrid;

    fn params() -> LkParams {
        LkParams {
            win_size: 15,
            max_level: 2,
            max_iter: 30,
            epsilon: 0.01,
        }
    }

    /// Smooth blob pattern, shifted by `(dx, dy)`.
    fn pattern(h: usize, w: usize, dx: f32, dy: f32) -> Array2<u8> {
        Array2::from_shape_fn((h, w), |(y, x)| {
            let (x, y) = (x as f32 - dx, y as f32 - dy);
            let v = (x * 0.2).sin() * (y * 0.25).cos() + (x * 0.07 + y * 0.05).sin();
            (127.0 + 60.0 * v) as u8
        })
    }

    #[test]
    fn identical_frames_do_not_move() {
        let img = pattern(64, 64, 0.0, 0.0);
        let grid = ReferenceGrid::uniform(64, 64, 16);

        let out = PyramidalLk
            .track(img.view(), img.view(), &grid.points, &params())
            .unwrap();

        assert_eq!(out.points.len(), grid.len());
        for (a, b) in out.points.iter().zip(&grid.points) {
            assert_eq!(a, b);
        }
        assert!(out.error.iter().all(|&e| e == 0.0));
    }

    #[test]
    fn recovers_translation() {
        let a = pattern(96, 96, 0.0, 0.0);
        let b = pattern(96, 96, 2.0, -1.0);
        let points = vec![na::Point2::new(40.0, 40.0), na::Point2::new(56.0, 48.0)];

        let out = PyramidalLk
            .track(a.view(), b.view(), &points, &params())
            .unwrap();

        for (p, q) in points.iter().zip(&out.points) {
            let d = q - p;
            assert!((d.x - 2.0).abs() < 0.5, "{d:?}");
            assert!((d.y + 1.0).abs() < 0.5, "{d:?}");
        }
    }

    #[test]
    fn flat_image_loses_points() {
        let img = Array2::from_elem((32, 32), 100u8);
        let points = vec![na::Point2::new(16.0, 16.0)];

        let out = PyramidalLk
            .track(img.view(), img.view(), &points, &params())
            .unwrap();

        assert_eq!(out.status, vec![0]);
        assert_eq!(out.points[0], points[0]);
    }

    #[test]
    fn pyramid_sizes() {
        let img = Array2::from_elem((33, 20), 1u8);
        let levels = build_levels(img.view(), img.view(), 3);
        let dims = levels.iter().map(|l| l.prev.dim()).collect::<Vec<_>>();
        assert_eq!(dims, vec![(33, 20), (17, 10), (9, 5), (5, 3)]);
    }
}
