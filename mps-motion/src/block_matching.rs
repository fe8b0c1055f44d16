//! # Block matching
//!
//! The reference image is split into square blocks, and every block is searched for in the target
//! image within a limited window. The offset with the lowest sum of absolute differences wins, ties
//! resolved in favour of the shortest offset.

use crate::flow::{stack_fields, Flow, FlowField};
use crate::properties::*;
use crate::scaling::resize_flow;
use crate::utils::{check_frame_dimensions, to_uint8};
use anyhow::Result;
use log::*;
use ndarray::{s, Array3, Array4, ArrayView2, Axis};
use rayon::prelude::*;

#[derive(Clone, Debug)]
pub struct BlockMatching {
    block_size: usize,
    max_block_movement: usize,
    resize: bool,
}

impl Default for BlockMatching {
    fn default() -> Self {
        Self {
            block_size: 9,
            max_block_movement: 18,
            resize: true,
        }
    }
}

impl Properties for BlockMatching {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        vec![
            (
                "block_size",
                PropertyMut::usize(&mut self.block_size, 1, 256),
            ),
            (
                "max_block_movement",
                PropertyMut::usize(&mut self.max_block_movement, 0, 256),
            ),
            ("resize", PropertyMut::bool(&mut self.resize)),
        ]
    }
}

impl BlockMatching {
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn max_block_movement(mut self, max_block_movement: usize) -> Self {
        self.max_block_movement = max_block_movement;
        self
    }

    pub fn resize(mut self, resize: bool) -> Self {
        self.resize = resize;
        self
    }

    /// Match every reference block in the image.
    ///
    /// Returns a `(height / block_size, width / block_size, 2)` grid of block displacements.
    fn match_blocks(&self, image: ArrayView2<u8>, reference: ArrayView2<u8>) -> Array3<f64> {
        let bs = self.block_size;
        let (h, w) = reference.dim();
        let (ny, nx) = (h / bs, w / bs);
        let m = self.max_block_movement as isize;

        let mut out = Array3::zeros((ny, nx, 2));

        for by in 0..ny {
            for bx in 0..nx {
                let (y0, x0) = ((by * bs) as isize, (bx * bs) as isize);
                let block = reference.slice(s![by * bs..(by + 1) * bs, bx * bs..(bx + 1) * bs]);

                let mut best = (u32::MAX, isize::MAX, 0, 0);

                for dy in -m..=m {
                    let y = y0 + dy;
                    if y < 0 || y as usize + bs > h {
                        continue;
                    }

                    for dx in -m..=m {
                        let x = x0 + dx;
                        if x < 0 || x as usize + bs > w {
                            continue;
                        }

                        let (y, x) = (y as usize, x as usize);
                        let candidate = image.slice(s![y..y + bs, x..x + bs]);

                        let sad = block
                            .iter()
                            .zip(candidate.iter())
                            .map(|(&a, &b)| (a as i32 - b as i32).unsigned_abs())
                            .sum::<u32>();

                        let dist = dx * dx + dy * dy;

                        if (sad, dist) < (best.0, best.1) {
                            best = (sad, dist, dx, dy);
                        }
                    }
                }

                out[[by, bx, 0]] = best.2 as f64;
                out[[by, bx, 1]] = best.3 as f64;
            }
        }

        out
    }

    fn field(&self, image: ArrayView2<u8>, reference: ArrayView2<u8>) -> Array3<f64> {
        let coarse = self.match_blocks(image, reference);

        if self.resize {
            resize_flow(&coarse, reference.dim())
        } else {
            coarse
        }
    }

    fn output_size(&self, (h, w): (usize, usize)) -> (usize, usize) {
        if self.resize {
            (h, w)
        } else {
            (h / self.block_size, w / self.block_size)
        }
    }
}

impl Flow for BlockMatching {
    fn name(&self) -> &'static str {
        "block_matching"
    }

    fn flow(&self, image: ArrayView2<f64>, reference: ArrayView2<f64>) -> Result<FlowField> {
        Ok(FlowField::Dense(
            self.field(to_uint8(image).view(), to_uint8(reference).view()),
        ))
    }

    fn get_displacements(
        &self,
        frames: &Array3<f64>,
        reference: ArrayView2<f64>,
    ) -> Result<Array4<f64>> {
        info!("Get displacements using block matching");

        check_frame_dimensions(frames, reference)?;

        let size = self.output_size(reference.dim());
        let reference = to_uint8(reference);

        let fields = (0..frames.len_of(Axis(2)))
            .into_par_iter()
            .map(|i| {
                let image = to_uint8(frames.index_axis(Axis(2), i));
                self.field(image.view(), reference.view())
            })
            .collect::<Vec<_>>();

        stack_fields(&fields, size)
    }
}
