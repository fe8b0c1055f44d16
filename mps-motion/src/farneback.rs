//! # Farneback dense optical flow
//!
//! Farnebäck, G. (2003). Two-frame motion estimation based on polynomial expansion.
//!
//! The polynomial expansion itself is supplied by a [`DenseFlow`] provider, see the
//! `mps-motion-cv` crate for one backed by OpenCV.

use crate::dense::{self, DenseFlow};
use crate::error::MotionError;
use crate::flow::{Flow, FlowField};
use crate::properties::*;
use anyhow::Result;
use log::*;
use ndarray::{Array1, Array3, Array4, ArrayView2};
use std::sync::Arc;

/// Farneback settings, named after their OpenCV counterparts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FarnebackParams {
    /// Image scale between pyramid layers.
    pub pyr_scale: f32,
    pub levels: usize,
    /// Averaging window size.
    pub winsize: usize,
    /// Iterations at each pyramid level.
    pub iterations: usize,
    /// Pixel neighbourhood used for the polynomial expansion.
    pub poly_n: usize,
    pub poly_sigma: f32,
    pub flags: usize,
}

impl Default for FarnebackParams {
    fn default() -> Self {
        Self {
            pyr_scale: 0.5,
            levels: 3,
            winsize: 15,
            iterations: 3,
            poly_n: 5,
            poly_sigma: 1.2,
            flags: 0,
        }
    }
}

#[derive(Clone, Default)]
pub struct Farneback {
    params: FarnebackParams,
    provider: Option<Arc<dyn DenseFlow<FarnebackParams>>>,
}

impl Properties for Farneback {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        let p = &mut self.params;
        vec![
            ("pyr_scale", PropertyMut::float(&mut p.pyr_scale, 0.05, 0.95)),
            ("levels", PropertyMut::usize(&mut p.levels, 1, 16)),
            ("winsize", PropertyMut::usize(&mut p.winsize, 1, 255)),
            ("iterations", PropertyMut::usize(&mut p.iterations, 1, 100)),
            ("poly_n", PropertyMut::usize(&mut p.poly_n, 5, 7)),
            ("poly_sigma", PropertyMut::float(&mut p.poly_sigma, 0.1, 10.0)),
            ("flags", PropertyMut::usize(&mut p.flags, 0, 512)),
        ]
    }
}

impl Farneback {
    pub fn new(provider: Arc<dyn DenseFlow<FarnebackParams>>) -> Self {
        Self {
            params: Default::default(),
            provider: Some(provider),
        }
    }

    pub fn params(&self) -> &FarnebackParams {
        &self.params
    }

    fn provider(&self) -> Result<&dyn DenseFlow<FarnebackParams>> {
        self.provider
            .as_deref()
            .ok_or_else(|| MotionError::CapabilityUnavailable { algorithm: "farneback" }.into())
    }
}

impl Flow for Farneback {
    fn name(&self) -> &'static str {
        "farneback"
    }

    fn flow(&self, image: ArrayView2<f64>, reference: ArrayView2<f64>) -> Result<FlowField> {
        dense::pair(self.provider()?, &self.params, image, reference).map(FlowField::Dense)
    }

    fn get_displacements(
        &self,
        frames: &Array3<f64>,
        reference: ArrayView2<f64>,
    ) -> Result<Array4<f64>> {
        info!("Get displacements using Farneback's algorithm");
        dense::displacements(self.provider()?, &self.params, frames, reference)
    }

    fn supports_velocities(&self) -> bool {
        true
    }

    fn get_velocities(&self, frames: &Array3<f64>, time_stamps: &Array1<f64>) -> Result<Array4<f64>> {
        info!("Get velocities using Farneback's algorithm");
        dense::velocities(self.provider()?, &self.params, frames, time_stamps)
    }
}
