//! # Dual TV-L1 dense optical flow
//!
//! Zach, C., Pock, T., & Bischof, H. (2007). A duality based approach for realtime TV-L1 optical
//! flow.

use crate::dense::{self, DenseFlow};
use crate::error::MotionError;
use crate::flow::{Flow, FlowField};
use crate::properties::*;
use anyhow::Result;
use log::*;
use ndarray::{Array1, Array3, Array4, ArrayView2};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DualTvl1Params {
    /// Time step of the numerical scheme.
    pub tau: f32,
    /// Weight of the data term.
    pub lambda: f32,
    /// Tightness of the coupling between the two flow estimates.
    pub theta: f32,
    pub nscales: usize,
    /// Warpings per scale.
    pub warps: usize,
    /// Stopping criterion threshold.
    pub epsilon: f32,
    pub inner_iterations: usize,
    pub outer_iterations: usize,
    pub scale_step: f32,
    pub gamma: f32,
    pub median_filtering: usize,
}

impl Default for DualTvl1Params {
    fn default() -> Self {
        Self {
            tau: 0.25,
            lambda: 0.15,
            theta: 0.3,
            nscales: 5,
            warps: 5,
            epsilon: 0.01,
            inner_iterations: 30,
            outer_iterations: 10,
            scale_step: 0.8,
            gamma: 0.0,
            median_filtering: 5,
        }
    }
}

#[derive(Clone, Default)]
pub struct DualTvl1 {
    params: DualTvl1Params,
    provider: Option<Arc<dyn DenseFlow<DualTvl1Params>>>,
}

impl Properties for DualTvl1 {
    fn props_mut(&mut self) -> Vec<(&str, PropertyMut)> {
        let p = &mut self.params;
        vec![
            ("tau", PropertyMut::float(&mut p.tau, 0.0, 1.0)),
            ("lambda", PropertyMut::float(&mut p.lambda, 0.0, 10.0)),
            ("theta", PropertyMut::float(&mut p.theta, 0.0, 1.0)),
            ("nscales", PropertyMut::usize(&mut p.nscales, 1, 16)),
            ("warps", PropertyMut::usize(&mut p.warps, 1, 100)),
            ("epsilon", PropertyMut::float(&mut p.epsilon, 0.0, 1.0)),
            (
                "inner_iterations",
                PropertyMut::usize(&mut p.inner_iterations, 1, 1000),
            ),
            (
                "outer_iterations",
                PropertyMut::usize(&mut p.outer_iterations, 1, 1000),
            ),
            ("scale_step", PropertyMut::float(&mut p.scale_step, 0.05, 0.99)),
            ("gamma", PropertyMut::float(&mut p.gamma, 0.0, 10.0)),
            (
                "median_filtering",
                PropertyMut::usize(&mut p.median_filtering, 1, 15),
            ),
        ]
    }
}

impl DualTvl1 {
    pub fn new(provider: Arc<dyn DenseFlow<DualTvl1Params>>) -> Self {
        Self {
            params: Default::default(),
            provider: Some(provider),
        }
    }

    pub fn params(&self) -> &DualTvl1Params {
        &self.params
    }

    fn provider(&self) -> Result<&dyn DenseFlow<DualTvl1Params>> {
        self.provider
            .as_deref()
            .ok_or_else(|| MotionError::CapabilityUnavailable { algorithm: "dualtvl10" }.into())
    }
}

impl Flow for DualTvl1 {
    fn name(&self) -> &'static str {
        "dualtvl10"
    }

    fn flow(&self, image: ArrayView2<f64>, reference: ArrayView2<f64>) -> Result<FlowField> {
        dense::pair(self.provider()?, &self.params, image, reference).map(FlowField::Dense)
    }

    fn get_displacements(
        &self,
        frames: &Array3<f64>,
        reference: ArrayView2<f64>,
    ) -> Result<Array4<f64>> {
        info!("Get displacements using Dual TV-L1");
        dense::displacements(self.provider()?, &self.params, frames, reference)
    }

    fn supports_velocities(&self) -> bool {
        true
    }

    fn get_velocities(&self, frames: &Array3<f64>, time_stamps: &Array1<f64>) -> Result<Array4<f64>> {
        info!("Get velocities using Dual TV-L1");
        dense::velocities(self.provider()?, &self.params, frames, time_stamps)
    }
}
